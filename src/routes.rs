use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{self, AppState};

pub fn create_routes(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/polls", post(handlers::create_poll))
        .route("/api/polls/{poll_id}", get(handlers::get_poll))
        .route("/api/polls/{poll_id}/vote", post(handlers::vote))
        .route("/api/polls/{poll_id}/live", get(handlers::live))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::store::PgPollStore;

    // connect_lazy never opens a connection; every request below is
    // rejected before a query would run.
    fn test_router() -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        create_routes(Arc::new(AppState {
            store: PgPollStore::new(pool),
            broadcaster: Broadcaster::new(),
        }))
    }

    fn vote_request(body: &str) -> Request<Body> {
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let mut request = Request::builder()
            .method("POST")
            .uri(format!("/api/polls/{}/vote", Uuid::new_v4()))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    #[tokio::test]
    async fn vote_body_missing_option_id_is_bad_request() {
        let response = test_router().oneshot(vote_request("{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_vote_body_is_bad_request() {
        let response = test_router()
            .oneshot(vote_request("not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn blank_question_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/polls")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"question":"  ","options":["A","B"]}"#))
            .unwrap();
        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
