use std::env;

use tracing::info;

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
}

impl Config {
    /// Reads configuration from the environment. `DATABASE_URL` is
    /// mandatory; everything else has a default suitable for local
    /// development.
    pub fn load() -> Self {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3030".to_string())
            .parse()
            .expect("PORT must be a valid number");

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| {
                info!("DATABASE_MAX_CONNECTIONS not set, using default: 5");
                "5".to_string()
            })
            .parse()
            .expect("DATABASE_MAX_CONNECTIONS must be a valid number");

        Self {
            port,
            database_url,
            max_connections,
        }
    }
}
