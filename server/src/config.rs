use docinspect::Config;

/// HTTP settings, taken from the `server` section of the config file.
///
/// `HOST` and `PORT` in the environment (or `.env`) take precedence.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_config(config: &Config) -> Self {
        let section = &config.server;

        let host = std::env::var("HOST").unwrap_or_else(|_| section.host.clone());
        let port = match std::env::var("PORT").map(|p| p.parse::<u16>()) {
            Ok(Ok(port)) => port,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Ignoring invalid PORT");
                section.port
            }
            Err(_) => section.port,
        };

        Self {
            host,
            port,
            cors_origins: section.cors_origins.clone(),
            max_upload_bytes: section.max_upload_mb.saturating_mul(1024 * 1024),
        }
    }
}
