use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use docinspect::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber and routes `log` records into it.
///
/// `RUST_LOG` wins over the configured level.
pub fn init(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        EnvFilter::new(format!(
            "docinspect={level},docinspect_server={level},tower_http=info"
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().json()),
        )?,
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer()),
        )?,
    }

    tracing_log::LogTracer::init()?;
    Ok(())
}
