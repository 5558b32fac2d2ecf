use crate::config::LoggingConfig;
use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static INITIALIZED: OnceCell<()> = OnceCell::new();

fn build_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("keepnet={}", config.level)),
    );
    for (module, level) in &config.module_filters {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }
    Ok(filter)
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    INITIALIZED
        .get_or_try_init(|| {
            let subscriber = tracing_subscriber::registry().with(build_filter(config)?);

            match config.format.as_str() {
                "compact" => {
                    let layer = fmt::layer()
                        .compact()
                        .with_target(config.show_target)
                        .with_thread_ids(false)
                        .with_line_number(false);
                    subscriber.with(layer).try_init()?;
                }
                _ => {
                    let show_location = matches!(config.level.as_str(), "debug" | "trace");
                    let layer = fmt::layer()
                        .with_target(config.show_target)
                        .with_line_number(show_location)
                        .with_file(show_location);
                    subscriber.with(layer).try_init()?;
                }
            }
            tracing::debug!(level = %config.level, format = %config.format, "📝 Logging initialized");
            Ok(())
        })
        .map(|_| ())
}
