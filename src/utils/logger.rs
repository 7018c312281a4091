use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,grammers_mtsender=warn,grammers_session=warn";

/// Installs the global subscriber. `log` records from the Telegram modules are
/// picked up through the subscriber's log bridge.
///
/// `RUST_LOG` overrides the default filter. Calling this twice is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_err()
    {
        log::debug!("logger::init: subscriber already installed");
    }
}
