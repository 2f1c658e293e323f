use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    EnvFilter,
};

/// Installs the process-wide subscriber. Called once by the binary; library
/// code only emits events.
pub fn init_tracing() {
    let directive: Directive = "outage_normalizer=info"
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    let filter = EnvFilter::from_default_env().add_directive(directive);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
