use tracing::Level;

/// Installs a `tracing` fmt subscriber. Returns false if one was already installed.
pub fn init(debug: bool) -> bool {
    let level = if debug { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}
