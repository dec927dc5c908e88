pub mod config;
pub mod gaps;
pub mod replay;
pub mod watch;

use toe_core::logging::{self, LoggingGuard};
use toe_core::Config;
use tokio_util::sync::CancellationToken;

/// Logging from the user's config, or defaults when it cannot be read.
/// The command itself reports a broken config.
pub fn init_logging() -> Option<LoggingGuard> {
    let config = Config::load().unwrap_or_default();
    logging::init(&config.logging).ok()
}

/// Single-threaded runtime; every loop here runs on one logical thread.
pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Cancel `token` on Ctrl-C. Must be called inside the runtime.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            token.cancel();
        }
    });
}
