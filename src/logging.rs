//! Tracing setup for binaries and tests that embed the client.

use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Names a log file to write debug output to.
pub const LOG_FILE_ENV: &str = "LLM_CHAT_LOG";

const FILE_FILTER: &str = "llm_chat_openai=debug";

/// Install a global subscriber.
///
/// With `LLM_CHAT_LOG=<path>` debug logs go to that file; otherwise `RUST_LOG` enables
/// stderr output. Does nothing if neither is set or a subscriber is already installed.
pub fn init() -> std::io::Result<()> {
    if let Some(path) = std::env::var_os(LOG_FILE_ENV) {
        let file = File::create(path)?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(Arc::new(file))
            .with_ansi(false);
        let _ = tracing_subscriber::registry()
            .with(file_layer.with_filter(EnvFilter::new(FILE_FILTER)))
            .try_init();
    } else if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }
    Ok(())
}
