//! `stemma-api` binary entrypoint.
//!
//! Loads configuration from environment variables and starts the HTTP
//! server over the artifact directory.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use anyhow::Result;

use stemma_api::config::Config;
use stemma_api::server::Server;
use stemma_core::observability::{LogFormat, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_logging(LogFormat::for_debug(config.debug));

    if !config.artifact_root.join("manifest.json").is_file() {
        tracing::warn!(
            artifact_root = %config.artifact_root.display(),
            "no manifest.json at the artifact root; requests will return 503 until one appears"
        );
    }

    let server = Server::new(config);
    server.serve().await?;
    Ok(())
}
