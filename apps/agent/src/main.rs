//! # GoBus Agent Entry Point
//!
//! `gobus-agent [CONFIG_PATH]`
//!
//! The actual setup is in lib.rs so the router can be tested in-process.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(std::path::PathBuf::from);
    gobus_agent::run(config_path).await
}
