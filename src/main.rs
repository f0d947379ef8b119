use anyhow::Result;
use env_logger::{Builder, Env};

use modbus_bridge::cli::commands::{build_cli, handle_subcommands, level_filter};
use modbus_bridge::config::Config;

fn init_logging(level: &str) {
    // RUST_LOG still wins when set.
    let mut builder = Builder::new();
    builder.filter_level(level_filter(level));
    builder.parse_env(Env::default());
    builder.format_timestamp_millis();
    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let config = Config::from_matches(&matches)?;
    init_logging(&config.log_level);

    handle_subcommands(&matches, &config).await
}
