use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use log::{info, warn, LevelFilter};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::adapter_config::{
    resolve_topic_root, AdapterConfigSource, AdapterQuery, FileAdapterConfigSource,
};
use crate::config::settings::Config;
use crate::modbus::client::TcpConnector;
use crate::modbus::dispatcher::Dispatcher;
use crate::modbus::session::ConnectionManager;
use crate::output::formatters::{JsonFormatter, OutboundMessage};
use crate::services::command_worker::{CommandPipeline, CommandWorker};
use crate::services::messaging::{MessagingClient, MqttMessagingClient};

fn value_arg(name: &'static str, value_name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name(value_name)
        .help(help)
        .global(true)
}

pub fn build_cli() -> Command {
    Command::new("modbus-bridge")
        .version(crate::VERSION)
        .about("Executes Modbus/TCP commands received over MQTT and publishes the results")
        .arg(value_arg("config", "FILE", "TOML configuration file"))
        .arg(value_arg("broker", "HOST", "MQTT broker host"))
        .arg(value_arg("broker-port", "PORT", "MQTT broker port"))
        .arg(value_arg("device-id", "NAME", "Device name used as MQTT username and client id prefix"))
        .arg(value_arg("active-key", "KEY", "MQTT password for the device"))
        .arg(value_arg("topic-root", "TOPIC", "Root of the request, response and error topics"))
        .arg(value_arg("adapter-id", "ID", "Adapter id to look up in the configuration store"))
        .arg(value_arg(
            "adapter-config-collection",
            "NAME",
            "Collection holding adapter configuration rows",
        ))
        .arg(value_arg(
            "adapter-config-store",
            "FILE",
            "TOML file acting as the adapter configuration store",
        ))
        .arg(value_arg("unit-id", "ID", "Modbus unit identifier placed in every frame"))
        .arg(value_arg("timeout-ms", "MS", "Modbus connect and response timeout"))
        .arg(value_arg("log-level", "LEVEL", "debug, info, warn, error or fatal"))
        .subcommand(Command::new("run").about("Start the bridge (default)"))
        .subcommand(
            Command::new("exec")
                .about("Execute one JSON command against its Modbus host and print the result")
                .arg(Arg::new("json").required(true).value_name("JSON")),
        )
        .subcommand(Command::new("show-config").about("Print the effective configuration as TOML"))
}

/// Maps a configured level name to a filter; `fatal` has no direct
/// counterpart and is treated as `error`.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" | "fatal" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

pub async fn handle_subcommands(matches: &ArgMatches, config: &Config) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("exec", sub)) => {
            let json = sub
                .get_one::<String>("json")
                .context("missing JSON command")?;
            exec_once(config, json).await
        }
        Some(("show-config", _)) => show_config(config),
        _ => run_bridge(config).await,
    }
}

fn build_pipeline(config: &Config, topic_root: &str) -> CommandPipeline<TcpConnector> {
    let connector = TcpConnector::new(config.modbus.timeout(), config.modbus.unit_id);
    let connections =
        ConnectionManager::new(connector).with_idle_timeout(config.modbus.idle_timeout());
    let dispatcher = Dispatcher::new(connections, config.modbus.coil_bit_order);
    CommandPipeline::new(dispatcher, Box::new(JsonFormatter::new(topic_root)))
}

pub async fn run_bridge(config: &Config) -> anyhow::Result<()> {
    info!("🚀 Starting Modbus bridge v{}", crate::VERSION);

    let query = AdapterQuery::from_settings(&config.adapter);
    let store = config
        .adapter
        .config_store
        .as_ref()
        .map(|path| FileAdapterConfigSource::new(path, config.adapter.config_collection.as_str()));
    let topic_root = resolve_topic_root(
        store.as_ref().map(|s| s as &dyn AdapterConfigSource),
        &query,
        &config.adapter.topic_root,
    )
    .await;

    let formatter = JsonFormatter::new(topic_root.as_str());
    let messaging = Arc::new(MqttMessagingClient::new(&config.mqtt));
    let inbound = messaging
        .subscribe(&formatter.request_topic())
        .await
        .context("unable to subscribe to the request topic")?;

    let mut worker = CommandWorker::new(build_pipeline(config, &topic_root), messaging);
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut handle = tokio::spawn(async move {
        worker.run(inbound, stop_rx).await;
    });

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        finished = &mut handle => {
            warn!("⚠️  Command worker exited on its own");
            finished.context("command worker panicked")?;
            false
        }
    };

    if interrupted {
        info!("🛑 Shutdown requested");
        if stop_tx.send(true).is_err() {
            warn!("⚠️  Command worker already stopped");
        }
        handle.await.context("command worker panicked")?;
    }

    info!("👋 Modbus bridge stopped");
    Ok(())
}

/// Runs one command end to end and returns the message that would be published.
pub async fn exec_message(config: &Config, json: &str) -> anyhow::Result<OutboundMessage> {
    let mut pipeline = build_pipeline(config, &config.adapter.topic_root);
    let message = pipeline.process(json.as_bytes()).await;
    pipeline.shutdown().await;
    Ok(message?)
}

pub async fn exec_once(config: &Config, json: &str) -> anyhow::Result<()> {
    let message = exec_message(config, json).await?;
    println!("{}", message.topic);
    println!("{}", String::from_utf8_lossy(&message.payload));
    Ok(())
}

pub fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", config.to_toml()?);
    Ok(())
}
