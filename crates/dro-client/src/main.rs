//! Console client: connects to one DRO/AO2 server, prints everything it
//! publishes and sends packets typed on stdin.
//!
//! Run with: `cargo run -p dro-client -- --server Localhost`

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use dro_config::{CliArgs, Config};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::commands::Input;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config_dir = match args.config.clone() {
        Some(dir) => dir,
        None => dirs::config_dir()
            .context("no configuration directory on this platform")?
            .join("dro-client"),
    };
    let mut config = Config::load_or_create(&config_dir)
        .with_context(|| format!("failed to load config from {}", config_dir.display()))?;
    config.apply_cli_overrides(&args);

    dro_log::init_logging(
        Some(&config_dir.join("logs")),
        cfg!(debug_assertions),
        Some(&config),
    );

    let mut server = args.descriptor(&config)?;
    info!("dro-client {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: {} | connect timeout: {} ms | saved servers: {}",
        config_dir.display(),
        config.network.connect_timeout_ms,
        config.servers.len()
    );

    let (handle, mut events, task) = dro_net::spawn(config.connection_config());
    handle.connect(server.clone()).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("{}", commands::describe(&event)),
                None => break,
            },
            line = stdin.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match commands::parse_input(&line) {
                    Some(Input::Quit) => break,
                    Some(Input::Disconnect) => handle.disconnect().await?,
                    Some(Input::Connect(name)) => {
                        if let Some(name) = name {
                            match config.find_server(&name) {
                                Some(saved) => server = saved.clone(),
                                None => {
                                    warn!("No saved server named {name:?}");
                                    continue;
                                }
                            }
                        }
                        handle.connect(server.clone()).await?;
                    }
                    Some(Input::Help) => commands::print_help(),
                    Some(Input::Send(packet)) => handle.send(packet).await?,
                    None => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // The actor may already be gone if the event channel closed.
    let _ = handle.shutdown().await;
    task.await.context("connection task failed")?;
    while let Ok(event) = events.try_recv() {
        println!("{}", commands::describe(&event));
    }

    info!("Bye");
    Ok(())
}
