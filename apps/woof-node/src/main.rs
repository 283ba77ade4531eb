use woof_node::cli::{Cli, Command};
use woof_node::commands;
use woof_node::config::NodeConfig;
use woof_node::error::NodeError;
use woof_node::logger::initialize as LoggerInitialize;

use common::RedactedSecret;

use clap::Parser;
use log::info;

#[tokio::main]
async fn main() -> Result<(), NodeError> {
    let cli = Cli::parse();

    // Logger first so config loading is logged
    LoggerInitialize(&cli.log_dir, cli.level_filter())?;
    info!("woof-node {} starting", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::load(&cli.config)?;

    match cli.command {
        Command::Serve { listen } => commands::serve(&config, listen.as_deref()).await?,
        Command::Ping { url, count } => {
            for (sequence, round_trip) in commands::ping(&config, &url, count)
                .await?
                .into_iter()
                .enumerate()
            {
                println!("ping {}: {round_trip:?}", sequence + 1);
            }
        }
        Command::Identify { url } => {
            let identity = commands::identify(&config, &url).await?;
            println!("name:    {}", identity.name);
            println!("version: {}", identity.version);
            if let Some(build_time) = identity.build_time {
                println!("built:   {build_time}");
            }
            if let Some(uptime) = identity.uptime {
                println!("uptime:  {uptime}");
            }
            if let Some(timeout) = identity.timeout {
                println!("timeout: {timeout}");
            }
        }
        Command::Api {
            url,
            include_internal,
        } => {
            for message_type in commands::api(&config, &url, include_internal).await? {
                let mut flags = Vec::new();
                if message_type.is_signed {
                    flags.push("signed");
                }
                if message_type.is_sign_in {
                    flags.push("sign-in");
                }
                if message_type.is_error {
                    flags.push("error");
                }
                println!(
                    "{:>6}  {}  {}",
                    message_type.type_id,
                    message_type.name,
                    flags.join(",")
                );
            }
        }
        Command::Download {
            url,
            stream_id,
            output,
            api_key,
            api_secret,
        } => {
            let credentials = api_key.zip(api_secret.map(RedactedSecret::from));
            let bytes = commands::download(&config, &url, &stream_id, &output, credentials).await?;
            println!("{bytes} bytes written to {}", output.display());
        }
    }

    Ok(())
}
