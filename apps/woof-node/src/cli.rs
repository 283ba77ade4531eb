use crate::config::NODE_CONFIG_FILE_NAME;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "woof-node", version, about = "Host or query a WOOF endpoint")]
pub struct Cli {
    /// Node configuration file (missing file means defaults)
    #[arg(long, env = "WOOF_NODE_CONFIG", default_value = NODE_CONFIG_FILE_NAME, global = true)]
    pub config: PathBuf,

    /// Directory the log file is written to
    #[arg(long, env = "WOOF_NODE_LOG_DIR", default_value = ".", global = true)]
    pub log_dir: PathBuf,

    /// Log verbosity; `trace` also shows WebSocket frame logs
    #[arg(long, env = "WOOF_NODE_LOG_LEVEL", value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Requested log level, or the build's default.
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level
            .map(LevelFilter::from)
            .unwrap_or(crate::logger::DEFAULT_LEVEL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a server until interrupted
    Serve {
        /// Overrides `listen_address` from the config file
        #[arg(long, env = "WOOF_NODE_LISTEN")]
        listen: Option<String>,
    },

    /// Measure round trips to a server
    Ping {
        #[arg(env = "WOOF_NODE_URL")]
        url: String,

        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },

    /// Print the server's identity
    Identify {
        #[arg(env = "WOOF_NODE_URL")]
        url: String,
    },

    /// List the message types a server understands
    Api {
        #[arg(env = "WOOF_NODE_URL")]
        url: String,

        /// Include the built-in protocol messages
        #[arg(long)]
        include_internal: bool,
    },

    /// Download a stream to a file
    Download {
        url: String,

        stream_id: String,

        output: PathBuf,

        #[arg(long, env = "WOOF_API_KEY", requires = "api_secret")]
        api_key: Option<String>,

        #[arg(long, env = "WOOF_API_SECRET", hide_env_values = true)]
        api_secret: Option<String>,
    },
}
