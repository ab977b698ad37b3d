//! UNA command-line tool
//!
//! Inspect the calling conventions UNA would use on this machine, compile
//! signatures to see their register/stack layout, and call native functions
//! straight from the shell.

mod commands;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use std::path::PathBuf;

use crate::config::UnaConfig;

#[derive(Parser)]
#[command(name = "una")]
#[command(about = "Native calls by ABI emulation", long_about = None)]
#[command(version)]
struct Cli {
    /// Set log level (overrides una.toml and UNA_LOG)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    /// Configuration file (defaults to ./una.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected process and the conventions it maps to
    Info,

    /// Run the calling-convention self-test
    Selftest,

    /// Compile a signature and print the resulting invoker
    Compile {
        /// Signature, e.g. "i(ppip)"
        signature: String,
        /// Convention attribute: default, stdcall or stdcall-on-windows
        #[arg(long)]
        convention: Option<String>,
        /// Arch/OS string to compile for instead of this machine
        #[arg(long)]
        arch_os: Option<String>,
    },

    /// Call a native function
    Call {
        /// Symbol name
        symbol: String,
        /// Signature, e.g. "d(d)"
        signature: String,
        /// Arguments: integers (decimal or 0x hex), decimals for f/d slots,
        /// @text for a pointer to a C string
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,
        /// Library to search (repeatable; defaults to [loader] search)
        #[arg(short, long = "lib")]
        libs: Vec<String>,
        /// Convention attribute: default, stdcall or stdcall-on-windows
        #[arg(long)]
        convention: Option<String>,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = UnaConfig::load(cli.config.as_deref())?;

    // Initialize logging: --log-level, then UNA_LOG, then una.toml
    let mut logger = env_logger::Builder::from_env(Env::default().filter_or("UNA_LOG", "warn"));
    if let Some(level) = cli.log_level {
        logger.filter_level(level.into());
    } else if std::env::var_os("UNA_LOG").is_none() {
        if let Some(level) = config.log_level()? {
            logger.filter_level(level);
        }
    }
    logger.init();

    match cli.command {
        Commands::Info => commands::info::execute(&config),
        Commands::Selftest => commands::selftest::execute(),
        Commands::Compile {
            signature,
            convention,
            arch_os,
        } => commands::compile::execute(&config, &signature, convention.as_deref(), arch_os.as_deref()),
        Commands::Call {
            symbol,
            signature,
            args,
            libs,
            convention,
        } => commands::call::execute(
            &config,
            commands::call::CallOptions {
                symbol,
                signature,
                args,
                libs,
                convention,
            },
        ),
    }
}
