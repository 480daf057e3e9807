use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};

use super::{LogFormat, LogLevel};

/// Command-line arguments for the Scrivano binary.
#[derive(Debug, Parser)]
#[command(name = "scrivano", version, about = "Scrivano page server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SCRIVANO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    pub fn overrides(&self) -> Option<&ServeOverrides> {
        match &self.command {
            Some(Command::Serve(args)) => Some(&args.overrides),
            Some(Command::Render(args)) => Some(&args.overrides),
            None => None,
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Scrivano HTTP service.
    Serve(ServeArgs),
    /// Render a single document to stdout and exit.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Name of the document to render.
    #[arg(value_name = "DOCUMENT")]
    pub document: String,

    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the documents root directory.
    #[arg(long = "documents-root", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub documents_root: Option<PathBuf>,

    /// Override the log level.
    #[arg(long = "log-level", value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Override the log format.
    #[arg(long = "log-format", value_enum, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}
