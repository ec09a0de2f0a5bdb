use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Sets the level of verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Skip using the password manager (for unsupported platforms)
    #[arg(long, global = true)]
    pub skip_password_manager: bool,

    /// Role ARN to assume instead of choosing one interactively
    #[arg(long, value_name = "ARN", global = true)]
    pub role: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Configure aws-saml-signon
    #[command(alias = "config")]
    Configure,

    /// Sign in and store credentials for the configured profile (default)
    Login,
}
