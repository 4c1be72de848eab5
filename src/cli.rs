use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use streamctl_common::Role;

#[derive(Parser)]
#[command(name = "streamctl")]
#[command(author, version, about = "Orchestration for multi-tenant streaming hosts")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the operator API and media proxy
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,

    /// Check that required external tools are available
    CheckTools,

    /// Create a tenant's remote directories and publish its playlist document
    Provision {
        /// Tenant login
        login: String,
    },

    /// Regenerate and hot-reload a tenant's playlist document
    Sync {
        /// Tenant login
        login: String,
    },

    /// Run a lifecycle action against a tenant's application
    App {
        /// Tenant login
        login: String,

        /// start, stop, restart, block, unblock, status or reload
        action: String,

        /// Role the action is performed as
        #[arg(long, value_enum, default_value_t = RoleArg::Admin)]
        role: RoleArg,
    },

    /// Mint a media proxy token for a tenant
    IssueToken {
        /// Tenant login
        login: String,

        /// Lifetime in seconds (defaults to proxy.token_ttl_secs)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Show a tenant's storage usage measured on its host
    Usage {
        /// Tenant login
        login: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a random secret for proxy token signing
    GenerateSecret,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Tenant,
    Reseller,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Tenant => Role::Tenant,
            RoleArg::Reseller => Role::Reseller,
            RoleArg::Admin => Role::Admin,
        }
    }
}
