use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "systemd-notices")]
#[command(version)]
#[command(about = "Relays systemd service start/stop transitions to Juju hooks", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub(crate) struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Juju unit to notify (e.g., app/0)
    pub unit: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Create service hooks and install the daemon as a systemd service
    Install {
        /// Juju unit to notify (e.g., app/0)
        unit: String,

        /// Services to observe (e.g., nginx)
        #[arg(required = true)]
        services: Vec<String>,
    },

    /// Stop and disable the daemon's systemd service
    Uninstall {
        /// Juju unit the daemon was installed for
        unit: String,
    },
}
