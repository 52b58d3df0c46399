mod args;
mod commands;
mod init;

use args::{Cli, Commands};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use systemd_notices::NoticesConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let unit = cli.unit.filter(|unit| !unit.trim().is_empty());
    if cli.command.is_none() && unit.is_none() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "the following required arguments were not provided: <UNIT>",
            )
            .exit();
    }

    let config = NoticesConfig::load()?;
    init::initialize_tracing(cli.debug, config.log_file.as_deref())?;

    match cli.command {
        Some(Commands::Install { unit, services }) => {
            commands::install::cmd_install(&unit, &services, &config).await?
        }
        Some(Commands::Uninstall { unit }) => {
            commands::install::cmd_uninstall(&unit, &config).await?
        }
        None => {
            if let Some(unit) = unit {
                commands::run::cmd_run(&unit, &config).await?
            }
        }
    }

    Ok(())
}
