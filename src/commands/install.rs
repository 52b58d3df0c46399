use anyhow::Context;
use systemd_notices::daemon::{Installer, SystemdBus};
use systemd_notices::NoticesConfig;

fn installer(unit: &str, config: &NoticesConfig) -> anyhow::Result<Installer> {
    let charm_dir = std::env::current_dir().context("Failed to resolve working directory")?;
    let exe = std::env::current_exe().context("Failed to resolve own executable path")?;
    Ok(Installer::new(unit, charm_dir, &config.unit_dir, exe).with_hooks_dir(&config.hooks_dir))
}

pub(crate) async fn cmd_install(
    unit: &str,
    services: &[String],
    config: &NoticesConfig,
) -> anyhow::Result<()> {
    tracing::trace!(unit = %unit, ?services, "cmd_install invoked");
    let installer = installer(unit, config)?;
    let bus = SystemdBus::connect().await?;
    installer
        .install(&bus, services)
        .await
        .with_context(|| format!("Failed to install {}", installer.service_name()))
}

pub(crate) async fn cmd_uninstall(unit: &str, config: &NoticesConfig) -> anyhow::Result<()> {
    tracing::trace!(unit = %unit, "cmd_uninstall invoked");
    let installer = installer(unit, config)?;
    let bus = SystemdBus::connect().await?;
    installer
        .uninstall(&bus)
        .await
        .with_context(|| format!("Failed to uninstall {}", installer.service_name()))
}
