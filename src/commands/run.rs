use anyhow::Context;
use systemd_notices::daemon::monitor;
use systemd_notices::NoticesConfig;

pub(crate) async fn cmd_run(unit: &str, config: &NoticesConfig) -> anyhow::Result<()> {
    tracing::trace!(unit = %unit, ?config, "cmd_run invoked");
    monitor::run(unit, config)
        .await
        .with_context(|| format!("systemd notices daemon for {unit} failed"))
}
