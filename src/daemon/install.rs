//! Installs the daemon as a systemd service for a Juju unit.
//!
//! `install` creates the charm's `service-<name>-<started|stopped>` hooks,
//! writes a unit file running this binary for the Juju unit, then reloads
//! systemd, enables and starts it over the bus. `uninstall` stops and
//! disables it again.

use super::bus::SystemdBus;
use super::discovery::parse_trigger;
use super::state::TransitionKind;
use crate::error::{NoticesError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DISPATCH_SCRIPT: &str = "dispatch";
const PLACEHOLDER_HOOK: &str = "#!/bin/sh\nexec ./dispatch \"$@\"\n";

/// `app/0` -> `juju-app-0-systemd-notices.service`
pub fn unit_file_name(unit: &str) -> String {
    format!("juju-{}-systemd-notices.service", unit.replace('/', "-"))
}

pub fn render_unit_file(exe: &Path, unit: &str, working_dir: &Path) -> String {
    format!(
        "[Unit]\n\
         Description=Juju systemd notices daemon\n\
         After=multi-user.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         Restart=always\n\
         ExecStart={exe} {unit}\n\
         WorkingDirectory={dir}\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        exe = exe.display(),
        dir = working_dir.display(),
    )
}

pub struct Installer {
    unit: String,
    charm_dir: PathBuf,
    hooks_dir: PathBuf,
    unit_dir: PathBuf,
    exe: PathBuf,
}

impl Installer {
    /// `charm_dir` holds `dispatch` and `hooks/`; `unit_dir` receives the unit file.
    pub fn new(
        unit: impl Into<String>,
        charm_dir: impl Into<PathBuf>,
        unit_dir: impl Into<PathBuf>,
        exe: impl Into<PathBuf>,
    ) -> Self {
        let charm_dir = charm_dir.into();
        Self {
            unit: unit.into(),
            hooks_dir: charm_dir.join("hooks"),
            charm_dir,
            unit_dir: unit_dir.into(),
            exe: exe.into(),
        }
    }

    /// Write hooks somewhere other than `<charm_dir>/hooks`. Relative paths
    /// are taken from the charm directory.
    pub fn with_hooks_dir(mut self, hooks_dir: impl AsRef<Path>) -> Self {
        self.hooks_dir = self.charm_dir.join(hooks_dir);
        self
    }

    pub fn service_name(&self) -> String {
        unit_file_name(&self.unit)
    }

    pub fn unit_file_path(&self) -> PathBuf {
        self.unit_dir.join(self.service_name())
    }

    /// Create `hooks/service-<name>-started` and `-stopped` for each service,
    /// copying the charm's dispatch script when it has one.
    pub fn write_hooks(&self, services: &[String]) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.hooks_dir)?;

        let dispatch = self.charm_dir.join(DISPATCH_SCRIPT);
        let content = if dispatch.exists() {
            fs::read(&dispatch)?
        } else {
            debug!(path = %dispatch.display(), "No dispatch script, writing placeholder hooks");
            PLACEHOLDER_HOOK.as_bytes().to_vec()
        };

        let mut written = Vec::new();
        for service in services {
            for kind in [TransitionKind::Started, TransitionKind::Stopped] {
                let name = format!("service-{service}-{kind}");
                if parse_trigger(&name).is_none() {
                    return Err(NoticesError::Install(format!(
                        "invalid service name '{service}'"
                    )));
                }

                let path = self.hooks_dir.join(&name);
                fs::write(&path, &content)?;
                make_executable(&path)?;
                written.push(path);
            }
        }
        Ok(written)
    }

    pub fn write_unit_file(&self) -> Result<PathBuf> {
        let path = self.unit_file_path();
        if path.exists() {
            debug!(path = %path.display(), "Overwriting existing service file");
        }
        fs::create_dir_all(&self.unit_dir)?;
        fs::write(&path, render_unit_file(&self.exe, &self.unit, &self.charm_dir))?;
        Ok(path)
    }

    pub async fn install(&self, bus: &SystemdBus, services: &[String]) -> Result<()> {
        let hooks = self.write_hooks(services)?;
        info!(count = hooks.len(), "Hooks written");

        let path = self.write_unit_file()?;
        info!(path = %path.display(), "Service file created, reloading systemd");
        bus.reload().await?;

        let service = self.service_name();
        let (_, changes) = bus
            .enable_unit_files(std::slice::from_ref(&service), false, true)
            .await?;
        debug!(service = %service, ?changes, "Enabled");

        let job = bus.start_unit(&service, "fail").await?;
        info!(service = %service, job = %job.as_str(), "Started notices daemon");
        Ok(())
    }

    pub async fn uninstall(&self, bus: &SystemdBus) -> Result<()> {
        let service = self.service_name();
        info!(service = %service, "Stopping notices daemon");
        bus.stop_unit(&service, "fail").await?;

        let changes = bus
            .disable_unit_files(std::slice::from_ref(&service), false)
            .await?;
        debug!(service = %service, ?changes, "Disabled");
        Ok(())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
