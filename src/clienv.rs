use std::path::PathBuf;

/// Environment variables recognised by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVar {
    Config,
    HooksDir,
    JujuExec,
    Log,
    UnitDir,
}

impl EnvVar {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "SYSTEMD_NOTICES_CONFIG",
            Self::HooksDir => "SYSTEMD_NOTICES_HOOKS_DIR",
            Self::JujuExec => "SYSTEMD_NOTICES_JUJU_EXEC",
            Self::Log => "SYSTEMD_NOTICES_LOG",
            Self::UnitDir => "SYSTEMD_NOTICES_UNIT_DIR",
        }
    }
}

pub const DEFAULT_HOOKS_DIR: &str = "hooks";
pub const DEFAULT_JUJU_EXEC: &str = "/usr/bin/juju-exec";
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Non-empty value of an env var.
fn env_opt(var: EnvVar) -> Option<String> {
    std::env::var(var.as_str()).ok().filter(|v| !v.trim().is_empty())
}

fn env_path(var: EnvVar) -> Option<PathBuf> {
    let path = env_opt(var).map(PathBuf::from);
    tracing::trace!(var = var.as_str(), value = ?path, "Resolved env path");
    path
}

/// Config file override ($SYSTEMD_NOTICES_CONFIG)
pub fn config_path() -> Option<PathBuf> {
    env_path(EnvVar::Config)
}

/// Hooks directory override ($SYSTEMD_NOTICES_HOOKS_DIR)
pub fn hooks_dir() -> Option<PathBuf> {
    env_path(EnvVar::HooksDir)
}

/// Hook executable override ($SYSTEMD_NOTICES_JUJU_EXEC)
pub fn juju_exec() -> Option<PathBuf> {
    env_path(EnvVar::JujuExec)
}

/// Log file override ($SYSTEMD_NOTICES_LOG)
pub fn log_file() -> Option<PathBuf> {
    env_path(EnvVar::Log)
}

/// systemd unit-file directory override ($SYSTEMD_NOTICES_UNIT_DIR)
pub fn unit_dir() -> Option<PathBuf> {
    env_path(EnvVar::UnitDir)
}
