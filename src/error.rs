use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NoticesError {
    #[error("failed to connect to the system bus: {0}")]
    BusConnect(#[source] zbus::Error),

    #[error("bus call {method} failed: {source}")]
    BusCall {
        method: String,
        #[source]
        source: zbus::Error,
    },

    #[error("unit not found: {0}")]
    UnitNotFound(String),

    #[error("match rule subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("bus message stream closed")]
    BusClosed,

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to parse config {path}: {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("install failed: {0}")]
    Install(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NoticesError {
    pub(crate) fn bus_call(method: &str, source: zbus::Error) -> Self {
        Self::BusCall {
            method: method.to_string(),
            source,
        }
    }

    /// True for errors meaning the queried unit does not exist (yet).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnitNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, NoticesError>;
