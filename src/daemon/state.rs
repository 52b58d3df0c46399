use std::collections::HashMap;
use std::fmt;

/// Unit-type suffix systemd expects on service units.
pub const SERVICE_SUFFIX: &str = ".service";

/// State recorded for a unit the bus could not report on.
pub const UNKNOWN_STATE: &str = "unknown";

const ACTIVE_STATE: &str = "active";

/// `web` -> `web.service`; names already carrying the suffix are unchanged.
pub fn unit_identifier(service: &str) -> String {
    if service.ends_with(SERVICE_SUFFIX) {
        service.to_string()
    } else {
        format!("{service}{SERVICE_SUFFIX}")
    }
}

/// `web.service` -> `web`.
pub fn service_name(identifier: &str) -> &str {
    identifier.strip_suffix(SERVICE_SUFFIX).unwrap_or(identifier)
}

/// Last observed `ActiveState` per watched unit.
///
/// Entries are only ever added by discovery and updated by the signal
/// filter; nothing is removed for the lifetime of the process.
#[derive(Debug, Default)]
pub struct StateCache {
    states: HashMap<String, String>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.states.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.states.get(identifier).map(String::as_str)
    }

    /// Insert a newly discovered unit. Returns false and leaves the cache
    /// untouched if the unit is already watched.
    pub fn watch(&mut self, identifier: String, state: String) -> bool {
        if self.states.contains_key(&identifier) {
            return false;
        }
        self.states.insert(identifier, state);
        true
    }

    /// Record a new state for a watched unit, returning the previous one.
    /// Unwatched units are ignored.
    pub fn update(&mut self, identifier: &str, state: &str) -> Option<String> {
        let slot = self.states.get_mut(identifier)?;
        Some(std::mem::replace(slot, state.to_string()))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// The two notifications a unit can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Started,
    Stopped,
}

impl TransitionKind {
    /// `active` is a start; every other settled state is a stop.
    pub fn from_state(state: &str) -> Self {
        if state == ACTIVE_STATE {
            Self::Started
        } else {
            Self::Stopped
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A settled state change of a watched unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub identifier: String,
    pub state: String,
    pub previous: String,
}

impl Transition {
    pub fn kind(&self) -> TransitionKind {
        TransitionKind::from_state(&self.state)
    }

    pub fn service(&self) -> &str {
        service_name(&self.identifier)
    }
}
