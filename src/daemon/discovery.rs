use super::bus::UnitStateQuery;
use super::state::{unit_identifier, StateCache, TransitionKind, UNKNOWN_STATE};
use crate::error::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const TRIGGER_PREFIX: &str = "service-";

/// A service the charm wants to hear about, and for which transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    pub service: String,
    pub started: bool,
    pub stopped: bool,
}

impl WatchRequest {
    fn new(service: String) -> Self {
        Self {
            service,
            started: false,
            stopped: false,
        }
    }

    fn wants(&mut self, kind: TransitionKind) {
        match kind {
            TransitionKind::Started => self.started = true,
            TransitionKind::Stopped => self.stopped = true,
        }
    }
}

/// Parse `service-<name>-<started|stopped>` into its service name and kind.
pub fn parse_trigger(file_name: &str) -> Option<(&str, TransitionKind)> {
    let rest = file_name.strip_prefix(TRIGGER_PREFIX)?;
    let (service, kind) = if let Some(service) = rest.strip_suffix("-started") {
        (service, TransitionKind::Started)
    } else if let Some(service) = rest.strip_suffix("-stopped") {
        (service, TransitionKind::Stopped)
    } else {
        return None;
    };

    let valid = !service.is_empty()
        && service
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@' | ':' | '\\'));
    valid.then_some((service, kind))
}

/// Finds the services to watch from the charm's hook files.
pub struct Discovery {
    hooks_dir: PathBuf,
}

impl Discovery {
    pub fn new(hooks_dir: impl Into<PathBuf>) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
        }
    }

    /// Distinct services named by trigger files, ordered by name. A missing
    /// hooks directory yields no requests.
    pub async fn watch_requests(&self) -> Result<Vec<WatchRequest>> {
        if !self.hooks_dir.exists() {
            warn!(dir = %self.hooks_dir.display(), "Hooks dir does not exist");
            return Ok(Vec::new());
        }

        let mut requests: BTreeMap<String, WatchRequest> = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(&self.hooks_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some((service, kind)) = file_name.to_str().and_then(parse_trigger) else {
                continue;
            };
            requests
                .entry(service.to_string())
                .or_insert_with(|| WatchRequest::new(service.to_string()))
                .wants(kind);
        }

        Ok(requests.into_values().collect())
    }

    /// Add every newly requested service to `cache` with its current state.
    /// Services already in the cache are left alone. Returns how many were added.
    pub async fn discover<Q>(&self, cache: &mut StateCache, query: &Q) -> Result<usize>
    where
        Q: UnitStateQuery + ?Sized,
    {
        info!(dir = %self.hooks_dir.display(), "Loading services from hooks");
        let requests = self.watch_requests().await?;
        let names: Vec<&str> = requests.iter().map(|r| r.service.as_str()).collect();
        info!(services = ?names, "Services from hooks");

        let mut added = 0;
        for request in &requests {
            let identifier = unit_identifier(&request.service);
            if cache.contains(&identifier) {
                continue;
            }

            let state = match query.active_state(&identifier).await {
                Ok(state) => state,
                Err(e) => {
                    if !e.is_not_found() {
                        warn!(service = %identifier, error = %e, "Failed to query unit state");
                    }
                    UNKNOWN_STATE.to_string()
                }
            };

            debug!(service = %identifier, state = %state, "Adding service with initial state");
            cache.watch(identifier, state);
            added += 1;
        }

        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NoticesError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::path::Path;

    /// In-memory unit states that records every query.
    #[derive(Default)]
    struct FakeUnits {
        states: HashMap<String, String>,
        queried: Mutex<Vec<String>>,
    }

    impl FakeUnits {
        fn with(units: &[(&str, &str)]) -> Self {
            Self {
                states: units
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                queried: Mutex::new(Vec::new()),
            }
        }

        fn queried(&self) -> Vec<String> {
            self.queried.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UnitStateQuery for FakeUnits {
        async fn active_state(&self, identifier: &str) -> Result<String> {
            self.queried.lock().unwrap().push(identifier.to_string());
            self.states
                .get(identifier)
                .cloned()
                .ok_or_else(|| NoticesError::UnitNotFound(identifier.to_string()))
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn parses_trigger_names() {
        assert_eq!(
            parse_trigger("service-web-started"),
            Some(("web", TransitionKind::Started))
        );
        assert_eq!(
            parse_trigger("service-snap.lxd-daemon-stopped"),
            Some(("snap.lxd-daemon", TransitionKind::Stopped))
        );
        assert_eq!(parse_trigger("service--started"), None);
        assert_eq!(parse_trigger("service-web-restarted"), None);
        assert_eq!(parse_trigger("install"), None);
        assert_eq!(parse_trigger("service-we b-started"), None);
    }

    #[tokio::test]
    async fn missing_dir_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = Discovery::new(dir.path().join("hooks"));
        assert!(discovery.watch_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn merges_directions_per_service() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "service-web-started");
        touch(dir.path(), "service-web-stopped");
        touch(dir.path(), "service-db-stopped");
        touch(dir.path(), "config-changed");

        let requests = Discovery::new(dir.path()).watch_requests().await.unwrap();
        assert_eq!(
            requests,
            vec![
                WatchRequest {
                    service: "db".into(),
                    started: false,
                    stopped: true
                },
                WatchRequest {
                    service: "web".into(),
                    started: true,
                    stopped: true
                },
            ]
        );
    }

    #[tokio::test]
    async fn creates_one_entry_per_service_queried_once() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "service-web-started");
        touch(dir.path(), "service-web-stopped");

        let units = FakeUnits::with(&[("web.service", "active")]);
        let mut cache = StateCache::new();
        let added = Discovery::new(dir.path())
            .discover(&mut cache, &units)
            .await
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("web.service"), Some("active"));
        assert_eq!(units.queried(), vec!["web.service"]);
    }

    #[tokio::test]
    async fn missing_unit_is_recorded_as_unknown() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "service-api-started");

        let units = FakeUnits::default();
        let mut cache = StateCache::new();
        Discovery::new(dir.path())
            .discover(&mut cache, &units)
            .await
            .unwrap();

        assert_eq!(cache.get("api.service"), Some(UNKNOWN_STATE));
    }

    #[tokio::test]
    async fn rediscovery_only_adds_new_services() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "service-web-started");

        let units = FakeUnits::with(&[("web.service", "inactive"), ("db.service", "active")]);
        let discovery = Discovery::new(dir.path());
        let mut cache = StateCache::new();
        discovery.discover(&mut cache, &units).await.unwrap();
        cache.update("web.service", "active");

        touch(dir.path(), "service-web-stopped");
        touch(dir.path(), "service-db.service-started");
        let added = discovery.discover(&mut cache, &units).await.unwrap();

        assert_eq!(added, 1);
        assert_eq!(cache.get("web.service"), Some("active"));
        assert_eq!(cache.get("db.service"), Some("active"));
        assert_eq!(units.queried(), vec!["web.service", "db.service"]);
    }

    #[tokio::test]
    async fn discovery_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "service-web-started");

        let units = FakeUnits::with(&[("web.service", "active")]);
        let discovery = Discovery::new(dir.path());
        let mut cache = StateCache::new();
        discovery.discover(&mut cache, &units).await.unwrap();
        let added = discovery.discover(&mut cache, &units).await.unwrap();

        assert_eq!(added, 0);
        assert_eq!(units.queried().len(), 1);
    }
}
