use super::bus::UnitSignal;
use super::path;
use super::state::{StateCache, Transition};
use tracing::{debug, info};

/// Suffix of systemd's in-progress states (`activating`, `deactivating`, `reloading`).
const TRANSITIONAL_SUFFIX: &str = "ing";

/// Why a signal did not produce a [`Transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropped {
    Unwatched,
    NoActiveState,
    Transitional,
    Duplicate,
}

/// Decide whether `signal` is a settled state change of a watched unit.
///
/// On acceptance the cache already holds the new state when this returns,
/// so the next signal for the same unit is compared against it.
pub fn evaluate(
    cache: &mut StateCache,
    signal: &UnitSignal,
) -> std::result::Result<Transition, Dropped> {
    let identifier = path::unit_name(&signal.path);
    let Some(previous) = cache.get(&identifier) else {
        debug!(service = %identifier, "Dropping event for unwatched service");
        return Err(Dropped::Unwatched);
    };

    let Some(state) = signal.active_state.as_deref() else {
        return Err(Dropped::NoActiveState);
    };

    if state.ends_with(TRANSITIONAL_SUFFIX) {
        debug!(service = %identifier, state, "Dropping transitional event");
        return Err(Dropped::Transitional);
    }
    if state == previous {
        debug!(service = %identifier, state, "Dropping duplicate event");
        return Err(Dropped::Duplicate);
    }

    let previous = cache.update(&identifier, state).ok_or(Dropped::Unwatched)?;
    info!(service = %identifier, state, previous = %previous, "Service changed state");

    Ok(Transition {
        identifier,
        state: state.to_string(),
        previous,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(identifier: &str, state: &str) -> StateCache {
        let mut cache = StateCache::new();
        cache.watch(identifier.into(), state.into());
        cache
    }

    #[test]
    fn transitional_state_is_dropped() {
        let mut cache = cache_with("svc.service", "active");
        let signal = UnitSignal::for_unit("svc.service", "activating");

        assert_eq!(evaluate(&mut cache, &signal), Err(Dropped::Transitional));
        assert_eq!(cache.get("svc.service"), Some("active"));
    }

    #[test]
    fn settled_change_emits_transition() {
        let mut cache = cache_with("svc.service", "inactive");
        let signal = UnitSignal::for_unit("svc.service", "active");

        let transition = evaluate(&mut cache, &signal).unwrap();
        assert_eq!(
            transition,
            Transition {
                identifier: "svc.service".into(),
                state: "active".into(),
                previous: "inactive".into(),
            }
        );
        assert_eq!(cache.get("svc.service"), Some("active"));
    }

    #[test]
    fn unwatched_service_never_transitions() {
        let mut cache = cache_with("svc.service", "inactive");
        for state in ["active", "failed", "inactive"] {
            let signal = UnitSignal::for_unit("other.service", state);
            assert_eq!(evaluate(&mut cache, &signal), Err(Dropped::Unwatched));
        }
        assert!(!cache.contains("other.service"));
    }

    #[test]
    fn duplicate_state_is_dropped() {
        let mut cache = cache_with("svc.service", "active");
        let signal = UnitSignal::for_unit("svc.service", "active");
        assert_eq!(evaluate(&mut cache, &signal), Err(Dropped::Duplicate));
    }

    #[test]
    fn signal_without_active_state_is_dropped() {
        let mut cache = cache_with("svc.service", "inactive");
        let signal = UnitSignal::new(path::unit_path("svc.service"), None);
        assert_eq!(evaluate(&mut cache, &signal), Err(Dropped::NoActiveState));
        assert_eq!(cache.get("svc.service"), Some("inactive"));
    }

    #[test]
    fn full_start_then_failure_sequence() {
        let mut cache = cache_with("svc.service", "unknown");
        let states = ["activating", "active", "active", "deactivating", "failed"];

        let accepted: Vec<(String, String)> = states
            .iter()
            .filter_map(|s| evaluate(&mut cache, &UnitSignal::for_unit("svc.service", s)).ok())
            .map(|t| (t.previous, t.state))
            .collect();

        assert_eq!(
            accepted,
            vec![
                ("unknown".to_string(), "active".to_string()),
                ("active".to_string(), "failed".to_string()),
            ]
        );
    }
}
