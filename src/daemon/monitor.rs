use super::bus::{SystemdBus, UnitSignal, UnitStateQuery};
use super::discovery::Discovery;
use super::dispatch::HookDispatcher;
use super::filter;
use super::signals;
use super::state::{StateCache, Transition};
use crate::config::NoticesConfig;
use crate::error::{NoticesError, Result};
use futures_util::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for hooks that are still running.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Stopping,
    Terminated,
}

/// The event loop: owns the state cache and feeds bus signals through the
/// filter into the hook dispatcher.
///
/// Discovery and signal handling both run on the loop, so the cache is
/// only ever touched from one task.
pub struct Monitor<Q> {
    query: Q,
    discovery: Discovery,
    dispatcher: HookDispatcher,
    cache: StateCache,
    inflight: JoinSet<bool>,
    phase: Phase,
}

impl<Q: UnitStateQuery> Monitor<Q> {
    pub fn new(query: Q, discovery: Discovery, dispatcher: HookDispatcher) -> Self {
        Self {
            query,
            discovery,
            dispatcher,
            cache: StateCache::new(),
            inflight: JoinSet::new(),
            phase: Phase::Starting,
        }
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn inflight(&self) -> usize {
        self.inflight.len()
    }

    /// Run discovery against the hooks directory, returning how many
    /// services were newly watched.
    pub async fn load_services(&mut self) -> Result<usize> {
        let added = self
            .discovery
            .discover(&mut self.cache, &self.query)
            .await?;
        info!(added, watched = self.cache.len(), "Services loaded");
        Ok(added)
    }

    /// Re-run discovery on request; failures are logged and the loop goes on.
    pub async fn reload(&mut self) {
        if let Err(e) = self.load_services().await {
            error!(error = %e, "Failed to reload services");
        }
    }

    /// Filter one signal and, if it is a reportable transition, start its hook.
    pub fn handle_signal(&mut self, signal: &UnitSignal) -> Option<Transition> {
        match filter::evaluate(&mut self.cache, signal) {
            Ok(transition) => {
                self.dispatcher.spawn(transition.clone(), &mut self.inflight);
                Some(transition)
            }
            Err(reason) => {
                debug!(path = %signal.path, ?reason, "Signal dropped");
                None
            }
        }
    }

    /// Process signals until shutdown is requested or the stream ends.
    ///
    /// Shutdown wins over pending work, and queued reloads are applied
    /// before further signals so newly watched services are not missed.
    pub async fn run<S>(
        &mut self,
        mut signals: S,
        mut reload: mpsc::Receiver<()>,
        shutdown: CancellationToken,
    ) -> Result<()>
    where
        S: Stream<Item = UnitSignal> + Unpin,
    {
        self.phase = Phase::Running;
        info!(watched = self.cache.len(), "Monitoring systemd units");

        let result = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
                Some(()) = reload.recv() => {
                    self.reload().await;
                }
                Some(joined) = self.inflight.join_next(), if !self.inflight.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Hook task did not complete");
                    }
                }
                signal = signals.next() => match signal {
                    Some(signal) => {
                        self.handle_signal(&signal);
                    }
                    None => {
                        error!("Bus message stream closed");
                        break Err(NoticesError::BusClosed);
                    }
                },
            }
        };

        self.phase = Phase::Stopping;
        self.drain().await;
        self.phase = Phase::Terminated;
        result
    }

    async fn drain(&mut self) {
        if self.inflight.is_empty() {
            return;
        }

        info!(count = self.inflight.len(), "Waiting for running hooks");
        let inflight = &mut self.inflight;
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(count = self.inflight.len(), "Leaving hooks running at exit");
            self.inflight.detach_all();
        }
    }
}

/// Daemon entry point: connect, discover, subscribe, and run until stopped.
pub async fn run(unit: &str, config: &NoticesConfig) -> Result<()> {
    info!(unit, "Starting systemd notices daemon");

    let bus = SystemdBus::connect().await?;

    let shutdown = CancellationToken::new();
    let (reload_tx, reload_rx) = mpsc::channel(1);
    signals::spawn_listener(shutdown.clone(), reload_tx)?;

    let mut monitor = Monitor::new(
        bus.clone(),
        Discovery::new(&config.hooks_dir),
        HookDispatcher::new(&config.juju_exec, unit),
    );
    monitor.load_services().await?;

    let signals = bus.subscribe_units().await?;
    let result = monitor.run(signals, reload_rx, shutdown).await;

    info!("Systemd notices daemon stopped");
    result
}
