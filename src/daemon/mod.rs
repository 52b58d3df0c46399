//! systemd notices daemon - relays service state changes to Juju hooks
//!
//! The daemon watches the services a charm has hooks for and runs
//! `service-<name>-started` / `service-<name>-stopped` through `juju-exec`
//! whenever systemd reports that a service settled into a new state.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                 systemd-notices                    │
//! ├───────────────────────────────────────────────────┤
//! │ Discovery ──► StateCache ◄── filter ◄── SystemdBus │
//! │ (hooks dir)   (per unit)       │       (D-Bus)     │
//! │                                ▼                   │
//! │                         HookDispatcher             │
//! │                          (juju-exec)               │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! Everything that touches the cache runs on the [`Monitor`] event loop;
//! only the bus reader and hook processes run in the background.

pub mod bus;
pub mod discovery;
pub mod dispatch;
pub mod filter;
pub mod install;
pub mod monitor;
pub mod path;
pub mod signals;
pub mod state;

pub use bus::{SystemdBus, UnitSignal, UnitStateQuery};
pub use discovery::{Discovery, WatchRequest};
pub use dispatch::HookDispatcher;
pub use install::Installer;
pub use monitor::{Monitor, Phase};
pub use state::{StateCache, Transition, TransitionKind};
