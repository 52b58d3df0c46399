//! System bus client for the systemd manager.
//!
//! Owns the single D-Bus connection of the process. Exposes the manager
//! calls used by `install`/`uninstall`, the `ActiveState` query used by
//! discovery, and the `PropertiesChanged` subscription that feeds the
//! signal filter.

use super::path::{self, UNIT_PATH_PREFIX};
use crate::error::{NoticesError, Result};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use zbus::message::Type as MessageType;
use zbus::zvariant::{DynamicType, OwnedObjectPath, OwnedValue};
use zbus::{Connection, Message, MessageStream};

pub const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";
pub const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
pub const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
pub const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
pub const ACTIVE_STATE_PROPERTY: &str = "ActiveState";

const DBUS_DESTINATION: &str = "org.freedesktop.DBus";
const DBUS_PATH: &str = "/org/freedesktop/DBus";
const DBUS_INTERFACE: &str = "org.freedesktop.DBus";
const PROPERTIES_CHANGED: &str = "PropertiesChanged";

/// One `(type, file, destination)` change reported by (En|Dis)ableUnitFiles.
pub type UnitFileChange = (String, String, String);

/// Inbound `PropertiesChanged` signals for unit objects.
pub type SignalStream = Pin<Box<dyn Stream<Item = UnitSignal> + Send>>;

/// Match rule for property changes of every systemd unit object.
pub fn unit_match_rule() -> String {
    format!(
        "path_namespace='{UNIT_PATH_PREFIX}',type='signal',interface='{PROPERTIES_INTERFACE}'"
    )
}

/// A property change of a unit object, reduced to what the filter needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSignal {
    /// Object path the signal was emitted from
    pub path: String,
    /// New `ActiveState`, if the change included it
    pub active_state: Option<String>,
}

impl UnitSignal {
    pub fn new(path: impl Into<String>, active_state: Option<&str>) -> Self {
        Self {
            path: path.into(),
            active_state: active_state.map(str::to_string),
        }
    }

    /// Signal for the unit `identifier` reporting `state`.
    pub fn for_unit(identifier: &str, state: &str) -> Self {
        Self::new(path::unit_path(identifier), Some(state))
    }
}

/// Source of current unit states, queried on discovery.
#[async_trait]
pub trait UnitStateQuery: Send + Sync {
    /// Current `ActiveState` of the unit. A unit that does not exist yields
    /// [`NoticesError::UnitNotFound`].
    async fn active_state(&self, identifier: &str) -> Result<String>;
}

/// Connection to the system bus, addressed at the systemd manager.
#[derive(Clone)]
pub struct SystemdBus {
    connection: Connection,
}

impl SystemdBus {
    /// Connect to the system bus. Failure here is fatal for the daemon.
    pub async fn connect() -> Result<Self> {
        let connection = Connection::system()
            .await
            .map_err(NoticesError::BusConnect)?;
        debug!(
            unique_name = ?connection.unique_name().map(|n| n.to_string()),
            "Connected to system bus"
        );
        Ok(Self { connection })
    }

    /// Invoke `method` on the systemd manager object.
    pub async fn call_manager<B>(&self, method: &str, body: &B) -> Result<Message>
    where
        B: serde::Serialize + DynamicType,
    {
        trace!(method, "Calling systemd manager");
        self.connection
            .call_method(
                Some(SYSTEMD_DESTINATION),
                SYSTEMD_PATH,
                Some(MANAGER_INTERFACE),
                method,
                body,
            )
            .await
            .map_err(|e| NoticesError::bus_call(method, e))
    }

    pub async fn start_unit(&self, unit: &str, mode: &str) -> Result<OwnedObjectPath> {
        let reply = self.call_manager("StartUnit", &(unit, mode)).await?;
        reply
            .body()
            .deserialize()
            .map_err(|e| NoticesError::bus_call("StartUnit", e))
    }

    pub async fn stop_unit(&self, unit: &str, mode: &str) -> Result<OwnedObjectPath> {
        let reply = self.call_manager("StopUnit", &(unit, mode)).await?;
        reply
            .body()
            .deserialize()
            .map_err(|e| NoticesError::bus_call("StopUnit", e))
    }

    pub async fn enable_unit_files(
        &self,
        files: &[String],
        runtime: bool,
        force: bool,
    ) -> Result<(bool, Vec<UnitFileChange>)> {
        let reply = self
            .call_manager("EnableUnitFiles", &(files, runtime, force))
            .await?;
        reply
            .body()
            .deserialize()
            .map_err(|e| NoticesError::bus_call("EnableUnitFiles", e))
    }

    pub async fn disable_unit_files(
        &self,
        files: &[String],
        runtime: bool,
    ) -> Result<Vec<UnitFileChange>> {
        let reply = self
            .call_manager("DisableUnitFiles", &(files, runtime))
            .await?;
        reply
            .body()
            .deserialize()
            .map_err(|e| NoticesError::bus_call("DisableUnitFiles", e))
    }

    /// Equivalent of `systemctl daemon-reload`.
    pub async fn reload(&self) -> Result<()> {
        self.call_manager("Reload", &()).await?;
        Ok(())
    }

    /// Read `property` of the unit `identifier` through `org.freedesktop.DBus.Properties.Get`.
    pub async fn unit_property(&self, identifier: &str, property: &str) -> Result<OwnedValue> {
        let object_path = path::unit_path(identifier);
        debug!(unit = %identifier, path = %object_path, property, "Querying unit property");

        let reply = self
            .connection
            .call_method(
                Some(SYSTEMD_DESTINATION),
                object_path.as_str(),
                Some(PROPERTIES_INTERFACE),
                "Get",
                &(UNIT_INTERFACE, property),
            )
            .await
            .map_err(|e| match e {
                zbus::Error::MethodError(name, detail, _) => {
                    debug!(unit = %identifier, error = %name, ?detail, "Unit not available");
                    NoticesError::UnitNotFound(identifier.to_string())
                }
                zbus::Error::FDO(fdo) => {
                    debug!(unit = %identifier, error = %fdo, "Unit not available");
                    NoticesError::UnitNotFound(identifier.to_string())
                }
                other => NoticesError::bus_call("Get", other),
            })?;

        reply
            .body()
            .deserialize()
            .map_err(|e| NoticesError::bus_call("Get", e))
    }

    /// Register the unit match rule and return the stream of matching signals.
    ///
    /// The daemon's `AddMatch` must be answered by a method return; any other
    /// reply is a startup failure.
    ///
    /// Incoming messages are drained by a background task, so the returned
    /// stream may sit unpolled (say, during a reload) without stalling the
    /// connection and the method replies queued behind it.
    pub async fn subscribe_units(&self) -> Result<SignalStream> {
        // Subscribed before AddMatch so nothing emitted in between is lost.
        let (pump, mut signals) = spawn_signal_pump(MessageStream::from(&self.connection));

        let rule = unit_match_rule();
        debug!(rule = %rule, "Adding match rule");
        let reply = self
            .connection
            .call_method(
                Some(DBUS_DESTINATION),
                DBUS_PATH,
                Some(DBUS_INTERFACE),
                "AddMatch",
                &(rule.as_str(),),
            )
            .await
            .map_err(|e| match e {
                zbus::Error::MethodError(name, detail, _) => NoticesError::SubscriptionRejected(
                    format!("{name}: {}", detail.unwrap_or_default()),
                ),
                zbus::Error::FDO(fdo) => NoticesError::SubscriptionRejected(fdo.to_string()),
                other => NoticesError::bus_call("AddMatch", other),
            });

        match reply {
            Ok(reply) if reply.message_type() == MessageType::MethodReturn => {
                trace!("Match rule added");
            }
            Ok(reply) => {
                pump.abort();
                return Err(NoticesError::SubscriptionRejected(format!(
                    "unexpected {:?} reply to AddMatch",
                    reply.message_type()
                )));
            }
            Err(e) => {
                pump.abort();
                return Err(e);
            }
        }

        Ok(Box::pin(futures_util::stream::poll_fn(move |cx| {
            signals.poll_recv(cx)
        })))
    }
}

/// Forward unit signals from `messages` into an unbounded channel.
///
/// The connection stops reading its socket while any message stream is
/// full, so this task must never wait on the consumer. It ends with the
/// connection or once the receiver is dropped.
fn spawn_signal_pump(
    mut messages: MessageStream,
) -> (JoinHandle<()>, mpsc::UnboundedReceiver<UnitSignal>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pump = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                message = messages.next() => match message {
                    Some(Ok(message)) => {
                        if let Some(signal) = parse_properties_changed(&message) {
                            if tx.send(signal).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "Failed to read bus message"),
                    None => {
                        debug!("Bus message stream ended");
                        break;
                    }
                },
            }
        }
    });
    (pump, rx)
}

#[async_trait]
impl UnitStateQuery for SystemdBus {
    async fn active_state(&self, identifier: &str) -> Result<String> {
        let value = self
            .unit_property(identifier, ACTIVE_STATE_PROPERTY)
            .await?;
        String::try_from(value).map_err(|e| NoticesError::bus_call("Get", e.into()))
    }
}

/// Reduce a bus message to a [`UnitSignal`]. Anything that is not a
/// `PropertiesChanged` signal from a unit object yields `None`.
pub fn parse_properties_changed(message: &Message) -> Option<UnitSignal> {
    if message.message_type() != MessageType::Signal {
        return None;
    }

    let header = message.header();
    if header.member()?.as_str() != PROPERTIES_CHANGED
        || header.interface()?.as_str() != PROPERTIES_INTERFACE
    {
        return None;
    }

    let object_path = header.path()?.as_str().to_string();
    if !object_path.starts_with(UNIT_PATH_PREFIX) {
        return None;
    }

    let body: (String, HashMap<String, OwnedValue>, Vec<String>) =
        match message.body().deserialize() {
            Ok(body) => body,
            Err(e) => {
                debug!(path = %object_path, error = %e, "Dropping malformed PropertiesChanged");
                return None;
            }
        };
    let (_interface, mut changed, _invalidated) = body;

    let active_state = changed
        .remove(ACTIVE_STATE_PROPERTY)
        .and_then(|value| String::try_from(value).ok());

    Some(UnitSignal {
        path: object_path,
        active_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::UnixStream;
    use zbus::connection::Builder;
    use zbus::zvariant::Value;
    use zbus::Guid;

    const WEB_PATH: &str = "/org/freedesktop/systemd1/unit/web_2eservice";

    /// Connected `(client, server)` pair over a socketpair, no bus daemon.
    async fn peer_pair() -> (Connection, Connection) {
        let guid = Guid::generate();
        let (client, server) = UnixStream::pair().unwrap();
        tokio::try_join!(
            Builder::unix_stream(client).p2p().build(),
            Builder::unix_stream(server).server(guid).unwrap().p2p().build(),
        )
        .unwrap()
    }

    #[derive(Clone, Copy)]
    enum AddMatchReply {
        Accept,
        Deny,
    }

    /// Answers `AddMatch` and `Properties.Get` (always `active`) on `server`.
    fn serve_fake_systemd(server: Connection, add_match: AddMatchReply) {
        let mut calls = MessageStream::from(&server);
        tokio::spawn(async move {
            while let Some(Ok(call)) = calls.next().await {
                if call.message_type() != MessageType::MethodCall {
                    continue;
                }
                let header = call.header();
                let reply = match (header.member().map(|m| m.as_str()), add_match) {
                    (Some("AddMatch"), AddMatchReply::Accept) => {
                        Message::method_return(&header).unwrap().build(&()).unwrap()
                    }
                    (Some("AddMatch"), AddMatchReply::Deny) => {
                        Message::error(&header, "org.freedesktop.DBus.Error.AccessDenied")
                            .unwrap()
                            .build(&("match rules are not allowed",))
                            .unwrap()
                    }
                    (Some("Get"), _) => Message::method_return(&header)
                        .unwrap()
                        .build(&Value::from("active"))
                        .unwrap(),
                    _ => continue,
                };
                server.send(&reply).await.unwrap();
            }
        });
    }

    fn properties_changed(object_path: &str, changed: HashMap<&str, Value<'_>>) -> Message {
        Message::signal(object_path, PROPERTIES_INTERFACE, PROPERTIES_CHANGED)
            .unwrap()
            .build(&(UNIT_INTERFACE, changed, Vec::<String>::new()))
            .unwrap()
    }

    #[test]
    fn match_rule_scopes_to_unit_namespace() {
        assert_eq!(
            unit_match_rule(),
            "path_namespace='/org/freedesktop/systemd1/unit',type='signal',\
             interface='org.freedesktop.DBus.Properties'"
        );
    }

    #[test]
    fn unit_signal_targets_encoded_path() {
        let signal = UnitSignal::for_unit("api.service", "active");
        assert_eq!(signal.path, "/org/freedesktop/systemd1/unit/api_2eservice");
        assert_eq!(signal.active_state.as_deref(), Some("active"));
    }

    #[test]
    fn parses_active_state_change() {
        let mut changed = HashMap::new();
        changed.insert("ActiveState", Value::from("active"));
        changed.insert("SubState", Value::from("running"));
        let message = properties_changed("/org/freedesktop/systemd1/unit/api_2eservice", changed);

        let signal = parse_properties_changed(&message).unwrap();
        assert_eq!(
            signal,
            UnitSignal::new("/org/freedesktop/systemd1/unit/api_2eservice", Some("active"))
        );
    }

    #[test]
    fn keeps_signals_without_active_state() {
        let mut changed = HashMap::new();
        changed.insert("SubState", Value::from("running"));
        let message = properties_changed("/org/freedesktop/systemd1/unit/api_2eservice", changed);

        let signal = parse_properties_changed(&message).unwrap();
        assert!(signal.active_state.is_none());
    }

    #[test]
    fn ignores_objects_outside_unit_namespace() {
        let mut changed = HashMap::new();
        changed.insert("ActiveState", Value::from("active"));
        let message = properties_changed("/org/freedesktop/systemd1/job/42", changed);

        assert!(parse_properties_changed(&message).is_none());
    }

    #[tokio::test]
    async fn denied_match_rule_is_subscription_rejected() {
        let (client, server) = peer_pair().await;
        serve_fake_systemd(server, AddMatchReply::Deny);

        let bus = SystemdBus { connection: client };
        let err = match bus.subscribe_units().await {
            Ok(_) => panic!("subscription should have been rejected"),
            Err(e) => e,
        };
        assert!(
            matches!(err, NoticesError::SubscriptionRejected(_)),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn queries_complete_while_signals_pile_up() {
        let (client, server) = peer_pair().await;
        serve_fake_systemd(server.clone(), AddMatchReply::Accept);

        let bus = SystemdBus { connection: client };
        let signals = bus.subscribe_units().await.unwrap();

        // Well past the connection's per-stream queue, with nobody polling.
        for _ in 0..200 {
            let mut changed = HashMap::new();
            changed.insert("ActiveState", Value::from("active"));
            server.send(&properties_changed(WEB_PATH, changed)).await.unwrap();
        }

        let state = tokio::time::timeout(Duration::from_secs(3), bus.active_state("web.service"))
            .await
            .expect("Get stalled behind unread signals")
            .unwrap();
        assert_eq!(state, "active");

        let received = tokio::time::timeout(Duration::from_secs(3), signals.take(200).count())
            .await
            .unwrap();
        assert_eq!(received, 200);
    }
}
