//! The `Network` package.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};
use trellis_core::{Container, Error, Value};
use trellis_packages::{Instance, PackageDefinition, Side};

use crate::caller::Caller;
use crate::catalog::Catalog;
use crate::config::NetworkConfig;
use crate::definition::{ChannelKind, CommunicatorDefinition, CommunicatorSource};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::handle::{ChannelHandle, Role};
use crate::resolver::ChannelResolver;
use crate::transport::{RawChannel, Transport};

/// Name the network registers under in the package registry.
pub const PACKAGE_NAME: &str = "Network";

/// A singleton, shared-domain package whose instance is a [`Network`] built
/// for the host's side.
pub fn package(transport: Arc<dyn Transport>, config: NetworkConfig) -> PackageDefinition {
    PackageDefinition::new(())
        .singleton(true)
        .with_initializer(move |ctx| {
            debug!(side = %ctx.side(), "building network");
            let network = Network::new(transport.clone(), config.clone(), ctx.side());
            Ok(Arc::new(network) as Instance)
        })
}

#[derive(Default)]
struct State {
    catalog: Catalog,
    resolver: ChannelResolver,
}

struct Shared {
    transport: Arc<dyn Transport>,
    config: NetworkConfig,
    side: Side,
    state: RwLock<State>,
    dispatcher: Arc<Dispatcher>,
    sealed: AtomicBool,
}

/// Communicator catalog, channel resolution and dispatch for one side of the
/// application.
///
/// On the server side, appending communicators installs dispatch callbacks on
/// every channel primitive, so inbound invocations reach the bound actions.
/// On the client side the primitives are only allocated; handles default to
/// the dependent role.
///
/// Clones share state. [`Network::with_session`] returns a clone whose
/// dependent handles attribute invocations to another caller.
#[derive(Clone)]
pub struct Network {
    shared: Arc<Shared>,
    session: Caller,
}

impl Network {
    pub fn new(transport: Arc<dyn Transport>, config: NetworkConfig, side: Side) -> Self {
        let session = match side {
            Side::Server => Caller::authority(),
            Side::Client => Caller::new(),
        };
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                side,
                state: RwLock::new(State::default()),
                dispatcher: Arc::new(Dispatcher::new()),
                sealed: AtomicBool::new(false),
            }),
            session,
        }
    }

    pub fn side(&self) -> Side {
        self.shared.side
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.shared.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    /// The caller dependent handles act as.
    pub fn session(&self) -> &Caller {
        &self.session
    }

    /// A view of this network acting as `caller`.
    pub fn with_session(&self, caller: Caller) -> Self {
        Self {
            shared: self.shared.clone(),
            session: caller,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.shared
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register every immediate child of every container as a communicator.
    ///
    /// Allocates a transport primitive per channel. Returns the number of
    /// communicators added. Nothing is added if any definition is rejected.
    pub fn append_communicators<I>(&self, containers: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Container<Entry = CommunicatorSource>,
    {
        if self.is_sealed() {
            return Err(Error::RegistrationClosed.into());
        }

        let mut state = self.write();
        // `seal` takes the write lock, so this settles any race with it.
        if self.is_sealed() {
            return Err(Error::RegistrationClosed.into());
        }
        let prepared = state.catalog.prepare(containers)?;

        let mut allocated = Vec::new();
        for definition in &prepared {
            for spec in definition.channels() {
                let raw = match spec.kind() {
                    ChannelKind::Request => RawChannel::Request(
                        self.shared
                            .transport
                            .request_channel(definition.name(), spec.name())?,
                    ),
                    ChannelKind::Fire => RawChannel::Fire(
                        self.shared
                            .transport
                            .fire_channel(definition.name(), spec.name())?,
                    ),
                };
                allocated.push(raw);
            }
        }

        let serving = self.shared.side.is_server();
        if serving {
            for definition in &prepared {
                for spec in definition.channels() {
                    self.shared.dispatcher.bind(
                        definition.name(),
                        spec.name(),
                        spec.kind(),
                        spec.action().cloned(),
                    );
                }
            }
        }

        let added = prepared.len();
        state.catalog.commit(prepared);
        for raw in &allocated {
            state.resolver.insert(raw.clone());
        }
        info!(
            side = %self.shared.side,
            added,
            total = state.catalog.len(),
            channels = state.resolver.len(),
            "registered communicators"
        );
        drop(state);

        // Connecting a fire listener delivers queued messages, and handlers
        // may look up channels, so this runs without the state lock.
        if serving {
            for raw in &allocated {
                self.install(raw);
            }
        }
        Ok(added)
    }

    /// Route inbound traffic on `raw` to the dispatcher.
    fn install(&self, raw: &RawChannel) {
        let dispatcher = self.shared.dispatcher.clone();
        let communicator = raw.communicator().to_string();
        let channel = raw.name().to_string();
        match raw {
            RawChannel::Request(primitive) => {
                primitive.on_invoke(Arc::new(move |caller: &Caller, args: Vec<Value>| {
                    dispatcher.dispatch_request(&communicator, &channel, caller, args)
                }));
            }
            RawChannel::Fire(primitive) => {
                primitive.connect(Arc::new(move |caller: &Caller, args: Vec<Value>| {
                    dispatcher.dispatch_fire(&communicator, &channel, caller, args)
                }));
            }
        }
    }

    /// A registered communicator definition.
    pub fn communicator(&self, name: &str) -> Result<Arc<CommunicatorDefinition>> {
        Ok(self.read().catalog.get(name)?.clone())
    }

    /// Communicator names in discovery order.
    pub fn communicators(&self) -> Vec<String> {
        self.read().catalog.names()
    }

    /// A handle to `communicator.channel` for `role`.
    pub fn get_channel(&self, communicator: &str, channel: &str, role: Role) -> Result<ChannelHandle> {
        let state = self.read();
        let handle =
            state
                .resolver
                .resolve(&state.catalog, communicator, channel, role, &self.session)?;
        Ok(handle)
    }

    /// A handle for the role this network's side plays.
    pub fn channel(&self, communicator: &str, channel: &str) -> Result<ChannelHandle> {
        self.get_channel(communicator, channel, Role::from(self.shared.side))
    }

    /// Close communicator registration.
    /// Close registration, after any registration in progress finishes.
    pub fn seal(&self) {
        let state = self.write();
        if !self.shared.sealed.swap(true, Ordering::SeqCst) {
            info!(communicators = state.catalog.len(), "communicator registration sealed");
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.shared.sealed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("side", &self.shared.side)
            .field("session", &self.session.id())
            .field("communicators", &self.communicators())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatchState;
    use crate::error::{NetworkError, RemoteErrorKind};
    use crate::handle::Remote;
    use crate::local::LocalTransport;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex;
    use trellis_core::{EntryKind, Folder};
    use trellis_packages::{HostConfig, HostContext};

    type ActionResult = std::result::Result<Value, trellis_core::BoxError>;

    fn pair(config: NetworkConfig) -> (Network, Network) {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(config.clone()));
        let server = Network::new(transport.clone(), config.clone(), Side::Server);
        let client = Network::new(transport, config, Side::Client);
        (server, client)
    }

    fn tools() -> Folder<CommunicatorSource> {
        Folder::new("Communicators").with(
            "Tools",
            CommunicatorSource::new()
                .request("Echo")
                .request("Unbound")
                .request("Fail")
                .fire("Log")
                .on_request("Echo", |_, mut args| Ok(args.pop().unwrap_or_default()))
                .on_request("Fail", |_, _| Err("broken".into())),
        )
    }

    fn both(server: &Network, client: &Network, source: Folder<CommunicatorSource>) {
        server.append_communicators([source.clone()]).unwrap();
        client.append_communicators([source]).unwrap();
    }

    #[tokio::test]
    async fn dependent_echo_round_trip() {
        let (server, client) = pair(NetworkConfig::default());
        both(&server, &client, tools());

        let echo = client.channel("Tools", "Echo").unwrap();
        assert_eq!(echo.role(), Role::Dependent);
        let out = echo.invoke(vec![Value::Integer(42)]).await.unwrap();
        assert_eq!(out, Value::Integer(42));
    }

    #[tokio::test]
    async fn handler_failure_and_missing_handler_are_responses() {
        let (server, client) = pair(NetworkConfig::default());
        both(&server, &client, tools());

        let err = client
            .channel("Tools", "Fail")
            .unwrap()
            .invoke(vec![])
            .await
            .unwrap_err();
        let remote = err.remote().unwrap();
        assert_eq!(remote.kind, RemoteErrorKind::HandlerFailed);
        assert_eq!(remote.message, "broken");

        let err = client
            .channel("Tools", "Unbound")
            .unwrap()
            .invoke(vec![])
            .await
            .unwrap_err();
        assert_eq!(err.remote().unwrap().kind, RemoteErrorKind::NoHandler);
    }

    #[test]
    fn fire_reaches_handler_with_caller() {
        let (server, client) = pair(NetworkConfig::default());
        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = heard.clone();
        let chat = Folder::new("Communicators").with(
            "Chat",
            CommunicatorSource::new()
                .fire("Log")
                .on_fire("Log", move |caller, args| -> ActionResult {
                    sink.lock().unwrap().push((caller.id(), args));
                    Ok(Value::Null)
                }),
        );
        both(&server, &client, chat);

        let ada = client.with_session(Caller::named("Ada"));
        ada.channel("Chat", "Log")
            .unwrap()
            .send(vec![Value::from("hello")])
            .unwrap();

        let heard = heard.lock().unwrap();
        assert_eq!(heard.len(), 1);
        assert_eq!(heard[0].0, ada.session().id());
        assert_eq!(heard[0].1, vec![Value::from("hello")]);
    }

    #[test]
    fn fire_without_handler_does_not_raise() {
        let (server, client) = pair(NetworkConfig::default());
        both(&server, &client, tools());
        client
            .channel("Tools", "Log")
            .unwrap()
            .send(vec![Value::from("hello")])
            .unwrap();
    }

    #[test]
    fn fires_queue_until_server_registers() {
        let (server, client) = pair(NetworkConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let chat = Folder::new("Communicators").with(
            "Chat",
            CommunicatorSource::new()
                .fire("Log")
                .on_fire("Log", move |_, _| -> ActionResult {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }),
        );

        client.append_communicators([chat.clone()]).unwrap();
        let log = client.channel("Chat", "Log").unwrap();
        log.send(vec![]).unwrap();
        log.send(vec![]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        server.append_communicators([chat]).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn authoritative_gets_raw_primitive() {
        let (server, client) = pair(NetworkConfig::default());
        both(&server, &client, tools());

        let raw = server.channel("Tools", "Echo").unwrap();
        assert_eq!(raw.role(), Role::Authoritative);
        let primitive = raw.raw().unwrap().as_request().unwrap();
        assert!(primitive.has_callback());

        let proxy = client.get_channel("Tools", "Echo", Role::Dependent).unwrap();
        assert!(proxy.raw().is_none());
    }

    #[test]
    fn client_side_does_not_bind_handlers() {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::default());
        let client = Network::new(transport, NetworkConfig::default(), Side::Client);
        client.append_communicators([tools()]).unwrap();

        let raw = client
            .get_channel("Tools", "Echo", Role::Authoritative)
            .unwrap();
        assert!(!raw.raw().unwrap().as_request().unwrap().has_callback());
        assert_eq!(client.dispatcher().state("Tools", "Echo"), None);
    }

    #[tokio::test]
    async fn kind_mismatch() {
        let (server, client) = pair(NetworkConfig::default());
        both(&server, &client, tools());

        let err = client
            .channel("Tools", "Log")
            .unwrap()
            .invoke(vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::KindMismatch { .. }));

        let err = client
            .channel("Tools", "Echo")
            .unwrap()
            .send(vec![])
            .unwrap_err();
        assert!(matches!(err, NetworkError::KindMismatch { .. }));
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let (server, client) = pair(NetworkConfig {
            request_timeout_ms: 50,
            ..NetworkConfig::default()
        });
        let slow = Folder::new("Communicators").with(
            "Slow",
            CommunicatorSource::new()
                .request("Wait")
                .on_request("Wait", |_, _| {
                    std::thread::sleep(std::time::Duration::from_millis(300));
                    Ok(Value::Null)
                }),
        );
        both(&server, &client, slow);

        let err = client
            .channel("Slow", "Wait")
            .unwrap()
            .invoke(vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Timeout { .. }));
    }

    #[test]
    fn unknown_lookups() {
        let (server, _client) = pair(NetworkConfig::default());
        server.append_communicators([tools()]).unwrap();

        let err = server.channel("Ghost", "Echo").unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Core(Error::NotFound {
                kind: EntryKind::Communicator,
                ..
            })
        ));
        let err = server.channel("Tools", "Ghost").unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Core(Error::NotFound {
                kind: EntryKind::Channel,
                ..
            })
        ));
        assert!(server.communicator("Ghost").is_err());
        assert_eq!(server.communicator("Tools").unwrap().requests().len(), 3);
    }

    #[test]
    fn failed_registration_leaves_nothing() {
        let (server, _client) = pair(NetworkConfig::default());
        let err = server
            .append_communicators([Folder::new("Communicators")
                .with("Good", CommunicatorSource::new().request("Ping"))
                .with(
                    "Bad",
                    CommunicatorSource::new()
                        .request("Y")
                        .on_request("X", |_, _| Ok(Value::Null)),
                )])
            .unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Core(Error::MalformedDefinition { .. })
        ));
        assert!(server.communicators().is_empty());
        assert_eq!(server.dispatcher().state("Good", "Ping"), None);
    }

    #[test]
    fn duplicates_across_calls() {
        let (server, _client) = pair(NetworkConfig::default());
        server.append_communicators([tools()]).unwrap();
        let err = server.append_communicators([tools()]).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Core(Error::DuplicateName {
                kind: EntryKind::Communicator,
                ..
            })
        ));
    }

    /// Parks inside `list_children` until released.
    struct Gate {
        entered: std::sync::mpsc::Sender<()>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl Container for Gate {
        type Entry = CommunicatorSource;

        fn name(&self) -> &str {
            "Gate"
        }

        fn list_children(&self) -> Vec<(String, CommunicatorSource)> {
            self.entered.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            vec![("Inside".to_string(), CommunicatorSource::new().fire("Ping"))]
        }
    }

    #[test]
    fn seal_waits_for_registration_in_progress() {
        let (server, _client) = pair(NetworkConfig::default());
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let gate = Gate {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        };
        let sealed = AtomicBool::new(false);

        std::thread::scope(|s| {
            let registering = s.spawn(|| server.append_communicators([&gate]));
            entered_rx.recv().unwrap();

            let sealing = s.spawn(|| {
                server.seal();
                sealed.store(true, Ordering::SeqCst);
            });
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert!(!sealed.load(Ordering::SeqCst));

            release_tx.send(()).unwrap();
            assert_eq!(registering.join().unwrap().unwrap(), 1);
            sealing.join().unwrap();
        });

        assert!(server.is_sealed());
        assert_eq!(server.communicators(), vec!["Inside"]);
        assert!(matches!(
            server.append_communicators([Folder::new("Late").with("Late", CommunicatorSource::new())]),
            Err(NetworkError::Core(Error::RegistrationClosed))
        ));
    }

    #[test]
    fn sealing_blocks_registration_only() {
        let (server, _client) = pair(NetworkConfig::default());
        server.append_communicators([tools()]).unwrap();
        server.seal();
        assert!(server.is_sealed());
        assert!(server.channel("Tools", "Echo").is_ok());
        let err = server
            .append_communicators([Folder::new("Late").with("Late", CommunicatorSource::new())])
            .unwrap_err();
        assert!(matches!(err, NetworkError::Core(Error::RegistrationClosed)));
    }

    #[test]
    fn sessions_share_state() {
        let (server, _client) = pair(NetworkConfig::default());
        let view = server.with_session(Caller::named("Guest"));
        server.append_communicators([tools()]).unwrap();
        assert_eq!(view.communicators(), vec!["Tools"]);
        assert_eq!(view.session().label(), Some("Guest"));
        assert!(server.session().is_authority());
        assert_eq!(
            server.dispatcher().state("Tools", "Echo"),
            Some(DispatchState::Idle)
        );
    }

    #[test]
    fn network_is_a_singleton_package() {
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport::default());
        let host = HostContext::new(HostConfig::client());
        host.append_packages([Folder::new("Core").with(
            PACKAGE_NAME,
            package(transport, NetworkConfig::default()),
        )])
        .unwrap();

        let a = host.resolve_as::<Network>(PACKAGE_NAME).unwrap();
        let b = host.resolve_as::<Network>(PACKAGE_NAME).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.side(), Side::Client);
    }
}
