//! Routes inbound invocations to the actions bound on each channel.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};
use trellis_core::{BoxError, Value};

use crate::caller::Caller;
use crate::definition::{Action, ChannelKind};
use crate::error::{RemoteError, RemoteErrorKind};
use crate::transport::Response;

/// Whether a channel is currently running a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
}

struct Binding {
    kind: ChannelKind,
    action: Option<Action>,
    in_flight: AtomicUsize,
}

/// Decrements the in-flight counter even if the handler unwinds.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handler table keyed by `(communicator, channel)`.
///
/// Handlers run synchronously on the calling thread. Invocations on different
/// channels never contend; invocations on the same channel may overlap.
#[derive(Default)]
pub struct Dispatcher {
    bindings: RwLock<BTreeMap<(String, String), Arc<Binding>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the channel and its action, if any.
    pub(crate) fn bind(
        &self,
        communicator: &str,
        channel: &str,
        kind: ChannelKind,
        action: Option<Action>,
    ) {
        let binding = Arc::new(Binding {
            kind,
            action,
            in_flight: AtomicUsize::new(0),
        });
        self.bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((communicator.to_string(), channel.to_string()), binding);
    }

    fn binding(&self, communicator: &str, channel: &str) -> Option<Arc<Binding>> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(communicator.to_string(), channel.to_string()))
            .cloned()
    }

    /// Whether a handler is bound to the channel.
    pub fn has_handler(&self, communicator: &str, channel: &str) -> bool {
        self.binding(communicator, channel)
            .is_some_and(|b| b.action.is_some())
    }

    /// The channel's dispatch state, or `None` for an unknown channel.
    pub fn state(&self, communicator: &str, channel: &str) -> Option<DispatchState> {
        self.binding(communicator, channel).map(|b| {
            if b.in_flight.load(Ordering::SeqCst) > 0 {
                DispatchState::Dispatching
            } else {
                DispatchState::Idle
            }
        })
    }

    /// Run a request handler and turn its outcome into a response.
    ///
    /// Never fails from the dispatcher's point of view: a missing handler, a
    /// handler error or a handler panic all become an error response.
    pub fn dispatch_request(
        &self,
        communicator: &str,
        channel: &str,
        caller: &Caller,
        args: Vec<Value>,
    ) -> Response {
        let remote = |kind: RemoteErrorKind, message: String| RemoteError {
            kind,
            communicator: communicator.to_string(),
            channel: channel.to_string(),
            message,
        };

        let action = match self.binding(communicator, channel) {
            Some(binding) if binding.kind == ChannelKind::Request => {
                binding.action.clone().map(|action| (binding, action))
            }
            _ => None,
        };
        let Some((binding, action)) = action else {
            debug!(communicator = %communicator, channel = %channel, caller = %caller.id(), "no request handler");
            return Err(remote(RemoteErrorKind::NoHandler, String::new()));
        };

        debug!(communicator = %communicator, channel = %channel, caller = %caller.id(), "dispatching request");
        match run(&binding, &action, caller, args) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(remote(RemoteErrorKind::HandlerFailed, e.to_string())),
            Err(message) => Err(remote(RemoteErrorKind::HandlerPanicked, message)),
        }
    }

    /// Run a fire handler. Nothing is returned to the sender.
    pub fn dispatch_fire(
        &self,
        communicator: &str,
        channel: &str,
        caller: &Caller,
        args: Vec<Value>,
    ) {
        let action = match self.binding(communicator, channel) {
            Some(binding) if binding.kind == ChannelKind::Fire => {
                binding.action.clone().map(|action| (binding, action))
            }
            _ => None,
        };
        let Some((binding, action)) = action else {
            debug!(communicator = %communicator, channel = %channel, caller = %caller.id(), "no fire handler, dropping");
            return;
        };

        debug!(communicator = %communicator, channel = %channel, caller = %caller.id(), "dispatching fire");
        match run(&binding, &action, caller, args) {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(communicator = %communicator, channel = %channel, caller = %caller.id(), error = %e, "fire handler failed")
            }
            Err(message) => {
                warn!(communicator = %communicator, channel = %channel, caller = %caller.id(), panic = %message, "fire handler panicked")
            }
        }
    }
}

fn run(
    binding: &Binding,
    action: &Action,
    caller: &Caller,
    args: Vec<Value>,
) -> std::result::Result<std::result::Result<Value, BoxError>, String> {
    let _guard = InFlight::enter(&binding.in_flight);
    catch_unwind(AssertUnwindSafe(|| action(caller, args))).map_err(|payload| {
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}
