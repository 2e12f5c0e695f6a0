//! Host side of the bridge.

use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::capability::{CapabilityDispatcher, HostCapabilities, methods};
use crate::channel::{Inbox, MessagePort};
use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::globals::{Globals, diff};
use crate::message::{BridgeMessage, RenderProps};
use crate::rpc::{MethodHandler, RpcEndpoint};

/// A legacy (pre-RPC) message received from the guest.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyEvent {
    /// The guest finished loading
    Ready,
    /// The guest reported a height
    Resize(Value),
    /// A user action
    Action(Value),
    /// The guest added a result
    AddResult(Value),
    /// The guest reported an error
    Error(Value),
}

/// Receives legacy messages, for hosts that still act on them.
pub trait LegacyObserver: Send + Sync {
    /// Called once per legacy message.
    fn on_legacy_event(&self, event: &LegacyEvent);
}

impl<F> LegacyObserver for F
where
    F: Fn(&LegacyEvent) + Send + Sync,
{
    fn on_legacy_event(&self, event: &LegacyEvent) {
        self(event);
    }
}

/// Options for [`HostBridge::send_globals`].
#[derive(Debug, Clone, Default)]
pub struct SendGlobalsOptions {
    /// Send the full snapshot and the legacy `render` message
    pub is_initial: bool,
    /// Tool name carried by the legacy `render` message
    pub tool_name: Option<String>,
}

impl SendGlobalsOptions {
    /// Options for the first push of a session.
    pub fn initial(tool_name: impl Into<String>) -> Self {
        Self {
            is_initial: true,
            tool_name: Some(tool_name.into()),
        }
    }
}

/// Host half of the bridge.
///
/// Dispatches the guest's capability calls to a [`HostCapabilities`]
/// implementation and pushes global state to the guest.
pub struct HostBridge {
    endpoint: Arc<RpcEndpoint>,
    handler: Arc<dyn MethodHandler>,
    legacy: Option<Arc<dyn LegacyObserver>>,
    last_sent: Mutex<Option<Globals>>,
    shutdown: Notify,
}

impl HostBridge {
    /// Create a host bridge with the default configuration.
    pub fn new<H>(port: Arc<dyn MessagePort>, capabilities: Arc<H>) -> Self
    where
        H: HostCapabilities + ?Sized + 'static,
    {
        Self::with_config(port, capabilities, BridgeConfig::default())
    }

    /// Create a host bridge with an explicit configuration.
    pub fn with_config<H>(port: Arc<dyn MessagePort>, capabilities: Arc<H>, config: BridgeConfig) -> Self
    where
        H: HostCapabilities + ?Sized + 'static,
    {
        Self {
            endpoint: Arc::new(RpcEndpoint::new(port, config)),
            handler: Arc::new(CapabilityDispatcher::new(capabilities)),
            legacy: None,
            last_sent: Mutex::new(None),
            shutdown: Notify::new(),
        }
    }

    /// Report legacy messages to `observer`.
    pub fn with_legacy_observer(mut self, observer: Arc<dyn LegacyObserver>) -> Self {
        self.legacy = Some(observer);
        self
    }

    /// The underlying endpoint.
    pub fn endpoint(&self) -> &Arc<RpcEndpoint> {
        &self.endpoint
    }

    /// Handle one raw message from the guest.
    ///
    /// Method calls are answered on their own task; everything else is
    /// handled inline. Malformed messages are logged and dropped.
    pub fn handle_message(&self, raw: Value) {
        if self.endpoint.is_closed() {
            trace!("Host bridge detached, ignoring message");
            return;
        }
        let message = match BridgeMessage::from_value(raw) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "Dropping malformed guest message");
                return;
            }
        };

        match message {
            BridgeMessage::MethodCall(call) => {
                self.endpoint.spawn_dispatch(call, Arc::clone(&self.handler));
            }
            BridgeMessage::MethodResponse(response) => self.endpoint.handle_response(response),
            BridgeMessage::Ready => self.notify_legacy(LegacyEvent::Ready),
            BridgeMessage::Resize { payload } => {
                if let Some(height) = payload.as_f64() {
                    self.forward_resize(height);
                }
                self.notify_legacy(LegacyEvent::Resize(payload));
            }
            BridgeMessage::Action { payload } => self.notify_legacy(LegacyEvent::Action(payload)),
            BridgeMessage::AddResult { payload } => {
                self.notify_legacy(LegacyEvent::AddResult(payload));
            }
            BridgeMessage::Error { payload } => {
                warn!(payload = %payload, "Guest reported an error");
                self.notify_legacy(LegacyEvent::Error(payload));
            }
            other @ (BridgeMessage::SetGlobals { .. } | BridgeMessage::Render { .. }) => {
                debug!(kind = other.kind(), "Ignoring host-bound message from guest");
            }
        }
    }

    fn notify_legacy(&self, event: LegacyEvent) {
        if let Some(observer) = &self.legacy {
            observer.on_legacy_event(&event);
        }
    }

    fn forward_resize(&self, height: f64) {
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            if let Err(err) = handler
                .handle(methods::NOTIFY_INTRINSIC_HEIGHT, vec![json!(height)])
                .await
            {
                debug!(height, error = %err, "Legacy resize not applied");
            }
        });
    }

    /// Push global state to the guest.
    ///
    /// Sends only the fields that changed since the last successful push, or
    /// the full snapshot when `options.is_initial` is set or nothing was sent
    /// yet. `previousDisplayMode` is derived from the last pushed snapshot.
    /// Concurrent pushes are applied one at a time, each diffed against the
    /// snapshot the previous one delivered. Returns whether anything was posted.
    ///
    /// # Errors
    ///
    /// Returns the port's error if a message could not be posted.
    pub async fn send_globals(&self, snapshot: &Globals, options: SendGlobalsOptions) -> BridgeResult<bool> {
        let mut last = self.last_sent.lock().await;
        let mut next = snapshot.clone();
        let patch = match last.as_ref() {
            Some(prior) => {
                next.derive_previous_display_mode(prior);
                if options.is_initial {
                    next.to_patch()?
                } else {
                    diff(prior, &next)?
                }
            }
            None => next.to_patch()?,
        };

        if patch.is_empty() {
            trace!("Globals unchanged, nothing to push");
            return Ok(false);
        }

        debug!(fields = patch.len(), is_initial = options.is_initial, "Pushing globals");
        self.endpoint
            .post(BridgeMessage::SetGlobals { globals: patch })
            .await?;

        if options.is_initial {
            self.endpoint
                .post(BridgeMessage::Render {
                    tool_name: options.tool_name,
                    props: RenderProps {
                        result: next.tool_output.clone(),
                        args: next.tool_input.clone(),
                    },
                })
                .await?;
        }

        *last = Some(next);
        Ok(true)
    }

    /// The snapshot most recently pushed, with derived fields applied.
    pub async fn last_sent(&self) -> Option<Globals> {
        self.last_sent.lock().await.clone()
    }

    /// Invoke a method the guest registered.
    ///
    /// # Errors
    ///
    /// See [`RpcEndpoint::call`].
    pub async fn call(&self, method: &str, args: Vec<Value>) -> BridgeResult<Value> {
        self.endpoint.call(method, args).await
    }

    /// Feed messages from `inbox` to [`handle_message`](Self::handle_message)
    /// until the inbox closes or [`detach`](Self::detach) is called.
    pub fn listen(self: &Arc<Self>, mut inbox: Inbox) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            debug!("Host bridge listening");
            loop {
                tokio::select! {
                    _ = bridge.shutdown.notified() => break,
                    message = inbox.recv() => match message {
                        Some(raw) => bridge.handle_message(raw),
                        None => break,
                    },
                }
            }
            debug!("Host bridge stopped listening");
        })
    }

    /// Stop handling guest messages and stop posting.
    pub fn detach(&self) {
        self.endpoint.close();
        self.shutdown.notify_one();
        info!("Host bridge detached");
    }
}
