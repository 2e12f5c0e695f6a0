//! Correlated method calls over a [`MessagePort`].
//!
//! [`RpcEndpoint`] is shared by the host bridge and the guest runtime. It
//! owns the pending call table for calls this side issued, and turns inbound
//! calls into exactly one response each.
//!
//! ```text
//! call(method, args)                          other side
//!   ├─ register id in PendingCalls
//!   ├─ post AUI_METHOD_CALL ───────────────▶  dispatch → handler
//!   └─ await (timeout) ◀──────────────────── AUI_METHOD_RESPONSE
//!        complete(id) removes the entry; a late response finds nothing
//! ```

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::channel::MessagePort;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult, CapabilityError};
use crate::message::{BridgeMessage, CallId, MethodCall, MethodResponse};

type Completion = oneshot::Sender<Result<Value, String>>;

/// Handles method calls arriving from the other side.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Run `method` with positional `args`.
    async fn handle(&self, method: &str, args: Vec<Value>) -> Result<Value, CapabilityError>;
}

/// Handler that knows no methods.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMethods;

#[async_trait]
impl MethodHandler for NoMethods {
    async fn handle(&self, method: &str, _args: Vec<Value>) -> Result<Value, CapabilityError> {
        Err(BridgeError::UnknownMethod(method.to_string()).into())
    }
}

/// Calls this side issued that are still waiting for a response.
#[derive(Default)]
pub struct PendingCalls {
    waiters: Mutex<HashMap<CallId, Completion>>,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and return the receiver its response will complete.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DuplicateCall`] if `id` is already pending.
    pub fn register(&self, id: CallId) -> BridgeResult<oneshot::Receiver<Result<Value, String>>> {
        let mut waiters = self.waiters.lock();
        if waiters.contains_key(&id) {
            return Err(BridgeError::DuplicateCall(id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(id, tx);
        Ok(rx)
    }

    /// Complete the pending call matching `response`.
    ///
    /// Returns `false` when no call with that id is pending.
    pub fn complete(&self, response: MethodResponse) -> bool {
        let Some(tx) = self.waiters.lock().remove(&response.id) else {
            return false;
        };
        // The caller may have been dropped in the meantime.
        let _ = tx.send(response.into_outcome());
        true
    }

    /// Forget `id`. Safe to call for ids that are no longer pending.
    pub fn remove(&self, id: &CallId) -> bool {
        self.waiters.lock().remove(id).is_some()
    }

    /// Number of calls still waiting.
    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Whether no calls are waiting.
    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }
}

/// Removes a pending entry when the awaiting call finishes or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingCalls,
    id: CallId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Inbound call ids that are being handled or were answered recently.
///
/// An id stays known while its call runs and for the next `capacity`
/// answers after it completes.
#[derive(Debug)]
struct SeenCalls {
    known: HashSet<CallId>,
    answered: VecDeque<CallId>,
    capacity: usize,
}

impl SeenCalls {
    fn new(capacity: usize) -> Self {
        Self {
            known: HashSet::new(),
            answered: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Claim `id` for dispatch; `false` if it is running or was answered recently.
    fn claim(&mut self, id: &CallId) -> bool {
        self.known.insert(id.clone())
    }

    fn answered(&mut self, id: CallId) {
        if self.capacity == 0 {
            self.known.remove(&id);
            return;
        }
        if self.answered.len() == self.capacity
            && let Some(oldest) = self.answered.pop_front()
        {
            self.known.remove(&oldest);
        }
        self.answered.push_back(id);
    }
}

/// One side of a bridge: issues calls and answers the other side's calls.
pub struct RpcEndpoint {
    port: Arc<dyn MessagePort>,
    config: BridgeConfig,
    pending: PendingCalls,
    seen: Mutex<SeenCalls>,
    closed: AtomicBool,
}

impl RpcEndpoint {
    /// Create an endpoint posting through `port`.
    pub fn new(port: Arc<dyn MessagePort>, config: BridgeConfig) -> Self {
        let seen = Mutex::new(SeenCalls::new(config.answered_history));
        Self {
            port,
            config,
            pending: PendingCalls::new(),
            seen,
            closed: AtomicBool::new(false),
        }
    }

    /// The endpoint's configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Calls issued by this side that have not completed.
    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    /// Stop posting. Calls and responses attempted afterwards are dropped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Post a message unless the endpoint is closed.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ChannelClosed`] after [`close`](Self::close),
    /// otherwise whatever the port reports.
    pub async fn post(&self, message: BridgeMessage) -> BridgeResult<()> {
        if self.is_closed() {
            return Err(BridgeError::ChannelClosed("endpoint detached".to_string()));
        }
        self.port.post(message).await
    }

    /// Invoke `method` on the other side and wait for its response.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Remote`] with the handler's message when the other side answers with an error
    /// - [`BridgeError::Timeout`] when no response arrives within the call window
    /// - [`BridgeError::ChannelClosed`] when the call could not be posted
    pub async fn call(&self, method: &str, args: Vec<Value>) -> BridgeResult<Value> {
        let id = CallId::generate();
        let rx = self.pending.register(id.clone())?;
        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        trace!(call_id = %id, method, "Posting method call");
        self.post(BridgeMessage::MethodCall(MethodCall {
            id: id.clone(),
            method: method.to_string(),
            args,
        }))
        .await?;

        match tokio::time::timeout(self.config.call_timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(BridgeError::Remote(message)),
            Ok(Err(_)) => Err(BridgeError::ChannelClosed(
                "pending call dropped before completion".to_string(),
            )),
            Err(_) => {
                warn!(call_id = %id, method, timeout = ?self.config.call_timeout, "Method call timed out");
                Err(BridgeError::Timeout {
                    method: method.to_string(),
                    timeout: self.config.call_timeout,
                })
            }
        }
    }

    /// Route a response to the call waiting for it.
    pub fn handle_response(&self, response: MethodResponse) {
        let id = response.id.clone();
        if self.pending.complete(response) {
            trace!(call_id = %id, "Routed method response");
        } else {
            debug!(call_id = %id, "Dropping response for unknown or expired call");
        }
    }

    /// Answer `call` on a new task.
    ///
    /// Returns `None` without responding when a call with the same id is
    /// still being handled or is among the last
    /// [`answered_history`](BridgeConfig::answered_history) answered calls.
    pub fn spawn_dispatch(
        self: &Arc<Self>,
        call: MethodCall,
        handler: Arc<dyn MethodHandler>,
    ) -> Option<JoinHandle<()>> {
        if !self.seen.lock().claim(&call.id) {
            warn!(call_id = %call.id, method = %call.method, "Ignoring duplicate call");
            return None;
        }
        let endpoint = Arc::clone(self);
        Some(tokio::spawn(async move {
            endpoint.respond(call, handler.as_ref()).await;
        }))
    }

    async fn respond(&self, call: MethodCall, handler: &dyn MethodHandler) {
        let MethodCall { id, method, args } = call;
        debug!(call_id = %id, method = %method, "Dispatching method call");

        let outcome = AssertUnwindSafe(handler.handle(&method, args))
            .catch_unwind()
            .await;
        let response = match outcome {
            Ok(Ok(value)) => MethodResponse::success(id.clone(), value),
            Ok(Err(err)) => {
                debug!(call_id = %id, method = %method, error = %err, "Method handler failed");
                MethodResponse::failure(id.clone(), err.message())
            }
            Err(_) => {
                warn!(call_id = %id, method = %method, "Method handler panicked");
                MethodResponse::failure(id.clone(), format!("Handler for {method} panicked"))
            }
        };

        if let Err(err) = self.post(BridgeMessage::MethodResponse(response)).await {
            warn!(call_id = %id, method = %method, error = %err, "Failed to post method response");
        }
        self.seen.lock().answered(id);
    }
}
