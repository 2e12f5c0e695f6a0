//! Guest side of the bridge.
//!
//! [`GuestRuntime`] mirrors the host's capability surface as async methods
//! (the [`ToolUiApi`] trait), keeps the latest [`Globals`] snapshot, and
//! publishes a [`GlobalsChanged`] event whenever a push changes it.
//! [`GuestNamespaces`] exposes one runtime under both the `aui` and `openai`
//! names so guests written against either spelling work unchanged.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::capability::{
    CallToolResponse, CapabilityCall, DisplayModeRequest, FileDownloadRequest, FileDownloadUrl,
    FileUpload, FollowUpMessage, ModalOptions, OpenExternal, UploadedFile,
};
use crate::channel::{Inbox, MessagePort};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::globals::{
    DisplayMode, Globals, GlobalsPatch, SafeArea, Theme, ToolResponseMetadata, UserAgent,
    UserLocation, diff,
};
use crate::message::BridgeMessage;
use crate::rpc::{MethodHandler, NoMethods, RpcEndpoint};

/// Namespace names the guest API is registered under.
pub const NAMESPACES: [&str; 2] = ["aui", "openai"];

/// Event names a globals change is announced under.
pub const GLOBALS_EVENTS: [&str; 2] = ["aui:set_globals", "openai:set_globals"];

const EVENT_CAPACITY: usize = 64;

/// Fields changed by one applied globals update.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalsChanged {
    /// Changed top-level fields and their new values
    pub globals: GlobalsPatch,
}

/// The capability surface available to guest code.
#[async_trait]
pub trait ToolUiApi: Send + Sync {
    /// Run a tool on the host.
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> BridgeResult<CallToolResponse>;

    /// Persist state with the host.
    async fn set_widget_state(&self, state: Value) -> BridgeResult<()>;

    /// Send a follow-up prompt.
    async fn send_follow_up_message(&self, prompt: &str) -> BridgeResult<()>;

    /// Ask for a display mode; resolves with the mode granted.
    async fn request_display_mode(&self, mode: DisplayMode) -> BridgeResult<DisplayMode>;

    /// Ask the host to open a modal.
    async fn request_modal(&self, options: ModalOptions) -> BridgeResult<()>;

    /// Ask the host to close the widget.
    async fn request_close(&self) -> BridgeResult<()>;

    /// Open a link outside the sandbox.
    async fn open_external(&self, href: &str) -> BridgeResult<()>;

    /// Report the content height.
    async fn notify_intrinsic_height(&self, height: f64) -> BridgeResult<()>;

    /// Upload file contents; returns the host's file id.
    async fn upload_file(&self, name: &str, mime_type: &str, contents: &[u8]) -> BridgeResult<String>;

    /// Resolve a download URL for an uploaded file.
    async fn get_file_download_url(&self, file_id: &str) -> BridgeResult<String>;
}

/// Guest half of the bridge.
pub struct GuestRuntime {
    endpoint: Arc<RpcEndpoint>,
    handler: Arc<dyn MethodHandler>,
    globals: RwLock<Globals>,
    events: broadcast::Sender<GlobalsChanged>,
    shutdown: Notify,
}

impl GuestRuntime {
    /// Create a runtime with default globals and configuration.
    pub fn new(port: Arc<dyn MessagePort>) -> Self {
        Self::with_config(port, BridgeConfig::default())
    }

    /// Create a runtime with an explicit configuration.
    pub fn with_config(port: Arc<dyn MessagePort>, config: BridgeConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            endpoint: Arc::new(RpcEndpoint::new(port, config)),
            handler: Arc::new(NoMethods),
            globals: RwLock::new(Globals::default()),
            events,
            shutdown: Notify::new(),
        }
    }

    /// Answer host-initiated calls with `handler` instead of rejecting them.
    pub fn with_handler(mut self, handler: Arc<dyn MethodHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// The underlying endpoint.
    pub fn endpoint(&self) -> &Arc<RpcEndpoint> {
        &self.endpoint
    }

    /// Tell the host the guest has loaded.
    ///
    /// # Errors
    ///
    /// Returns the port's error if the message could not be posted.
    pub async fn announce_ready(&self) -> BridgeResult<()> {
        self.endpoint.post(BridgeMessage::Ready).await
    }

    /// Handle one raw message from the host.
    pub fn handle_message(&self, raw: Value) {
        let message = match BridgeMessage::from_value(raw) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "Dropping malformed host message");
                return;
            }
        };

        match message {
            BridgeMessage::SetGlobals { globals } => {
                if let Err(err) = self.apply_globals(&globals) {
                    warn!(error = %err, "Rejected globals update");
                }
            }
            BridgeMessage::MethodResponse(response) => self.endpoint.handle_response(response),
            BridgeMessage::MethodCall(call) => {
                self.endpoint.spawn_dispatch(call, Arc::clone(&self.handler));
            }
            other => trace!(kind = other.kind(), "Ignoring message not handled by the guest"),
        }
    }

    /// Overlay a pushed patch on the current snapshot.
    ///
    /// Returns the fields that actually changed; a change event is published
    /// only when that set is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`] if the patch does not fit the
    /// snapshot; the current snapshot is left untouched.
    pub fn apply_globals(&self, patch: &GlobalsPatch) -> BridgeResult<GlobalsPatch> {
        let changed = {
            let mut current = self.globals.write();
            let next = current.apply_patch(patch)?;
            let changed = diff(&current, &next)?;
            *current = next;
            changed
        };
        self.publish(&changed);
        Ok(changed)
    }

    /// Reset the snapshot to the defaults overlaid with `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`] if `initial` does not fit the snapshot.
    pub fn init_globals(&self, initial: &GlobalsPatch) -> BridgeResult<GlobalsPatch> {
        let seeded = Globals::default().apply_patch(initial)?;
        let changed = {
            let mut current = self.globals.write();
            let changed = diff(&current, &seeded)?;
            *current = seeded;
            changed
        };
        self.publish(&changed);
        Ok(changed)
    }

    fn publish(&self, changed: &GlobalsPatch) {
        if changed.is_empty() {
            return;
        }
        debug!(fields = changed.len(), "Globals changed");
        // No subscribers is fine.
        let _ = self.events.send(GlobalsChanged {
            globals: changed.clone(),
        });
    }

    /// Receive a [`GlobalsChanged`] event for every applied change.
    pub fn subscribe(&self) -> broadcast::Receiver<GlobalsChanged> {
        self.events.subscribe()
    }

    /// Copy of the full snapshot.
    pub fn globals(&self) -> Globals {
        self.globals.read().clone()
    }

    /// Current theme.
    pub fn theme(&self) -> Theme {
        self.globals.read().theme
    }

    /// Current locale.
    pub fn locale(&self) -> String {
        self.globals.read().locale.clone()
    }

    /// Current display mode.
    pub fn display_mode(&self) -> DisplayMode {
        self.globals.read().display_mode
    }

    /// Display mode before the last change.
    pub fn previous_display_mode(&self) -> Option<DisplayMode> {
        self.globals.read().previous_display_mode
    }

    /// Maximum height in pixels.
    pub fn max_height(&self) -> f64 {
        self.globals.read().max_height
    }

    /// Arguments the tool was called with.
    pub fn tool_input(&self) -> Value {
        self.globals.read().tool_input.clone()
    }

    /// The tool's output.
    pub fn tool_output(&self) -> Value {
        self.globals.read().tool_output.clone()
    }

    /// Persisted widget state.
    pub fn widget_state(&self) -> Value {
        self.globals.read().widget_state.clone()
    }

    /// Host user agent.
    pub fn user_agent(&self) -> UserAgent {
        self.globals.read().user_agent.clone()
    }

    /// Safe area insets.
    pub fn safe_area(&self) -> SafeArea {
        self.globals.read().safe_area.clone()
    }

    /// User location, if shared.
    pub fn user_location(&self) -> Option<UserLocation> {
        self.globals.read().user_location.clone()
    }

    /// Tool response metadata.
    pub fn tool_response_metadata(&self) -> Option<ToolResponseMetadata> {
        self.globals.read().tool_response_metadata.clone()
    }

    /// Host view descriptor.
    pub fn view(&self) -> Option<Value> {
        self.globals.read().view.clone()
    }

    /// Invoke a host method by name.
    ///
    /// # Errors
    ///
    /// See [`RpcEndpoint::call`].
    pub async fn call(&self, method: &str, args: Vec<Value>) -> BridgeResult<Value> {
        self.endpoint.call(method, args).await
    }

    async fn invoke<T: DeserializeOwned>(&self, call: CapabilityCall) -> BridgeResult<T> {
        let method = call.method();
        let value = self.call(method, call.to_args()?).await?;
        serde_json::from_value(value).map_err(|e| {
            BridgeError::Serialization(format!("unexpected result from {method}: {e}"))
        })
    }

    async fn invoke_unit(&self, call: CapabilityCall) -> BridgeResult<()> {
        let method = call.method();
        self.call(method, call.to_args()?).await.map(|_| ())
    }

    /// Feed messages from `inbox` to [`handle_message`](Self::handle_message)
    /// until the inbox closes or [`shutdown`](Self::shutdown) is called.
    pub fn listen(self: &Arc<Self>, mut inbox: Inbox) -> JoinHandle<()> {
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = runtime.shutdown.notified() => break,
                    message = inbox.recv() => match message {
                        Some(raw) => runtime.handle_message(raw),
                        None => break,
                    },
                }
            }
            debug!("Guest runtime stopped listening");
        })
    }

    /// Stop the listening task.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[async_trait]
impl ToolUiApi for GuestRuntime {
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> BridgeResult<CallToolResponse> {
        self.invoke(CapabilityCall::CallTool {
            name: name.to_string(),
            arguments,
        })
        .await
    }

    async fn set_widget_state(&self, state: Value) -> BridgeResult<()> {
        self.invoke_unit(CapabilityCall::SetWidgetState(state)).await
    }

    async fn send_follow_up_message(&self, prompt: &str) -> BridgeResult<()> {
        self.invoke_unit(CapabilityCall::SendFollowUpMessage(FollowUpMessage {
            prompt: prompt.to_string(),
        }))
        .await
    }

    async fn request_display_mode(&self, mode: DisplayMode) -> BridgeResult<DisplayMode> {
        let granted: DisplayModeRequest = self
            .invoke(CapabilityCall::RequestDisplayMode(DisplayModeRequest { mode }))
            .await?;
        Ok(granted.mode)
    }

    async fn request_modal(&self, options: ModalOptions) -> BridgeResult<()> {
        self.invoke_unit(CapabilityCall::RequestModal(options)).await
    }

    async fn request_close(&self) -> BridgeResult<()> {
        self.invoke_unit(CapabilityCall::RequestClose).await
    }

    async fn open_external(&self, href: &str) -> BridgeResult<()> {
        self.invoke_unit(CapabilityCall::OpenExternal(OpenExternal {
            href: href.to_string(),
        }))
        .await
    }

    async fn notify_intrinsic_height(&self, height: f64) -> BridgeResult<()> {
        self.invoke_unit(CapabilityCall::NotifyIntrinsicHeight(height)).await
    }

    async fn upload_file(&self, name: &str, mime_type: &str, contents: &[u8]) -> BridgeResult<String> {
        let uploaded: UploadedFile = self
            .invoke(CapabilityCall::UploadFile(FileUpload {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                size: contents.len() as u64,
                data: STANDARD.encode(contents),
            }))
            .await?;
        Ok(uploaded.file_id)
    }

    async fn get_file_download_url(&self, file_id: &str) -> BridgeResult<String> {
        let url: FileDownloadUrl = self
            .invoke(CapabilityCall::GetFileDownloadUrl(FileDownloadRequest {
                file_id: file_id.to_string(),
            }))
            .await?;
        Ok(url.download_url)
    }
}

/// One runtime registered under every namespace and event alias.
#[derive(Clone)]
pub struct GuestNamespaces {
    runtime: Arc<GuestRuntime>,
}

impl GuestNamespaces {
    /// Register `runtime` under [`NAMESPACES`].
    pub fn new(runtime: Arc<GuestRuntime>) -> Self {
        Self { runtime }
    }

    /// The API registered under `name`, if it is a known namespace.
    pub fn get(&self, name: &str) -> Option<Arc<GuestRuntime>> {
        NAMESPACES
            .contains(&name)
            .then(|| Arc::clone(&self.runtime))
    }

    /// Subscribe to globals changes under one of [`GLOBALS_EVENTS`].
    ///
    /// Every event name yields the same stream of changes.
    pub fn subscribe(&self, event: &str) -> Option<broadcast::Receiver<GlobalsChanged>> {
        GLOBALS_EVENTS
            .contains(&event)
            .then(|| self.runtime.subscribe())
    }
}
