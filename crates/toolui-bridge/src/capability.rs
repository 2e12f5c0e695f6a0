//! The host capability surface.
//!
//! On the wire a capability call is a method name plus positional JSON
//! arguments. At the boundary it becomes a [`CapabilityCall`], one typed
//! variant per capability, and is handed to the host's [`HostCapabilities`]
//! implementation.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult, CapabilityError};
use crate::globals::DisplayMode;
use crate::rpc::MethodHandler;

/// Wire names of the capability methods.
pub mod methods {
    /// Invoke a tool on the host's server
    pub const CALL_TOOL: &str = "callTool";
    /// Persist guest state
    pub const SET_WIDGET_STATE: &str = "setWidgetState";
    /// Send a follow-up prompt to the conversation
    pub const SEND_FOLLOW_UP_MESSAGE: &str = "sendFollowUpMessage";
    /// Ask for a different display mode
    pub const REQUEST_DISPLAY_MODE: &str = "requestDisplayMode";
    /// Ask the host to open a modal
    pub const REQUEST_MODAL: &str = "requestModal";
    /// Ask the host to close the widget
    pub const REQUEST_CLOSE: &str = "requestClose";
    /// Open a link outside the sandbox
    pub const OPEN_EXTERNAL: &str = "openExternal";
    /// Report the content height
    pub const NOTIFY_INTRINSIC_HEIGHT: &str = "notifyIntrinsicHeight";
    /// Upload a file to the host
    pub const UPLOAD_FILE: &str = "uploadFile";
    /// Resolve a download URL for an uploaded file
    pub const GET_FILE_DOWNLOAD_URL: &str = "getFileDownloadUrl";
}

/// Result of a `callTool` invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResponse {
    /// Structured tool output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Unstructured content blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// The tool reported a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Response metadata
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Any other fields the host returns
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Argument of `sendFollowUpMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpMessage {
    /// Prompt text
    pub prompt: String,
}

/// Argument and result of `requestDisplayMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayModeRequest {
    /// Requested (or granted) mode
    pub mode: DisplayMode,
}

/// Argument of `requestModal`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModalOptions {
    /// Modal title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Parameters handed to the modal view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Host-specific options
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Argument of `openExternal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenExternal {
    /// Target URL
    pub href: String,
}

/// Argument of `uploadFile`; `data` is the base64 encoded content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    /// File name
    pub name: String,
    /// MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    /// Base64 content
    pub data: String,
}

/// Result of `uploadFile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Host-assigned id
    pub file_id: String,
}

/// Argument of `getFileDownloadUrl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDownloadRequest {
    /// Id returned by `uploadFile`
    pub file_id: String,
}

/// Result of `getFileDownloadUrl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDownloadUrl {
    /// Where the file can be fetched
    pub download_url: String,
}

/// A capability invocation with its typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityCall {
    /// `callTool(name, args)`
    CallTool {
        /// Tool name
        name: String,
        /// Tool arguments
        arguments: Map<String, Value>,
    },
    /// `setWidgetState(state)`
    SetWidgetState(Value),
    /// `sendFollowUpMessage({prompt})`
    SendFollowUpMessage(FollowUpMessage),
    /// `requestDisplayMode({mode})`
    RequestDisplayMode(DisplayModeRequest),
    /// `requestModal(options)`
    RequestModal(ModalOptions),
    /// `requestClose()`
    RequestClose,
    /// `openExternal({href})`
    OpenExternal(OpenExternal),
    /// `notifyIntrinsicHeight(height)`
    NotifyIntrinsicHeight(f64),
    /// `uploadFile(file)`
    UploadFile(FileUpload),
    /// `getFileDownloadUrl({fileId})`
    GetFileDownloadUrl(FileDownloadRequest),
}

impl CapabilityCall {
    /// Decode a wire call.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownMethod`] for a name outside the capability set,
    /// [`BridgeError::InvalidArguments`] when an argument has the wrong shape.
    pub fn from_wire(method: &str, args: &[Value]) -> BridgeResult<Self> {
        use methods::*;

        let call = match method {
            CALL_TOOL => Self::CallTool {
                name: arg(method, args, 0)?,
                arguments: arg::<Option<Map<String, Value>>>(method, args, 1)?.unwrap_or_default(),
            },
            SET_WIDGET_STATE => Self::SetWidgetState(arg(method, args, 0)?),
            SEND_FOLLOW_UP_MESSAGE => Self::SendFollowUpMessage(arg(method, args, 0)?),
            REQUEST_DISPLAY_MODE => Self::RequestDisplayMode(arg(method, args, 0)?),
            REQUEST_MODAL => {
                Self::RequestModal(arg::<Option<ModalOptions>>(method, args, 0)?.unwrap_or_default())
            }
            REQUEST_CLOSE => Self::RequestClose,
            OPEN_EXTERNAL => Self::OpenExternal(arg(method, args, 0)?),
            NOTIFY_INTRINSIC_HEIGHT => Self::NotifyIntrinsicHeight(arg(method, args, 0)?),
            UPLOAD_FILE => Self::UploadFile(arg(method, args, 0)?),
            GET_FILE_DOWNLOAD_URL => Self::GetFileDownloadUrl(arg(method, args, 0)?),
            other => return Err(BridgeError::UnknownMethod(other.to_string())),
        };
        Ok(call)
    }

    /// Wire method name.
    pub fn method(&self) -> &'static str {
        use methods::*;

        match self {
            Self::CallTool { .. } => CALL_TOOL,
            Self::SetWidgetState(_) => SET_WIDGET_STATE,
            Self::SendFollowUpMessage(_) => SEND_FOLLOW_UP_MESSAGE,
            Self::RequestDisplayMode(_) => REQUEST_DISPLAY_MODE,
            Self::RequestModal(_) => REQUEST_MODAL,
            Self::RequestClose => REQUEST_CLOSE,
            Self::OpenExternal(_) => OPEN_EXTERNAL,
            Self::NotifyIntrinsicHeight(_) => NOTIFY_INTRINSIC_HEIGHT,
            Self::UploadFile(_) => UPLOAD_FILE,
            Self::GetFileDownloadUrl(_) => GET_FILE_DOWNLOAD_URL,
        }
    }

    /// Positional wire arguments.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`] if an argument cannot be encoded.
    pub fn to_args(&self) -> BridgeResult<Vec<Value>> {
        let args = match self {
            Self::CallTool { name, arguments } => {
                vec![Value::String(name.clone()), Value::Object(arguments.clone())]
            }
            Self::SetWidgetState(state) => vec![state.clone()],
            Self::SendFollowUpMessage(message) => vec![serde_json::to_value(message)?],
            Self::RequestDisplayMode(request) => vec![serde_json::to_value(request)?],
            Self::RequestModal(options) => vec![serde_json::to_value(options)?],
            Self::RequestClose => Vec::new(),
            Self::OpenExternal(target) => vec![serde_json::to_value(target)?],
            Self::NotifyIntrinsicHeight(height) => vec![serde_json::to_value(height)?],
            Self::UploadFile(file) => vec![serde_json::to_value(file)?],
            Self::GetFileDownloadUrl(request) => vec![serde_json::to_value(request)?],
        };
        Ok(args)
    }
}

fn arg<T: DeserializeOwned>(method: &str, args: &[Value], index: usize) -> BridgeResult<T> {
    let value = args.get(index).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| BridgeError::InvalidArguments {
        method: method.to_string(),
        reason: format!("argument {index}: {e}"),
    })
}

/// Host-side implementation of the capabilities offered to the guest.
///
/// Every method defaults to rejecting the call, so a host implements only
/// what it supports.
#[async_trait]
pub trait HostCapabilities: Send + Sync {
    /// Run a tool and return its result.
    async fn call_tool(
        &self,
        name: String,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResponse, CapabilityError> {
        let _ = (name, arguments);
        Err(CapabilityError::unsupported(methods::CALL_TOOL))
    }

    /// Persist guest state.
    async fn set_widget_state(&self, state: Value) -> Result<(), CapabilityError> {
        let _ = state;
        Err(CapabilityError::unsupported(methods::SET_WIDGET_STATE))
    }

    /// Send a follow-up prompt.
    async fn send_follow_up_message(&self, message: FollowUpMessage) -> Result<(), CapabilityError> {
        let _ = message;
        Err(CapabilityError::unsupported(methods::SEND_FOLLOW_UP_MESSAGE))
    }

    /// Change display mode; returns the mode actually granted.
    async fn request_display_mode(
        &self,
        request: DisplayModeRequest,
    ) -> Result<DisplayModeRequest, CapabilityError> {
        let _ = request;
        Err(CapabilityError::unsupported(methods::REQUEST_DISPLAY_MODE))
    }

    /// Open a modal.
    async fn request_modal(&self, options: ModalOptions) -> Result<(), CapabilityError> {
        let _ = options;
        Err(CapabilityError::unsupported(methods::REQUEST_MODAL))
    }

    /// Close the widget.
    async fn request_close(&self) -> Result<(), CapabilityError> {
        Err(CapabilityError::unsupported(methods::REQUEST_CLOSE))
    }

    /// Open an external link.
    async fn open_external(&self, target: OpenExternal) -> Result<(), CapabilityError> {
        let _ = target;
        Err(CapabilityError::unsupported(methods::OPEN_EXTERNAL))
    }

    /// Record the guest's content height.
    async fn notify_intrinsic_height(&self, height: f64) -> Result<(), CapabilityError> {
        let _ = height;
        Err(CapabilityError::unsupported(methods::NOTIFY_INTRINSIC_HEIGHT))
    }

    /// Store an uploaded file.
    async fn upload_file(&self, file: FileUpload) -> Result<UploadedFile, CapabilityError> {
        let _ = file;
        Err(CapabilityError::unsupported(methods::UPLOAD_FILE))
    }

    /// Resolve a download URL.
    async fn get_file_download_url(
        &self,
        request: FileDownloadRequest,
    ) -> Result<FileDownloadUrl, CapabilityError> {
        let _ = request;
        Err(CapabilityError::unsupported(methods::GET_FILE_DOWNLOAD_URL))
    }
}

/// Runs decoded [`CapabilityCall`]s against a [`HostCapabilities`] value.
pub struct CapabilityDispatcher<H: ?Sized> {
    capabilities: Arc<H>,
}

impl<H: HostCapabilities + ?Sized> CapabilityDispatcher<H> {
    /// Wrap a capability implementation.
    pub fn new(capabilities: Arc<H>) -> Self {
        Self { capabilities }
    }

    /// Execute one typed call and encode its result.
    ///
    /// # Errors
    ///
    /// Returns the handler's error, or a serialization error for the result.
    pub async fn execute(&self, call: CapabilityCall) -> Result<Value, CapabilityError> {
        let caps = &self.capabilities;
        let value = match call {
            CapabilityCall::CallTool { name, arguments } => {
                encode(caps.call_tool(name, arguments).await?)?
            }
            CapabilityCall::SetWidgetState(state) => {
                caps.set_widget_state(state).await?;
                Value::Null
            }
            CapabilityCall::SendFollowUpMessage(message) => {
                caps.send_follow_up_message(message).await?;
                Value::Null
            }
            CapabilityCall::RequestDisplayMode(request) => {
                encode(caps.request_display_mode(request).await?)?
            }
            CapabilityCall::RequestModal(options) => {
                caps.request_modal(options).await?;
                Value::Null
            }
            CapabilityCall::RequestClose => {
                caps.request_close().await?;
                Value::Null
            }
            CapabilityCall::OpenExternal(target) => {
                caps.open_external(target).await?;
                Value::Null
            }
            CapabilityCall::NotifyIntrinsicHeight(height) => {
                caps.notify_intrinsic_height(height).await?;
                Value::Null
            }
            CapabilityCall::UploadFile(file) => encode(caps.upload_file(file).await?)?,
            CapabilityCall::GetFileDownloadUrl(request) => {
                encode(caps.get_file_download_url(request).await?)?
            }
        };
        Ok(value)
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, CapabilityError> {
    serde_json::to_value(value).map_err(|e| CapabilityError::new(e.to_string()))
}

#[async_trait]
impl<H: HostCapabilities + ?Sized> MethodHandler for CapabilityDispatcher<H> {
    async fn handle(&self, method: &str, args: Vec<Value>) -> Result<Value, CapabilityError> {
        let call = CapabilityCall::from_wire(method, &args)?;
        self.execute(call).await
    }
}
