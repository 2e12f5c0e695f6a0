//! # toolui-bridge
//!
//! Correlated RPC between a tool UI host and the sandboxed guest it embeds.
//!
//! Host and guest share nothing but an asynchronous, best-effort message
//! channel. This crate builds request/response pairing, per-call timeouts,
//! capability dispatch and diffed global-state pushes on top of it.
//!
//! ## Architecture
//!
//! - [`message`] - wire envelopes and legacy/aliased message normalization
//! - [`rpc`] - pending call table, `call` with timeout, at-most-one-response dispatch
//! - [`capability`] - typed capability calls and the [`HostCapabilities`] trait
//! - [`globals`] - the global state snapshot and its structural diff
//! - [`host`] - [`HostBridge`], the host half
//! - [`guest`] - [`GuestRuntime`], the guest half, and its namespace aliases
//! - [`channel`] - the [`MessagePort`] abstraction and an in-process channel pair
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::{Map, Value};
//! use toolui_bridge::{
//!     CallToolResponse, CapabilityError, GuestRuntime, HostBridge, HostCapabilities, ToolUiApi,
//!     channel,
//! };
//!
//! struct Host;
//!
//! #[async_trait]
//! impl HostCapabilities for Host {
//!     async fn call_tool(
//!         &self,
//!         name: String,
//!         _arguments: Map<String, Value>,
//!     ) -> Result<CallToolResponse, CapabilityError> {
//!         Ok(CallToolResponse {
//!             structured_content: Some(Value::String(name)),
//!             ..CallToolResponse::default()
//!         })
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (host_end, guest_end) = channel::pair();
//! let host = Arc::new(HostBridge::new(Arc::new(host_end.port), Arc::new(Host)));
//! let guest = Arc::new(GuestRuntime::new(Arc::new(guest_end.port)));
//! host.listen(host_end.inbox);
//! guest.listen(guest_end.inbox);
//!
//! let response = guest.call_tool("search", Map::new()).await?;
//! assert_eq!(response.structured_content, Some(Value::String("search".into())));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod capability;
pub mod channel;
pub mod config;
pub mod error;
pub mod globals;
pub mod guest;
pub mod host;
pub mod message;
pub mod rpc;

pub use capability::{
    CallToolResponse, CapabilityCall, CapabilityDispatcher, DisplayModeRequest, FileDownloadRequest,
    FileDownloadUrl, FileUpload, FollowUpMessage, HostCapabilities, ModalOptions, OpenExternal,
    UploadedFile,
};
pub use channel::{ChannelEnd, Inbox, LocalPort, MessagePort};
pub use config::{BridgeConfig, DEFAULT_CALL_TIMEOUT};
pub use error::{BridgeError, BridgeResult, CapabilityError};
pub use globals::{DisplayMode, Globals, GlobalsPatch, Theme};
pub use guest::{GLOBALS_EVENTS, GlobalsChanged, GuestNamespaces, GuestRuntime, NAMESPACES, ToolUiApi};
pub use host::{HostBridge, LegacyEvent, LegacyObserver, SendGlobalsOptions};
pub use message::{BridgeMessage, CallId, MethodCall, MethodResponse};
pub use rpc::{MethodHandler, NoMethods, PendingCalls, RpcEndpoint};
