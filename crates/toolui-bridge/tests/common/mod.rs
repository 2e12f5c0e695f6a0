//! Shared fixtures for bridge integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use toolui_bridge::{
    BridgeConfig, CallToolResponse, CapabilityError, DisplayModeRequest, FileDownloadRequest,
    FileDownloadUrl, FileUpload, GuestRuntime, HostBridge, HostCapabilities, Inbox, LocalPort,
    UploadedFile, channel,
};

/// Route bridge logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("toolui_bridge=debug")
        .with_test_writer()
        .try_init();
}

/// Host capabilities that record what the guest asked for.
#[derive(Default)]
pub struct RecordingHost {
    pub widget_states: Mutex<Vec<Value>>,
    pub heights: Mutex<Vec<f64>>,
    pub uploads: Mutex<Vec<FileUpload>>,
}

#[async_trait]
impl HostCapabilities for RecordingHost {
    async fn call_tool(
        &self,
        name: String,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResponse, CapabilityError> {
        match name.as_str() {
            "fail" => Err(CapabilityError::new("tool exploded")),
            "slow" => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(structured(json!({"tool": "slow"})))
            }
            _ => Ok(structured(json!({"tool": name, "echo": arguments}))),
        }
    }

    async fn set_widget_state(&self, state: Value) -> Result<(), CapabilityError> {
        self.widget_states.lock().push(state);
        Ok(())
    }

    async fn request_display_mode(
        &self,
        request: DisplayModeRequest,
    ) -> Result<DisplayModeRequest, CapabilityError> {
        Ok(request)
    }

    async fn notify_intrinsic_height(&self, height: f64) -> Result<(), CapabilityError> {
        self.heights.lock().push(height);
        Ok(())
    }

    async fn upload_file(&self, file: FileUpload) -> Result<UploadedFile, CapabilityError> {
        let file_id = format!("file-{}", self.uploads.lock().len() + 1);
        self.uploads.lock().push(file);
        Ok(UploadedFile { file_id })
    }

    async fn get_file_download_url(
        &self,
        request: FileDownloadRequest,
    ) -> Result<FileDownloadUrl, CapabilityError> {
        Ok(FileDownloadUrl {
            download_url: format!("https://files.example.com/{}", request.file_id),
        })
    }
}

fn structured(value: Value) -> CallToolResponse {
    CallToolResponse {
        structured_content: Some(value),
        ..CallToolResponse::default()
    }
}

/// A host bridge and guest runtime connected and listening.
pub struct Connected {
    pub host: Arc<HostBridge>,
    pub guest: Arc<GuestRuntime>,
    pub capabilities: Arc<RecordingHost>,
}

pub fn connect() -> Connected {
    init_tracing();
    let (host_end, guest_end) = channel::pair();
    let capabilities = Arc::new(RecordingHost::default());
    let host = Arc::new(HostBridge::new(
        Arc::new(host_end.port),
        Arc::clone(&capabilities),
    ));
    let guest = Arc::new(GuestRuntime::new(Arc::new(guest_end.port)));
    host.listen(host_end.inbox);
    guest.listen(guest_end.inbox);
    Connected {
        host,
        guest,
        capabilities,
    }
}

/// A listening guest whose host side is driven by hand.
pub fn guest_with_raw_host(config: BridgeConfig) -> (Arc<GuestRuntime>, LocalPort, Inbox) {
    init_tracing();
    let (host_end, guest_end) = channel::pair();
    let guest = Arc::new(GuestRuntime::with_config(Arc::new(guest_end.port), config));
    guest.listen(guest_end.inbox);
    (guest, host_end.port, host_end.inbox)
}

/// Yield until `check` passes or the budget runs out.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
