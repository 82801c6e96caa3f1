//! In-memory collaborators for tests and examples.
//!
//! [`MemoryClipboard`] stands in for the platform clipboard with controllable
//! focus and permission. [`RecordingRemote`] answers backend calls with
//! scripted ids and records every request.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use c2d_protocol::{CreateGenerateTaskRequest, CreateGenerateTaskResponse, SaveCopyInfoRequest, SaveCopyInfoResponse};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::auth::AuthorizationPayload;
use crate::clipboard::{ClipboardItem, ClipboardPlatform, PermissionState};
use crate::error::{Error, Result};
use crate::remote::RemoteClient;

/// Clipboard held in memory.
///
/// Starts focused with permission granted.
pub struct MemoryClipboard {
	focus: watch::Sender<bool>,
	permission: Mutex<PermissionState>,
	permission_error: Mutex<bool>,
	reject_with: Mutex<Option<String>>,
	contents: Mutex<Option<ClipboardItem>>,
	writes: AtomicUsize,
	queries: AtomicUsize,
}

impl Default for MemoryClipboard {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryClipboard {
	pub fn new() -> Self {
		let (focus, _) = watch::channel(true);
		Self {
			focus,
			permission: Mutex::new(PermissionState::Granted),
			permission_error: Mutex::new(false),
			reject_with: Mutex::new(None),
			contents: Mutex::new(None),
			writes: AtomicUsize::new(0),
			queries: AtomicUsize::new(0),
		}
	}

	pub fn set_focused(&self, focused: bool) {
		self.focus.send_replace(focused);
	}

	pub fn set_permission(&self, state: PermissionState) {
		*self.permission.lock() = state;
	}

	/// Makes permission queries fail.
	pub fn fail_permission_query(&self) {
		*self.permission_error.lock() = true;
	}

	/// Makes every write fail with `message`.
	pub fn reject_writes(&self, message: &str) {
		*self.reject_with.lock() = Some(message.to_string());
	}

	pub fn contents(&self) -> Option<ClipboardItem> {
		self.contents.lock().clone()
	}

	/// Successful writes so far.
	pub fn write_count(&self) -> usize {
		self.writes.load(Ordering::SeqCst)
	}

	pub fn permission_queries(&self) -> usize {
		self.queries.load(Ordering::SeqCst)
	}

	/// Live receivers obtained through [`ClipboardPlatform::focus`].
	pub fn focus_subscribers(&self) -> usize {
		self.focus.receiver_count()
	}
}

#[async_trait]
impl ClipboardPlatform for MemoryClipboard {
	fn focus(&self) -> watch::Receiver<bool> {
		self.focus.subscribe()
	}

	async fn query_permission(&self) -> Result<PermissionState> {
		self.queries.fetch_add(1, Ordering::SeqCst);
		if *self.permission_error.lock() {
			return Err(Error::WriteFailed("permission query unavailable".into()));
		}
		Ok(*self.permission.lock())
	}

	async fn write(&self, item: &ClipboardItem) -> Result<()> {
		if let Some(message) = self.reject_with.lock().clone() {
			return Err(Error::WriteFailed(message));
		}
		*self.contents.lock() = Some(item.clone());
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

/// A backend call seen by [`RecordingRemote`].
#[derive(Debug, Clone)]
pub enum RemoteCall {
	SaveCopyInfo {
		endpoint: String,
		auth: AuthorizationPayload,
		request: SaveCopyInfoRequest,
	},
	CreateGenerateTask {
		endpoint: String,
		auth: AuthorizationPayload,
		request: CreateGenerateTaskRequest,
	},
}

#[derive(Default)]
struct RecordingState {
	calls: Mutex<Vec<RemoteCall>>,
	copy_ids: Mutex<VecDeque<String>>,
	task_ids: Mutex<VecDeque<String>>,
	fail_with: Mutex<Option<String>>,
}

/// Remote client answering from queued ids.
///
/// When a queue is empty, ids are generated as `copy-N` / `task-N`.
#[derive(Clone, Default)]
pub struct RecordingRemote {
	state: Arc<RecordingState>,
}

impl RecordingRemote {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push_copy_id(&self, id: impl Into<String>) {
		self.state.copy_ids.lock().push_back(id.into());
	}

	pub fn push_task_id(&self, id: impl Into<String>) {
		self.state.task_ids.lock().push_back(id.into());
	}

	/// Makes every subsequent call fail with `message`.
	pub fn fail_with(&self, message: &str) {
		*self.state.fail_with.lock() = Some(message.to_string());
	}

	pub fn calls(&self) -> Vec<RemoteCall> {
		self.state.calls.lock().clone()
	}

	fn check_failure(&self, operation: &'static str) -> Result<()> {
		match self.state.fail_with.lock().clone() {
			Some(message) => Err(Error::remote(operation, message)),
			None => Ok(()),
		}
	}

	fn next_id(&self, queue: &Mutex<VecDeque<String>>, prefix: &str) -> String {
		let fallback = format!("{prefix}-{}", self.state.calls.lock().len());
		queue.lock().pop_front().unwrap_or(fallback)
	}
}

#[async_trait]
impl RemoteClient for RecordingRemote {
	async fn save_copy_info(&self, endpoint: &str, auth: &AuthorizationPayload, request: &SaveCopyInfoRequest) -> Result<SaveCopyInfoResponse> {
		self.state.calls.lock().push(RemoteCall::SaveCopyInfo {
			endpoint: endpoint.to_string(),
			auth: auth.clone(),
			request: request.clone(),
		});
		self.check_failure("save-copy-info")?;
		Ok(SaveCopyInfoResponse {
			copy_id: self.next_id(&self.state.copy_ids, "copy"),
		})
	}

	async fn create_generate_task(
		&self,
		endpoint: &str,
		auth: &AuthorizationPayload,
		request: &CreateGenerateTaskRequest,
	) -> Result<CreateGenerateTaskResponse> {
		self.state.calls.lock().push(RemoteCall::CreateGenerateTask {
			endpoint: endpoint.to_string(),
			auth: auth.clone(),
			request: request.clone(),
		});
		self.check_failure("create-generate-task")?;
		Ok(CreateGenerateTaskResponse {
			task_id: self.next_id(&self.state.task_ids, "task"),
		})
	}
}
