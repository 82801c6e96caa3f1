//! Clipboard write state machine.
//!
//! ```text
//! WaitingFocus -> CheckingPermission -> Writing -> Done
//!                        |
//!                        +-> PermissionDenied      (denied)
//!                        +-> UserActionRequired    (permission state unavailable)
//! ```
//!
//! Platforms that cannot report permission state often also reject writes
//! made outside a user gesture. In that case the write is handed back as a
//! [`PendingWrite`] for the caller to [`commit`](PendingWrite::commit) from a
//! click handler.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::error::{Error, Result};

pub const HTML_MIME: &str = "text/html";

/// A single clipboard item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardItem {
	pub mime_type: String,
	pub data: String,
}

impl ClipboardItem {
	pub fn html(data: impl Into<String>) -> Self {
		Self {
			mime_type: HTML_MIME.to_string(),
			data: data.into(),
		}
	}
}

/// Clipboard-write permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
	Granted,
	Prompt,
	Denied,
	/// The platform cannot report a permission state.
	NotSupported,
}

/// Platform clipboard access.
#[async_trait]
pub trait ClipboardPlatform: Send + Sync {
	/// Focus state of the document. `true` while focused.
	fn focus(&self) -> watch::Receiver<bool>;

	/// Errors are treated as [`PermissionState::NotSupported`].
	async fn query_permission(&self) -> Result<PermissionState>;

	/// Writes the item. Rejections should surface as [`Error::WriteFailed`].
	async fn write(&self, item: &ClipboardItem) -> Result<()>;
}

/// States of a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
	WaitingFocus,
	CheckingPermission,
	Writing,
	Done,
	PermissionDenied,
	UserActionRequired,
}

type Callback = Arc<dyn Fn() + Send + Sync>;
type StateCallback = Arc<dyn Fn(WriteState) + Send + Sync>;

/// Optional notifications raised during a write.
#[derive(Clone, Default)]
pub struct WriteHooks {
	on_waiting_focus: Option<Callback>,
	on_state: Option<StateCallback>,
}

impl WriteHooks {
	/// Called once when the write has to wait for the document to gain focus.
	pub fn on_waiting_focus(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
		self.on_waiting_focus = Some(Arc::new(callback));
		self
	}

	/// Called on every state transition.
	pub fn on_state(mut self, callback: impl Fn(WriteState) + Send + Sync + 'static) -> Self {
		self.on_state = Some(Arc::new(callback));
		self
	}

	fn enter(&self, state: WriteState) {
		debug!(target = "c2d.clipboard", ?state, "clipboard write state");
		if let Some(callback) = &self.on_state {
			callback(state);
		}
	}

	fn waiting_focus(&self) {
		if let Some(callback) = &self.on_waiting_focus {
			callback();
		}
	}
}

impl fmt::Debug for WriteHooks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WriteHooks")
			.field("on_waiting_focus", &self.on_waiting_focus.is_some())
			.field("on_state", &self.on_state.is_some())
			.finish()
	}
}

/// Result of [`ClipboardWriter::write`].
#[must_use = "a deferred write does nothing until committed"]
#[derive(Debug)]
pub enum WriteOutcome {
	Written,
	/// Nothing was written; commit the returned write from a user gesture.
	UserActionRequired(PendingWrite),
}

impl WriteOutcome {
	pub fn is_written(&self) -> bool {
		matches!(self, WriteOutcome::Written)
	}
}

/// A clipboard write deferred until a user gesture.
pub struct PendingWrite {
	platform: Arc<dyn ClipboardPlatform>,
	item: ClipboardItem,
	hooks: WriteHooks,
}

impl PendingWrite {
	pub fn item(&self) -> &ClipboardItem {
		&self.item
	}

	/// Performs the write.
	pub async fn commit(self) -> Result<()> {
		write_item(self.platform.as_ref(), &self.item, &self.hooks).await
	}
}

impl fmt::Debug for PendingWrite {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PendingWrite").field("item", &self.item).finish_non_exhaustive()
	}
}

/// Drives a write through focus and permission checks.
#[derive(Clone)]
pub struct ClipboardWriter {
	platform: Arc<dyn ClipboardPlatform>,
}

impl ClipboardWriter {
	pub fn new(platform: Arc<dyn ClipboardPlatform>) -> Self {
		Self { platform }
	}

	pub fn platform(&self) -> &Arc<dyn ClipboardPlatform> {
		&self.platform
	}

	pub async fn write(&self, item: ClipboardItem, hooks: &WriteHooks) -> Result<WriteOutcome> {
		self.wait_for_focus(hooks).await?;

		hooks.enter(WriteState::CheckingPermission);
		let permission = match self.platform.query_permission().await {
			Ok(state) => state,
			Err(err) => {
				trace!(target = "c2d.clipboard", error = %err, "permission query failed");
				PermissionState::NotSupported
			}
		};

		match permission {
			PermissionState::Denied => {
				hooks.enter(WriteState::PermissionDenied);
				Err(Error::PermissionDenied)
			}
			PermissionState::NotSupported => {
				hooks.enter(WriteState::UserActionRequired);
				Ok(WriteOutcome::UserActionRequired(PendingWrite {
					platform: Arc::clone(&self.platform),
					item,
					hooks: hooks.clone(),
				}))
			}
			PermissionState::Granted | PermissionState::Prompt => {
				write_item(self.platform.as_ref(), &item, hooks).await?;
				Ok(WriteOutcome::Written)
			}
		}
	}

	async fn wait_for_focus(&self, hooks: &WriteHooks) -> Result<()> {
		// Take the receiver before reading the flag so a focus change in
		// between is still observed.
		let mut focus = self.platform.focus();
		if *focus.borrow_and_update() {
			return Ok(());
		}

		hooks.enter(WriteState::WaitingFocus);
		hooks.waiting_focus();
		focus
			.wait_for(|focused| *focused)
			.await
			.map_err(|_| Error::WriteFailed("focus source closed before the document gained focus".into()))?;
		Ok(())
	}
}

async fn write_item(platform: &dyn ClipboardPlatform, item: &ClipboardItem, hooks: &WriteHooks) -> Result<()> {
	hooks.enter(WriteState::Writing);
	platform.write(item).await?;
	hooks.enter(WriteState::Done);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MemoryClipboard;
	use parking_lot::Mutex;

	fn recording_hooks() -> (WriteHooks, Arc<Mutex<Vec<WriteState>>>) {
		let states = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&states);
		(WriteHooks::default().on_state(move |state| sink.lock().push(state)), states)
	}

	#[tokio::test]
	async fn test_granted_and_focused_writes_immediately() {
		let clipboard = Arc::new(MemoryClipboard::new());
		let writer = ClipboardWriter::new(clipboard.clone());
		let (hooks, states) = recording_hooks();

		let outcome = writer.write(ClipboardItem::html("<b>x</b>"), &hooks).await.unwrap();
		assert!(outcome.is_written());
		assert_eq!(clipboard.contents(), Some(ClipboardItem::html("<b>x</b>")));
		assert_eq!(*states.lock(), vec![WriteState::CheckingPermission, WriteState::Writing, WriteState::Done]);
	}

	#[tokio::test]
	async fn test_prompt_proceeds_to_write() {
		let clipboard = Arc::new(MemoryClipboard::new());
		clipboard.set_permission(PermissionState::Prompt);
		let writer = ClipboardWriter::new(clipboard.clone());

		assert!(writer.write(ClipboardItem::html("p"), &WriteHooks::default()).await.unwrap().is_written());
		assert_eq!(clipboard.write_count(), 1);
	}

	#[tokio::test]
	async fn test_denied_rejects_without_writing() {
		let clipboard = Arc::new(MemoryClipboard::new());
		clipboard.set_permission(PermissionState::Denied);
		let writer = ClipboardWriter::new(clipboard.clone());
		let (hooks, states) = recording_hooks();

		let err = writer.write(ClipboardItem::html("x"), &hooks).await.unwrap_err();
		assert!(err.is_permission_denied());
		assert_eq!(clipboard.write_count(), 0);
		assert_eq!(states.lock().last(), Some(&WriteState::PermissionDenied));
	}

	#[tokio::test]
	async fn test_unsupported_defers_until_commit() {
		let clipboard = Arc::new(MemoryClipboard::new());
		clipboard.set_permission(PermissionState::NotSupported);
		let writer = ClipboardWriter::new(clipboard.clone());

		let outcome = writer.write(ClipboardItem::html("later"), &WriteHooks::default()).await.unwrap();
		let WriteOutcome::UserActionRequired(pending) = outcome else {
			panic!("expected a deferred write");
		};
		assert_eq!(clipboard.write_count(), 0);
		assert_eq!(pending.item().data, "later");

		pending.commit().await.unwrap();
		assert_eq!(clipboard.contents().unwrap().data, "later");
	}

	#[tokio::test]
	async fn test_failed_permission_query_is_treated_as_unsupported() {
		let clipboard = Arc::new(MemoryClipboard::new());
		clipboard.fail_permission_query();
		let writer = ClipboardWriter::new(clipboard.clone());

		let outcome = writer.write(ClipboardItem::html("x"), &WriteHooks::default()).await.unwrap();
		assert!(matches!(outcome, WriteOutcome::UserActionRequired(_)));
	}

	#[tokio::test]
	async fn test_waits_for_focus_before_checking_permission() {
		let clipboard = Arc::new(MemoryClipboard::new());
		clipboard.set_focused(false);
		let writer = ClipboardWriter::new(clipboard.clone());

		let notified = Arc::new(Mutex::new(0));
		let counter = Arc::clone(&notified);
		let hooks = WriteHooks::default().on_waiting_focus(move || *counter.lock() += 1);

		let task = tokio::spawn({
			let writer = writer.clone();
			async move { writer.write(ClipboardItem::html("f"), &hooks).await }
		});

		while clipboard.focus_subscribers() == 0 {
			tokio::task::yield_now().await;
		}
		assert_eq!(clipboard.permission_queries(), 0);
		assert_eq!(clipboard.write_count(), 0);

		clipboard.set_focused(true);
		assert!(task.await.unwrap().unwrap().is_written());
		assert_eq!(*notified.lock(), 1);
		assert_eq!(clipboard.permission_queries(), 1);
	}

	#[tokio::test]
	async fn test_rejected_write_surfaces_write_failure() {
		let clipboard = Arc::new(MemoryClipboard::new());
		clipboard.reject_writes("permission revoked");
		let writer = ClipboardWriter::new(clipboard.clone());

		let err = writer.write(ClipboardItem::html("x"), &WriteHooks::default()).await.unwrap_err();
		assert!(matches!(err, Error::WriteFailed(message) if message == "permission revoked"));
	}
}
