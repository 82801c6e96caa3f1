//! Clipboard stand-in for a terminal: the item goes to a file or stdout.

use std::path::PathBuf;

use async_trait::async_trait;
use c2d::{ClipboardItem, ClipboardPlatform, Error, PermissionState, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::debug;

/// Always focused, always permitted.
pub struct FileClipboard {
	out: Option<PathBuf>,
	focus: watch::Sender<bool>,
}

impl FileClipboard {
	/// Writes to `out`, or stdout when `None`.
	pub fn new(out: Option<PathBuf>) -> Self {
		let (focus, _) = watch::channel(true);
		Self { out, focus }
	}
}

#[async_trait]
impl ClipboardPlatform for FileClipboard {
	fn focus(&self) -> watch::Receiver<bool> {
		self.focus.subscribe()
	}

	async fn query_permission(&self) -> Result<PermissionState> {
		Ok(PermissionState::Granted)
	}

	async fn write(&self, item: &ClipboardItem) -> Result<()> {
		let failed = |err: std::io::Error| Error::WriteFailed(err.to_string());
		match &self.out {
			Some(path) => {
				tokio::fs::write(path, item.data.as_bytes()).await.map_err(failed)?;
				debug!(target = "c2d.clipboard", path = %path.display(), mime = %item.mime_type, "clipboard item written");
			}
			None => {
				let mut stdout = tokio::io::stdout();
				stdout.write_all(item.data.as_bytes()).await.map_err(failed)?;
				stdout.write_all(b"\n").await.map_err(failed)?;
				stdout.flush().await.map_err(failed)?;
			}
		}
		Ok(())
	}
}
