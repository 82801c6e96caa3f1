//! Delivery orchestration.

use std::sync::Arc;

use c2d_protocol::{CreateGenerateTaskRequest, PlatformType, RESOURCE_UNSUBSCRIBE_EVENT, ResourceKey, SaveCopyInfoRequest};
use c2d_runtime::{ChannelConnector, ConnectionPool, PooledConnection, RealtimeChannel as _, SocketIoConnector};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::auth::AuthorizationPayload;
use crate::cipher::{AesGcmCipher, Cipher, generate_secret};
use crate::clipboard::{ClipboardItem, ClipboardPlatform, ClipboardWriter, WriteHooks, WriteOutcome};
use crate::error::{Error, Result};
use crate::marker::MarkerElement;
use crate::options::CopyToDesignOptions;
use crate::payload::{CopyRequest, PayloadDescriptor};
use crate::remote::{HttpRemoteClient, RemoteClient};

/// Collaborators for [`CopyToDesign::with_parts`].
#[derive(Clone)]
pub struct DeliveryParts {
	pub clipboard: Arc<dyn ClipboardPlatform>,
	pub remote: Arc<dyn RemoteClient>,
	pub connector: Arc<dyn ChannelConnector>,
	pub cipher: Arc<dyn Cipher>,
}

/// Entry point: delivers HTML to a design tool.
///
/// Owns the connection pool used by direct deliveries. Call
/// [`shutdown`](Self::shutdown) to close pooled channels eagerly.
#[derive(Clone)]
pub struct CopyToDesign {
	options: CopyToDesignOptions,
	writer: ClipboardWriter,
	remote: Arc<dyn RemoteClient>,
	cipher: Arc<dyn Cipher>,
	pool: ConnectionPool,
}

impl CopyToDesign {
	/// Uses the HTTP remote client, Socket.IO channels and AES-GCM.
	pub fn new(options: CopyToDesignOptions, clipboard: Arc<dyn ClipboardPlatform>) -> Result<Self> {
		let remote = Arc::new(HttpRemoteClient::new(&options)?);
		Ok(Self::with_parts(
			options,
			DeliveryParts {
				clipboard,
				remote,
				connector: Arc::new(SocketIoConnector::new()),
				cipher: Arc::new(AesGcmCipher),
			},
		))
	}

	pub fn with_parts(options: CopyToDesignOptions, parts: DeliveryParts) -> Self {
		let pool = ConnectionPool::new(parts.connector, options.pool.clone());
		Self {
			options,
			writer: ClipboardWriter::new(parts.clipboard),
			remote: parts.remote,
			cipher: parts.cipher,
			pool,
		}
	}

	pub fn options(&self) -> &CopyToDesignOptions {
		&self.options
	}

	pub fn pool(&self) -> &ConnectionPool {
		&self.pool
	}

	/// Places an encrypted marker on the clipboard for the design-tool plugin.
	///
	/// Never opens a realtime channel.
	pub async fn copy_interactive(&self, request: &CopyRequest, hooks: &WriteHooks) -> Result<WriteOutcome> {
		let endpoint = self.options.endpoint_for(request.platform);
		let auth = self.options.authorization.authorization().await?;
		debug!(target = "c2d.delivery", platform = %request.platform, %endpoint, "interactive delivery");

		let descriptor = PayloadDescriptor::interactive(request);
		let marker = self.persist(&endpoint, &auth, request, &descriptor).await?;
		info!(target = "c2d.delivery", copy_id = %marker.copy_id, "copy info saved");

		self.writer.write(ClipboardItem::html(marker.to_html()?), hooks).await
	}

	/// Has the backend convert the payload and writes the converted content
	/// to the clipboard.
	///
	/// The pooled connection is released and the task unsubscribed on every
	/// path, including when the returned future is dropped mid-wait.
	pub async fn copy_direct(&self, request: &CopyRequest, hooks: &WriteHooks) -> Result<WriteOutcome> {
		if !request.platform.supports_direct() {
			return Err(Error::UnsupportedPlatform(request.platform));
		}

		let endpoint = self.options.endpoint_for(request.platform);
		let auth = self.options.authorization.authorization().await?;
		debug!(target = "c2d.delivery", platform = %request.platform, %endpoint, "direct delivery");

		let socket_auth = auth.socket_auth(&self.options.page_url)?;
		let connection = self.pool.acquire(&endpoint, &socket_auth).await.inspect_err(|err| {
			warn!(target = "c2d.delivery", %endpoint, error = %err, "realtime connection failed");
		})?;
		let mut lease = TaskLease::new(self.pool.clone(), connection);

		let result = self.await_generated(&endpoint, &auth, request, &mut lease).await;
		lease.finish().await;

		let content = result?;
		self.writer.write(ClipboardItem::html(content), hooks).await
	}

	/// Closes every pooled channel and drops pending subscriptions.
	pub async fn shutdown(&self) {
		self.pool.teardown_all().await;
	}

	async fn await_generated(&self, endpoint: &str, auth: &AuthorizationPayload, request: &CopyRequest, lease: &mut TaskLease) -> Result<String> {
		let descriptor = PayloadDescriptor::direct(request);
		let marker = self.persist(endpoint, auth, request, &descriptor).await?;

		let task = self
			.remote
			.create_generate_task(
				endpoint,
				auth,
				&CreateGenerateTaskRequest {
					platform: request.platform,
					content: marker.to_html()?,
				},
			)
			.await?;
		debug!(target = "c2d.delivery", task_id = %task.task_id, "generation task created");

		let key = ResourceKey::generate_task(&task.task_id);
		let wait = self.pool.subscriptions().subscribe_to_resource(lease.connection()?, key.clone()).await?;
		lease.track(key);

		let payload = wait.await?;
		let content = payload.content.ok_or_else(|| Error::EmptyResult { task_id: task.task_id.clone() })?;
		info!(target = "c2d.delivery", task_id = %task.task_id, bytes = content.len(), "generation task finished");
		Ok(content)
	}

	/// Encrypts the descriptor, stores its secret and builds the marker.
	async fn persist(&self, endpoint: &str, auth: &AuthorizationPayload, request: &CopyRequest, descriptor: &PayloadDescriptor) -> Result<MarkerElement> {
		let secret = generate_secret();
		let content = self.cipher.encrypt(&descriptor.to_json()?, &secret)?;

		let saved = self
			.remote
			.save_copy_info(
				endpoint,
				auth,
				&SaveCopyInfoRequest {
					secret,
					platform: request.platform,
					import_mode: descriptor.import_mode(),
				},
			)
			.await?;

		Ok(MarkerElement {
			copy_id: saved.copy_id,
			version: self.options.sdk_version.clone(),
			endpoint: endpoint.to_string(),
			content,
			top_layer_name: request.top_layer_name.clone(),
		})
	}
}

impl std::fmt::Debug for CopyToDesign {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CopyToDesign")
			.field("options", &self.options)
			.field("pooled_connections", &self.pool.len())
			.finish_non_exhaustive()
	}
}

/// A pooled connection held for one direct delivery, plus the task
/// subscription made on it.
///
/// [`finish`](Self::finish) unsubscribes and releases. If the lease is
/// dropped unfinished, the table entry is removed, the connection released,
/// and the unsubscribe message sent from a spawned task.
struct TaskLease {
	pool: ConnectionPool,
	connection: Option<PooledConnection>,
	key: Option<ResourceKey>,
}

impl TaskLease {
	fn new(pool: ConnectionPool, connection: PooledConnection) -> Self {
		Self {
			pool,
			connection: Some(connection),
			key: None,
		}
	}

	fn connection(&self) -> Result<&PooledConnection> {
		self.connection.as_ref().ok_or(Error::ChannelClosed)
	}

	fn track(&mut self, key: ResourceKey) {
		self.key = Some(key);
	}

	/// Unsubscribes, then releases. The connection and key stay in the lease
	/// until the unsubscribe completes, so dropping this future mid-emit still
	/// runs the `Drop` cleanup.
	async fn finish(mut self) {
		if let (Some(connection), Some(key)) = (self.connection.as_ref(), self.key.as_ref()) {
			if let Err(err) = self.pool.subscriptions().unsubscribe_from_resource(connection, key).await {
				debug!(target = "c2d.delivery", %key, error = %err, "unsubscribe not sent");
			}
		}
		self.key = None;
		if let Some(connection) = self.connection.take() {
			self.pool.release(connection);
		}
	}
}

impl Drop for TaskLease {
	fn drop(&mut self) {
		let Some(connection) = self.connection.take() else {
			return;
		};
		if let Some(key) = self.key.take() {
			self.pool.subscriptions().cancel(&key);
			match (Handle::try_current(), serde_json::to_value(&key)) {
				(Ok(handle), Ok(request)) => {
					let channel = Arc::clone(connection.channel());
					handle.spawn(async move {
						let _ = channel.emit(RESOURCE_UNSUBSCRIBE_EVENT, request).await;
					});
				}
				_ => debug!(target = "c2d.delivery", %key, "unsubscribe skipped outside a runtime"),
			}
		}
		debug!(target = "c2d.delivery", endpoint = connection.endpoint(), "abandoned direct delivery cleaned up");
		self.pool.release(connection);
	}
}

/// Platforms [`CopyToDesign::copy_direct`] accepts.
pub fn direct_platforms() -> impl Iterator<Item = PlatformType> {
	PlatformType::ALL.into_iter().filter(|platform| platform.supports_direct())
}
