//! Connection pool: one shared realtime channel per endpoint.
//!
//! [`ConnectionPool::acquire`] hands out [`PooledConnection`] handles that
//! share one channel per endpoint. Each acquire bumps the entry's reference
//! count; each [`ConnectionPool::release`] drops it. When the count reaches
//! zero the pool schedules an eviction after the idle grace period, and at
//! that point checks again that the count is still zero and that the grace
//! period really elapsed since the most recent release. A caller that
//! re-acquires inside the window therefore keeps the channel alive.
//!
//! # Inbound events
//!
//! Every pooled channel gets one dispatcher task that forwards inbound events
//! to the pool's [`ResourceSubscriptions`]. The task and its event queue are
//! created before the connector starts the handshake.
//!
//! # Concurrency
//!
//! The connection table is guarded by a `parking_lot` mutex that is never
//! held across an `.await`. Concurrent acquires of an endpoint with no live
//! channel are serialized by a per-endpoint async gate, so only the first one
//! opens a channel and the rest reuse it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::channel::{ChannelConnector, InboundEvent, RealtimeChannel};
use crate::error::{Error, Result};
use crate::subscription::ResourceSubscriptions;

/// Default time a connection stays open after its last release.
pub const DEFAULT_IDLE_GRACE: Duration = Duration::from_secs(30);

/// Tunables for [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
	/// How long an unreferenced connection is kept for reuse.
	pub idle_grace: Duration,
	/// Upper bound on the connect handshake. `None` waits indefinitely.
	pub connect_timeout: Option<Duration>,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			idle_grace: DEFAULT_IDLE_GRACE,
			connect_timeout: None,
		}
	}
}

impl PoolConfig {
	pub fn with_idle_grace(mut self, idle_grace: Duration) -> Self {
		self.idle_grace = idle_grace;
		self
	}

	pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
		self.connect_timeout = Some(timeout);
		self
	}
}

/// Handle to a pooled channel, one per counted reference.
///
/// Not `Clone`: each handle is handed back exactly once through
/// [`ConnectionPool::release`], which consumes it.
pub struct PooledConnection {
	id: u64,
	endpoint: Arc<str>,
	channel: Arc<dyn RealtimeChannel>,
}

impl PooledConnection {
	/// Pool-assigned id; differs between successive channels to one endpoint.
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	pub fn channel(&self) -> &Arc<dyn RealtimeChannel> {
		&self.channel
	}
}

impl fmt::Debug for PooledConnection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PooledConnection")
			.field("id", &self.id)
			.field("endpoint", &self.endpoint)
			.field("connected", &self.channel.is_connected())
			.finish()
	}
}

struct ConnectionEntry {
	id: u64,
	endpoint: Arc<str>,
	channel: Arc<dyn RealtimeChannel>,
	ref_count: usize,
	last_released: Option<Instant>,
	dispatcher: JoinHandle<()>,
}

impl ConnectionEntry {
	fn handle(&self) -> PooledConnection {
		PooledConnection {
			id: self.id,
			endpoint: Arc::clone(&self.endpoint),
			channel: Arc::clone(&self.channel),
		}
	}
}

struct PoolInner {
	connector: Arc<dyn ChannelConnector>,
	config: PoolConfig,
	subscriptions: ResourceSubscriptions,
	connections: Mutex<HashMap<String, ConnectionEntry>>,
	gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
	next_id: AtomicU64,
}

impl Drop for PoolInner {
	fn drop(&mut self) {
		for entry in self.connections.get_mut().values() {
			entry.dispatcher.abort();
		}
	}
}

/// Reference-counted pool of realtime channels keyed by endpoint.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct ConnectionPool {
	inner: Arc<PoolInner>,
}

impl ConnectionPool {
	/// Creates an empty pool that opens channels through `connector`.
	pub fn new(connector: Arc<dyn ChannelConnector>, config: PoolConfig) -> Self {
		Self {
			inner: Arc::new(PoolInner {
				connector,
				config,
				subscriptions: ResourceSubscriptions::new(),
				connections: Mutex::new(HashMap::new()),
				gates: Mutex::new(HashMap::new()),
				next_id: AtomicU64::new(1),
			}),
		}
	}

	/// Subscription table fed by every channel in this pool.
	pub fn subscriptions(&self) -> &ResourceSubscriptions {
		&self.inner.subscriptions
	}

	pub fn config(&self) -> &PoolConfig {
		&self.inner.config
	}

	/// Returns the live channel for `endpoint`, opening one if needed.
	///
	/// A connect failure is returned as-is; the pool does not retry.
	pub async fn acquire(&self, endpoint: &str, auth: &Value) -> Result<PooledConnection> {
		if let Some(connection) = self.try_reuse(endpoint) {
			return Ok(connection);
		}

		let gate = self.gate(endpoint);
		let _guard = gate.lock().await;

		// Another caller may have connected while we waited on the gate.
		if let Some(connection) = self.try_reuse(endpoint) {
			return Ok(connection);
		}

		self.discard_stale(endpoint).await;
		self.open(endpoint, auth).await
	}

	/// Drops the reference held by `connection`.
	///
	/// When the count reaches zero an eviction is scheduled after the idle
	/// grace period. Handles from a connection that has since been replaced
	/// are ignored. The count never goes below zero.
	pub fn release(&self, connection: PooledConnection) {
		let remaining = {
			let mut connections = self.inner.connections.lock();
			let Some(entry) = connections.get_mut(connection.endpoint()) else {
				debug!(target = "c2d.pool", endpoint = connection.endpoint(), "release of unknown connection ignored");
				return;
			};
			if entry.id != connection.id() {
				debug!(target = "c2d.pool", endpoint = connection.endpoint(), id = connection.id(), "release of replaced connection ignored");
				return;
			}
			entry.ref_count = entry.ref_count.saturating_sub(1);
			entry.last_released = Some(Instant::now());
			entry.ref_count
		};

		debug!(target = "c2d.pool", endpoint = connection.endpoint(), ref_count = remaining, "connection released");
		if remaining == 0 {
			self.schedule_eviction(connection.endpoint().to_string(), connection.id());
		}
	}

	/// Closes every channel and drops every pending subscription, regardless
	/// of reference counts.
	pub async fn teardown_all(&self) {
		let entries: Vec<ConnectionEntry> = self.inner.connections.lock().drain().map(|(_, entry)| entry).collect();
		let dropped = self.inner.subscriptions.clear();
		// Gates held by an in-flight acquire stay.
		self.inner.gates.lock().retain(|_, gate| Arc::strong_count(gate) > 1);

		for entry in &entries {
			entry.dispatcher.abort();
			entry.channel.close().await;
		}
		debug!(target = "c2d.pool", connections = entries.len(), subscriptions = dropped, "pool torn down");
	}

	/// Current reference count for `endpoint`, if pooled.
	pub fn ref_count(&self, endpoint: &str) -> Option<usize> {
		self.inner.connections.lock().get(endpoint).map(|entry| entry.ref_count)
	}

	pub fn is_pooled(&self, endpoint: &str) -> bool {
		self.inner.connections.lock().contains_key(endpoint)
	}

	pub fn len(&self) -> usize {
		self.inner.connections.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn try_reuse(&self, endpoint: &str) -> Option<PooledConnection> {
		let mut connections = self.inner.connections.lock();
		let entry = connections.get_mut(endpoint)?;
		if !entry.channel.is_connected() {
			return None;
		}
		entry.ref_count += 1;
		debug!(target = "c2d.pool", endpoint, ref_count = entry.ref_count, "reusing connection");
		Some(entry.handle())
	}

	fn gate(&self, endpoint: &str) -> Arc<tokio::sync::Mutex<()>> {
		let mut gates = self.inner.gates.lock();
		Arc::clone(gates.entry(endpoint.to_string()).or_default())
	}

	/// Removes an entry whose channel is no longer connected.
	async fn discard_stale(&self, endpoint: &str) {
		let stale = self.inner.connections.lock().remove(endpoint);
		if let Some(entry) = stale {
			let dropped = self.inner.subscriptions.drop_connection(entry.id);
			entry.dispatcher.abort();
			entry.channel.close().await;
			debug!(target = "c2d.pool", endpoint, id = entry.id, subscriptions = dropped, "discarded disconnected channel");
		}
	}

	async fn open(&self, endpoint: &str, auth: &Value) -> Result<PooledConnection> {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let dispatcher = tokio::spawn(dispatch_inbound(self.inner.subscriptions.clone(), inbound_rx, endpoint.to_string()));

		let connecting = self.inner.connector.connect(endpoint, auth, inbound_tx);
		let connected = match self.inner.config.connect_timeout {
			Some(timeout) => match tokio::time::timeout(timeout, connecting).await {
				Ok(result) => result,
				Err(_) => Err(Error::ConnectTimeout {
					endpoint: endpoint.to_string(),
					timeout,
				}),
			},
			None => connecting.await,
		};

		let channel = match connected {
			Ok(channel) => channel,
			Err(err) => {
				dispatcher.abort();
				warn!(target = "c2d.pool", endpoint, error = %err, "connect failed");
				return Err(err);
			}
		};

		let entry = ConnectionEntry {
			id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
			endpoint: Arc::from(endpoint),
			channel,
			ref_count: 1,
			last_released: None,
			dispatcher,
		};
		let handle = entry.handle();
		self.inner.connections.lock().insert(endpoint.to_string(), entry);
		debug!(target = "c2d.pool", endpoint, id = handle.id(), "connection opened");
		Ok(handle)
	}

	fn schedule_eviction(&self, endpoint: String, id: u64) {
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			warn!(target = "c2d.pool", %endpoint, "no runtime to schedule idle eviction; connection stays open until teardown");
			return;
		};

		let pool = Arc::downgrade(&self.inner);
		let grace = self.inner.config.idle_grace;
		runtime.spawn(async move {
			tokio::time::sleep(grace).await;
			evict_if_idle(pool, &endpoint, id).await;
		});
	}
}

impl fmt::Debug for ConnectionPool {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionPool")
			.field("connections", &self.len())
			.field("subscriptions", &self.inner.subscriptions.len())
			.field("config", &self.inner.config)
			.finish()
	}
}

async fn evict_if_idle(pool: Weak<PoolInner>, endpoint: &str, id: u64) {
	let Some(inner) = pool.upgrade() else {
		return;
	};

	let evicted = {
		let mut connections = inner.connections.lock();
		let idle = connections.get(endpoint).is_some_and(|entry| {
			entry.id == id && entry.ref_count == 0 && entry.last_released.is_none_or(|at| at.elapsed() >= inner.config.idle_grace)
		});
		if idle { connections.remove(endpoint) } else { None }
	};
	if evicted.is_some() {
		prune_gate(&mut inner.gates.lock(), endpoint);
	}

	let Some(entry) = evicted else {
		debug!(target = "c2d.pool", endpoint, "connection back in use; eviction skipped");
		return;
	};

	let dropped = inner.subscriptions.drop_connection(entry.id);
	entry.dispatcher.abort();
	entry.channel.close().await;
	debug!(target = "c2d.pool", endpoint, id, subscriptions = dropped, "idle connection evicted");
}

fn prune_gate(gates: &mut HashMap<String, Arc<tokio::sync::Mutex<()>>>, endpoint: &str) {
	if gates.get(endpoint).is_some_and(|gate| Arc::strong_count(gate) == 1) {
		gates.remove(endpoint);
	}
}

async fn dispatch_inbound(subscriptions: ResourceSubscriptions, mut inbound: mpsc::UnboundedReceiver<InboundEvent>, endpoint: String) {
	while let Some(event) = inbound.recv().await {
		subscriptions.dispatch_inbound(event);
	}
	debug!(target = "c2d.pool", %endpoint, "inbound stream ended");
}
