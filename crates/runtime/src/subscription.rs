//! Resource subscription correlation layer.
//!
//! Callers subscribe to a `(resourceType, resourceId)` key on a pooled
//! connection and await exactly one settlement notification for it. The
//! shared inbound handler of every pooled connection feeds
//! [`ResourceSubscriptions::dispatch`], which looks the key up in the
//! correlation table and completes the matching waiter.
//!
//! # Message Flow
//!
//! 1. `subscribe_to_resource` inserts a oneshot sender under the key
//! 2. Only then is `resource:subscribe` emitted on the channel
//! 3. The server answers with `resource:subscribe` carrying a `payload`
//! 4. Dispatch removes the entry and completes the oneshot
//! 5. `unsubscribe_from_resource` emits `resource:unsubscribe` and removes any
//!    entry that is still there
//!
//! Registering before emitting is what keeps a fast server reply from
//! arriving before anyone is listening for it.
//!
//! # Duplicate keys
//!
//! Subscribing to a key that is still pending fails with
//! [`Error::DuplicateSubscription`]; the existing waiter is left untouched and
//! nothing is sent.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use c2d_protocol::{RESOURCE_SUBSCRIBE_EVENT, RESOURCE_UNSUBSCRIBE_EVENT, ResourceEvent, ResourceKey, ResourcePayload};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::channel::InboundEvent;
use crate::error::{Error, Result};
use crate::pool::PooledConnection;

struct PendingSubscription {
	/// Pool id of the connection the subscribe request went out on.
	connection_id: u64,
	waiter: oneshot::Sender<Result<ResourcePayload>>,
}

/// Correlation table of pending resource subscriptions.
///
/// Cheap to clone; clones share the same table. The table lock is never held
/// across an `.await`.
#[derive(Clone, Default)]
pub struct ResourceSubscriptions {
	pending: Arc<Mutex<HashMap<ResourceKey, PendingSubscription>>>,
}

impl ResourceSubscriptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Subscribes to `key` on `connection`.
	///
	/// The returned [`ResourceWait`] resolves with the settlement payload, or
	/// fails with [`Error::SubscriptionFailed`] when the server reports
	/// `success: false`, or [`Error::ChannelClosed`] when the connection is
	/// torn down first.
	pub async fn subscribe_to_resource(&self, connection: &PooledConnection, key: ResourceKey) -> Result<ResourceWait> {
		let (tx, rx) = oneshot::channel();

		{
			let mut pending = self.pending.lock();
			if pending.contains_key(&key) {
				return Err(Error::DuplicateSubscription(key));
			}
			pending.insert(
				key.clone(),
				PendingSubscription {
					connection_id: connection.id(),
					waiter: tx,
				},
			);
		}

		let request = serde_json::to_value(&key)?;
		if let Err(err) = connection.channel().emit(RESOURCE_SUBSCRIBE_EVENT, request).await {
			self.cancel(&key);
			return Err(err);
		}

		debug!(target = "c2d.subscription", %key, endpoint = connection.endpoint(), "subscribed");
		Ok(ResourceWait { key, rx })
	}

	/// Unsubscribes from `key` and drops its table entry whether or not a
	/// result ever arrived. Calling it again for the same key only re-sends
	/// the unsubscribe message.
	pub async fn unsubscribe_from_resource(&self, connection: &PooledConnection, key: &ResourceKey) -> Result<()> {
		let request = serde_json::to_value(key)?;
		let sent = connection.channel().emit(RESOURCE_UNSUBSCRIBE_EVENT, request).await;
		let removed = self.cancel(key);
		debug!(target = "c2d.subscription", %key, removed, "unsubscribed");
		sent
	}

	/// Removes the table entry for `key` without touching the channel.
	///
	/// Returns `true` if an entry was pending.
	pub fn cancel(&self, key: &ResourceKey) -> bool {
		self.pending.lock().remove(key).is_some()
	}

	/// Routes a settlement notification to its waiter.
	///
	/// Returns `true` when a pending subscription consumed the event.
	/// Notifications for unknown keys and notifications without a payload are
	/// dropped.
	pub fn dispatch(&self, event: ResourceEvent) -> bool {
		let key = event.key();
		let Some(payload) = event.payload else {
			trace!(target = "c2d.subscription", %key, "notification without payload ignored");
			return false;
		};

		let Some(subscription) = self.pending.lock().remove(&key) else {
			trace!(target = "c2d.subscription", %key, "no subscriber; notification dropped");
			return false;
		};

		let result = if payload.success { Ok(payload) } else { Err(Error::SubscriptionFailed(key.clone())) };
		debug!(target = "c2d.subscription", %key, success = result.is_ok(), "resource settled");
		// The waiter may have been dropped by a cancelled caller.
		let _ = subscription.waiter.send(result);
		true
	}

	/// Entry point for the shared inbound handler of a pooled connection.
	pub(crate) fn dispatch_inbound(&self, event: InboundEvent) {
		if event.name != RESOURCE_SUBSCRIBE_EVENT {
			trace!(target = "c2d.subscription", event = %event.name, "ignoring inbound event");
			return;
		}
		match serde_json::from_value::<ResourceEvent>(event.data) {
			Ok(resource) => {
				self.dispatch(resource);
			}
			Err(err) => warn!(target = "c2d.subscription", error = %err, "malformed resource notification"),
		}
	}

	/// Drops every subscription that was made on connection `connection_id`.
	/// Their waiters observe [`Error::ChannelClosed`].
	pub(crate) fn drop_connection(&self, connection_id: u64) -> usize {
		let mut pending = self.pending.lock();
		let before = pending.len();
		pending.retain(|_, subscription| subscription.connection_id != connection_id);
		before - pending.len()
	}

	/// Drops every pending subscription.
	pub fn clear(&self) -> usize {
		let mut pending = self.pending.lock();
		let count = pending.len();
		pending.clear();
		count
	}

	pub fn is_pending(&self, key: &ResourceKey) -> bool {
		self.pending.lock().contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.pending.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl std::fmt::Debug for ResourceSubscriptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResourceSubscriptions").field("pending", &self.len()).finish()
	}
}

/// Pending result of one resource subscription.
#[derive(Debug)]
pub struct ResourceWait {
	key: ResourceKey,
	rx: oneshot::Receiver<Result<ResourcePayload>>,
}

impl ResourceWait {
	pub fn key(&self) -> &ResourceKey {
		&self.key
	}
}

impl Future for ResourceWait {
	type Output = Result<ResourcePayload>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx).poll(cx).map(|received| received.map_err(|_| Error::ChannelClosed).and_then(|result| result))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fake::FakeConnector;
	use crate::pool::{ConnectionPool, PoolConfig};
	use serde_json::json;

	async fn pooled() -> (ConnectionPool, crate::fake::FakeController, PooledConnection) {
		let (connector, controller) = FakeConnector::new();
		let pool = ConnectionPool::new(Arc::new(connector), PoolConfig::default());
		let connection = pool.acquire("https://api.test", &json!({})).await.unwrap();
		(pool, controller, connection)
	}

	#[tokio::test]
	async fn test_notification_resolves_matching_key_only() {
		let (pool, controller, connection) = pooled().await;
		let subscriptions = pool.subscriptions().clone();

		let first = subscriptions.subscribe_to_resource(&connection, ResourceKey::generate_task("a")).await.unwrap();
		let second = subscriptions.subscribe_to_resource(&connection, ResourceKey::generate_task("b")).await.unwrap();

		controller.settle("https://api.test", ResourceKey::generate_task("b"), ResourcePayload::succeeded("<b/>"));

		let payload = second.await.unwrap();
		assert_eq!(payload.content.as_deref(), Some("<b/>"));
		assert!(subscriptions.is_pending(&ResourceKey::generate_task("a")));

		controller.settle("https://api.test", ResourceKey::generate_task("a"), ResourcePayload::succeeded("<a/>"));
		assert_eq!(first.await.unwrap().content.as_deref(), Some("<a/>"));
		assert!(subscriptions.is_empty());
	}

	#[tokio::test]
	async fn test_same_tick_reply_is_not_dropped() {
		let (pool, controller, connection) = pooled().await;
		controller.respond_to_subscribe(|key| Some(ResourcePayload::succeeded(format!("done:{}", key.resource_id))));

		let wait = pool
			.subscriptions()
			.subscribe_to_resource(&connection, ResourceKey::generate_task("fast"))
			.await
			.unwrap();

		assert_eq!(wait.await.unwrap().content.as_deref(), Some("done:fast"));
	}

	#[tokio::test]
	async fn test_failure_payload_rejects() {
		let (pool, controller, connection) = pooled().await;
		let key = ResourceKey::generate_task("bad");
		let wait = pool.subscriptions().subscribe_to_resource(&connection, key.clone()).await.unwrap();

		controller.settle("https://api.test", key.clone(), ResourcePayload::failed());

		match wait.await {
			Err(Error::SubscriptionFailed(failed)) => assert_eq!(failed, key),
			other => panic!("expected SubscriptionFailed, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_duplicate_pending_key_is_rejected() {
		let (pool, controller, connection) = pooled().await;
		let key = ResourceKey::generate_task("dup");
		let _wait = pool.subscriptions().subscribe_to_resource(&connection, key.clone()).await.unwrap();

		let second = pool.subscriptions().subscribe_to_resource(&connection, key.clone()).await;
		assert!(matches!(second, Err(Error::DuplicateSubscription(_))));
		assert_eq!(controller.emitted_named(RESOURCE_SUBSCRIBE_EVENT).len(), 1);
		assert!(pool.subscriptions().is_pending(&key));
	}

	#[tokio::test]
	async fn test_unsubscribe_is_idempotent_and_cleans_up() {
		let (pool, controller, connection) = pooled().await;
		let key = ResourceKey::generate_task("gone");
		let subscriptions = pool.subscriptions().clone();
		let wait = subscriptions.subscribe_to_resource(&connection, key.clone()).await.unwrap();

		subscriptions.unsubscribe_from_resource(&connection, &key).await.unwrap();
		subscriptions.unsubscribe_from_resource(&connection, &key).await.unwrap();

		assert!(!subscriptions.is_pending(&key));
		assert!(matches!(wait.await, Err(Error::ChannelClosed)));

		let sent = controller.emitted_named(RESOURCE_UNSUBSCRIBE_EVENT);
		assert_eq!(sent.len(), 2);
		assert_eq!(sent[0].data, json!({"resourceType": "copy-to-design:generate-task", "resourceId": "gone"}));

		// A late notification for the cleaned-up key is dropped.
		assert!(!subscriptions.dispatch(ResourceEvent {
			resource_type: key.resource_type.clone(),
			resource_id: key.resource_id.clone(),
			payload: Some(ResourcePayload::succeeded("late")),
		}));
	}

	#[tokio::test]
	async fn test_notification_without_payload_keeps_waiting() {
		let subscriptions = ResourceSubscriptions::new();
		let (pool, _controller, connection) = pooled().await;
		drop(pool);
		let key = ResourceKey::generate_task("p");
		let _wait = subscriptions.subscribe_to_resource(&connection, key.clone()).await.unwrap();

		let consumed = subscriptions.dispatch(ResourceEvent {
			resource_type: key.resource_type.clone(),
			resource_id: key.resource_id.clone(),
			payload: None,
		});
		assert!(!consumed);
		assert!(subscriptions.is_pending(&key));
	}

	#[tokio::test]
	async fn test_emit_failure_unregisters() {
		let (pool, controller, connection) = pooled().await;
		controller.disconnect("https://api.test");
		let key = ResourceKey::generate_task("offline");

		let result = pool.subscriptions().subscribe_to_resource(&connection, key.clone()).await;
		assert!(matches!(result, Err(Error::ChannelClosed)));
		assert!(!pool.subscriptions().is_pending(&key));
	}

	#[test]
	fn test_dispatch_inbound_ignores_other_events() {
		let subscriptions = ResourceSubscriptions::new();
		subscriptions.dispatch_inbound(InboundEvent::new("presence", json!({"online": 3})));
		subscriptions.dispatch_inbound(InboundEvent::new(RESOURCE_SUBSCRIBE_EVENT, json!("not an object")));
		assert!(subscriptions.is_empty());
	}
}
