//! In-memory channel connector for tests.
//!
//! Provides a [`ChannelConnector`] that never touches the network, plus a
//! [`FakeController`] for injecting inbound events and inspecting what was
//! opened, emitted and closed.
//!
//! # Example
//!
//! ```ignore
//! let (connector, controller) = FakeConnector::new();
//! let pool = ConnectionPool::new(Arc::new(connector), PoolConfig::default());
//!
//! let connection = pool.acquire("https://api.test", &json!({})).await?;
//! let wait = pool.subscriptions().subscribe_to_resource(&connection, key.clone()).await?;
//! controller.settle("https://api.test", key, ResourcePayload::succeeded("<div/>"));
//! let payload = wait.await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use c2d_protocol::{RESOURCE_SUBSCRIBE_EVENT, ResourceEvent, ResourceKey, ResourcePayload};
use parking_lot::Mutex;
use serde_json::Value;

use crate::channel::{ChannelConnector, InboundEvent, InboundSender, RealtimeChannel};
use crate::error::{Error, Result};

type Responder = Box<dyn Fn(&ResourceKey) -> Option<ResourcePayload> + Send + Sync>;

/// Event emitted by client code on a fake channel.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
	pub endpoint: String,
	pub name: String,
	pub data: Value,
}

#[derive(Default)]
struct FakeState {
	attempts: AtomicUsize,
	opens: AtomicUsize,
	closes: AtomicUsize,
	emitted: Mutex<Vec<EmittedEvent>>,
	channels: Mutex<HashMap<String, Arc<FakeChannel>>>,
	responder: Mutex<Option<Responder>>,
	fail_next: Mutex<Option<String>>,
	connect_delay: Mutex<Option<Duration>>,
	last_auth: Mutex<Option<Value>>,
	emit_holds: Mutex<HashMap<String, Duration>>,
}

/// Connector that hands out in-memory channels.
pub struct FakeConnector {
	state: Arc<FakeState>,
}

impl FakeConnector {
	/// Creates a connector and the controller that drives it.
	pub fn new() -> (Self, FakeController) {
		let state = Arc::new(FakeState::default());
		(Self { state: Arc::clone(&state) }, FakeController { state })
	}
}

#[async_trait]
impl ChannelConnector for FakeConnector {
	async fn connect(&self, endpoint: &str, auth: &Value, inbound: InboundSender) -> Result<Arc<dyn RealtimeChannel>> {
		self.state.attempts.fetch_add(1, Ordering::SeqCst);
		*self.state.last_auth.lock() = Some(auth.clone());

		let delay = *self.state.connect_delay.lock();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}

		let failure = self.state.fail_next.lock().take();
		if let Some(message) = failure {
			return Err(Error::Connect {
				endpoint: endpoint.to_string(),
				message,
			});
		}

		let channel = Arc::new(FakeChannel {
			endpoint: endpoint.to_string(),
			connected: AtomicBool::new(true),
			inbound,
			state: Arc::clone(&self.state),
		});
		self.state.opens.fetch_add(1, Ordering::SeqCst);
		self.state.channels.lock().insert(endpoint.to_string(), Arc::clone(&channel));
		Ok(channel)
	}
}

/// Controller for injecting events and inspecting fake channels.
pub struct FakeController {
	state: Arc<FakeState>,
}

impl FakeController {
	/// Number of connect calls so far, failed ones included.
	pub fn connect_attempts(&self) -> usize {
		self.state.attempts.load(Ordering::SeqCst)
	}

	/// Number of channels opened so far.
	pub fn open_count(&self) -> usize {
		self.state.opens.load(Ordering::SeqCst)
	}

	/// Number of channels closed so far.
	pub fn close_count(&self) -> usize {
		self.state.closes.load(Ordering::SeqCst)
	}

	/// Auth payload passed to the most recent connect.
	pub fn last_auth(&self) -> Option<Value> {
		self.state.last_auth.lock().clone()
	}

	/// Makes the next connect fail with `message`.
	pub fn fail_next_connect(&self, message: &str) {
		*self.state.fail_next.lock() = Some(message.to_string());
	}

	/// Delays every connect handshake by `delay`.
	pub fn set_connect_delay(&self, delay: Duration) {
		*self.state.connect_delay.lock() = Some(delay);
	}

	/// Makes every emit of `event` pend for `hold` after it is recorded.
	pub fn hold_emits(&self, event: &str, hold: Duration) {
		self.state.emit_holds.lock().insert(event.to_string(), hold);
	}

	/// Answers every `resource:subscribe` request synchronously, from inside
	/// the emit call, whenever `responder` returns a payload.
	pub fn respond_to_subscribe(&self, responder: impl Fn(&ResourceKey) -> Option<ResourcePayload> + Send + Sync + 'static) {
		*self.state.responder.lock() = Some(Box::new(responder));
	}

	/// Pushes a raw inbound event into the channel for `endpoint`.
	pub fn inject(&self, endpoint: &str, name: &str, data: Value) -> bool {
		let channel = self.state.channels.lock().get(endpoint).cloned();
		match channel {
			Some(channel) => channel.inbound.send(InboundEvent::new(name, data)).is_ok(),
			None => false,
		}
	}

	/// Sends a settlement notification for `key`.
	pub fn settle(&self, endpoint: &str, key: ResourceKey, payload: ResourcePayload) -> bool {
		let event = ResourceEvent {
			resource_type: key.resource_type,
			resource_id: key.resource_id,
			payload: Some(payload),
		};
		match serde_json::to_value(event) {
			Ok(data) => self.inject(endpoint, RESOURCE_SUBSCRIBE_EVENT, data),
			Err(_) => false,
		}
	}

	/// Simulates the server dropping the channel for `endpoint`.
	pub fn disconnect(&self, endpoint: &str) {
		if let Some(channel) = self.state.channels.lock().get(endpoint) {
			channel.connected.store(false, Ordering::SeqCst);
		}
	}

	/// All events emitted so far.
	pub fn emitted(&self) -> Vec<EmittedEvent> {
		self.state.emitted.lock().clone()
	}

	/// Emitted events with the given name.
	pub fn emitted_named(&self, name: &str) -> Vec<EmittedEvent> {
		self.state.emitted.lock().iter().filter(|event| event.name == name).cloned().collect()
	}

	/// Takes all emitted events, clearing the buffer.
	pub fn take_emitted(&self) -> Vec<EmittedEvent> {
		std::mem::take(&mut *self.state.emitted.lock())
	}
}

struct FakeChannel {
	endpoint: String,
	connected: AtomicBool,
	inbound: InboundSender,
	state: Arc<FakeState>,
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
	async fn emit(&self, event: &str, data: Value) -> Result<()> {
		if !self.connected.load(Ordering::SeqCst) {
			return Err(Error::ChannelClosed);
		}

		self.state.emitted.lock().push(EmittedEvent {
			endpoint: self.endpoint.clone(),
			name: event.to_string(),
			data: data.clone(),
		});

		if event == RESOURCE_SUBSCRIBE_EVENT {
			let key: ResourceKey = serde_json::from_value(data)?;
			let reply = self.state.responder.lock().as_ref().and_then(|responder| responder(&key));
			if let Some(payload) = reply {
				let event = ResourceEvent {
					resource_type: key.resource_type,
					resource_id: key.resource_id,
					payload: Some(payload),
				};
				let _ = self.inbound.send(InboundEvent::new(RESOURCE_SUBSCRIBE_EVENT, serde_json::to_value(event)?));
			}
		}

		let hold = self.state.emit_holds.lock().get(event).copied();
		if let Some(hold) = hold {
			tokio::time::sleep(hold).await;
		}
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	async fn close(&self) {
		if self.connected.swap(false, Ordering::SeqCst) {
			self.state.closes.fetch_add(1, Ordering::SeqCst);
		}
	}
}
