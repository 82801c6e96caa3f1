//! Socket.IO realtime channel over a WebSocket.
//!
//! The handshake follows Engine.IO v4:
//!
//! 1. Open a WebSocket to `{endpoint}/socket.io/?EIO=4&transport=websocket`
//! 2. Read the server's `open` packet
//! 3. Send a Socket.IO CONNECT carrying the auth payload
//! 4. Wait for the CONNECT ack, or fail on CONNECT_ERROR
//!
//! After the handshake a reader task answers heartbeats and forwards events
//! on the default namespace to the inbound sender, and a writer task drains
//! the outgoing queue into the socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use c2d_protocol::{EnginePacket, SocketKind, SocketPacket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace, warn};
use url::Url;

use crate::channel::{ChannelConnector, InboundEvent, InboundSender, RealtimeChannel};
use crate::error::{Error, Result};

/// Default Socket.IO mount path.
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

/// Opens Socket.IO channels with `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
	path: String,
}

impl Default for SocketIoConnector {
	fn default() -> Self {
		Self {
			path: DEFAULT_SOCKET_PATH.to_string(),
		}
	}
}

impl SocketIoConnector {
	pub fn new() -> Self {
		Self::default()
	}

	/// Uses a custom mount path instead of `/socket.io/`.
	pub fn with_path(path: impl Into<String>) -> Self {
		Self { path: path.into() }
	}
}

/// Builds the WebSocket URL for an HTTP(S) endpoint.
pub fn socket_url(endpoint: &str, path: &str) -> Result<Url> {
	let invalid = |reason: &str| Error::InvalidEndpoint {
		endpoint: endpoint.to_string(),
		reason: reason.to_string(),
	};

	let mut url = Url::parse(endpoint).map_err(|err| invalid(&err.to_string()))?;
	let scheme = match url.scheme() {
		"http" | "ws" => "ws",
		"https" | "wss" => "wss",
		_ => return Err(invalid("scheme must be http, https, ws or wss")),
	};
	url.set_scheme(scheme).map_err(|_| invalid("cannot switch to a websocket scheme"))?;
	url.set_path(path);
	url.set_query(Some("EIO=4&transport=websocket"));
	url.set_fragment(None);
	Ok(url)
}

#[async_trait]
impl ChannelConnector for SocketIoConnector {
	async fn connect(&self, endpoint: &str, auth: &Value, inbound: InboundSender) -> Result<Arc<dyn RealtimeChannel>> {
		let url = socket_url(endpoint, &self.path)?;
		debug!(target = "c2d.socket", %url, "opening websocket");

		let (ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await.map_err(|err| Error::connect(endpoint, err))?;
		let (mut sink, mut stream) = ws.split();

		let handshake = match next_packet(&mut stream).await? {
			EnginePacket::Open(handshake) => handshake,
			other => return Err(Error::connect(endpoint, format!("expected open packet, got {other:?}"))),
		};
		trace!(target = "c2d.socket", sid = %handshake.sid, ping_interval = handshake.ping_interval, "engine.io open");

		send_packet(&mut sink, &EnginePacket::Message(SocketPacket::new(SocketKind::Connect(Some(auth.clone()))))).await?;
		await_connect_ack(endpoint, &mut sink, &mut stream).await?;

		let connected = Arc::new(AtomicBool::new(true));
		let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

		let writer = tokio::spawn(write_loop(sink, outgoing_rx));
		let reader = tokio::spawn(read_loop(stream, outgoing_tx.clone(), inbound, Arc::clone(&connected), endpoint.to_string()));

		debug!(target = "c2d.socket", endpoint, "socket connected");
		Ok(Arc::new(SocketIoChannel {
			endpoint: endpoint.to_string(),
			outgoing: outgoing_tx,
			connected,
			tasks: Mutex::new(Some((reader, writer))),
		}))
	}
}

struct SocketIoChannel {
	endpoint: String,
	outgoing: mpsc::UnboundedSender<Message>,
	connected: Arc<AtomicBool>,
	tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

#[async_trait]
impl RealtimeChannel for SocketIoChannel {
	async fn emit(&self, event: &str, data: Value) -> Result<()> {
		if !self.is_connected() {
			return Err(Error::ChannelClosed);
		}
		let frame = EnginePacket::Message(SocketPacket::event(event, data)).encode();
		trace!(target = "c2d.socket", endpoint = %self.endpoint, %frame, "emit");
		self.outgoing.send(Message::Text(frame.into())).map_err(|_| Error::ChannelClosed)
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	async fn close(&self) {
		let was_connected = self.connected.swap(false, Ordering::SeqCst);
		if was_connected {
			let disconnect = EnginePacket::Message(SocketPacket::new(SocketKind::Disconnect)).encode();
			let _ = self.outgoing.send(Message::Text(disconnect.into()));
		}
		let _ = self.outgoing.send(Message::Close(None));

		let tasks = self.tasks.lock().take();
		if let Some((reader, writer)) = tasks {
			reader.abort();
			// The writer exits after flushing the close frame.
			if writer.await.is_err() {
				trace!(target = "c2d.socket", endpoint = %self.endpoint, "writer task aborted");
			}
		}
		debug!(target = "c2d.socket", endpoint = %self.endpoint, "socket closed");
	}
}

impl Drop for SocketIoChannel {
	fn drop(&mut self) {
		if let Some((reader, writer)) = self.tasks.get_mut().take() {
			reader.abort();
			writer.abort();
		}
	}
}

async fn await_connect_ack<S, R>(endpoint: &str, sink: &mut S, stream: &mut R) -> Result<()>
where
	S: Sink<Message, Error = WsError> + Unpin,
	R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
	loop {
		match next_packet(stream).await? {
			EnginePacket::Ping => send_packet(sink, &EnginePacket::Pong).await?,
			EnginePacket::Message(packet) if packet.is_default_namespace() => match packet.kind {
				SocketKind::Connect(_) => return Ok(()),
				SocketKind::ConnectError(data) => return Err(Error::connect(endpoint, connect_error_message(&data))),
				other => trace!(target = "c2d.socket", ?other, "ignoring packet before connect ack"),
			},
			EnginePacket::Close => return Err(Error::connect(endpoint, "server closed the connection during handshake")),
			_ => {}
		}
	}
}

fn connect_error_message(data: &Value) -> String {
	data.get("message")
		.and_then(Value::as_str)
		.map(str::to_string)
		.unwrap_or_else(|| data.to_string())
}

async fn next_packet<R>(stream: &mut R) -> Result<EnginePacket>
where
	R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
	loop {
		match stream.next().await {
			Some(Ok(Message::Text(text))) => return Ok(EnginePacket::decode(text.as_str())?),
			Some(Ok(Message::Close(_))) | None => return Err(Error::ChannelClosed),
			Some(Ok(_)) => continue,
			Some(Err(err)) => return Err(err.into()),
		}
	}
}

async fn send_packet<S>(sink: &mut S, packet: &EnginePacket) -> Result<()>
where
	S: Sink<Message, Error = WsError> + Unpin,
{
	sink.send(Message::Text(packet.encode().into())).await?;
	Ok(())
}

async fn write_loop<S>(mut sink: S, mut outgoing: mpsc::UnboundedReceiver<Message>)
where
	S: Sink<Message, Error = WsError> + Unpin,
{
	while let Some(message) = outgoing.recv().await {
		let closing = matches!(message, Message::Close(_));
		if let Err(err) = sink.send(message).await {
			trace!(target = "c2d.socket", error = %err, "write failed");
			break;
		}
		if closing {
			break;
		}
	}
	let _ = sink.close().await;
}

async fn read_loop<R>(mut stream: R, outgoing: mpsc::UnboundedSender<Message>, inbound: InboundSender, connected: Arc<AtomicBool>, endpoint: String)
where
	R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
	loop {
		let packet = match next_packet(&mut stream).await {
			Ok(packet) => packet,
			Err(Error::Packet(err)) => {
				warn!(target = "c2d.socket", %endpoint, error = %err, "undecodable frame");
				continue;
			}
			Err(err) => {
				debug!(target = "c2d.socket", %endpoint, error = %err, "socket stream ended");
				break;
			}
		};

		match packet {
			EnginePacket::Ping => {
				let _ = outgoing.send(Message::Text(EnginePacket::Pong.encode().into()));
			}
			EnginePacket::Close => break,
			EnginePacket::Message(packet) if packet.is_default_namespace() => match packet.kind {
				SocketKind::Event { name, mut args, .. } => {
					let data = if args.is_empty() { Value::Null } else { args.swap_remove(0) };
					if inbound.send(InboundEvent::new(name, data)).is_err() {
						break;
					}
				}
				SocketKind::Disconnect => {
					debug!(target = "c2d.socket", %endpoint, "server disconnected the socket");
					break;
				}
				other => trace!(target = "c2d.socket", ?other, "ignoring packet"),
			},
			_ => {}
		}
	}
	connected.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_socket_url_from_https() {
		let url = socket_url("https://api.demoway.com", DEFAULT_SOCKET_PATH).unwrap();
		assert_eq!(url.as_str(), "wss://api.demoway.com/socket.io/?EIO=4&transport=websocket");
	}

	#[test]
	fn test_socket_url_keeps_port() {
		let url = socket_url("http://127.0.0.1:3000/ignored?x=1", "/rt/").unwrap();
		assert_eq!(url.as_str(), "ws://127.0.0.1:3000/rt/?EIO=4&transport=websocket");
	}

	#[test]
	fn test_socket_url_rejects_other_schemes() {
		assert!(matches!(socket_url("ftp://host", DEFAULT_SOCKET_PATH), Err(Error::InvalidEndpoint { .. })));
		assert!(matches!(socket_url("not a url", DEFAULT_SOCKET_PATH), Err(Error::InvalidEndpoint { .. })));
	}

	#[test]
	fn test_connect_error_message() {
		assert_eq!(connect_error_message(&serde_json::json!({"message": "bad key"})), "bad key");
		assert_eq!(connect_error_message(&serde_json::json!("raw")), "\"raw\"");
	}
}
