//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! The realtime channel speaks Socket.IO over a raw WebSocket. Every text
//! frame is one Engine.IO packet; Engine.IO `message` packets carry one
//! Socket.IO packet:
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   open
//! 2 / 3                                                  ping / pong
//! 40{"token":".."}                                       CONNECT with auth
//! 42["resource:subscribe",{"resourceType":"..",..}]      EVENT
//! 44{"message":"unauthorized"}                           CONNECT_ERROR
//! 41                                                     DISCONNECT
//! ```
//!
//! Binary packets are not supported; the backend never sends them on this
//! channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_NAMESPACE: &str = "/";

/// Errors produced while decoding a text frame.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
	#[error("empty packet")]
	Empty,

	#[error("unknown {layer} packet type '{ty}'")]
	UnknownType { layer: &'static str, ty: char },

	#[error("malformed packet: {0}")]
	Malformed(&'static str),

	#[error("invalid packet JSON: {0}")]
	Json(#[from] serde_json::Error),
}

/// Handshake data sent by the server in the `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
	pub sid: String,
	#[serde(default)]
	pub upgrades: Vec<String>,
	pub ping_interval: u64,
	pub ping_timeout: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_payload: Option<u64>,
}

/// Engine.IO transport-level packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
	Open(OpenHandshake),
	Close,
	Ping,
	Pong,
	Message(SocketPacket),
	Upgrade,
	Noop,
}

/// Socket.IO packet addressed to a namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
	pub namespace: String,
	pub kind: SocketKind,
}

/// Socket.IO packet body.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketKind {
	/// Client: connect request with optional auth. Server: connect ack.
	Connect(Option<Value>),
	Disconnect,
	Event { ack: Option<u64>, name: String, args: Vec<Value> },
	Ack { id: u64, args: Vec<Value> },
	ConnectError(Value),
}

impl SocketPacket {
	/// Packet on the default namespace.
	pub fn new(kind: SocketKind) -> Self {
		Self {
			namespace: DEFAULT_NAMESPACE.to_string(),
			kind,
		}
	}

	/// Event with a single data argument and no ack.
	pub fn event(name: impl Into<String>, data: Value) -> Self {
		Self::new(SocketKind::Event {
			ack: None,
			name: name.into(),
			args: vec![data],
		})
	}

	pub fn is_default_namespace(&self) -> bool {
		self.namespace == DEFAULT_NAMESPACE
	}

	fn type_digit(&self) -> char {
		match self.kind {
			SocketKind::Connect(_) => '0',
			SocketKind::Disconnect => '1',
			SocketKind::Event { .. } => '2',
			SocketKind::Ack { .. } => '3',
			SocketKind::ConnectError(_) => '4',
		}
	}

	/// Encodes the Socket.IO packet (without the Engine.IO `4` prefix).
	pub fn encode(&self) -> String {
		let mut out = String::new();
		out.push(self.type_digit());
		if !self.is_default_namespace() {
			out.push_str(&self.namespace);
			out.push(',');
		}
		match &self.kind {
			SocketKind::Connect(Some(auth)) => out.push_str(&auth.to_string()),
			SocketKind::Connect(None) | SocketKind::Disconnect => {}
			SocketKind::Event { ack, name, args } => {
				if let Some(id) = ack {
					out.push_str(&id.to_string());
				}
				let mut array = Vec::with_capacity(args.len() + 1);
				array.push(Value::String(name.clone()));
				array.extend(args.iter().cloned());
				out.push_str(&Value::Array(array).to_string());
			}
			SocketKind::Ack { id, args } => {
				out.push_str(&id.to_string());
				out.push_str(&Value::Array(args.clone()).to_string());
			}
			SocketKind::ConnectError(data) => out.push_str(&data.to_string()),
		}
		out
	}

	/// Decodes a Socket.IO packet (the part after the Engine.IO `4`).
	pub fn decode(input: &str) -> Result<Self, PacketError> {
		let mut chars = input.chars();
		let ty = chars.next().ok_or(PacketError::Empty)?;
		let mut rest = chars.as_str();

		let mut namespace = DEFAULT_NAMESPACE.to_string();
		if rest.starts_with('/') {
			match rest.find(',') {
				Some(comma) => {
					namespace = rest[..comma].to_string();
					rest = &rest[comma + 1..];
				}
				None => {
					namespace = rest.to_string();
					rest = "";
				}
			}
		}

		let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
		let ack = if digits > 0 {
			Some(rest[..digits].parse::<u64>().map_err(|_| PacketError::Malformed("ack id out of range"))?)
		} else {
			None
		};
		let body = &rest[digits..];
		let data = if body.is_empty() { None } else { Some(serde_json::from_str::<Value>(body)?) };

		let kind = match ty {
			'0' => SocketKind::Connect(data),
			'1' => SocketKind::Disconnect,
			'2' => {
				let (name, args) = split_event(data)?;
				SocketKind::Event { ack, name, args }
			}
			'3' => {
				let id = ack.ok_or(PacketError::Malformed("ack without id"))?;
				let args = match data {
					Some(Value::Array(args)) => args,
					_ => return Err(PacketError::Malformed("ack data must be an array")),
				};
				SocketKind::Ack { id, args }
			}
			'4' => SocketKind::ConnectError(data.unwrap_or(Value::Null)),
			other => return Err(PacketError::UnknownType { layer: "socket.io", ty: other }),
		};

		Ok(Self { namespace, kind })
	}
}

fn split_event(data: Option<Value>) -> Result<(String, Vec<Value>), PacketError> {
	let Some(Value::Array(mut items)) = data else {
		return Err(PacketError::Malformed("event data must be an array"));
	};
	if items.is_empty() {
		return Err(PacketError::Malformed("event without name"));
	}
	let Value::String(name) = items.remove(0) else {
		return Err(PacketError::Malformed("event name must be a string"));
	};
	Ok((name, items))
}

impl EnginePacket {
	/// Encodes the packet as a text frame.
	pub fn encode(&self) -> String {
		match self {
			EnginePacket::Open(handshake) => {
				format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
			}
			EnginePacket::Close => "1".to_string(),
			EnginePacket::Ping => "2".to_string(),
			EnginePacket::Pong => "3".to_string(),
			EnginePacket::Message(packet) => format!("4{}", packet.encode()),
			EnginePacket::Upgrade => "5".to_string(),
			EnginePacket::Noop => "6".to_string(),
		}
	}

	/// Decodes a text frame.
	pub fn decode(input: &str) -> Result<Self, PacketError> {
		let mut chars = input.chars();
		let ty = chars.next().ok_or(PacketError::Empty)?;
		let rest = chars.as_str();
		match ty {
			'0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
			'1' => Ok(EnginePacket::Close),
			// Probe payloads ("2probe") only appear during transport upgrades.
			'2' => Ok(EnginePacket::Ping),
			'3' => Ok(EnginePacket::Pong),
			'4' => Ok(EnginePacket::Message(SocketPacket::decode(rest)?)),
			'5' => Ok(EnginePacket::Upgrade),
			'6' => Ok(EnginePacket::Noop),
			other => Err(PacketError::UnknownType { layer: "engine.io", ty: other }),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn decode_open_handshake() {
		let packet = EnginePacket::decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#).unwrap();
		match packet {
			EnginePacket::Open(handshake) => {
				assert_eq!(handshake.sid, "abc");
				assert_eq!(handshake.ping_interval, 25000);
				assert_eq!(handshake.max_payload, Some(1_000_000));
			}
			other => panic!("expected open, got {other:?}"),
		}
	}

	#[test]
	fn encode_connect_with_auth() {
		let packet = EnginePacket::Message(SocketPacket::new(SocketKind::Connect(Some(json!({"key": "k"})))));
		assert_eq!(packet.encode(), r#"40{"key":"k"}"#);
	}

	#[test]
	fn decode_connect_ack() {
		let packet = EnginePacket::decode(r#"40{"sid":"xyz"}"#).unwrap();
		let EnginePacket::Message(socket) = packet else {
			panic!("expected message");
		};
		assert!(socket.is_default_namespace());
		assert_eq!(socket.kind, SocketKind::Connect(Some(json!({"sid": "xyz"}))));
	}

	#[test]
	fn decode_connect_error() {
		let packet = EnginePacket::decode(r#"44{"message":"unauthorized"}"#).unwrap();
		let EnginePacket::Message(socket) = packet else {
			panic!("expected message");
		};
		assert_eq!(socket.kind, SocketKind::ConnectError(json!({"message": "unauthorized"})));
	}

	#[test]
	fn encode_event() {
		let packet = EnginePacket::Message(SocketPacket::event("resource:subscribe", json!({"resourceId": "1"})));
		assert_eq!(packet.encode(), r#"42["resource:subscribe",{"resourceId":"1"}]"#);
	}

	#[test]
	fn decode_event_with_namespace_and_ack() {
		let socket = SocketPacket::decode(r#"2/admin,13["hello",1,2]"#).unwrap();
		assert_eq!(socket.namespace, "/admin");
		assert_eq!(
			socket.kind,
			SocketKind::Event {
				ack: Some(13),
				name: "hello".into(),
				args: vec![json!(1), json!(2)],
			}
		);
		assert_eq!(socket.encode(), r#"2/admin,13["hello",1,2]"#);
	}

	#[test]
	fn heartbeat_packets() {
		assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping);
		assert_eq!(EnginePacket::Pong.encode(), "3");
		assert_eq!(EnginePacket::decode("41").unwrap(), EnginePacket::Message(SocketPacket::new(SocketKind::Disconnect)));
	}

	#[test]
	fn rejects_garbage() {
		assert!(matches!(EnginePacket::decode(""), Err(PacketError::Empty)));
		assert!(matches!(EnginePacket::decode("9"), Err(PacketError::UnknownType { .. })));
		assert!(matches!(SocketPacket::decode("2{}"), Err(PacketError::Malformed(_))));
		assert!(matches!(SocketPacket::decode("2[42]"), Err(PacketError::Malformed(_))));
	}
}
