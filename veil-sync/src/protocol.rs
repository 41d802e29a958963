//! Binary wire protocol for the push stream.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌────────────┬───────────┬──────────┬──────────┐
//! │ frame_type │ sender    │ seq      │ payload  │
//! │ 1 byte     │ 16 bytes  │ 8 bytes  │ variable │
//! └────────────┴───────────┴──────────┴──────────┘
//! ```
//!
//! Snapshot frames carry a [`SnapshotFrame`] payload; pointer frames carry
//! a [`PointerEvent`]. A logically complete update is always one frame —
//! viewers reconstruct state by replaying frames in arrival order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use veil_core::Snapshot;

/// Frame types on the push stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    /// Viewer handshake with identity metadata.
    Hello = 1,
    /// Full or lite state snapshot.
    Snapshot = 2,
    /// Ephemeral pointer position (fire-and-forget).
    Pointer = 3,
    /// Heartbeat ping.
    Ping = 4,
    /// Heartbeat pong.
    Pong = 5,
}

/// Viewer identity with display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerInfo {
    pub viewer_id: Uuid,
    pub name: String,
}

impl ViewerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            viewer_id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// Create with an explicit viewer id (for testing).
    pub fn with_id(viewer_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            viewer_id,
            name: name.into(),
        }
    }
}

/// A snapshot as transmitted on a payload-size-sensitive channel.
///
/// The elision flags make a lite frame distinguishable from a snapshot
/// whose payload is genuinely empty: when `image_elided` is set the image
/// payload bytes were stripped because the channel already transmitted
/// them for this `(generation, identity)`; when `events_elided` is set the
/// event log was stripped because its length is unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFrame {
    pub snapshot: Snapshot,
    pub image_elided: bool,
    pub events_elided: bool,
}

impl SnapshotFrame {
    /// A full, nothing-elided frame (initial pull fetch).
    pub fn full(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            image_elided: false,
            events_elided: false,
        }
    }
}

/// An ephemeral pointer position in image-space coordinates.
///
/// No replay, no ordering guarantee against the snapshot stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub x: f32,
    pub y: f32,
    /// Display label shown next to the remote pointer.
    pub label: String,
    /// Sender-side monotonic timestamp, for staleness filtering.
    pub timestamp_ms: u64,
}

/// Top-level wire frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub frame_type: FrameType,
    /// Originating peer; `Uuid::nil()` for authority-originated frames.
    pub sender: Uuid,
    /// Store version for snapshot frames, 0 otherwise.
    pub seq: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Viewer handshake frame.
    pub fn hello(info: &ViewerInfo) -> Result<Self, ProtocolError> {
        Ok(Self {
            frame_type: FrameType::Hello,
            sender: info.viewer_id,
            seq: 0,
            payload: encode_payload(info)?,
        })
    }

    /// Snapshot frame, full or lite.
    pub fn snapshot(seq: u64, frame: &SnapshotFrame) -> Result<Self, ProtocolError> {
        Ok(Self {
            frame_type: FrameType::Snapshot,
            sender: Uuid::nil(),
            seq,
            payload: encode_payload(frame)?,
        })
    }

    /// Pointer frame.
    pub fn pointer(sender: Uuid, event: &PointerEvent) -> Result<Self, ProtocolError> {
        Ok(Self {
            frame_type: FrameType::Pointer,
            sender,
            seq: 0,
            payload: encode_payload(event)?,
        })
    }

    pub fn ping(sender: Uuid) -> Self {
        Self {
            frame_type: FrameType::Ping,
            sender,
            seq: 0,
            payload: Vec::new(),
        }
    }

    pub fn pong(sender: Uuid) -> Self {
        Self {
            frame_type: FrameType::Pong,
            sender,
            seq: 0,
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Ok(frame)
    }

    /// Parse a hello payload.
    pub fn viewer_info(&self) -> Result<ViewerInfo, ProtocolError> {
        self.expect_type(FrameType::Hello)?;
        decode_payload(&self.payload)
    }

    /// Parse a snapshot payload.
    pub fn snapshot_frame(&self) -> Result<SnapshotFrame, ProtocolError> {
        self.expect_type(FrameType::Snapshot)?;
        decode_payload(&self.payload)
    }

    /// Parse a pointer payload.
    pub fn pointer_event(&self) -> Result<PointerEvent, ProtocolError> {
        self.expect_type(FrameType::Pointer)?;
        decode_payload(&self.payload)
    }

    fn expect_type(&self, expected: FrameType) -> Result<(), ProtocolError> {
        if self.frame_type == expected {
            Ok(())
        } else {
            Err(ProtocolError::InvalidFrameType)
        }
    }
}

fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

fn decode_payload<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::Decode(e.to_string()))?;
    Ok(value)
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Encode(String),
    Decode(String),
    InvalidFrameType,
    ConnectionClosed,
    /// The authority task has stopped; no further mutations are possible.
    AuthorityStopped,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::InvalidFrameType => write!(f, "invalid frame type"),
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::AuthorityStopped => write!(f, "authority task stopped"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::{CanonicalState, ImageRef, MaskOp};

    fn sample_snapshot() -> Snapshot {
        let mut state = CanonicalState::new();
        state.image = Some(ImageRef::new("map1", vec![9u8; 64], 50, 50));
        state.log.push(MaskOp::RevealCircle { x: 25.0, y: 25.0, r: 10.0 });
        state.events.push("{\"kind\":\"reveal\"}".to_string());
        Snapshot { version: 7, state }
    }

    #[test]
    fn test_hello_roundtrip() {
        let info = ViewerInfo::new("Table TV");
        let frame = Frame::hello(&info).unwrap();
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.frame_type, FrameType::Hello);
        assert_eq!(decoded.sender, info.viewer_id);
        assert_eq!(decoded.viewer_info().unwrap(), info);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let snap = sample_snapshot();
        let frame = Frame::snapshot(snap.version, &SnapshotFrame::full(snap.clone())).unwrap();
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.frame_type, FrameType::Snapshot);
        assert_eq!(decoded.seq, 7);
        let sf = decoded.snapshot_frame().unwrap();
        assert!(!sf.image_elided);
        assert!(!sf.events_elided);
        assert_eq!(sf.snapshot, snap);
    }

    #[test]
    fn test_pointer_roundtrip() {
        let sender = Uuid::new_v4();
        let event = PointerEvent {
            x: 12.5,
            y: -3.0,
            label: "GM".to_string(),
            timestamp_ms: 123_456,
        };
        let frame = Frame::pointer(sender, &event).unwrap();
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.frame_type, FrameType::Pointer);
        assert_eq!(decoded.sender, sender);
        assert_eq!(decoded.pointer_event().unwrap(), event);
    }

    #[test]
    fn test_ping_pong() {
        let sender = Uuid::new_v4();
        let ping = Frame::decode(&Frame::ping(sender).encode().unwrap()).unwrap();
        let pong = Frame::decode(&Frame::pong(sender).encode().unwrap()).unwrap();
        assert_eq!(ping.frame_type, FrameType::Ping);
        assert_eq!(pong.frame_type, FrameType::Pong);
        assert!(ping.payload.is_empty());
    }

    #[test]
    fn test_wrong_payload_accessor_rejected() {
        let frame = Frame::ping(Uuid::new_v4());
        assert!(matches!(
            frame.snapshot_frame(),
            Err(ProtocolError::InvalidFrameType)
        ));
        assert!(matches!(
            frame.pointer_event(),
            Err(ProtocolError::InvalidFrameType)
        ));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Frame::decode(&[0xFF, 0xFE, 0xFD]).is_err());
    }

    #[test]
    fn test_lite_frame_smaller_than_full() {
        let snap = sample_snapshot();
        let full = Frame::snapshot(1, &SnapshotFrame::full(snap.clone()))
            .unwrap()
            .encode()
            .unwrap();

        let mut lite_snap = snap;
        if let Some(img) = lite_snap.state.image.as_mut() {
            img.payload = Vec::new();
        }
        let lite = Frame::snapshot(
            1,
            &SnapshotFrame {
                snapshot: lite_snap,
                image_elided: true,
                events_elided: false,
            },
        )
        .unwrap()
        .encode()
        .unwrap();

        assert!(lite.len() < full.len());
    }
}
