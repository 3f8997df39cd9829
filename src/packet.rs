use std::sync::Arc;

use crate::draw::DrawCommand;
use crate::format::ValueFormat;
use crate::stage::StageId;

/// Camera matrices shared by render-state producers and shader nodes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderState {
    /// Column-major view matrix.
    pub view: [f32; 16],
    /// Column-major projection matrix.
    pub projection: [f32; 16],
}

impl RenderState {
    pub const IDENTITY: [f32; 16] = [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ];
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            view: Self::IDENTITY,
            projection: Self::IDENTITY,
        }
    }
}

/// Packet contents. Dispatch is by pattern match; [`Payload::tag`] exists for logs.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    /// Tightly packed audio/video/voxel bytes laid out per the packet format.
    Bytes(Vec<u8>),
    /// Handle to a stage owned by the producing atom. Receivers treat it as read-only.
    Stage(StageId),
    State(RenderState),
    Commands(Arc<[DrawCommand]>),
}

impl Payload {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bytes(_) => "bytes",
            Self::Stage(_) => "gfxbuf",
            Self::State(_) => "gfxstate",
            Self::Commands(_) => "drawcmd",
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_stage(&self) -> Option<StageId> {
        match self {
            Self::Stage(id) => Some(*id),
            _ => None,
        }
    }
}

/// Transient unit of data on one edge.
///
/// Packets are moved, never shared. A receiver that needs the data after `recv` returns keeps it
/// by taking the packet (or its payload) by value.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub format: ValueFormat,
    /// Producer-stamped sequence number.
    pub seq: u64,
    pub payload: Payload,
}

impl Packet {
    pub fn new(format: ValueFormat, seq: u64, payload: Payload) -> Self {
        Self {
            format,
            seq,
            payload,
        }
    }

    pub fn bytes(format: ValueFormat, seq: u64, data: Vec<u8>) -> Self {
        Self::new(format, seq, Payload::Bytes(data))
    }

    pub fn stage(format: ValueFormat, seq: u64, id: StageId) -> Self {
        Self::new(format, seq, Payload::Stage(id))
    }

    pub fn tick(format: ValueFormat, seq: u64) -> Self {
        Self::new(format, seq, Payload::Empty)
    }

    /// Take the byte payload, leaving `Empty` behind.
    pub fn take_bytes(&mut self) -> Option<Vec<u8>> {
        match std::mem::take(&mut self.payload) {
            Payload::Bytes(b) => Some(b),
            other => {
                self.payload = other;
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/packet.rs"]
mod tests;
