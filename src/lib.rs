//! atomgraph is a real-time media pipeline runtime.
//!
//! Atoms exchange format-tagged packets over negotiated links. Every atom renders through the
//! [`Gfx`] hardware abstraction, so the same node code runs on the software rasterizer, OpenGL
//! (feature `gl`) or Direct3D 11 (feature `d3d11`, Windows only).
//!
//! - Assemble a [`Pipeline`] by hand or from a [`PipelineDef`]
//! - [`Pipeline::initialize`] negotiates every link
//! - [`Pipeline::tick`] runs the atoms in dependency order
#![deny(unsafe_code)]

pub mod atom;
pub mod atoms;
pub mod context;
pub mod draw;
pub mod format;
pub mod foundation;
pub mod gfx;
pub mod packet;
pub mod pipeline;
pub mod router;
pub mod stage;

pub use crate::atom::{
    ATOM_KINDS, Atom, AtomConfig, CaptureHandle, Environment, KeyState, PacketIo, PostInit,
    SharedKeyState, TickConfig, create_atom,
};
pub use crate::context::RenderContext;
pub use crate::draw::DrawCommand;
pub use crate::format::negotiate::{accepts_format, negotiate};
pub use crate::format::{AudioFormat, FormatTag, ValueFormat, VideoFormat};
pub use crate::foundation::core::{SampleType, Size2, Size3};
pub use crate::foundation::error::{GfxError, GfxResult, GraphError, GraphResult};
pub use crate::gfx::Gfx;
pub use crate::gfx::soft::SoftGfx;
pub use crate::packet::{Packet, Payload, RenderState};
pub use crate::pipeline::{Endpoint, Link, LinkState, Pipeline, PipelineDef, TickStats};
pub use crate::router::{Direction, LinkPolicy, PacketRouter};
pub use crate::stage::{BufferStage, StageId};
