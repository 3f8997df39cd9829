//! The node contract.
//!
//! An atom goes through `initialize` (static configuration), link negotiation
//! (`negotiate_sink_format` / `negotiate_source_format`), `post_initialize` (renegotiation
//! requests), then a per-tick loop of `is_ready`, `recv`, `send` and `finalize`, and finally
//! `uninitialize`. Atoms are generic over the backend; dynamic dispatch happens per node, never
//! per draw call.

pub mod config;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub use config::AtomConfig;

use crate::context::RenderContext;
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::ValueFormat;
use crate::format::negotiate::accepts_format;
use crate::gfx::Gfx;
use crate::packet::Packet;

/// Per-tick timing handed to `send` and `finalize`. Never stored by atoms.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickConfig {
    /// Zero-based tick index.
    pub frame: u64,
    /// Seconds since the first tick.
    pub time: f64,
    /// Seconds since the previous tick.
    pub delta: f64,
}

/// State of one sink port as seen by `is_ready`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SinkIo {
    /// At least one active link feeds this port.
    pub connected: bool,
    /// Packets waiting on those links.
    pub queued: usize,
}

/// Sink-side view of the router for one readiness check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketIo {
    sinks: Vec<SinkIo>,
}

impl PacketIo {
    pub fn new(sinks: Vec<SinkIo>) -> Self {
        Self { sinks }
    }

    pub fn is_connected(&self, ch: usize) -> bool {
        self.sinks.get(ch).is_some_and(|s| s.connected)
    }

    pub fn queued(&self, ch: usize) -> usize {
        self.sinks.get(ch).map_or(0, |s| s.queued)
    }

    pub fn has_packet(&self, ch: usize) -> bool {
        self.queued(ch) > 0
    }

    pub fn any_packet(&self) -> bool {
        self.sinks.iter().any(|s| s.queued > 0)
    }

    /// Every connected sink has a packet waiting. Unconnected sinks are ignored.
    pub fn all_connected_have_packets(&self) -> bool {
        self.sinks.iter().all(|s| !s.connected || s.queued > 0)
    }
}

/// Renegotiation requests collected during `post_initialize`.
#[derive(Clone, Debug, Default)]
pub struct PostInit {
    sink_formats: Vec<ValueFormat>,
    requests: Vec<(usize, ValueFormat)>,
}

impl PostInit {
    pub fn new(sink_formats: Vec<ValueFormat>) -> Self {
        Self {
            sink_formats,
            requests: Vec::new(),
        }
    }

    /// Format negotiated on sink `ch`, or `Null` when nothing is connected.
    pub fn sink_format(&self, ch: usize) -> ValueFormat {
        self.sink_formats.get(ch).copied().unwrap_or_default()
    }

    /// Ask the producer feeding sink `ch` to switch to `fmt`.
    pub fn request_sink_format(&mut self, ch: usize, fmt: ValueFormat) {
        self.requests.push((ch, fmt));
    }

    pub fn requests(&self) -> &[(usize, ValueFormat)] {
        &self.requests
    }

    pub(crate) fn into_requests(self) -> Vec<(usize, ValueFormat)> {
        self.requests
    }
}

/// Key state bridged from an external input source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyState {
    down: [bool; 256],
}

impl Default for KeyState {
    fn default() -> Self {
        Self {
            down: [false; 256],
        }
    }
}

impl KeyState {
    pub fn set(&mut self, key: u8, down: bool) {
        self.down[key as usize] = down;
    }

    pub fn press(&mut self, key: u8) {
        self.set(key, true);
    }

    pub fn release(&mut self, key: u8) {
        self.set(key, false);
    }

    pub fn is_down(&self, key: u8) -> bool {
        self.down[key as usize]
    }

    pub fn release_all(&mut self) {
        self.down = [false; 256];
    }

    pub fn snapshot(&self) -> [bool; 256] {
        self.down
    }
}

pub type SharedKeyState = Arc<Mutex<KeyState>>;

/// Packets stored by a capture sink.
pub type CaptureHandle = Arc<Mutex<Vec<Packet>>>;

/// Named external objects atoms can attach to by configuration (`target` keys).
#[derive(Clone, Debug, Default)]
pub struct Environment {
    keyboards: HashMap<String, SharedKeyState>,
    captures: HashMap<String, CaptureHandle>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or fetch) a key-state object.
    pub fn add_keyboard(&mut self, name: &str) -> SharedKeyState {
        self.keyboards.entry(name.to_string()).or_default().clone()
    }

    pub fn keyboard(&self, name: &str) -> Option<SharedKeyState> {
        self.keyboards.get(name).cloned()
    }

    /// Register (or fetch) a capture buffer.
    pub fn add_capture(&mut self, name: &str) -> CaptureHandle {
        self.captures.entry(name.to_string()).or_default().clone()
    }

    pub fn capture(&self, name: &str) -> Option<CaptureHandle> {
        self.captures.get(name).cloned()
    }
}

/// A pipeline node.
pub trait Atom<G: Gfx> {
    /// Kind name used by the factory and in logs.
    fn kind(&self) -> &'static str;

    /// Read static configuration and fix port counts. Errors abort pipeline assembly.
    fn initialize(
        &mut self,
        ctx: &mut RenderContext<G>,
        cfg: &AtomConfig,
        env: &Environment,
    ) -> GraphResult<()>;

    fn sink_count(&self) -> usize;

    fn source_count(&self) -> usize;

    /// Formats sink `ch` accepts, most preferred first.
    fn sink_formats(&self, ch: usize) -> Vec<ValueFormat>;

    /// Formats source `ch` can produce, most preferred first.
    fn source_formats(&self, ch: usize) -> Vec<ValueFormat>;

    /// Accept (and remember) the format chosen for sink `ch`.
    fn negotiate_sink_format(&mut self, ch: usize, fmt: &ValueFormat) -> bool {
        accepts_format(&self.sink_formats(ch), fmt)
    }

    /// Accept (and remember) the format chosen for source `ch`.
    fn negotiate_source_format(&mut self, ch: usize, fmt: &ValueFormat) -> bool {
        accepts_format(&self.source_formats(ch), fmt)
    }

    fn post_initialize(
        &mut self,
        _ctx: &mut RenderContext<G>,
        _post: &mut PostInit,
    ) -> GraphResult<()> {
        Ok(())
    }

    /// Pure readiness check. `false` means "retry next tick".
    fn is_ready(&self, ctx: &RenderContext<G>, io: &PacketIo) -> bool;

    /// Consume one packet. `GraphError::Format` fails the edge it came from.
    fn recv(&mut self, ctx: &mut RenderContext<G>, ch: usize, packet: Packet) -> GraphResult<()>;

    /// Produce the packet for source `ch`, if any.
    fn send(
        &mut self,
        ctx: &mut RenderContext<G>,
        cfg: &TickConfig,
        ch: usize,
        fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>>;

    /// Runs after all sends of the tick.
    fn finalize(&mut self, _ctx: &mut RenderContext<G>, _cfg: &TickConfig) -> GraphResult<()> {
        Ok(())
    }

    /// Whether this atom owns framebuffer stages. Such atoms are torn down after the ones that
    /// only own textures.
    fn owns_render_targets(&self) -> bool {
        false
    }

    /// Release every backend resource this atom owns.
    fn uninitialize(&mut self, ctx: &mut RenderContext<G>);
}

/// Kind names understood by [`create_atom`].
pub const ATOM_KINDS: &[&str] = &[
    "texture",
    "shader",
    "readback",
    "keyboard",
    "audio",
    "image_source",
    "draw_replay",
    "tone_source",
    "present",
    "capture",
];

/// Construct an unconfigured atom by kind name.
pub fn create_atom<G: Gfx + 'static>(kind: &str) -> GraphResult<Box<dyn Atom<G>>> {
    use crate::atoms::*;

    Ok(match kind {
        "texture" => Box::new(TextureAtom::default()),
        "shader" => Box::new(ShaderAtom::<G>::default()),
        "readback" => Box::new(ReadbackAtom::default()),
        "keyboard" => Box::new(KeyboardAtom::default()),
        "audio" => Box::new(AudioAtom::default()),
        "image_source" => Box::new(ImageSourceAtom::default()),
        "draw_replay" => Box::new(DrawReplayAtom::default()),
        "tone_source" => Box::new(ToneSourceAtom::default()),
        "present" => Box::new(PresentAtom::<G>::default()),
        "capture" => Box::new(CaptureAtom::default()),
        other => {
            return Err(GraphError::config(format!(
                "unknown atom kind '{other}' (known: {})",
                ATOM_KINDS.join(", ")
            )));
        }
    })
}

/// Convert a stage error raised while consuming a packet into an edge-local format error.
pub(crate) fn edge_error(err: GraphError) -> GraphError {
    match err {
        GraphError::Stage(msg) => GraphError::Format(msg),
        other => other,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/atom/mod.rs"]
mod tests;
