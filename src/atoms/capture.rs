use crate::atom::{Atom, AtomConfig, CaptureHandle, Environment, PacketIo, TickConfig};
use crate::context::RenderContext;
use crate::foundation::core::{Size2, Size3};
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::{AudioFormat, DrawFormat, FboFormat, ValueFormat, VideoFormat, VolumeFormat};
use crate::gfx::Gfx;
use crate::packet::Packet;

/// Terminal sink that stores every packet it receives.
#[derive(Debug, Default)]
pub struct CaptureAtom {
    handle: CaptureHandle,
    limit: Option<usize>,
}

impl CaptureAtom {
    pub fn handle(&self) -> CaptureHandle {
        self.handle.clone()
    }

    /// Wildcard of every format domain.
    pub fn accept_all() -> Vec<ValueFormat> {
        vec![
            ValueFormat::Video(VideoFormat::any_with_channels(0)),
            ValueFormat::Video(VideoFormat::any_with_channels(0).with_cubemap(true)),
            ValueFormat::Audio(AudioFormat::any()),
            ValueFormat::Volume(VolumeFormat {
                size: Size3::default(),
                channels: 0,
                sample: None,
            }),
            ValueFormat::Fbo(FboFormat::default()),
            ValueFormat::State,
            ValueFormat::Keyboard,
            ValueFormat::Program(DrawFormat {
                size: Size2::default(),
            }),
            ValueFormat::Order,
            ValueFormat::Receipt,
        ]
    }
}

impl<G: Gfx> Atom<G> for CaptureAtom {
    fn kind(&self) -> &'static str {
        "capture"
    }

    fn initialize(
        &mut self,
        _ctx: &mut RenderContext<G>,
        cfg: &AtomConfig,
        env: &Environment,
    ) -> GraphResult<()> {
        if let Some(target) = cfg.get_str("target")? {
            self.handle = env.capture(target).ok_or_else(|| {
                GraphError::config(format!("capture target '{target}' is not registered"))
            })?;
        }
        self.limit = match cfg.get_u32("limit", 0)? {
            0 => None,
            n => Some(n as usize),
        };
        Ok(())
    }

    fn sink_count(&self) -> usize {
        1
    }

    fn source_count(&self) -> usize {
        0
    }

    fn sink_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        Self::accept_all()
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        Vec::new()
    }

    fn is_ready(&self, _ctx: &RenderContext<G>, io: &PacketIo) -> bool {
        io.any_packet()
    }

    fn recv(&mut self, _ctx: &mut RenderContext<G>, _ch: usize, packet: Packet) -> GraphResult<()> {
        let mut stored = match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        stored.push(packet);
        // Keep the most recent packets only.
        if let Some(limit) = self.limit
            && stored.len() > limit
        {
            let excess = stored.len() - limit;
            stored.drain(..excess);
        }
        Ok(())
    }

    fn send(
        &mut self,
        _ctx: &mut RenderContext<G>,
        _cfg: &TickConfig,
        _ch: usize,
        _fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        Ok(None)
    }

    fn uninitialize(&mut self, _ctx: &mut RenderContext<G>) {}
}

#[cfg(test)]
#[path = "../../tests/unit/atoms/capture.rs"]
mod tests;
