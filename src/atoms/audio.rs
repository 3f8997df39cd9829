use crate::atom::{Atom, AtomConfig, Environment, PacketIo, PostInit, TickConfig, edge_error};
use crate::atoms::stage_packet;
use crate::context::RenderContext;
use crate::foundation::core::{Filter, SampleType, Size2, Wrap};
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::{AudioFormat, FboFormat, ValueFormat};
use crate::gfx::{Gfx, TexImage};
use crate::packet::Packet;
use crate::stage::StageId;

/// Sample type every audio sink is renegotiated to.
pub const AUDIO_STORAGE_SAMPLE: SampleType = SampleType::U16;

/// Stores each PCM block as a `samples x 1` texture row.
#[derive(Debug, Default)]
pub struct AudioAtom {
    format: Option<AudioFormat>,
    stage: Option<StageId>,
    seq: u64,
}

impl AudioAtom {
    /// Format currently accepted on the sink.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    fn upload<G: Gfx>(
        &mut self,
        ctx: &mut RenderContext<G>,
        fmt: AudioFormat,
        data: &[u8],
    ) -> GraphResult<()> {
        let Some(sample) = fmt.sample else {
            return Err(GraphError::format("audio packet without a sample type"));
        };
        if data.len() != fmt.packet_bytes() {
            return Err(GraphError::format(format!(
                "audio packet is {} bytes, {} needs {}",
                data.len(),
                ValueFormat::Audio(fmt),
                fmt.packet_bytes()
            )));
        }
        let id = self
            .stage
            .ok_or_else(|| GraphError::stage("audio atom is not initialized"))?;
        let image = TexImage::new_2d(Size2::new(fmt.samples, 1), fmt.channels, sample);
        let (gfx, stage) = ctx.stage_with_gfx(id)?;
        if stage.is_initialized() {
            stage.read_texture(gfx, image, data)
        } else {
            stage.initialize_texture(gfx, image, Some(data), Filter::Nearest, Wrap::Clamp)
        }
    }
}

impl<G: Gfx> Atom<G> for AudioAtom {
    fn kind(&self) -> &'static str {
        "audio"
    }

    fn initialize(
        &mut self,
        ctx: &mut RenderContext<G>,
        _cfg: &AtomConfig,
        _env: &Environment,
    ) -> GraphResult<()> {
        self.stage = Some(ctx.create_stage(false));
        Ok(())
    }

    fn sink_count(&self) -> usize {
        1
    }

    fn source_count(&self) -> usize {
        1
    }

    fn sink_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        vec![ValueFormat::Audio(AudioFormat::any())]
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        let fbo = match self.format {
            Some(a) => FboFormat {
                size: Size2::new(a.samples, 1),
                channels: a.channels,
                sample: Some(AUDIO_STORAGE_SAMPLE),
            },
            None => FboFormat::default(),
        };
        vec![ValueFormat::Fbo(fbo)]
    }

    fn negotiate_sink_format(&mut self, _ch: usize, fmt: &ValueFormat) -> bool {
        match fmt {
            ValueFormat::Audio(a) if a.sample.is_some() => {
                self.format = Some(*a);
                true
            }
            _ => false,
        }
    }

    fn post_initialize(
        &mut self,
        _ctx: &mut RenderContext<G>,
        post: &mut PostInit,
    ) -> GraphResult<()> {
        if let ValueFormat::Audio(a) = post.sink_format(0)
            && a.sample != Some(AUDIO_STORAGE_SAMPLE)
        {
            let wanted = a.with_sample(AUDIO_STORAGE_SAMPLE);
            tracing::debug!(
                from = %ValueFormat::Audio(a),
                to = %ValueFormat::Audio(wanted),
                "audio sink renegotiation"
            );
            post.request_sink_format(0, ValueFormat::Audio(wanted));
        }
        Ok(())
    }

    fn is_ready(&self, ctx: &RenderContext<G>, io: &PacketIo) -> bool {
        io.has_packet(0) || self.stage.is_some_and(|id| ctx.stage_ready(id))
    }

    fn recv(&mut self, ctx: &mut RenderContext<G>, _ch: usize, packet: Packet) -> GraphResult<()> {
        let ValueFormat::Audio(fmt) = packet.format else {
            return Err(GraphError::format(format!(
                "audio sink cannot take {}",
                packet.format
            )));
        };
        if let Some(expected) = self.format
            && expected.sample != fmt.sample
        {
            return Err(GraphError::format(format!(
                "audio packet is {}, sink negotiated {}",
                packet.format,
                ValueFormat::Audio(expected)
            )));
        }
        let Some(data) = packet.payload.as_bytes() else {
            return Err(GraphError::format(format!(
                "audio packet carries {}",
                packet.payload.tag()
            )));
        };
        self.upload(ctx, fmt, data).map_err(edge_error)
    }

    fn send(
        &mut self,
        ctx: &mut RenderContext<G>,
        _cfg: &TickConfig,
        _ch: usize,
        _fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        let packet = stage_packet(ctx, self.stage, self.seq);
        if packet.is_some() {
            self.seq += 1;
        }
        Ok(packet)
    }

    fn uninitialize(&mut self, ctx: &mut RenderContext<G>) {
        if let Some(id) = self.stage.take() {
            ctx.release_stage(id);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/atoms/audio.rs"]
mod tests;
