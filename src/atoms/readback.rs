use crate::atom::{Atom, AtomConfig, Environment, PacketIo, TickConfig, edge_error};
use crate::context::RenderContext;
use crate::foundation::core::{SampleType, Size2};
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::{AudioFormat, ValueFormat, VideoFormat};
use crate::format::negotiate::accepts_format;
use crate::gfx::Gfx;
use crate::packet::{Packet, Payload};
use crate::stage::StageId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadbackMode {
    /// A `samplerate x 1` stage read as one PCM block.
    Audio,
    #[default]
    Video,
}

impl ReadbackMode {
    pub fn parse(s: &str) -> GraphResult<Self> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(GraphError::config(format!(
                "unknown readback mode '{other}' (expected audio|video)"
            ))),
        }
    }
}

fn parse_sample(s: &str) -> GraphResult<SampleType> {
    match s {
        "u8" => Ok(SampleType::U8),
        "u16" => Ok(SampleType::U16),
        "f32" => Ok(SampleType::F32),
        other => Err(GraphError::config(format!(
            "unknown sample type '{other}' (expected u8|u16|f32)"
        ))),
    }
}

/// Reads a received stage back into bytes, as PCM or raw video.
#[derive(Debug, Default)]
pub struct ReadbackAtom {
    mode: ReadbackMode,
    native: ValueFormat,
    negotiated: Option<ValueFormat>,
    pending: Option<StageId>,
    seq: u64,
}

impl ReadbackAtom {
    pub fn mode(&self) -> ReadbackMode {
        self.mode
    }

    fn layout(&self) -> ValueFormat {
        self.negotiated.unwrap_or(self.native)
    }

    /// Stage size and channel count the outgoing format reads.
    fn expected(fmt: &ValueFormat) -> Option<(Size2, u8)> {
        match fmt {
            ValueFormat::Audio(a) => Some((Size2::new(a.samples, 1), a.channels)),
            ValueFormat::Video(v) => Some((v.size, v.channels)),
            _ => None,
        }
    }
}

impl<G: Gfx> Atom<G> for ReadbackAtom {
    fn kind(&self) -> &'static str {
        "readback"
    }

    fn initialize(
        &mut self,
        _ctx: &mut RenderContext<G>,
        cfg: &AtomConfig,
        _env: &Environment,
    ) -> GraphResult<()> {
        self.mode = match cfg.get_str("mode")? {
            Some(m) => ReadbackMode::parse(m)?,
            None => ReadbackMode::default(),
        };
        let sample = cfg.get_str("sample")?.map(parse_sample).transpose()?;
        let default_channels = match self.mode {
            ReadbackMode::Audio => 2,
            ReadbackMode::Video => 4,
        };
        let channels = cfg.get_u32("channels", default_channels)?;
        let channels = u8::try_from(channels)
            .ok()
            .filter(|c| (1..=4).contains(c))
            .ok_or_else(|| {
                GraphError::config(format!("readback 'channels' must be 1..=4, got {channels}"))
            })?;
        self.native = match self.mode {
            ReadbackMode::Audio => {
                let samples = cfg.get_u32("samplerate", 1024)?;
                if samples == 0 {
                    return Err(GraphError::config("readback 'samplerate' must be positive"));
                }
                ValueFormat::Audio(AudioFormat::new(
                    sample.unwrap_or(SampleType::U16),
                    cfg.get_u32("rate", 48_000)?,
                    channels,
                    samples,
                ))
            }
            ReadbackMode::Video => ValueFormat::Video(VideoFormat {
                size: Size2::new(cfg.get_u32("width", 0)?, cfg.get_u32("height", 0)?),
                channels,
                sample: Some(sample.unwrap_or(SampleType::U8)),
                cubemap: false,
            }),
        };
        tracing::debug!(mode = ?self.mode, native = %self.native, "readback configured");
        Ok(())
    }

    fn sink_count(&self) -> usize {
        1
    }

    fn source_count(&self) -> usize {
        1
    }

    fn sink_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        vec![ValueFormat::any_fbo()]
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        vec![self.native]
    }

    fn negotiate_source_format(&mut self, _ch: usize, fmt: &ValueFormat) -> bool {
        if !accepts_format(&[self.native], fmt) {
            return false;
        }
        self.negotiated = Some(*fmt);
        true
    }

    fn is_ready(&self, ctx: &RenderContext<G>, io: &PacketIo) -> bool {
        io.has_packet(0) || self.pending.is_some_and(|id| ctx.stage_ready(id))
    }

    fn recv(&mut self, ctx: &mut RenderContext<G>, _ch: usize, packet: Packet) -> GraphResult<()> {
        let Payload::Stage(id) = packet.payload else {
            return Err(GraphError::format(format!(
                "readback needs a stage handle, got {}",
                packet.payload.tag()
            )));
        };
        let layout = self.layout();
        if let Some((size, channels)) = Self::expected(&layout)
            && let Some(desc) = ctx.stage(id).map_err(edge_error)?.desc()
            && (desc.size() != size || desc.image.channels != channels)
        {
            return Err(GraphError::format(format!(
                "{id} is {} with {} channels, {layout} reads {size} with {channels}",
                desc.size(),
                desc.image.channels
            )));
        }
        self.pending = Some(id);
        Ok(())
    }

    fn send(
        &mut self,
        ctx: &mut RenderContext<G>,
        _cfg: &TickConfig,
        _ch: usize,
        fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        let fmt = if fmt.is_concrete() { *fmt } else { self.layout() };
        let Some((_, channels)) = Self::expected(&fmt) else {
            return Ok(None);
        };
        let sample = match fmt {
            ValueFormat::Audio(a) => a.sample,
            ValueFormat::Video(v) => v.sample,
            _ => None,
        };
        let (Some(sample), Some(len)) = (sample, fmt.payload_bytes()) else {
            return Ok(None);
        };
        let Some(id) = self.pending else {
            return Ok(None);
        };
        if !ctx.stage_ready(id) {
            return Ok(None);
        }
        // The handle is consumed by this read.
        self.pending = None;

        let mut out = vec![0; len];
        let (gfx, stage) = ctx.stage_with_gfx(id)?;
        stage.read_pixels(gfx, 0, channels, sample, &mut out)?;
        let packet = Packet::bytes(fmt, self.seq, out);
        self.seq += 1;
        tracing::trace!(stage = %id, bytes = len, "readback");
        Ok(Some(packet))
    }

    fn uninitialize(&mut self, _ctx: &mut RenderContext<G>) {
        self.pending = None;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/atoms/readback.rs"]
mod tests;
