use std::f64::consts::TAU;

use crate::atom::{Atom, AtomConfig, Environment, PacketIo, TickConfig};
use crate::context::RenderContext;
use crate::foundation::core::SampleType;
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::negotiate::accepts_format;
use crate::format::{AudioFormat, ValueFormat};
use crate::gfx::Gfx;
use crate::packet::Packet;

/// Sine generator producing interleaved PCM blocks, natively `f32`.
#[derive(Debug)]
pub struct ToneSourceAtom {
    frequency: f64,
    amplitude: f64,
    layout: AudioFormat,
    sample: SampleType,
    position: u64,
    seq: u64,
}

impl Default for ToneSourceAtom {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            amplitude: 0.5,
            layout: AudioFormat::new(SampleType::F32, 48_000, 2, 1024),
            sample: SampleType::F32,
            position: 0,
            seq: 0,
        }
    }
}

impl ToneSourceAtom {
    /// Sample type currently produced.
    pub fn sample(&self) -> SampleType {
        self.sample
    }

    fn offers(&self) -> [ValueFormat; 2] {
        [
            ValueFormat::Audio(self.layout.with_sample(SampleType::F32)),
            ValueFormat::Audio(self.layout.with_sample(SampleType::U16)),
        ]
    }

    /// Next block of `samples` frames, every channel carrying the same value.
    fn block(&mut self) -> Vec<u8> {
        let frames = self.layout.samples as usize;
        let channels = self.layout.channels as usize;
        let rate = self.layout.rate as f64;
        let mut out = Vec::with_capacity(self.sample.byte_len(frames, self.layout.channels));
        for i in 0..frames as u64 {
            let t = (self.position + i) as f64 / rate;
            let v = (self.amplitude * (TAU * self.frequency * t).sin()).clamp(-1.0, 1.0);
            for _ in 0..channels {
                match self.sample {
                    SampleType::F32 => out.extend_from_slice(&(v as f32).to_le_bytes()),
                    SampleType::U16 => {
                        let q = ((v * 0.5 + 0.5) * u16::MAX as f64).round() as u16;
                        out.extend_from_slice(&q.to_le_bytes());
                    }
                    SampleType::U8 => out.push(((v * 0.5 + 0.5) * 255.0).round() as u8),
                }
            }
        }
        self.position += frames as u64;
        out
    }
}

impl<G: Gfx> Atom<G> for ToneSourceAtom {
    fn kind(&self) -> &'static str {
        "tone_source"
    }

    fn initialize(
        &mut self,
        _ctx: &mut RenderContext<G>,
        cfg: &AtomConfig,
        _env: &Environment,
    ) -> GraphResult<()> {
        let defaults = Self::default();
        self.frequency = cfg.get_f64("frequency", defaults.frequency)?;
        self.amplitude = cfg.get_f64("amplitude", defaults.amplitude)?;
        let rate = cfg.get_u32("rate", defaults.layout.rate)?;
        let channels = cfg.get_u32("channels", defaults.layout.channels as u32)?;
        let samples = cfg.get_u32("samples", defaults.layout.samples)?;
        if rate == 0 || samples == 0 || !(1..=4).contains(&channels) {
            return Err(GraphError::config(format!(
                "tone_source needs rate > 0, samples > 0 and 1..=4 channels \
                 (got {rate}, {samples}, {channels})"
            )));
        }
        self.layout = AudioFormat::new(SampleType::F32, rate, channels as u8, samples);
        self.sample = SampleType::F32;
        self.position = 0;
        Ok(())
    }

    fn sink_count(&self) -> usize {
        0
    }

    fn source_count(&self) -> usize {
        1
    }

    fn sink_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        Vec::new()
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        self.offers().to_vec()
    }

    fn negotiate_source_format(&mut self, _ch: usize, fmt: &ValueFormat) -> bool {
        match fmt {
            ValueFormat::Audio(a) if accepts_format(&self.offers(), fmt) => {
                self.sample = a.sample.unwrap_or(SampleType::F32);
                true
            }
            _ => false,
        }
    }

    fn is_ready(&self, _ctx: &RenderContext<G>, _io: &PacketIo) -> bool {
        true
    }

    fn recv(&mut self, _ctx: &mut RenderContext<G>, ch: usize, _packet: Packet) -> GraphResult<()> {
        Err(GraphError::format(format!("tone_source has no sink {ch}")))
    }

    fn send(
        &mut self,
        _ctx: &mut RenderContext<G>,
        _cfg: &TickConfig,
        _ch: usize,
        _fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        let fmt = ValueFormat::Audio(self.layout.with_sample(self.sample));
        let data = self.block();
        let packet = Packet::bytes(fmt, self.seq, data);
        self.seq += 1;
        Ok(Some(packet))
    }

    fn uninitialize(&mut self, _ctx: &mut RenderContext<G>) {}
}

#[cfg(test)]
#[path = "../../tests/unit/atoms/tone_source.rs"]
mod tests;
