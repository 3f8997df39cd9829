use std::sync::Arc;

use crate::atom::{Atom, AtomConfig, Environment, PacketIo, TickConfig};
use crate::atoms::stage_packet;
use crate::context::RenderContext;
use crate::draw::{DrawCommand, parse_commands, replay};
use crate::foundation::core::{Filter, SampleType, Size2, Wrap};
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::{DrawFormat, FboFormat, ValueFormat};
use crate::gfx::{Gfx, TexImage};
use crate::packet::{Packet, Payload};
use crate::stage::StageId;

/// Rasterizes a draw-command list on the CPU and uploads the result into a stage.
#[derive(Debug, Default)]
pub struct DrawReplayAtom {
    size: Size2,
    commands: Option<Arc<[DrawCommand]>>,
    dirty: bool,
    stage: Option<StageId>,
    seq: u64,
}

impl DrawReplayAtom {
    fn redraw<G: Gfx>(&mut self, ctx: &mut RenderContext<G>) -> GraphResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let (Some(commands), Some(id)) = (self.commands.clone(), self.stage) else {
            return Ok(());
        };
        let pixels = replay(self.size, &commands)?;
        let image = TexImage::new_2d(self.size, 4, SampleType::U8);
        let (gfx, stage) = ctx.stage_with_gfx(id)?;
        if stage.is_initialized() {
            stage.read_texture(gfx, image, &pixels)?;
        } else {
            stage.initialize_texture(gfx, image, Some(&pixels), Filter::Linear, Wrap::Clamp)?;
        }
        self.dirty = false;
        tracing::trace!(commands = commands.len(), size = %self.size, "draw list replayed");
        Ok(())
    }
}

impl<G: Gfx> Atom<G> for DrawReplayAtom {
    fn kind(&self) -> &'static str {
        "draw_replay"
    }

    fn initialize(
        &mut self,
        ctx: &mut RenderContext<G>,
        cfg: &AtomConfig,
        _env: &Environment,
    ) -> GraphResult<()> {
        self.size = Size2::new(cfg.get_u32("width", 0)?, cfg.get_u32("height", 0)?);
        if self.size.is_empty() {
            return Err(GraphError::config("draw_replay needs 'width' and 'height'"));
        }
        if let Some(list) = cfg.get("commands") {
            self.commands = Some(parse_commands(list)?.into());
            self.dirty = true;
        }
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
        vec![ValueFormat::Program(DrawFormat::default())]
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        vec![ValueFormat::Fbo(FboFormat {
            size: self.size,
            channels: 4,
            sample: Some(SampleType::U8),
        })]
    }

    fn is_ready(&self, ctx: &RenderContext<G>, io: &PacketIo) -> bool {
        self.dirty || io.has_packet(0) || self.stage.is_some_and(|id| ctx.stage_ready(id))
    }

    fn recv(&mut self, _ctx: &mut RenderContext<G>, _ch: usize, packet: Packet) -> GraphResult<()> {
        match packet.payload {
            Payload::Commands(list) => {
                self.commands = Some(list);
                self.dirty = true;
                Ok(())
            }
            other => Err(GraphError::format(format!(
                "draw_replay needs a command list, got {}",
                other.tag()
            ))),
        }
    }

    fn send(
        &mut self,
        ctx: &mut RenderContext<G>,
        _cfg: &TickConfig,
        _ch: usize,
        _fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        // A rejected list leaves the previous image in place; nothing is emitted this tick.
        if let Err(e) = self.redraw(ctx) {
            tracing::warn!(error = %e, "draw list rejected");
            self.dirty = false;
            return Ok(None);
        }
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
        self.commands = None;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/atoms/draw_replay.rs"]
mod tests;
