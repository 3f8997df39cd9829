use crate::atom::{Atom, AtomConfig, Environment, PacketIo, PostInit, TickConfig};
use crate::context::RenderContext;
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::ValueFormat;
use crate::gfx::{FullscreenQuad, Gfx, UniformValue, builtin_program};
use crate::packet::{Packet, Payload};
use crate::stage::StageId;

/// Screen sink: blits the received stage to the default framebuffer and presents it.
pub struct PresentAtom<G: Gfx> {
    program: Option<G::Program>,
    channel: Option<G::Uniform>,
    resolution: Option<G::Uniform>,
    quad: Option<FullscreenQuad<G>>,
    source: Option<StageId>,
    clear: [f32; 4],
    presented: u64,
}

impl<G: Gfx> Default for PresentAtom<G> {
    fn default() -> Self {
        Self {
            program: None,
            channel: None,
            resolution: None,
            quad: None,
            source: None,
            clear: [0.0, 0.0, 0.0, 1.0],
            presented: 0,
        }
    }
}

impl<G: Gfx> PresentAtom<G> {
    /// Frames handed to `activate_next_frame` so far.
    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl<G: Gfx> Atom<G> for PresentAtom<G> {
    fn kind(&self) -> &'static str {
        "present"
    }

    fn initialize(
        &mut self,
        _ctx: &mut RenderContext<G>,
        cfg: &AtomConfig,
        _env: &Environment,
    ) -> GraphResult<()> {
        if let Some(v) = cfg.get("clear") {
            self.clear = serde_json::from_value(v.clone())
                .map_err(|e| GraphError::config(format!("present 'clear': {e}")))?;
        }
        Ok(())
    }

    fn sink_count(&self) -> usize {
        1
    }

    fn source_count(&self) -> usize {
        0
    }

    fn sink_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        vec![ValueFormat::any_fbo()]
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        Vec::new()
    }

    fn post_initialize(
        &mut self,
        ctx: &mut RenderContext<G>,
        _post: &mut PostInit,
    ) -> GraphResult<()> {
        let gfx = &mut ctx.gfx;
        let program = builtin_program(gfx, "passthrough", "copy")?;
        self.channel = gfx.uniform_location(&program, "iChannel0");
        self.resolution = gfx.uniform_location(&program, "iResolution");
        self.quad = Some(FullscreenQuad::new(gfx)?);
        self.program = Some(program);
        Ok(())
    }

    fn is_ready(&self, ctx: &RenderContext<G>, io: &PacketIo) -> bool {
        self.program.is_some()
            && (io.has_packet(0) || self.source.is_some_and(|id| ctx.stage_ready(id)))
    }

    fn recv(&mut self, _ctx: &mut RenderContext<G>, _ch: usize, packet: Packet) -> GraphResult<()> {
        match packet.payload {
            Payload::Stage(id) => {
                self.source = Some(id);
                Ok(())
            }
            other => Err(GraphError::format(format!(
                "present needs a stage handle, got {}",
                other.tag()
            ))),
        }
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

    fn finalize(&mut self, ctx: &mut RenderContext<G>, cfg: &TickConfig) -> GraphResult<()> {
        let (Some(program), Some(quad), Some(id)) = (&self.program, &self.quad, self.source) else {
            return Ok(());
        };
        if ctx.stage(id)?.desc().is_none() {
            return Ok(());
        }
        let (gfx, stage) = ctx.stage_with_gfx(id)?;
        gfx.bind_framebuffer_default();
        // Viewport and iResolution both span the window, so uv covers the stage once and the
        // stage is scaled to fit.
        let target = gfx.default_size();
        gfx.set_viewport((0, 0), target);
        gfx.set_depth_test(false);
        gfx.clear(self.clear);
        gfx.clear_buffers(true, true);
        gfx.use_program(program);
        stage.bind_input(gfx, 0)?;
        if let Some(loc) = &self.channel {
            gfx.set_uniform(loc, UniformValue::I1(0));
        }
        if let Some(loc) = &self.resolution {
            gfx.set_uniform(loc, UniformValue::F3([target.w as f32, target.h as f32, 1.0]));
        }
        quad.draw(gfx)?;
        gfx.activate_next_frame();
        self.presented += 1;
        tracing::trace!(frame = cfg.frame, source = %id, "presented");
        Ok(())
    }

    fn uninitialize(&mut self, ctx: &mut RenderContext<G>) {
        let gfx = &mut ctx.gfx;
        if let Some(p) = self.program.take() {
            gfx.delete_program(p);
        }
        if let Some(q) = self.quad.take() {
            q.release(gfx);
        }
        self.channel = None;
        self.resolution = None;
        self.source = None;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/atoms/present.rs"]
mod tests;
