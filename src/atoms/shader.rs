use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

use crate::atom::{Atom, AtomConfig, Environment, PacketIo, PostInit, TickConfig};
use crate::atoms::stage_packet;
use crate::context::RenderContext;
use crate::foundation::core::{SampleType, Size2};
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::{FboFormat, ValueFormat};
use crate::gfx::{
    CHANNEL_COUNT, CHANNEL_UNIFORMS, FullscreenQuad, Gfx, ShaderStage, UniformValue, compile_stage,
    link_shaders,
};
use crate::packet::{Packet, Payload, RenderState};
use crate::stage::StageId;

/// Where one shader stage's user code comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ShaderSource {
    Builtin(String),
    File(String),
}

impl ShaderSource {
    fn from_config(cfg: &AtomConfig, stage: &str, default: &str) -> GraphResult<Self> {
        if let Some(path) = cfg.get_str(&format!("shader.{stage}.path"))? {
            return Ok(Self::File(path.to_string()));
        }
        let name = cfg.get_str(&format!("shader.{stage}.name"))?.unwrap_or(default);
        Ok(Self::Builtin(name.to_string()))
    }

    fn user_code<G: Gfx>(&self, stage: ShaderStage) -> GraphResult<String> {
        match self {
            Self::Builtin(name) => G::builtin_user_code(stage, name)
                .map(str::to_string)
                .ok_or_else(|| {
                    GraphError::config(format!(
                        "backend {} has no built-in {stage:?} shader '{name}'",
                        G::KIND.as_str()
                    ))
                }),
            Self::File(path) => Ok(std::fs::read_to_string(Path::new(path))
                .with_context(|| format!("read shader source {path}"))?),
        }
    }
}

/// Renders a full-screen quad through a user program into its own render target.
///
/// Sinks `0..inputs` take stage handles (framebuffers or key textures) bound to `iChannel0..`;
/// the last sink takes an optional render-state packet feeding `iView`/`iProjection`.
pub struct ShaderAtom<G: Gfx> {
    program_name: String,
    inputs: usize,
    size: Size2,
    mix: f32,
    color: [f32; 4],
    vertex: Option<G::Shader>,
    fragment: Option<G::Shader>,
    program: Option<G::Program>,
    uniforms: HashMap<String, G::Uniform>,
    quad: Option<FullscreenQuad<G>>,
    bound: Vec<Option<StageId>>,
    state: RenderState,
    target: Option<StageId>,
    rendered_frame: Option<u64>,
    failure: Option<String>,
    seq: u64,
}

impl<G: Gfx> Default for ShaderAtom<G> {
    fn default() -> Self {
        Self {
            program_name: String::new(),
            inputs: 0,
            size: Size2::default(),
            mix: 0.5,
            color: [1.0, 1.0, 1.0, 1.0],
            vertex: None,
            fragment: None,
            program: None,
            uniforms: HashMap::new(),
            quad: None,
            bound: Vec::new(),
            state: RenderState::default(),
            target: None,
            rendered_frame: None,
            failure: None,
            seq: 0,
        }
    }
}

impl<G: Gfx> ShaderAtom<G> {
    /// Compile or link failure that disabled this node's output.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Uniform names the linked program declares.
    pub fn uniform_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.uniforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn target(&self) -> Option<StageId> {
        self.target
    }

    fn state_channel(&self) -> usize {
        self.inputs
    }

    fn disable(&mut self, gfx: &G, err: impl std::fmt::Display) {
        let detail = gfx.last_error().map(str::to_string);
        let msg = match detail {
            Some(log) => format!("{err}: {log}"),
            None => err.to_string(),
        };
        tracing::error!(program = %self.program_name, error = %msg, "shader disabled");
        self.failure = Some(msg);
    }

    fn compile(&mut self, gfx: &mut G, stage: ShaderStage, source: &ShaderSource) -> GraphResult<()> {
        let code = source.user_code::<G>(stage)?;
        match compile_stage(gfx, stage, &code) {
            Ok(shader) => {
                match stage {
                    ShaderStage::Vertex => self.vertex = Some(shader),
                    ShaderStage::Fragment => self.fragment = Some(shader),
                }
                Ok(())
            }
            Err(e) => {
                self.disable(gfx, e);
                Ok(())
            }
        }
    }

    fn link(&mut self, gfx: &mut G) -> GraphResult<()> {
        let (Some(vs), Some(fs)) = (self.vertex.take(), self.fragment.take()) else {
            return Ok(());
        };
        let linked = link_shaders(gfx, &[&vs, &fs]);
        gfx.delete_shader(vs);
        gfx.delete_shader(fs);
        let program = match linked {
            Ok(p) => p,
            Err(e) => {
                self.disable(gfx, e);
                return Ok(());
            }
        };
        self.uniforms = gfx
            .active_uniforms(&program)
            .into_iter()
            .filter_map(|name| {
                let loc = gfx.uniform_location(&program, &name)?;
                Some((name, loc))
            })
            .collect();
        tracing::debug!(
            program = %self.program_name,
            uniforms = self.uniforms.len(),
            "shader linked"
        );
        self.quad = Some(FullscreenQuad::new(gfx)?);
        self.program = Some(program);
        Ok(())
    }

    fn target_size(&self, ctx: &RenderContext<G>) -> Option<Size2> {
        if !self.size.is_empty() {
            return Some(self.size);
        }
        let id = self.bound.first().copied().flatten()?;
        ctx.stage(id).ok()?.desc().map(|d| d.size())
    }

    fn set(&self, gfx: &mut G, name: &str, value: UniformValue) {
        if let Some(loc) = self.uniforms.get(name) {
            gfx.set_uniform(loc, value);
        }
    }

    fn render(&mut self, ctx: &mut RenderContext<G>, cfg: &TickConfig) -> GraphResult<()> {
        if self.rendered_frame == Some(cfg.frame) {
            return Ok(());
        }
        let (Some(program), Some(quad), Some(target)) = (&self.program, &self.quad, self.target)
        else {
            return Ok(());
        };
        let Some(size) = self.target_size(ctx) else {
            return Ok(());
        };

        {
            let (gfx, stage) = ctx.stage_with_gfx(target)?;
            if !stage.is_initialized() {
                stage.initialize_render_target(gfx, size, 4, SampleType::U8, false)?;
            }
            stage.bind_target(gfx, 0)?;
            gfx.clear([0.0, 0.0, 0.0, 0.0]);
            gfx.clear_buffers(true, false);
            gfx.use_program(program);
        }

        for (unit, input) in self.bound.iter().enumerate() {
            if let Some(id) = input
                && ctx.stage_ready(*id)
            {
                let (gfx, stage) = ctx.stage_with_gfx(*id)?;
                stage.bind_input(gfx, unit as u32)?;
            }
        }

        let gfx = &mut ctx.gfx;
        let size_f = [size.w as f32, size.h as f32, 1.0];
        self.set(gfx, "iResolution", UniformValue::F3(size_f));
        self.set(gfx, "iTime", UniformValue::F1(cfg.time as f32));
        self.set(gfx, "iTimeDelta", UniformValue::F1(cfg.delta as f32));
        self.set(gfx, "iFrame", UniformValue::I1(cfg.frame as i32));
        self.set(gfx, "iMix", UniformValue::F1(self.mix));
        self.set(gfx, "iColor", UniformValue::F4(self.color));
        self.set(gfx, "iView", UniformValue::Mat4(self.state.view));
        self.set(gfx, "iProjection", UniformValue::Mat4(self.state.projection));
        for (unit, name) in CHANNEL_UNIFORMS.iter().enumerate().take(self.inputs.max(1)) {
            self.set(gfx, name, UniformValue::I1(unit as i32));
        }

        let drawn = quad.draw(gfx);
        gfx.unbind_framebuffer();
        drawn?;
        self.rendered_frame = Some(cfg.frame);
        tracing::trace!(program = %self.program_name, frame = cfg.frame, "shader rendered");
        Ok(())
    }
}

impl<G: Gfx> Atom<G> for ShaderAtom<G> {
    fn kind(&self) -> &'static str {
        "shader"
    }

    #[tracing::instrument(level = "debug", skip_all, fields(program))]
    fn initialize(
        &mut self,
        ctx: &mut RenderContext<G>,
        cfg: &AtomConfig,
        _env: &Environment,
    ) -> GraphResult<()> {
        self.program_name = cfg.get_str("program")?.unwrap_or("shader").to_string();
        tracing::Span::current().record("program", self.program_name.as_str());

        let inputs = cfg.get_u32("inputs", 0)? as usize;
        if inputs > CHANNEL_COUNT {
            return Err(GraphError::config(format!(
                "shader takes at most {CHANNEL_COUNT} inputs, got {inputs}"
            )));
        }
        self.inputs = inputs;
        self.bound = vec![None; inputs];
        self.size = Size2::new(cfg.get_u32("width", 0)?, cfg.get_u32("height", 0)?);
        if self.size.is_empty() && inputs == 0 {
            return Err(GraphError::config(
                "shader without inputs needs 'width' and 'height'",
            ));
        }
        self.mix = cfg.get_f64("mix", 0.5)? as f32;
        if let Some(v) = cfg.get("color") {
            self.color = serde_json::from_value(v.clone())
                .map_err(|e| GraphError::config(format!("shader 'color': {e}")))?;
        }

        let vtx = ShaderSource::from_config(cfg, "vtx", "passthrough")?;
        let frag = ShaderSource::from_config(cfg, "frag", "default")?;
        self.compile(&mut ctx.gfx, ShaderStage::Vertex, &vtx)?;
        if self.failure.is_none() {
            self.compile(&mut ctx.gfx, ShaderStage::Fragment, &frag)?;
        }
        self.target = Some(ctx.create_stage(false));
        Ok(())
    }

    fn sink_count(&self) -> usize {
        self.inputs + 1
    }

    fn source_count(&self) -> usize {
        1
    }

    fn sink_formats(&self, ch: usize) -> Vec<ValueFormat> {
        if ch == self.state_channel() {
            vec![ValueFormat::State]
        } else {
            vec![ValueFormat::any_fbo(), ValueFormat::Keyboard]
        }
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        vec![ValueFormat::Fbo(FboFormat {
            size: self.size,
            channels: 4,
            sample: Some(SampleType::U8),
        })]
    }

    fn post_initialize(
        &mut self,
        ctx: &mut RenderContext<G>,
        _post: &mut PostInit,
    ) -> GraphResult<()> {
        self.link(&mut ctx.gfx)
    }

    fn is_ready(&self, ctx: &RenderContext<G>, io: &PacketIo) -> bool {
        if self.program.is_none() {
            return false;
        }
        (0..self.inputs).all(|ch| {
            !io.is_connected(ch)
                || io.has_packet(ch)
                || self.bound[ch].is_some_and(|id| ctx.stage_ready(id))
        })
    }

    fn recv(&mut self, _ctx: &mut RenderContext<G>, ch: usize, packet: Packet) -> GraphResult<()> {
        match packet.payload {
            Payload::Stage(id) if ch < self.inputs => {
                self.bound[ch] = Some(id);
                Ok(())
            }
            Payload::State(state) if ch == self.state_channel() => {
                self.state = state;
                Ok(())
            }
            other => Err(GraphError::format(format!(
                "shader sink {ch} cannot take a {} payload",
                other.tag()
            ))),
        }
    }

    fn send(
        &mut self,
        ctx: &mut RenderContext<G>,
        cfg: &TickConfig,
        _ch: usize,
        _fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        self.render(ctx, cfg)?;
        let packet = stage_packet(ctx, self.target, self.seq);
        if packet.is_some() {
            self.seq += 1;
        }
        Ok(packet)
    }

    fn finalize(&mut self, ctx: &mut RenderContext<G>, cfg: &TickConfig) -> GraphResult<()> {
        self.render(ctx, cfg)
    }

    fn owns_render_targets(&self) -> bool {
        true
    }

    fn uninitialize(&mut self, ctx: &mut RenderContext<G>) {
        let gfx = &mut ctx.gfx;
        if let Some(s) = self.vertex.take() {
            gfx.delete_shader(s);
        }
        if let Some(s) = self.fragment.take() {
            gfx.delete_shader(s);
        }
        if let Some(p) = self.program.take() {
            gfx.delete_program(p);
        }
        if let Some(q) = self.quad.take() {
            q.release(gfx);
        }
        self.uniforms.clear();
        if let Some(id) = self.target.take() {
            ctx.release_stage(id);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/atoms/shader.rs"]
mod tests;
