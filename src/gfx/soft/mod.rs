//! Software rasterizer backend.
//!
//! All resources live in slabs inside [`SoftGfx`]; handles are copyable ids. Texture 0 and
//! framebuffer 0 form the default framebuffer, sized at construction.

pub(crate) mod raster;
pub(crate) mod shaders;

use crate::foundation::core::{Filter, SampleType, Size2, Wrap};
use crate::foundation::error::{GfxError, GfxResult};
use crate::gfx::slab::Slab;
use crate::gfx::{
    CHANNEL_COUNT, Gfx, GfxKind, ShaderStage, TexImage, TexKind, TexTarget, UniformValue, Vertex,
};
use raster::{ClipVertex, RasterState, RenderTarget, TexView};
use shaders::{Builtin, FragmentBuiltin, FrameUniforms, ShadeEnv, VertexBuiltin};

macro_rules! soft_handle {
    ($($(#[$m:meta])* $name:ident;)*) => {
        $(
            $(#[$m])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub(crate) u32);
        )*
    };
}

soft_handle! {
    /// Texture id. Id 0 is the default framebuffer color buffer.
    SoftTexture;
    SoftRenderbuffer;
    /// Framebuffer id. Id 0 is the default framebuffer.
    SoftFramebuffer;
    SoftShader;
    SoftProgram;
    SoftVertexArray;
    SoftVertexBuffer;
    SoftElementBuffer;
}

/// Uniform handle: program id plus slot in that program's uniform table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoftUniform {
    program: u32,
    slot: u32,
}

#[derive(Default)]
struct TexData {
    kind: Option<TexKind>,
    image: Option<TexImage>,
    /// 1 for 2D, depth for 3D, 6 for cubemaps.
    layers: u32,
    data: Vec<u8>,
    filter: Filter,
    wrap: Wrap,
}

impl TexData {
    fn layer_bytes(&self) -> usize {
        self.image
            .map(|i| i.sample.byte_len(i.size.size2().area(), i.channels))
            .unwrap_or(0)
    }

    fn layer(&self, layer: u32) -> Option<&[u8]> {
        let n = self.layer_bytes();
        let at = layer as usize * n;
        self.data.get(at..at + n)
    }

    fn view(&self, layer: u32) -> Option<TexView<'_>> {
        let image = self.image?;
        Some(TexView {
            data: self.layer(layer)?,
            size: image.size.size2(),
            channels: image.channels,
            sample: image.sample,
            filter: self.filter,
            wrap: self.wrap,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Attachment {
    tex: u32,
    layer: u32,
}

#[derive(Default)]
struct FramebufferData {
    color: Option<Attachment>,
    depth: Option<u32>,
}

struct RenderbufferData {
    size: Size2,
    depth: Vec<f32>,
}

struct ShaderData {
    stage: ShaderStage,
    source: String,
    compiled: Option<Builtin>,
}

#[derive(Default)]
struct ProgramData {
    attached: Vec<u32>,
    vertex: Option<VertexBuiltin>,
    fragment: Option<FragmentBuiltin>,
    linked: bool,
    uniforms: Vec<(&'static str, Option<UniformValue>)>,
}

#[derive(Default)]
struct VertexArrayData {
    vbo: Option<u32>,
    ebo: Option<u32>,
}

/// CPU implementation of [`Gfx`].
pub struct SoftGfx {
    size: Size2,
    textures: Slab<TexData>,
    framebuffers: Slab<FramebufferData>,
    renderbuffers: Slab<RenderbufferData>,
    shaders: Slab<ShaderData>,
    programs: Slab<ProgramData>,
    vertex_arrays: Slab<VertexArrayData>,
    vertex_buffers: Slab<Vec<Vertex>>,
    element_buffers: Slab<Vec<u32>>,

    units: [Option<u32>; CHANNEL_COUNT],
    active_unit: usize,
    rw_texture: Option<u32>,
    draw_fb: u32,
    read_fb: u32,
    program: Option<u32>,
    vao: Option<u32>,
    viewport: Option<(u32, u32, Size2)>,
    clear_color: [f32; 4],
    depth_test: bool,
    cull_back: bool,

    last_error: Option<String>,
    presented: Option<Vec<u8>>,
    frames: u64,
    geometry_budget: Option<usize>,
}

impl SoftGfx {
    /// Create a context whose default framebuffer is `size` RGBA8 with a depth buffer.
    pub fn new(size: Size2) -> Self {
        let mut textures = Slab::new();
        let image = TexImage::new_2d(size, 4, SampleType::U8);
        textures.insert(TexData {
            kind: Some(TexKind::Tex2D),
            image: Some(image),
            layers: 1,
            data: vec![0; image.byte_len()],
            ..TexData::default()
        });
        let mut renderbuffers = Slab::new();
        let depth = renderbuffers.insert(RenderbufferData {
            size,
            depth: vec![1.0; size.area()],
        });
        let mut framebuffers = Slab::new();
        framebuffers.insert(FramebufferData {
            color: Some(Attachment { tex: 0, layer: 0 }),
            depth: Some(depth),
        });
        Self {
            size,
            textures,
            framebuffers,
            renderbuffers,
            shaders: Slab::new(),
            programs: Slab::new(),
            vertex_arrays: Slab::new(),
            vertex_buffers: Slab::new(),
            element_buffers: Slab::new(),
            units: [None; CHANNEL_COUNT],
            active_unit: 0,
            rw_texture: None,
            draw_fb: 0,
            read_fb: 0,
            program: None,
            vao: None,
            viewport: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            depth_test: false,
            cull_back: false,
            last_error: None,
            presented: None,
            frames: 0,
            geometry_budget: None,
        }
    }

    /// Default framebuffer bytes captured by the last `activate_next_frame`.
    pub fn presented_frame(&self) -> Option<&[u8]> {
        self.presented.as_deref()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    /// Raw bytes of a texture (all layers).
    pub fn texture_bytes(&self, tex: &SoftTexture) -> Option<&[u8]> {
        self.textures.get(tex.0).map(|t| t.data.as_slice())
    }

    /// Live texture count, including the default color buffer.
    pub fn live_textures(&self) -> usize {
        self.textures.live()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.live()
    }

    /// Live vertex arrays plus vertex and element buffers.
    pub fn live_geometry(&self) -> usize {
        self.vertex_arrays.live() + self.vertex_buffers.live() + self.element_buffers.live()
    }

    /// Cap the number of live geometry objects. Allocating past the cap fails the way an
    /// exhausted device does.
    pub fn set_geometry_budget(&mut self, budget: Option<usize>) {
        self.geometry_budget = budget;
    }

    fn reserve_geometry(&mut self) -> GfxResult<()> {
        match self.geometry_budget {
            Some(max) if self.live_geometry() >= max => {
                Err(self.fail(GfxError::resource(format!("geometry budget of {max} exhausted"))))
            }
            _ => Ok(()),
        }
    }

    fn fail(&mut self, err: GfxError) -> GfxError {
        self.last_error = Some(err.to_string());
        err
    }

    fn color_target(&self, fb: u32) -> GfxResult<(Attachment, TexImage)> {
        let att = self
            .framebuffers
            .get(fb)
            .and_then(|f| f.color)
            .ok_or_else(|| GfxError::invalid_handle(format!("framebuffer {fb} has no color attachment")))?;
        let image = self
            .textures
            .get(att.tex)
            .and_then(|t| t.image)
            .ok_or_else(|| GfxError::resource(format!("texture {} has no storage", att.tex)))?;
        Ok((att, image))
    }

    fn assemble(&self, count: u32) -> GfxResult<(Vec<[ClipVertex; 3]>, FragmentBuiltin, FrameUniforms)> {
        let pid = self
            .program
            .ok_or_else(|| GfxError::invalid_handle("no program in use"))?;
        let program = self
            .programs
            .get(pid)
            .filter(|p| p.linked)
            .ok_or_else(|| GfxError::invalid_handle(format!("program {pid} is not linked")))?;
        let (Some(vertex), Some(fragment)) = (program.vertex, program.fragment) else {
            return Err(GfxError::invalid_handle(format!("program {pid} is incomplete")));
        };
        let vao = self
            .vao
            .and_then(|id| self.vertex_arrays.get(id))
            .ok_or_else(|| GfxError::invalid_handle("no vertex array bound"))?;
        let vertices = vao
            .vbo
            .and_then(|id| self.vertex_buffers.get(id))
            .ok_or_else(|| GfxError::invalid_handle("vertex array has no vertex buffer"))?;
        let indices = vao
            .ebo
            .and_then(|id| self.element_buffers.get(id))
            .ok_or_else(|| GfxError::invalid_handle("vertex array has no element buffer"))?;
        let count = (count as usize).min(indices.len());

        let uniforms = FrameUniforms::from_slots(&program.uniforms);
        let shaded: Vec<ClipVertex> = vertices
            .iter()
            .map(|v| ClipVertex {
                position: vertex.run(v.position, &uniforms),
                uv: v.tex_coord,
            })
            .collect();
        let mut tris = Vec::with_capacity(count / 3);
        for idx in indices[..count - count % 3].chunks_exact(3) {
            let fetch = |i: u32| {
                shaded
                    .get(i as usize)
                    .copied()
                    .ok_or_else(|| GfxError::resource(format!("index {i} out of range")))
            };
            tris.push([fetch(idx[0])?, fetch(idx[1])?, fetch(idx[2])?]);
        }
        Ok((tris, fragment, uniforms))
    }
}

impl Gfx for SoftGfx {
    const KIND: GfxKind = GfxKind::Soft;
    const BUILTIN_SHADERS: bool = true;

    type ColorBuffer = SoftTexture;
    type DepthBuffer = SoftRenderbuffer;
    type FrameBuffer = SoftFramebuffer;
    type Shader = SoftShader;
    type Program = SoftProgram;
    type Uniform = SoftUniform;
    type VertexArray = SoftVertexArray;
    type VertexBuffer = SoftVertexBuffer;
    type ElementBuffer = SoftElementBuffer;

    fn shader_template(stage: ShaderStage) -> &'static str {
        match stage {
            ShaderStage::Vertex => shaders::VERTEX_TEMPLATE,
            ShaderStage::Fragment => shaders::FRAGMENT_TEMPLATE,
        }
    }

    fn builtin_user_code(stage: ShaderStage, name: &str) -> Option<&'static str> {
        shaders::user_code(stage, name)
    }

    fn create_shader(&mut self, stage: ShaderStage) -> GfxResult<SoftShader> {
        Ok(SoftShader(self.shaders.insert(ShaderData {
            stage,
            source: String::new(),
            compiled: None,
        })))
    }

    fn shader_source(&mut self, shader: &SoftShader, source: &str) {
        if let Some(s) = self.shaders.get_mut(shader.0) {
            s.source = source.to_string();
            s.compiled = None;
        }
    }

    fn compile_shader(&mut self, shader: &SoftShader) -> GfxResult<()> {
        let Some(s) = self.shaders.get_mut(shader.0) else {
            let err = GfxError::invalid_handle(format!("shader {}", shader.0));
            return Err(self.fail(err));
        };
        match shaders::parse_source(s.stage, &s.source) {
            Ok(builtin) => {
                s.compiled = Some(builtin);
                Ok(())
            }
            Err(log) => {
                let err = GfxError::Compile {
                    stage: s.stage,
                    log,
                };
                Err(self.fail(err))
            }
        }
    }

    fn delete_shader(&mut self, shader: SoftShader) {
        self.shaders.remove(shader.0);
    }

    fn create_program(&mut self) -> GfxResult<SoftProgram> {
        Ok(SoftProgram(self.programs.insert(ProgramData::default())))
    }

    fn attach_shader(&mut self, program: &SoftProgram, shader: &SoftShader) {
        if let Some(p) = self.programs.get_mut(program.0) {
            p.attached.push(shader.0);
        }
    }

    fn link_program(&mut self, program: &SoftProgram) -> GfxResult<()> {
        let attached = match self.programs.get(program.0) {
            Some(p) => p.attached.clone(),
            None => {
                let err = GfxError::invalid_handle(format!("program {}", program.0));
                return Err(self.fail(err));
            }
        };
        let mut vertex = None;
        let mut fragment = None;
        for id in attached {
            match self.shaders.get(id).and_then(|s| s.compiled) {
                Some(Builtin::Vertex(v)) => vertex = Some(v),
                Some(Builtin::Fragment(f)) => fragment = Some(f),
                None => {
                    let err = GfxError::Link(format!("shader {id} is not compiled"));
                    return Err(self.fail(err));
                }
            }
        }
        let (Some(vertex), Some(fragment)) = (vertex, fragment) else {
            let err = GfxError::Link("program needs a vertex and a fragment shader".to_string());
            return Err(self.fail(err));
        };
        let mut uniforms: Vec<(&'static str, Option<UniformValue>)> = Vec::new();
        for name in Builtin::Vertex(vertex)
            .uniforms()
            .iter()
            .chain(Builtin::Fragment(fragment).uniforms())
        {
            if !uniforms.iter().any(|(n, _)| n == name) {
                uniforms.push((*name, None));
            }
        }
        if let Some(p) = self.programs.get_mut(program.0) {
            p.vertex = Some(vertex);
            p.fragment = Some(fragment);
            p.uniforms = uniforms;
            p.linked = true;
        }
        Ok(())
    }

    fn use_program(&mut self, program: &SoftProgram) {
        self.program = Some(program.0);
    }

    fn delete_program(&mut self, program: SoftProgram) {
        if self.program == Some(program.0) {
            self.program = None;
        }
        self.programs.remove(program.0);
    }

    fn active_uniforms(&self, program: &SoftProgram) -> Vec<String> {
        self.programs
            .get(program.0)
            .map(|p| p.uniforms.iter().map(|(n, _)| n.to_string()).collect())
            .unwrap_or_default()
    }

    fn uniform_location(&self, program: &SoftProgram, name: &str) -> Option<SoftUniform> {
        let p = self.programs.get(program.0)?;
        let slot = p.uniforms.iter().position(|(n, _)| *n == name)?;
        Some(SoftUniform {
            program: program.0,
            slot: slot as u32,
        })
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn gen_texture(&mut self) -> GfxResult<SoftTexture> {
        Ok(SoftTexture(self.textures.insert(TexData::default())))
    }

    fn active_texture(&mut self, unit: u32) {
        self.active_unit = (unit as usize).min(CHANNEL_COUNT - 1);
    }

    fn bind_texture_ro(&mut self, _kind: TexKind, tex: &SoftTexture) {
        self.units[self.active_unit] = Some(tex.0);
    }

    fn bind_texture_rw(&mut self, _kind: TexKind, tex: &SoftTexture) {
        self.rw_texture = Some(tex.0);
    }

    fn unbind_texture(&mut self, _kind: TexKind) {
        self.rw_texture = None;
        self.units[self.active_unit] = None;
    }

    fn set_texture(
        &mut self,
        target: TexTarget,
        image: &TexImage,
        data: Option<&[u8]>,
    ) -> GfxResult<()> {
        let id = self
            .rw_texture
            .ok_or_else(|| GfxError::invalid_handle("no texture bound for writing"))?;
        let tex = self
            .textures
            .get_mut(id)
            .ok_or_else(|| GfxError::invalid_handle(format!("texture {id}")))?;

        let (layers, layer) = match target {
            TexTarget::Tex2D => (1, 0),
            TexTarget::Tex3D => (image.size.d.max(1), 0),
            TexTarget::CubeFace(f) if f < 6 => (6, f as u32),
            TexTarget::CubeFace(f) => {
                return Err(GfxError::resource(format!("cube face {f} out of range")));
            }
        };
        let mut layout = *image;
        if target != TexTarget::Tex3D {
            layout.size.d = 0;
        }
        let layer_bytes = layout.sample.byte_len(layout.size.size2().area(), layout.channels);
        let upload_len = if target == TexTarget::Tex3D {
            layer_bytes * layers as usize
        } else {
            layer_bytes
        };
        if let Some(d) = data
            && d.len() != upload_len
        {
            return Err(GfxError::resource(format!(
                "texture upload of {} bytes, expected {upload_len}",
                d.len()
            )));
        }

        let kind = target.kind();
        let reuse = tex.kind == Some(kind) && tex.image == Some(layout) && tex.layers == layers;
        if !reuse {
            tex.kind = Some(kind);
            tex.image = Some(layout);
            tex.layers = layers;
            tex.data = vec![0; layer_bytes * layers as usize];
        }
        let at = layer as usize * layer_bytes;
        let dst = &mut tex.data[at..at + upload_len];
        match data {
            Some(d) => dst.copy_from_slice(d),
            None if reuse => dst.fill(0),
            None => {}
        }
        Ok(())
    }

    fn tex_parameters(&mut self, _kind: TexKind, filter: Filter, wrap: Wrap) {
        if let Some(t) = self.rw_texture.and_then(|id| self.textures.get_mut(id)) {
            t.filter = filter;
            t.wrap = wrap;
        }
    }

    fn generate_mipmap(&mut self, _kind: TexKind) {
        // Single-level textures; `Filter::Mipmap` samples linearly.
    }

    fn delete_texture(&mut self, tex: SoftTexture) {
        if tex.0 == 0 {
            return;
        }
        self.units.iter_mut().filter(|u| **u == Some(tex.0)).for_each(|u| *u = None);
        if self.rw_texture == Some(tex.0) {
            self.rw_texture = None;
        }
        self.textures.remove(tex.0);
    }

    fn create_framebuffer(&mut self) -> GfxResult<SoftFramebuffer> {
        Ok(SoftFramebuffer(
            self.framebuffers.insert(FramebufferData::default()),
        ))
    }

    fn bind_framebuffer(&mut self, fb: &SoftFramebuffer) {
        self.draw_fb = fb.0;
    }

    fn bind_framebuffer_ro(&mut self, fb: &SoftFramebuffer) {
        self.read_fb = fb.0;
    }

    fn bind_framebuffer_default(&mut self) {
        self.draw_fb = 0;
        self.read_fb = 0;
    }

    fn unbind_framebuffer(&mut self) {
        self.bind_framebuffer_default();
    }

    fn framebuffer_texture_2d(&mut self, target: TexTarget, tex: &SoftTexture) -> GfxResult<()> {
        let layer = match target {
            TexTarget::Tex2D => 0,
            TexTarget::CubeFace(f) if f < 6 => f as u32,
            other => {
                return Err(GfxError::unsupported(format!("{other:?} color attachment")));
            }
        };
        if self.draw_fb == 0 {
            return Err(GfxError::invalid_handle("cannot re-attach the default framebuffer"));
        }
        let fb = self
            .framebuffers
            .get_mut(self.draw_fb)
            .ok_or_else(|| GfxError::invalid_handle("bound framebuffer"))?;
        fb.color = Some(Attachment { tex: tex.0, layer });
        Ok(())
    }

    fn create_renderbuffer(&mut self) -> GfxResult<SoftRenderbuffer> {
        Ok(SoftRenderbuffer(self.renderbuffers.insert(RenderbufferData {
            size: Size2::default(),
            depth: Vec::new(),
        })))
    }

    fn renderbuffer_storage(&mut self, rb: &SoftRenderbuffer, size: Size2) -> GfxResult<()> {
        let r = self
            .renderbuffers
            .get_mut(rb.0)
            .ok_or_else(|| GfxError::invalid_handle(format!("renderbuffer {}", rb.0)))?;
        r.size = size;
        r.depth = vec![1.0; size.area()];
        Ok(())
    }

    fn framebuffer_renderbuffer(&mut self, rb: &SoftRenderbuffer) -> GfxResult<()> {
        if self.renderbuffers.get(rb.0).is_none() {
            return Err(GfxError::invalid_handle(format!("renderbuffer {}", rb.0)));
        }
        let fb = self
            .framebuffers
            .get_mut(self.draw_fb)
            .ok_or_else(|| GfxError::invalid_handle("bound framebuffer"))?;
        fb.depth = Some(rb.0);
        Ok(())
    }

    fn framebuffer_complete(&self) -> bool {
        let Ok((_, image)) = self.color_target(self.draw_fb) else {
            return false;
        };
        match self.framebuffers.get(self.draw_fb).and_then(|f| f.depth) {
            Some(rb) => self
                .renderbuffers
                .get(rb)
                .is_some_and(|r| r.size == image.size.size2()),
            None => true,
        }
    }

    fn delete_framebuffer(&mut self, fb: SoftFramebuffer) {
        if fb.0 == 0 {
            return;
        }
        if self.draw_fb == fb.0 {
            self.draw_fb = 0;
        }
        if self.read_fb == fb.0 {
            self.read_fb = 0;
        }
        self.framebuffers.remove(fb.0);
    }

    fn delete_renderbuffer(&mut self, rb: SoftRenderbuffer) {
        self.renderbuffers.remove(rb.0);
    }

    fn read_pixels(
        &mut self,
        origin: (u32, u32),
        size: Size2,
        channels: u8,
        sample: SampleType,
        out: &mut [u8],
    ) -> GfxResult<()> {
        let (att, image) = self.color_target(self.read_fb)?;
        let src_size = image.size.size2();
        if origin.0 + size.w > src_size.w || origin.1 + size.h > src_size.h {
            return Err(GfxError::resource(format!(
                "read of {size} at {origin:?} exceeds {src_size}"
            )));
        }
        let expected = sample.byte_len(size.area(), channels);
        if out.len() != expected {
            return Err(GfxError::resource(format!(
                "read buffer is {} bytes, expected {expected}",
                out.len()
            )));
        }
        let src = self
            .textures
            .get(att.tex)
            .and_then(|t| t.layer(att.layer))
            .ok_or_else(|| GfxError::resource("attachment layer missing"))?;
        raster::read_region(
            src,
            src_size,
            image.channels,
            image.sample,
            origin,
            size,
            channels,
            sample,
            out,
        );
        Ok(())
    }

    fn gen_vertex_array(&mut self) -> GfxResult<SoftVertexArray> {
        self.reserve_geometry()?;
        Ok(SoftVertexArray(
            self.vertex_arrays.insert(VertexArrayData::default()),
        ))
    }

    fn gen_vertex_buffer(&mut self) -> GfxResult<SoftVertexBuffer> {
        self.reserve_geometry()?;
        Ok(SoftVertexBuffer(self.vertex_buffers.insert(Vec::new())))
    }

    fn gen_element_buffer(&mut self) -> GfxResult<SoftElementBuffer> {
        self.reserve_geometry()?;
        Ok(SoftElementBuffer(self.element_buffers.insert(Vec::new())))
    }

    fn bind_vertex_array(&mut self, vao: &SoftVertexArray) {
        self.vao = Some(vao.0);
    }

    fn vertex_buffer_data(&mut self, vbo: &SoftVertexBuffer, vertices: &[Vertex]) -> GfxResult<()> {
        let buf = self
            .vertex_buffers
            .get_mut(vbo.0)
            .ok_or_else(|| GfxError::invalid_handle(format!("vertex buffer {}", vbo.0)))?;
        *buf = vertices.to_vec();
        if let Some(vao) = self.vao.and_then(|id| self.vertex_arrays.get_mut(id)) {
            vao.vbo = Some(vbo.0);
        }
        Ok(())
    }

    fn element_buffer_data(&mut self, ebo: &SoftElementBuffer, indices: &[u32]) -> GfxResult<()> {
        let buf = self
            .element_buffers
            .get_mut(ebo.0)
            .ok_or_else(|| GfxError::invalid_handle(format!("element buffer {}", ebo.0)))?;
        *buf = indices.to_vec();
        if let Some(vao) = self.vao.and_then(|id| self.vertex_arrays.get_mut(id)) {
            vao.ebo = Some(ebo.0);
        }
        Ok(())
    }

    fn draw_vertex_elements(&mut self, count: u32) -> GfxResult<()> {
        let (tris, fragment, uniforms) = self.assemble(count)?;
        let (att, image) = self.color_target(self.draw_fb)?;
        let size = image.size.size2();
        let state = RasterState {
            viewport: self.viewport.unwrap_or((0, 0, size)),
            depth_test: self.depth_test,
            cull_back: self.cull_back,
        };

        // Detach target storage so sampler views can borrow the slab.
        let layer_bytes = image.sample.byte_len(size.area(), image.channels);
        let mut color = self
            .textures
            .get_mut(att.tex)
            .map(|t| std::mem::take(&mut t.data))
            .unwrap_or_default();
        let depth_id = self.framebuffers.get(self.draw_fb).and_then(|f| f.depth);
        let mut depth = depth_id
            .and_then(|id| self.renderbuffers.get_mut(id))
            .filter(|r| r.size == size)
            .map(|r| std::mem::take(&mut r.depth));

        {
            let units: [Option<TexView<'_>>; CHANNEL_COUNT] = std::array::from_fn(|i| {
                self.units[i]
                    .filter(|id| *id != att.tex)
                    .and_then(|id| self.textures.get(id))
                    .and_then(|t| t.view(0))
            });
            let env = ShadeEnv { uniforms, units };
            let at = att.layer as usize * layer_bytes;
            if let Some(layer) = color.get_mut(at..at + layer_bytes) {
                let target = RenderTarget {
                    color: layer,
                    depth: depth.as_deref_mut(),
                    size,
                    channels: image.channels,
                    sample: image.sample,
                };
                raster::draw_triangles(target, &tris, &state, fragment, &env);
            }
        }

        if let Some(t) = self.textures.get_mut(att.tex) {
            t.data = color;
        }
        if let (Some(id), Some(d)) = (depth_id, depth)
            && let Some(r) = self.renderbuffers.get_mut(id)
        {
            r.depth = d;
        }
        Ok(())
    }

    fn delete_vertex_array(&mut self, vao: SoftVertexArray) {
        if self.vao == Some(vao.0) {
            self.vao = None;
        }
        self.vertex_arrays.remove(vao.0);
    }

    fn delete_vertex_buffer(&mut self, vbo: SoftVertexBuffer) {
        self.vertex_buffers.remove(vbo.0);
    }

    fn delete_element_buffer(&mut self, ebo: SoftElementBuffer) {
        self.element_buffers.remove(ebo.0);
    }

    fn set_uniform(&mut self, loc: &SoftUniform, value: UniformValue) {
        if let Some(slot) = self
            .programs
            .get_mut(loc.program)
            .and_then(|p| p.uniforms.get_mut(loc.slot as usize))
        {
            slot.1 = Some(value);
        }
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    fn clear_buffers(&mut self, color: bool, depth: bool) {
        let Ok((att, image)) = self.color_target(self.draw_fb) else {
            return;
        };
        if color && let Some(t) = self.textures.get_mut(att.tex) {
            let n = image.sample.byte_len(image.size.size2().area(), image.channels);
            let at = att.layer as usize * n;
            if let Some(layer) = t.data.get_mut(at..at + n) {
                raster::fill(layer, self.clear_color, image.channels, image.sample);
            }
        }
        if depth
            && let Some(r) = self
                .framebuffers
                .get(self.draw_fb)
                .and_then(|f| f.depth)
                .and_then(|id| self.renderbuffers.get_mut(id))
        {
            r.depth.fill(1.0);
        }
    }

    fn set_viewport(&mut self, origin: (u32, u32), size: Size2) {
        self.viewport = Some((origin.0, origin.1, size));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn set_triangle_backside_culling(&mut self, enabled: bool) {
        self.cull_back = enabled;
    }

    fn default_size(&self) -> Size2 {
        self.size
    }

    fn activate_next_frame(&mut self) {
        self.presented = self.textures.get(0).map(|t| t.data.clone());
        self.frames += 1;
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/gfx/soft.rs"]
mod tests;
