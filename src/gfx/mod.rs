//! Backend-agnostic graphics HAL.
//!
//! Every backend implements [`Gfx`] on its context value. Atoms and stages are generic over
//! `G: Gfx`, so the backend is fixed at compile time and draw calls are statically dispatched.
//! Binding state follows the usual GL model: one read-write texture target, a set of sampler
//! units, one draw framebuffer and one read framebuffer.

pub(crate) mod slab;
pub mod soft;

#[cfg(feature = "gl")]
pub mod gl;

#[cfg(all(feature = "d3d11", windows))]
pub mod d3d11;

use crate::foundation::core::{Filter, SampleType, Size2, Size3, Wrap};
use crate::foundation::error::{GfxError, GfxResult};

/// Programmable pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Backend identity, available as [`Gfx::KIND`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxKind {
    Soft,
    Gl,
    D3d11,
}

impl GfxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Gl => "gl",
            Self::D3d11 => "d3d11",
        }
    }
}

/// Texture dimensionality used by bind calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TexKind {
    Tex2D,
    Tex3D,
    Cube,
}

/// Upload destination for [`Gfx::set_texture`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TexTarget {
    Tex2D,
    Tex3D,
    /// Cubemap face `0..6` in `+X -X +Y -Y +Z -Z` order.
    CubeFace(u8),
}

impl TexTarget {
    pub fn kind(self) -> TexKind {
        match self {
            Self::Tex2D => TexKind::Tex2D,
            Self::Tex3D => TexKind::Tex3D,
            Self::CubeFace(_) => TexKind::Cube,
        }
    }
}

/// Layout of one texture image upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TexImage {
    /// `d` is only read for 3D targets.
    pub size: Size3,
    pub channels: u8,
    pub sample: SampleType,
}

impl TexImage {
    pub fn new_2d(size: Size2, channels: u8, sample: SampleType) -> Self {
        Self {
            size: size.into(),
            channels,
            sample,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.sample.byte_len(self.size.volume(), self.channels)
    }
}

/// Interleaved vertex: clip-space position and texture coordinate.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 4],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y, 0.0, 1.0],
            tex_coord: [u, v],
        }
    }
}

/// Value passed through [`Gfx::set_uniform`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    I1(i32),
    I2([i32; 2]),
    I3([i32; 3]),
    I4([i32; 4]),
    F1(f32),
    F2([f32; 2]),
    F3([f32; 3]),
    F4([f32; 4]),
    Mat4([f32; 16]),
}

impl UniformValue {
    /// Widen to four float components; matrices yield their first column.
    pub fn as_vec4(&self) -> [f32; 4] {
        match *self {
            Self::I1(a) => [a as f32, 0.0, 0.0, 0.0],
            Self::I2([a, b]) => [a as f32, b as f32, 0.0, 0.0],
            Self::I3([a, b, c]) => [a as f32, b as f32, c as f32, 0.0],
            Self::I4([a, b, c, d]) => [a as f32, b as f32, c as f32, d as f32],
            Self::F1(a) => [a, 0.0, 0.0, 0.0],
            Self::F2([a, b]) => [a, b, 0.0, 0.0],
            Self::F3([a, b, c]) => [a, b, c, 0.0],
            Self::F4(v) => v,
            Self::Mat4(m) => [m[0], m[1], m[2], m[3]],
        }
    }

    pub fn as_i32(&self) -> i32 {
        match *self {
            Self::I1(a) => a,
            other => other.as_vec4()[0] as i32,
        }
    }
}

/// A uniform every shader node feeds when the program declares it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardUniform {
    pub name: &'static str,
    /// Constant-buffer register for backends that pack uniforms (`float4` slots).
    pub register: u16,
    /// First component inside `register`.
    pub component: u8,
    /// Float component count.
    pub len: u8,
}

const fn std_uniform(name: &'static str, register: u16, component: u8, len: u8) -> StandardUniform {
    StandardUniform {
        name,
        register,
        component,
        len,
    }
}

/// Sampler uniform names, one per input channel.
pub const CHANNEL_UNIFORMS: [&str; 4] = ["iChannel0", "iChannel1", "iChannel2", "iChannel3"];

/// Number of sampler units shader nodes bind.
pub const CHANNEL_COUNT: usize = CHANNEL_UNIFORMS.len();

/// Standard uniform table. Sampler uniforms carry no register; they map to texture slots.
pub const STANDARD_UNIFORMS: &[StandardUniform] = &[
    std_uniform("iResolution", 0, 0, 3),
    std_uniform("iTime", 1, 0, 1),
    std_uniform("iTimeDelta", 1, 1, 1),
    std_uniform("iFrame", 1, 2, 1),
    std_uniform("iMix", 1, 3, 1),
    std_uniform("iColor", 2, 0, 4),
    std_uniform("iView", 4, 0, 16),
    std_uniform("iProjection", 8, 0, 16),
];

pub fn standard_uniform(name: &str) -> Option<&'static StandardUniform> {
    STANDARD_UNIFORMS.iter().find(|u| u.name == name)
}

/// Placeholder replaced by user shader code inside backend templates.
pub const USER_CODE_MARKER: &str = "${USER_CODE}";

pub fn expand_template(template: &str, user_code: &str) -> String {
    template.replace(USER_CODE_MARKER, user_code)
}

/// The graphics HAL.
///
/// Handles are opaque per backend. Fallible calls return [`GfxError`]; `compile_shader` and
/// `link_program` additionally keep the message for [`Gfx::last_error`].
pub trait Gfx {
    const KIND: GfxKind;
    /// True when the backend only executes its built-in shader library.
    const BUILTIN_SHADERS: bool;

    type ColorBuffer: Clone + std::fmt::Debug;
    type DepthBuffer: Clone + std::fmt::Debug;
    type FrameBuffer: Clone + std::fmt::Debug;
    type Shader: Clone + std::fmt::Debug;
    type Program: Clone + std::fmt::Debug;
    type Uniform: Clone + std::fmt::Debug;
    type VertexArray: Clone + std::fmt::Debug;
    type VertexBuffer: Clone + std::fmt::Debug;
    type ElementBuffer: Clone + std::fmt::Debug;

    // shaders
    fn shader_template(stage: ShaderStage) -> &'static str;
    fn builtin_user_code(stage: ShaderStage, name: &str) -> Option<&'static str>;
    fn create_shader(&mut self, stage: ShaderStage) -> GfxResult<Self::Shader>;
    fn shader_source(&mut self, shader: &Self::Shader, source: &str);
    fn compile_shader(&mut self, shader: &Self::Shader) -> GfxResult<()>;
    fn delete_shader(&mut self, shader: Self::Shader);
    fn create_program(&mut self) -> GfxResult<Self::Program>;
    fn attach_shader(&mut self, program: &Self::Program, shader: &Self::Shader);
    fn link_program(&mut self, program: &Self::Program) -> GfxResult<()>;
    fn use_program(&mut self, program: &Self::Program);
    fn delete_program(&mut self, program: Self::Program);
    fn active_uniforms(&self, program: &Self::Program) -> Vec<String>;
    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<Self::Uniform>;
    fn last_error(&self) -> Option<&str>;

    // textures
    fn gen_texture(&mut self) -> GfxResult<Self::ColorBuffer>;
    /// Select the sampler unit used by `bind_texture_ro`.
    fn active_texture(&mut self, unit: u32);
    fn bind_texture_ro(&mut self, kind: TexKind, tex: &Self::ColorBuffer);
    fn bind_texture_rw(&mut self, kind: TexKind, tex: &Self::ColorBuffer);
    fn unbind_texture(&mut self, kind: TexKind);
    /// Upload into the read-write bound texture. `None` allocates without data.
    fn set_texture(
        &mut self,
        target: TexTarget,
        image: &TexImage,
        data: Option<&[u8]>,
    ) -> GfxResult<()>;
    fn tex_parameters(&mut self, kind: TexKind, filter: Filter, wrap: Wrap);
    fn generate_mipmap(&mut self, kind: TexKind);
    fn delete_texture(&mut self, tex: Self::ColorBuffer);

    // framebuffers
    fn create_framebuffer(&mut self) -> GfxResult<Self::FrameBuffer>;
    fn bind_framebuffer(&mut self, fb: &Self::FrameBuffer);
    fn bind_framebuffer_ro(&mut self, fb: &Self::FrameBuffer);
    fn bind_framebuffer_default(&mut self);
    fn unbind_framebuffer(&mut self);
    /// Attach a 2D texture (or cube face) as color attachment of the bound draw framebuffer.
    fn framebuffer_texture_2d(
        &mut self,
        target: TexTarget,
        tex: &Self::ColorBuffer,
    ) -> GfxResult<()>;
    fn create_renderbuffer(&mut self) -> GfxResult<Self::DepthBuffer>;
    fn renderbuffer_storage(&mut self, rb: &Self::DepthBuffer, size: Size2) -> GfxResult<()>;
    fn framebuffer_renderbuffer(&mut self, rb: &Self::DepthBuffer) -> GfxResult<()>;
    fn framebuffer_complete(&self) -> bool;
    fn delete_framebuffer(&mut self, fb: Self::FrameBuffer);
    fn delete_renderbuffer(&mut self, rb: Self::DepthBuffer);
    /// Read from the read framebuffer into `out`, converting to the requested layout.
    fn read_pixels(
        &mut self,
        origin: (u32, u32),
        size: Size2,
        channels: u8,
        sample: SampleType,
        out: &mut [u8],
    ) -> GfxResult<()>;

    // geometry
    fn gen_vertex_array(&mut self) -> GfxResult<Self::VertexArray>;
    fn gen_vertex_buffer(&mut self) -> GfxResult<Self::VertexBuffer>;
    fn gen_element_buffer(&mut self) -> GfxResult<Self::ElementBuffer>;
    fn bind_vertex_array(&mut self, vao: &Self::VertexArray);
    /// Upload vertices and attach the buffer to the bound vertex array.
    fn vertex_buffer_data(&mut self, vbo: &Self::VertexBuffer, vertices: &[Vertex]) -> GfxResult<()>;
    /// Upload indices and attach the buffer to the bound vertex array.
    fn element_buffer_data(&mut self, ebo: &Self::ElementBuffer, indices: &[u32]) -> GfxResult<()>;
    /// Draw `count` indexed triangle-list vertices from the bound vertex array.
    fn draw_vertex_elements(&mut self, count: u32) -> GfxResult<()>;
    fn delete_vertex_array(&mut self, vao: Self::VertexArray);
    fn delete_vertex_buffer(&mut self, vbo: Self::VertexBuffer);
    fn delete_element_buffer(&mut self, ebo: Self::ElementBuffer);

    // uniforms
    fn set_uniform(&mut self, loc: &Self::Uniform, value: UniformValue);

    fn uniform1iv(&mut self, loc: &Self::Uniform, v: &[i32; 1]) {
        self.set_uniform(loc, UniformValue::I1(v[0]));
    }
    fn uniform2iv(&mut self, loc: &Self::Uniform, v: &[i32; 2]) {
        self.set_uniform(loc, UniformValue::I2(*v));
    }
    fn uniform3iv(&mut self, loc: &Self::Uniform, v: &[i32; 3]) {
        self.set_uniform(loc, UniformValue::I3(*v));
    }
    fn uniform4iv(&mut self, loc: &Self::Uniform, v: &[i32; 4]) {
        self.set_uniform(loc, UniformValue::I4(*v));
    }
    fn uniform1fv(&mut self, loc: &Self::Uniform, v: &[f32; 1]) {
        self.set_uniform(loc, UniformValue::F1(v[0]));
    }
    fn uniform2fv(&mut self, loc: &Self::Uniform, v: &[f32; 2]) {
        self.set_uniform(loc, UniformValue::F2(*v));
    }
    fn uniform3fv(&mut self, loc: &Self::Uniform, v: &[f32; 3]) {
        self.set_uniform(loc, UniformValue::F3(*v));
    }
    fn uniform4fv(&mut self, loc: &Self::Uniform, v: &[f32; 4]) {
        self.set_uniform(loc, UniformValue::F4(*v));
    }
    fn uniform_matrix4fv(&mut self, loc: &Self::Uniform, m: &[f32; 16]) {
        self.set_uniform(loc, UniformValue::Mat4(*m));
    }

    // state
    fn clear(&mut self, rgba: [f32; 4]);
    fn clear_buffers(&mut self, color: bool, depth: bool);
    fn set_viewport(&mut self, origin: (u32, u32), size: Size2);
    fn set_depth_test(&mut self, enabled: bool);
    fn set_triangle_backside_culling(&mut self, enabled: bool);
    /// Size of the default framebuffer (the window or presentation surface).
    fn default_size(&self) -> Size2;
    /// Present the default framebuffer and start the next frame.
    fn activate_next_frame(&mut self);
}

/// Compile one shader from a template and user code.
pub fn compile_stage<G: Gfx>(
    gfx: &mut G,
    stage: ShaderStage,
    user_code: &str,
) -> GfxResult<G::Shader> {
    let shader = gfx.create_shader(stage)?;
    gfx.shader_source(&shader, &expand_template(G::shader_template(stage), user_code));
    if let Err(e) = gfx.compile_shader(&shader) {
        gfx.delete_shader(shader);
        return Err(e);
    }
    Ok(shader)
}

/// Link compiled shaders into a program. Shaders stay owned by the caller.
pub fn link_shaders<G: Gfx>(gfx: &mut G, shaders: &[&G::Shader]) -> GfxResult<G::Program> {
    let program = gfx.create_program()?;
    for s in shaders {
        gfx.attach_shader(&program, s);
    }
    if let Err(e) = gfx.link_program(&program) {
        gfx.delete_program(program);
        return Err(e);
    }
    Ok(program)
}

/// Build a program from built-in user code for both stages.
pub fn builtin_program<G: Gfx>(gfx: &mut G, vertex: &str, fragment: &str) -> GfxResult<G::Program> {
    let vs_code = G::builtin_user_code(ShaderStage::Vertex, vertex)
        .ok_or_else(|| GfxError::unsupported(format!("no built-in vertex shader '{vertex}'")))?;
    let fs_code = G::builtin_user_code(ShaderStage::Fragment, fragment).ok_or_else(|| {
        GfxError::unsupported(format!("no built-in fragment shader '{fragment}'"))
    })?;
    let vs = compile_stage(gfx, ShaderStage::Vertex, vs_code)?;
    let fs = match compile_stage(gfx, ShaderStage::Fragment, fs_code) {
        Ok(fs) => fs,
        Err(e) => {
            gfx.delete_shader(vs);
            return Err(e);
        }
    };
    let program = link_shaders(gfx, &[&vs, &fs]);
    gfx.delete_shader(vs);
    gfx.delete_shader(fs);
    program
}

/// Two-triangle quad covering clip space, counter-clockwise.
pub struct FullscreenQuad<G: Gfx> {
    vao: G::VertexArray,
    vbo: G::VertexBuffer,
    ebo: G::ElementBuffer,
}

impl<G: Gfx> FullscreenQuad<G> {
    pub const VERTICES: [Vertex; 4] = [
        Vertex::new(-1.0, -1.0, 0.0, 0.0),
        Vertex::new(1.0, -1.0, 1.0, 0.0),
        Vertex::new(1.0, 1.0, 1.0, 1.0),
        Vertex::new(-1.0, 1.0, 0.0, 1.0),
    ];
    pub const INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

    /// Allocate and upload the quad. Nothing stays allocated when this fails.
    pub fn new(gfx: &mut G) -> GfxResult<Self> {
        let vao = gfx.gen_vertex_array()?;
        let vbo = match gfx.gen_vertex_buffer() {
            Ok(vbo) => vbo,
            Err(err) => {
                gfx.delete_vertex_array(vao);
                return Err(err);
            }
        };
        let ebo = match gfx.gen_element_buffer() {
            Ok(ebo) => ebo,
            Err(err) => {
                gfx.delete_vertex_buffer(vbo);
                gfx.delete_vertex_array(vao);
                return Err(err);
            }
        };
        let quad = Self { vao, vbo, ebo };
        gfx.bind_vertex_array(&quad.vao);
        let uploaded = gfx
            .vertex_buffer_data(&quad.vbo, &Self::VERTICES)
            .and_then(|()| gfx.element_buffer_data(&quad.ebo, &Self::INDICES));
        match uploaded {
            Ok(()) => Ok(quad),
            Err(err) => {
                quad.release(gfx);
                Err(err)
            }
        }
    }

    pub fn draw(&self, gfx: &mut G) -> GfxResult<()> {
        gfx.bind_vertex_array(&self.vao);
        gfx.draw_vertex_elements(Self::INDICES.len() as u32)
    }

    pub fn release(self, gfx: &mut G) {
        gfx.delete_element_buffer(self.ebo);
        gfx.delete_vertex_buffer(self.vbo);
        gfx.delete_vertex_array(self.vao);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/gfx/mod.rs"]
mod tests;
