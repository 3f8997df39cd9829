//! OpenGL 3.3 backend over `glow`.
//!
//! The caller owns window and context creation and hands a current `glow::Context` to
//! [`GlGfx::new`]. Every call assumes that context is current on the calling thread.
#![allow(unsafe_code)]

use std::collections::HashMap;

use glow::HasContext;

use crate::foundation::core::{Filter, SampleType, Size2, Wrap};
use crate::foundation::error::{GfxError, GfxResult};
use crate::gfx::{Gfx, GfxKind, ShaderStage, TexImage, TexKind, TexTarget, UniformValue, Vertex};

const VERTEX_TEMPLATE: &str = r#"#version 330 core
layout(location = 0) in vec4 aPosition;
layout(location = 1) in vec2 aTexCoord;
out vec2 vTexCoord;
uniform mat4 iView;
uniform mat4 iProjection;
${USER_CODE}
void main() {
    vTexCoord = aTexCoord;
    gl_Position = vertexMain(aPosition);
}
"#;

const FRAGMENT_TEMPLATE: &str = r#"#version 330 core
in vec2 vTexCoord;
out vec4 fragColor;
uniform vec3 iResolution;
uniform float iTime;
uniform float iTimeDelta;
uniform int iFrame;
uniform float iMix;
uniform vec4 iColor;
uniform sampler2D iChannel0;
uniform sampler2D iChannel1;
uniform sampler2D iChannel2;
uniform sampler2D iChannel3;
${USER_CODE}
void main() {
    mainImage(fragColor, gl_FragCoord.xy);
}
"#;

fn builtin(stage: ShaderStage, name: &str) -> Option<&'static str> {
    Some(match (stage, name) {
        (ShaderStage::Vertex, "passthrough") => "vec4 vertexMain(vec4 p) { return p; }",
        (ShaderStage::Vertex, "transform") => {
            "vec4 vertexMain(vec4 p) { return iProjection * iView * p; }"
        }
        (ShaderStage::Fragment, "default") => {
            "void mainImage(out vec4 c, in vec2 fc) { c = vec4(0.94, 0.19, 0.39, 1.0); }"
        }
        (ShaderStage::Fragment, "copy") => {
            "void mainImage(out vec4 c, in vec2 fc) { c = texture(iChannel0, fc / iResolution.xy); }"
        }
        (ShaderStage::Fragment, "invert") => {
            "void mainImage(out vec4 c, in vec2 fc) {\n\
             vec4 s = texture(iChannel0, fc / iResolution.xy);\n\
             c = vec4(1.0 - s.rgb, s.a);\n}"
        }
        (ShaderStage::Fragment, "solid") => "void mainImage(out vec4 c, in vec2 fc) { c = iColor; }",
        (ShaderStage::Fragment, "gradient") => {
            "void mainImage(out vec4 c, in vec2 fc) {\n\
             vec2 uv = fc / iResolution.xy;\n\
             c = vec4(uv, 0.5 + 0.5 * sin(iTime), 1.0);\n}"
        }
        (ShaderStage::Fragment, "mix") => {
            "void mainImage(out vec4 c, in vec2 fc) {\n\
             vec2 uv = fc / iResolution.xy;\n\
             c = mix(texture(iChannel0, uv), texture(iChannel1, uv), clamp(iMix, 0.0, 1.0));\n}"
        }
        _ => return None,
    })
}

fn tex_kind_target(kind: TexKind) -> u32 {
    match kind {
        TexKind::Tex2D => glow::TEXTURE_2D,
        TexKind::Tex3D => glow::TEXTURE_3D,
        TexKind::Cube => glow::TEXTURE_CUBE_MAP,
    }
}

fn tex_image_target(target: TexTarget) -> u32 {
    match target {
        TexTarget::Tex2D => glow::TEXTURE_2D,
        TexTarget::Tex3D => glow::TEXTURE_3D,
        TexTarget::CubeFace(f) => glow::TEXTURE_CUBE_MAP_POSITIVE_X + f as u32,
    }
}

/// `(internal format, format, type)` for a channel count and sample type.
fn pixel_format(channels: u8, sample: SampleType) -> GfxResult<(i32, u32, u32)> {
    let format = match channels {
        1 => glow::RED,
        2 => glow::RG,
        3 => glow::RGB,
        4 => glow::RGBA,
        n => return Err(GfxError::unsupported(format!("{n} channel textures"))),
    };
    let (internal, ty) = match (sample, channels) {
        (SampleType::U8, 1) => (glow::R8, glow::UNSIGNED_BYTE),
        (SampleType::U8, 2) => (glow::RG8, glow::UNSIGNED_BYTE),
        (SampleType::U8, 3) => (glow::RGB8, glow::UNSIGNED_BYTE),
        (SampleType::U8, _) => (glow::RGBA8, glow::UNSIGNED_BYTE),
        (SampleType::U16, 1) => (glow::R16, glow::UNSIGNED_SHORT),
        (SampleType::U16, 2) => (glow::RG16, glow::UNSIGNED_SHORT),
        (SampleType::U16, 3) => (glow::RGB16, glow::UNSIGNED_SHORT),
        (SampleType::U16, _) => (glow::RGBA16, glow::UNSIGNED_SHORT),
        (SampleType::F32, 1) => (glow::R32F, glow::FLOAT),
        (SampleType::F32, 2) => (glow::RG32F, glow::FLOAT),
        (SampleType::F32, 3) => (glow::RGB32F, glow::FLOAT),
        (SampleType::F32, _) => (glow::RGBA32F, glow::FLOAT),
    };
    Ok((internal as i32, format, ty))
}

/// OpenGL implementation of [`Gfx`].
pub struct GlGfx {
    gl: glow::Context,
    swap: Option<Box<dyn FnMut()>>,
    stages: HashMap<glow::Shader, ShaderStage>,
    last_error: Option<String>,
    default_size: Size2,
}

impl GlGfx {
    /// Wrap a current context. The default framebuffer size is taken from the current viewport.
    pub fn new(gl: glow::Context) -> Self {
        let mut viewport = [0i32; 4];
        unsafe { gl.get_parameter_i32_slice(glow::VIEWPORT, &mut viewport) };
        let default_size = Size2::new(viewport[2].max(0) as u32, viewport[3].max(0) as u32);
        Self {
            gl,
            swap: None,
            stages: HashMap::new(),
            last_error: None,
            default_size,
        }
    }

    /// Track a resized window surface.
    pub fn set_default_size(&mut self, size: Size2) {
        self.default_size = size;
    }

    /// Install the callback run by `activate_next_frame` (usually the window's buffer swap).
    pub fn with_swap(mut self, swap: impl FnMut() + 'static) -> Self {
        self.swap = Some(Box::new(swap));
        self
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    fn fail(&mut self, err: GfxError) -> GfxError {
        self.last_error = Some(err.to_string());
        err
    }
}

impl Gfx for GlGfx {
    const KIND: GfxKind = GfxKind::Gl;
    const BUILTIN_SHADERS: bool = false;

    type ColorBuffer = glow::Texture;
    type DepthBuffer = glow::Renderbuffer;
    type FrameBuffer = glow::Framebuffer;
    type Shader = glow::Shader;
    type Program = glow::Program;
    type Uniform = glow::UniformLocation;
    type VertexArray = glow::VertexArray;
    type VertexBuffer = glow::Buffer;
    type ElementBuffer = glow::Buffer;

    fn shader_template(stage: ShaderStage) -> &'static str {
        match stage {
            ShaderStage::Vertex => VERTEX_TEMPLATE,
            ShaderStage::Fragment => FRAGMENT_TEMPLATE,
        }
    }

    fn builtin_user_code(stage: ShaderStage, name: &str) -> Option<&'static str> {
        builtin(stage, name)
    }

    fn create_shader(&mut self, stage: ShaderStage) -> GfxResult<glow::Shader> {
        let ty = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        let shader = unsafe { self.gl.create_shader(ty) }.map_err(GfxError::Resource)?;
        self.stages.insert(shader, stage);
        Ok(shader)
    }

    fn shader_source(&mut self, shader: &glow::Shader, source: &str) {
        unsafe { self.gl.shader_source(*shader, source) }
    }

    fn compile_shader(&mut self, shader: &glow::Shader) -> GfxResult<()> {
        let ok = unsafe {
            self.gl.compile_shader(*shader);
            self.gl.get_shader_compile_status(*shader)
        };
        if ok {
            return Ok(());
        }
        let log = unsafe { self.gl.get_shader_info_log(*shader) };
        let stage = self
            .stages
            .get(shader)
            .copied()
            .unwrap_or(ShaderStage::Fragment);
        Err(self.fail(GfxError::Compile { stage, log }))
    }

    fn delete_shader(&mut self, shader: glow::Shader) {
        self.stages.remove(&shader);
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&mut self) -> GfxResult<glow::Program> {
        unsafe { self.gl.create_program() }.map_err(GfxError::Resource)
    }

    fn attach_shader(&mut self, program: &glow::Program, shader: &glow::Shader) {
        unsafe { self.gl.attach_shader(*program, *shader) }
    }

    fn link_program(&mut self, program: &glow::Program) -> GfxResult<()> {
        let ok = unsafe {
            self.gl.link_program(*program);
            self.gl.get_program_link_status(*program)
        };
        if ok {
            return Ok(());
        }
        let log = unsafe { self.gl.get_program_info_log(*program) };
        Err(self.fail(GfxError::Link(log)))
    }

    fn use_program(&mut self, program: &glow::Program) {
        unsafe { self.gl.use_program(Some(*program)) }
    }

    fn delete_program(&mut self, program: glow::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn active_uniforms(&self, program: &glow::Program) -> Vec<String> {
        unsafe {
            let n = self.gl.get_active_uniforms(*program);
            (0..n)
                .filter_map(|i| self.gl.get_active_uniform(*program, i))
                .map(|u| u.name)
                .collect()
        }
    }

    fn uniform_location(&self, program: &glow::Program, name: &str) -> Option<glow::UniformLocation> {
        unsafe { self.gl.get_uniform_location(*program, name) }
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn gen_texture(&mut self) -> GfxResult<glow::Texture> {
        unsafe { self.gl.create_texture() }.map_err(GfxError::Resource)
    }

    fn active_texture(&mut self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture_ro(&mut self, kind: TexKind, tex: &glow::Texture) {
        unsafe { self.gl.bind_texture(tex_kind_target(kind), Some(*tex)) }
    }

    fn bind_texture_rw(&mut self, kind: TexKind, tex: &glow::Texture) {
        unsafe { self.gl.bind_texture(tex_kind_target(kind), Some(*tex)) }
    }

    fn unbind_texture(&mut self, kind: TexKind) {
        unsafe { self.gl.bind_texture(tex_kind_target(kind), None) }
    }

    fn set_texture(
        &mut self,
        target: TexTarget,
        image: &TexImage,
        data: Option<&[u8]>,
    ) -> GfxResult<()> {
        if let Some(d) = data
            && d.len() != image.byte_len()
        {
            return Err(GfxError::resource(format!(
                "texture upload of {} bytes, expected {}",
                d.len(),
                image.byte_len()
            )));
        }
        let (internal, format, ty) = pixel_format(image.channels, image.sample)?;
        let (w, h) = (image.size.w as i32, image.size.h as i32);
        unsafe {
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            match target {
                TexTarget::Tex3D => self.gl.tex_image_3d(
                    glow::TEXTURE_3D,
                    0,
                    internal,
                    w,
                    h,
                    image.size.d.max(1) as i32,
                    0,
                    format,
                    ty,
                    glow::PixelUnpackData::Slice(data),
                ),
                other => self.gl.tex_image_2d(
                    tex_image_target(other),
                    0,
                    internal,
                    w,
                    h,
                    0,
                    format,
                    ty,
                    glow::PixelUnpackData::Slice(data),
                ),
            }
        }
        Ok(())
    }

    fn tex_parameters(&mut self, kind: TexKind, filter: Filter, wrap: Wrap) {
        let target = tex_kind_target(kind);
        let (min, mag) = match filter {
            Filter::Nearest => (glow::NEAREST, glow::NEAREST),
            Filter::Linear => (glow::LINEAR, glow::LINEAR),
            Filter::Mipmap => (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR),
        };
        let wrap = match wrap {
            Wrap::Clamp => glow::CLAMP_TO_EDGE,
            Wrap::Repeat => glow::REPEAT,
        };
        unsafe {
            self.gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, min as i32);
            self.gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, mag as i32);
            self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap as i32);
            self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap as i32);
            if kind != TexKind::Tex2D {
                self.gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_R, wrap as i32);
            }
        }
    }

    fn generate_mipmap(&mut self, kind: TexKind) {
        unsafe { self.gl.generate_mipmap(tex_kind_target(kind)) }
    }

    fn delete_texture(&mut self, tex: glow::Texture) {
        unsafe { self.gl.delete_texture(tex) }
    }

    fn create_framebuffer(&mut self) -> GfxResult<glow::Framebuffer> {
        unsafe { self.gl.create_framebuffer() }.map_err(GfxError::Resource)
    }

    fn bind_framebuffer(&mut self, fb: &glow::Framebuffer) {
        unsafe { self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, Some(*fb)) }
    }

    fn bind_framebuffer_ro(&mut self, fb: &glow::Framebuffer) {
        unsafe { self.gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(*fb)) }
    }

    fn bind_framebuffer_default(&mut self) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, None) }
    }

    fn unbind_framebuffer(&mut self) {
        self.bind_framebuffer_default();
    }

    fn framebuffer_texture_2d(&mut self, target: TexTarget, tex: &glow::Texture) -> GfxResult<()> {
        if target == TexTarget::Tex3D {
            return Err(GfxError::unsupported("3D color attachment"));
        }
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::DRAW_FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                tex_image_target(target),
                Some(*tex),
                0,
            );
        }
        Ok(())
    }

    fn create_renderbuffer(&mut self) -> GfxResult<glow::Renderbuffer> {
        unsafe { self.gl.create_renderbuffer() }.map_err(GfxError::Resource)
    }

    fn renderbuffer_storage(&mut self, rb: &glow::Renderbuffer, size: Size2) -> GfxResult<()> {
        unsafe {
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(*rb));
            self.gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::DEPTH_COMPONENT24,
                size.w as i32,
                size.h as i32,
            );
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        }
        Ok(())
    }

    fn framebuffer_renderbuffer(&mut self, rb: &glow::Renderbuffer) -> GfxResult<()> {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::DRAW_FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::RENDERBUFFER,
                Some(*rb),
            );
        }
        Ok(())
    }

    fn framebuffer_complete(&self) -> bool {
        unsafe { self.gl.check_framebuffer_status(glow::DRAW_FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE }
    }

    fn delete_framebuffer(&mut self, fb: glow::Framebuffer) {
        unsafe { self.gl.delete_framebuffer(fb) }
    }

    fn delete_renderbuffer(&mut self, rb: glow::Renderbuffer) {
        unsafe { self.gl.delete_renderbuffer(rb) }
    }

    fn read_pixels(
        &mut self,
        origin: (u32, u32),
        size: Size2,
        channels: u8,
        sample: SampleType,
        out: &mut [u8],
    ) -> GfxResult<()> {
        let expected = sample.byte_len(size.area(), channels);
        if out.len() != expected {
            return Err(GfxError::resource(format!(
                "read buffer is {} bytes, expected {expected}",
                out.len()
            )));
        }
        let (_, format, ty) = pixel_format(channels, sample)?;
        unsafe {
            self.gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            self.gl.read_pixels(
                origin.0 as i32,
                origin.1 as i32,
                size.w as i32,
                size.h as i32,
                format,
                ty,
                glow::PixelPackData::Slice(Some(out)),
            );
        }
        Ok(())
    }

    fn gen_vertex_array(&mut self) -> GfxResult<glow::VertexArray> {
        unsafe { self.gl.create_vertex_array() }.map_err(GfxError::Resource)
    }

    fn gen_vertex_buffer(&mut self) -> GfxResult<glow::Buffer> {
        unsafe { self.gl.create_buffer() }.map_err(GfxError::Resource)
    }

    fn gen_element_buffer(&mut self) -> GfxResult<glow::Buffer> {
        unsafe { self.gl.create_buffer() }.map_err(GfxError::Resource)
    }

    fn bind_vertex_array(&mut self, vao: &glow::VertexArray) {
        unsafe { self.gl.bind_vertex_array(Some(*vao)) }
    }

    fn vertex_buffer_data(&mut self, vbo: &glow::Buffer, vertices: &[Vertex]) -> GfxResult<()> {
        let stride = std::mem::size_of::<Vertex>() as i32;
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(*vbo));
            self.gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(vertices),
                glow::STATIC_DRAW,
            );
            self.gl.vertex_attrib_pointer_f32(0, 4, glow::FLOAT, false, stride, 0);
            self.gl.enable_vertex_attrib_array(0);
            self.gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, stride, 16);
            self.gl.enable_vertex_attrib_array(1);
        }
        Ok(())
    }

    fn element_buffer_data(&mut self, ebo: &glow::Buffer, indices: &[u32]) -> GfxResult<()> {
        unsafe {
            self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(*ebo));
            self.gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(indices),
                glow::STATIC_DRAW,
            );
        }
        Ok(())
    }

    fn draw_vertex_elements(&mut self, count: u32) -> GfxResult<()> {
        unsafe {
            self.gl
                .draw_elements(glow::TRIANGLES, count as i32, glow::UNSIGNED_INT, 0);
        }
        Ok(())
    }

    fn delete_vertex_array(&mut self, vao: glow::VertexArray) {
        unsafe { self.gl.delete_vertex_array(vao) }
    }

    fn delete_vertex_buffer(&mut self, vbo: glow::Buffer) {
        unsafe { self.gl.delete_buffer(vbo) }
    }

    fn delete_element_buffer(&mut self, ebo: glow::Buffer) {
        unsafe { self.gl.delete_buffer(ebo) }
    }

    fn set_uniform(&mut self, loc: &glow::UniformLocation, value: UniformValue) {
        let loc = Some(loc);
        unsafe {
            match value {
                UniformValue::I1(a) => self.gl.uniform_1_i32(loc, a),
                UniformValue::I2([a, b]) => self.gl.uniform_2_i32(loc, a, b),
                UniformValue::I3([a, b, c]) => self.gl.uniform_3_i32(loc, a, b, c),
                UniformValue::I4([a, b, c, d]) => self.gl.uniform_4_i32(loc, a, b, c, d),
                UniformValue::F1(a) => self.gl.uniform_1_f32(loc, a),
                UniformValue::F2([a, b]) => self.gl.uniform_2_f32(loc, a, b),
                UniformValue::F3([a, b, c]) => self.gl.uniform_3_f32(loc, a, b, c),
                UniformValue::F4([a, b, c, d]) => self.gl.uniform_4_f32(loc, a, b, c, d),
                UniformValue::Mat4(m) => self.gl.uniform_matrix_4_f32_slice(loc, false, &m),
            }
        }
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        unsafe { self.gl.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]) }
    }

    fn clear_buffers(&mut self, color: bool, depth: bool) {
        let mut mask = 0;
        if color {
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if depth {
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        if mask != 0 {
            unsafe { self.gl.clear(mask) }
        }
    }

    fn set_viewport(&mut self, origin: (u32, u32), size: Size2) {
        unsafe {
            self.gl.viewport(
                origin.0 as i32,
                origin.1 as i32,
                size.w as i32,
                size.h as i32,
            )
        }
    }

    fn set_depth_test(&mut self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::DEPTH_TEST);
                self.gl.depth_func(glow::LESS);
            } else {
                self.gl.disable(glow::DEPTH_TEST);
            }
        }
    }

    fn set_triangle_backside_culling(&mut self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::CULL_FACE);
                self.gl.cull_face(glow::BACK);
                self.gl.front_face(glow::CCW);
            } else {
                self.gl.disable(glow::CULL_FACE);
            }
        }
    }

    fn default_size(&self) -> Size2 {
        self.default_size
    }

    fn activate_next_frame(&mut self) {
        unsafe { self.gl.flush() }
        if let Some(swap) = self.swap.as_mut() {
            swap();
        }
    }
}
