//! Direct3D 11 backend.
//!
//! Runs headless: the default framebuffer is an offscreen RGBA8 texture and
//! `activate_next_frame` captures it, matching the software backend. Uniforms are packed into a
//! single 256 x `float4` constant buffer laid out by [`STANDARD_UNIFORMS`]; a uniform is active
//! when the program's user code mentions its name.
#![allow(unsafe_code)]

use std::ffi::c_void;

use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::Fxc::D3DCompile;
use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE, D3D_DRIVER_TYPE_HARDWARE, D3D_DRIVER_TYPE_WARP, D3D_FEATURE_LEVEL_11_0,
    D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST, ID3DBlob,
};
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::IDXGIAdapter;
use windows::core::{PCSTR, s};

use crate::foundation::core::{Filter, SampleType, Size2, Wrap};
use crate::foundation::error::{GfxError, GfxResult};
use crate::gfx::slab::Slab;
use crate::gfx::soft::raster;
use crate::gfx::{
    CHANNEL_COUNT, CHANNEL_UNIFORMS, Gfx, GfxKind, STANDARD_UNIFORMS, ShaderStage,
    StandardUniform, TexImage, TexKind, TexTarget, UniformValue, Vertex,
};

const HEADER: &str = r#"cbuffer CB0 : register(b0) { float4 U[256]; };
#define iResolution U[0].xyz
#define iTime U[1].x
#define iTimeDelta U[1].y
#define iFrame U[1].z
#define iMix U[1].w
#define iColor U[2]
#define iView float4x4(U[4], U[5], U[6], U[7])
#define iProjection float4x4(U[8], U[9], U[10], U[11])
Texture2D iChannel0 : register(t0);
Texture2D iChannel1 : register(t1);
Texture2D iChannel2 : register(t2);
Texture2D iChannel3 : register(t3);
SamplerState iSampler0 : register(s0);
SamplerState iSampler1 : register(s1);
SamplerState iSampler2 : register(s2);
SamplerState iSampler3 : register(s3);
struct VsIn { float4 pos : POSITION; float2 uv : TEXCOORD0; };
struct PsIn { float4 pos : SV_POSITION; float2 uv : TEXCOORD0; };
"#;

const VERTEX_TEMPLATE: &str = concat!(
    r#"cbuffer CB0 : register(b0) { float4 U[256]; };
#define iView float4x4(U[4], U[5], U[6], U[7])
#define iProjection float4x4(U[8], U[9], U[10], U[11])
struct VsIn { float4 pos : POSITION; float2 uv : TEXCOORD0; };
struct PsIn { float4 pos : SV_POSITION; float2 uv : TEXCOORD0; };
${USER_CODE}
PsIn main(VsIn i) {
    PsIn o;
    o.pos = vertexMain(i.pos);
    o.uv = i.uv;
    return o;
}
"#
);

fn fragment_template() -> &'static str {
    static TEMPLATE: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    TEMPLATE.get_or_init(|| {
        format!(
            "{HEADER}${{USER_CODE}}\nfloat4 main(PsIn i) : SV_TARGET {{\n    float4 c = float4(0.94, 0.19, 0.39, 1.0);\n    mainImage(c, i.pos.xy);\n    return c;\n}}\n"
        )
    })
}

fn builtin(stage: ShaderStage, name: &str) -> Option<&'static str> {
    Some(match (stage, name) {
        (ShaderStage::Vertex, "passthrough") => "float4 vertexMain(float4 p) { return p; }",
        (ShaderStage::Vertex, "transform") => {
            "float4 vertexMain(float4 p) { return mul(mul(p, iView), iProjection); }"
        }
        (ShaderStage::Fragment, "default") => "void mainImage(inout float4 c, float2 fc) { }",
        (ShaderStage::Fragment, "copy") => {
            "void mainImage(inout float4 c, float2 fc) {\n\
             c = iChannel0.Sample(iSampler0, fc / iResolution.xy);\n}"
        }
        (ShaderStage::Fragment, "invert") => {
            "void mainImage(inout float4 c, float2 fc) {\n\
             float4 s = iChannel0.Sample(iSampler0, fc / iResolution.xy);\n\
             c = float4(1.0 - s.rgb, s.a);\n}"
        }
        (ShaderStage::Fragment, "solid") => "void mainImage(inout float4 c, float2 fc) { c = iColor; }",
        (ShaderStage::Fragment, "gradient") => {
            "void mainImage(inout float4 c, float2 fc) {\n\
             float2 uv = fc / iResolution.xy;\n\
             c = float4(uv, 0.5 + 0.5 * sin(iTime), 1.0);\n}"
        }
        (ShaderStage::Fragment, "mix") => {
            "void mainImage(inout float4 c, float2 fc) {\n\
             float2 uv = fc / iResolution.xy;\n\
             c = lerp(iChannel0.Sample(iSampler0, uv), iChannel1.Sample(iSampler1, uv), saturate(iMix));\n}"
        }
        _ => return None,
    })
}

/// Whether `text` mentions `name` as a whole identifier.
fn mentions(text: &str, name: &str) -> bool {
    let ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    text.match_indices(name).any(|(at, _)| {
        let before = text[..at].chars().next_back().is_none_or(|c| !ident(c));
        let after = text[at + name.len()..].chars().next().is_none_or(|c| !ident(c));
        before && after
    })
}

/// Stored channel count: three-channel images are widened to four.
fn storage_channels(channels: u8) -> u8 {
    if channels == 3 { 4 } else { channels }
}

fn dxgi_format(channels: u8, sample: SampleType) -> GfxResult<DXGI_FORMAT> {
    Ok(match (sample, storage_channels(channels)) {
        (SampleType::U8, 1) => DXGI_FORMAT_R8_UNORM,
        (SampleType::U8, 2) => DXGI_FORMAT_R8G8_UNORM,
        (SampleType::U8, 4) => DXGI_FORMAT_R8G8B8A8_UNORM,
        (SampleType::U16, 1) => DXGI_FORMAT_R16_UNORM,
        (SampleType::U16, 2) => DXGI_FORMAT_R16G16_UNORM,
        (SampleType::U16, 4) => DXGI_FORMAT_R16G16B16A16_UNORM,
        (SampleType::F32, 1) => DXGI_FORMAT_R32_FLOAT,
        (SampleType::F32, 2) => DXGI_FORMAT_R32G32_FLOAT,
        (SampleType::F32, 4) => DXGI_FORMAT_R32G32B32A32_FLOAT,
        (_, n) => return Err(GfxError::unsupported(format!("{n} channel textures"))),
    })
}

/// Widen tightly packed texels to the stored channel count.
fn widen(data: &[u8], image: &TexImage) -> Vec<u8> {
    let stored = storage_channels(image.channels);
    if stored == image.channels {
        return data.to_vec();
    }
    let texels = image.size.volume();
    let mut out = vec![0u8; image.sample.byte_len(texels, stored)];
    let px = image.sample.byte_len(1, stored);
    for i in 0..texels {
        let rgba = raster::decode_texel(data, i, image.channels, image.sample);
        raster::encode_texel(rgba, stored, image.sample, &mut out[i * px..(i + 1) * px]);
    }
    out
}

fn gfx_err(context: &str, e: windows::core::Error) -> GfxError {
    GfxError::resource(format!("{context}: {e}"))
}

macro_rules! d11_handle {
    ($($name:ident;)*) => {
        $(
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
            pub struct $name(u32);
        )*
    };
}

d11_handle! {
    D11Texture;
    D11Renderbuffer;
    D11Framebuffer;
    D11Shader;
    D11Program;
    D11VertexArray;
    D11VertexBuffer;
    D11ElementBuffer;
}

/// Uniform handle: a constant-buffer slot or a sampler channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum D11Uniform {
    Slot { program: u32, slot: StandardUniform },
    Sampler { program: u32, channel: u8 },
}

enum Resource {
    Tex2D(ID3D11Texture2D),
    Tex3D(ID3D11Texture3D),
}

impl Resource {
    fn as_resource(&self) -> GfxResult<ID3D11Resource> {
        use windows::core::Interface;
        match self {
            Self::Tex2D(t) => t.cast(),
            Self::Tex3D(t) => t.cast(),
        }
        .map_err(|e| gfx_err("resource cast", e))
    }
}

#[derive(Default)]
struct TexEntry {
    kind: Option<TexKind>,
    image: Option<TexImage>,
    resource: Option<Resource>,
    srv: Option<ID3D11ShaderResourceView>,
    sampler: Option<ID3D11SamplerState>,
}

#[derive(Default)]
struct FbEntry {
    color: Option<(u32, u32)>,
    rtv: Option<ID3D11RenderTargetView>,
    dsv: Option<ID3D11DepthStencilView>,
}

#[derive(Default)]
struct RbEntry {
    size: Size2,
    dsv: Option<ID3D11DepthStencilView>,
}

struct ShaderEntry {
    stage: ShaderStage,
    source: String,
    bytecode: Option<Vec<u8>>,
}

struct ProgramEntry {
    attached: Vec<u32>,
    vs: Option<ID3D11VertexShader>,
    ps: Option<ID3D11PixelShader>,
    layout: Option<ID3D11InputLayout>,
    user_text: String,
    constants: Box<[[f32; 4]; 256]>,
}

#[derive(Default)]
struct VaEntry {
    vbo: Option<u32>,
    ebo: Option<u32>,
}

/// Direct3D 11 implementation of [`Gfx`].
pub struct D11Gfx {
    device: ID3D11Device,
    ctx: ID3D11DeviceContext,
    size: Size2,
    textures: Slab<TexEntry>,
    framebuffers: Slab<FbEntry>,
    renderbuffers: Slab<RbEntry>,
    shaders: Slab<ShaderEntry>,
    programs: Slab<ProgramEntry>,
    vertex_arrays: Slab<VaEntry>,
    buffers: Slab<Option<ID3D11Buffer>>,
    constant_buffer: ID3D11Buffer,
    raster_states: [ID3D11RasterizerState; 2],
    depth_states: [ID3D11DepthStencilState; 2],

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
}

fn create_device(driver: D3D_DRIVER_TYPE) -> windows::core::Result<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device = None;
    let mut ctx = None;
    unsafe {
        D3D11CreateDevice(
            None::<&IDXGIAdapter>,
            driver,
            HMODULE::default(),
            D3D11_CREATE_DEVICE_FLAG(0),
            Some(&[D3D_FEATURE_LEVEL_11_0]),
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut ctx),
        )?;
    }
    match (device, ctx) {
        (Some(d), Some(c)) => Ok((d, c)),
        _ => Err(windows::core::Error::empty()),
    }
}

impl D11Gfx {
    /// Create a headless device (hardware, falling back to WARP) with a `size` default
    /// framebuffer.
    pub fn new(size: Size2) -> GfxResult<Self> {
        let (device, ctx) = match create_device(D3D_DRIVER_TYPE_HARDWARE) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "hardware d3d11 device unavailable, using WARP");
                create_device(D3D_DRIVER_TYPE_WARP).map_err(|e| gfx_err("D3D11CreateDevice", e))?
            }
        };

        let cb_desc = D3D11_BUFFER_DESC {
            ByteWidth: (256 * 16) as u32,
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as u32,
            ..Default::default()
        };
        let mut constant_buffer = None;
        unsafe { device.CreateBuffer(&cb_desc, None, Some(&mut constant_buffer)) }
            .map_err(|e| gfx_err("CreateBuffer", e))?;
        let constant_buffer =
            constant_buffer.ok_or_else(|| GfxError::resource("constant buffer missing"))?;

        let raster = |cull: D3D11_CULL_MODE| -> GfxResult<ID3D11RasterizerState> {
            let desc = D3D11_RASTERIZER_DESC {
                FillMode: D3D11_FILL_SOLID,
                CullMode: cull,
                FrontCounterClockwise: true.into(),
                DepthClipEnable: true.into(),
                ..Default::default()
            };
            let mut state = None;
            unsafe { device.CreateRasterizerState(&desc, Some(&mut state)) }
                .map_err(|e| gfx_err("CreateRasterizerState", e))?;
            state.ok_or_else(|| GfxError::resource("rasterizer state missing"))
        };
        let depth = |enabled: bool| -> GfxResult<ID3D11DepthStencilState> {
            let desc = D3D11_DEPTH_STENCIL_DESC {
                DepthEnable: enabled.into(),
                DepthWriteMask: D3D11_DEPTH_WRITE_MASK_ALL,
                DepthFunc: D3D11_COMPARISON_LESS,
                ..Default::default()
            };
            let mut state = None;
            unsafe { device.CreateDepthStencilState(&desc, Some(&mut state)) }
                .map_err(|e| gfx_err("CreateDepthStencilState", e))?;
            state.ok_or_else(|| GfxError::resource("depth state missing"))
        };
        let raster_states = [raster(D3D11_CULL_NONE)?, raster(D3D11_CULL_BACK)?];
        let depth_states = [depth(false)?, depth(true)?];

        let mut gfx = Self {
            device,
            ctx,
            size,
            textures: Slab::new(),
            framebuffers: Slab::new(),
            renderbuffers: Slab::new(),
            shaders: Slab::new(),
            programs: Slab::new(),
            vertex_arrays: Slab::new(),
            buffers: Slab::new(),
            constant_buffer,
            raster_states,
            depth_states,
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
        };

        // Default framebuffer: texture 0, framebuffer 0, depth renderbuffer.
        let tex = D11Texture(gfx.textures.insert(TexEntry::default()));
        gfx.framebuffers.insert(FbEntry::default());
        gfx.bind_texture_rw(TexKind::Tex2D, &tex);
        gfx.set_texture(
            TexTarget::Tex2D,
            &TexImage::new_2d(size, 4, SampleType::U8),
            None,
        )?;
        gfx.attach_color(0, tex.0, TexTarget::Tex2D)?;
        let rb = gfx.create_renderbuffer()?;
        gfx.renderbuffer_storage(&rb, size)?;
        let dsv = gfx.renderbuffers.get(rb.0).and_then(|r| r.dsv.clone());
        if let Some(fb) = gfx.framebuffers.get_mut(0) {
            fb.dsv = dsv;
        }
        gfx.rw_texture = None;
        Ok(gfx)
    }

    pub fn presented_frame(&self) -> Option<&[u8]> {
        self.presented.as_deref()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    fn fail(&mut self, err: GfxError) -> GfxError {
        self.last_error = Some(err.to_string());
        err
    }

    fn attach_color(&mut self, fb: u32, tex: u32, target: TexTarget) -> GfxResult<()> {
        let entry = self
            .textures
            .get(tex)
            .ok_or_else(|| GfxError::invalid_handle(format!("texture {tex}")))?;
        let image = entry
            .image
            .ok_or_else(|| GfxError::resource(format!("texture {tex} has no storage")))?;
        let Some(Resource::Tex2D(res)) = entry.resource.as_ref() else {
            return Err(GfxError::unsupported("color attachment must be 2D or a cube face"));
        };
        let layer = match target {
            TexTarget::CubeFace(f) if f < 6 => f as u32,
            TexTarget::Tex2D => 0,
            other => return Err(GfxError::unsupported(format!("{other:?} color attachment"))),
        };
        let mut rtv = None;
        unsafe {
            if target == TexTarget::Tex2D {
                self.device.CreateRenderTargetView(res, None, Some(&mut rtv))
            } else {
                let desc = D3D11_RENDER_TARGET_VIEW_DESC {
                    Format: dxgi_format(image.channels, image.sample)?,
                    ViewDimension: D3D11_RTV_DIMENSION_TEXTURE2DARRAY,
                    Anonymous: D3D11_RENDER_TARGET_VIEW_DESC_0 {
                        Texture2DArray: D3D11_TEX2D_ARRAY_RTV {
                            MipSlice: 0,
                            FirstArraySlice: layer,
                            ArraySize: 1,
                        },
                    },
                };
                self.device.CreateRenderTargetView(res, Some(&desc), Some(&mut rtv))
            }
        }
        .map_err(|e| gfx_err("CreateRenderTargetView", e))?;
        let fb = self
            .framebuffers
            .get_mut(fb)
            .ok_or_else(|| GfxError::invalid_handle(format!("framebuffer {fb}")))?;
        fb.color = Some((tex, layer));
        fb.rtv = rtv;
        Ok(())
    }

    fn color_image(&self, fb: u32) -> GfxResult<(u32, u32, TexImage)> {
        let (tex, layer) = self
            .framebuffers
            .get(fb)
            .and_then(|f| f.color)
            .ok_or_else(|| GfxError::invalid_handle(format!("framebuffer {fb} has no color attachment")))?;
        let image = self
            .textures
            .get(tex)
            .and_then(|t| t.image)
            .ok_or_else(|| GfxError::resource(format!("texture {tex} has no storage")))?;
        Ok((tex, layer, image))
    }

    /// Copy one 2D layer of a texture to the CPU in its stored layout.
    fn download(&self, tex: u32, layer: u32, image: &TexImage) -> GfxResult<Vec<u8>> {
        let Some(Resource::Tex2D(src)) = self.textures.get(tex).and_then(|t| t.resource.as_ref())
        else {
            return Err(GfxError::unsupported("readback from non-2D texture"));
        };
        let size = image.size.size2();
        let format = dxgi_format(image.channels, image.sample)?;
        let desc = D3D11_TEXTURE2D_DESC {
            Width: size.w,
            Height: size.h,
            MipLevels: 1,
            ArraySize: 1,
            Format: format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            ..Default::default()
        };
        let stored = storage_channels(image.channels);
        let row = image.sample.byte_len(size.w as usize, stored);
        let mut out = vec![0u8; row * size.h as usize];
        unsafe {
            let mut staging = None;
            self.device
                .CreateTexture2D(&desc, None, Some(&mut staging))
                .map_err(|e| gfx_err("CreateTexture2D(staging)", e))?;
            let staging = staging.ok_or_else(|| GfxError::resource("staging texture missing"))?;
            self.ctx
                .CopySubresourceRegion(&staging, 0, 0, 0, 0, src, layer, None);
            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            self.ctx
                .Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .map_err(|e| gfx_err("Map", e))?;
            for y in 0..size.h as usize {
                let src_row = std::slice::from_raw_parts(
                    (mapped.pData as *const u8).add(y * mapped.RowPitch as usize),
                    row,
                );
                out[y * row..(y + 1) * row].copy_from_slice(src_row);
            }
            self.ctx.Unmap(&staging, 0);
        }
        Ok(out)
    }

    fn create_texture_resource(
        &self,
        target: TexTarget,
        image: &TexImage,
        data: Option<&[u8]>,
    ) -> GfxResult<(Resource, ID3D11ShaderResourceView)> {
        let format = dxgi_format(image.channels, image.sample)?;
        let stored = storage_channels(image.channels);
        let row_pitch = image.sample.byte_len(image.size.w as usize, stored) as u32;
        let slice_pitch = row_pitch * image.size.h;
        let widened = data.map(|d| widen(d, image));
        let init = widened.as_ref().map(|d| D3D11_SUBRESOURCE_DATA {
            pSysMem: d.as_ptr() as *const c_void,
            SysMemPitch: row_pitch,
            SysMemSlicePitch: slice_pitch,
        });
        let init_ptr = init.as_ref().map(|i| i as *const D3D11_SUBRESOURCE_DATA);
        let bind = (D3D11_BIND_SHADER_RESOURCE.0 | D3D11_BIND_RENDER_TARGET.0) as u32;
        unsafe {
            let resource = match target {
                TexTarget::Tex3D => {
                    let desc = D3D11_TEXTURE3D_DESC {
                        Width: image.size.w,
                        Height: image.size.h,
                        Depth: image.size.d.max(1),
                        MipLevels: 1,
                        Format: format,
                        Usage: D3D11_USAGE_DEFAULT,
                        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
                        ..Default::default()
                    };
                    let mut tex = None;
                    self.device
                        .CreateTexture3D(&desc, init_ptr, Some(&mut tex))
                        .map_err(|e| gfx_err("CreateTexture3D", e))?;
                    Resource::Tex3D(tex.ok_or_else(|| GfxError::resource("texture missing"))?)
                }
                TexTarget::Tex2D | TexTarget::CubeFace(_) => {
                    let cube = matches!(target, TexTarget::CubeFace(_));
                    let desc = D3D11_TEXTURE2D_DESC {
                        Width: image.size.w,
                        Height: image.size.h,
                        MipLevels: 1,
                        ArraySize: if cube { 6 } else { 1 },
                        Format: format,
                        SampleDesc: DXGI_SAMPLE_DESC {
                            Count: 1,
                            Quality: 0,
                        },
                        Usage: D3D11_USAGE_DEFAULT,
                        BindFlags: bind,
                        MiscFlags: if cube {
                            D3D11_RESOURCE_MISC_TEXTURECUBE.0 as u32
                        } else {
                            0
                        },
                        ..Default::default()
                    };
                    let mut tex = None;
                    // Cube faces arrive one at a time and are written with UpdateSubresource.
                    let init_ptr = if cube { None } else { init_ptr };
                    self.device
                        .CreateTexture2D(&desc, init_ptr, Some(&mut tex))
                        .map_err(|e| gfx_err("CreateTexture2D", e))?;
                    Resource::Tex2D(tex.ok_or_else(|| GfxError::resource("texture missing"))?)
                }
            };
            let mut srv = None;
            let res = resource.as_resource()?;
            self.device
                .CreateShaderResourceView(&res, None, Some(&mut srv))
                .map_err(|e| gfx_err("CreateShaderResourceView", e))?;
            let srv = srv.ok_or_else(|| GfxError::resource("view missing"))?;
            Ok((resource, srv))
        }
    }
}

impl Gfx for D11Gfx {
    const KIND: GfxKind = GfxKind::D3d11;
    const BUILTIN_SHADERS: bool = false;

    type ColorBuffer = D11Texture;
    type DepthBuffer = D11Renderbuffer;
    type FrameBuffer = D11Framebuffer;
    type Shader = D11Shader;
    type Program = D11Program;
    type Uniform = D11Uniform;
    type VertexArray = D11VertexArray;
    type VertexBuffer = D11VertexBuffer;
    type ElementBuffer = D11ElementBuffer;

    fn shader_template(stage: ShaderStage) -> &'static str {
        match stage {
            ShaderStage::Vertex => VERTEX_TEMPLATE,
            ShaderStage::Fragment => fragment_template(),
        }
    }

    fn builtin_user_code(stage: ShaderStage, name: &str) -> Option<&'static str> {
        builtin(stage, name)
    }

    fn create_shader(&mut self, stage: ShaderStage) -> GfxResult<D11Shader> {
        Ok(D11Shader(self.shaders.insert(ShaderEntry {
            stage,
            source: String::new(),
            bytecode: None,
        })))
    }

    fn shader_source(&mut self, shader: &D11Shader, source: &str) {
        if let Some(s) = self.shaders.get_mut(shader.0) {
            s.source = source.to_string();
            s.bytecode = None;
        }
    }

    fn compile_shader(&mut self, shader: &D11Shader) -> GfxResult<()> {
        let Some(entry) = self.shaders.get(shader.0) else {
            let err = GfxError::invalid_handle(format!("shader {}", shader.0));
            return Err(self.fail(err));
        };
        let stage = entry.stage;
        let target = match stage {
            ShaderStage::Vertex => s!("vs_5_0"),
            ShaderStage::Fragment => s!("ps_5_0"),
        };
        let mut code: Option<ID3DBlob> = None;
        let mut errors: Option<ID3DBlob> = None;
        let result = unsafe {
            D3DCompile(
                entry.source.as_ptr() as *const c_void,
                entry.source.len(),
                PCSTR::null(),
                None,
                None,
                s!("main"),
                target,
                0,
                0,
                &mut code,
                Some(&mut errors),
            )
        };
        let blob_bytes = |blob: &ID3DBlob| unsafe {
            std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
                .to_vec()
        };
        match (result, code) {
            (Ok(()), Some(code)) => {
                let bytes = blob_bytes(&code);
                if let Some(s) = self.shaders.get_mut(shader.0) {
                    s.bytecode = Some(bytes);
                }
                Ok(())
            }
            (result, _) => {
                let log = errors
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(&blob_bytes(b)).into_owned())
                    .or_else(|| result.err().map(|e| e.to_string()))
                    .unwrap_or_else(|| "D3DCompile produced no bytecode".to_string());
                Err(self.fail(GfxError::Compile { stage, log }))
            }
        }
    }

    fn delete_shader(&mut self, shader: D11Shader) {
        self.shaders.remove(shader.0);
    }

    fn create_program(&mut self) -> GfxResult<D11Program> {
        Ok(D11Program(self.programs.insert(ProgramEntry {
            attached: Vec::new(),
            vs: None,
            ps: None,
            layout: None,
            user_text: String::new(),
            constants: Box::new([[0.0; 4]; 256]),
        })))
    }

    fn attach_shader(&mut self, program: &D11Program, shader: &D11Shader) {
        if let Some(p) = self.programs.get_mut(program.0) {
            p.attached.push(shader.0);
        }
    }

    fn link_program(&mut self, program: &D11Program) -> GfxResult<()> {
        let Some(attached) = self.programs.get(program.0).map(|p| p.attached.clone()) else {
            let err = GfxError::invalid_handle(format!("program {}", program.0));
            return Err(self.fail(err));
        };
        let mut vs = None;
        let mut ps = None;
        let mut layout = None;
        let mut user_text = String::new();
        for id in attached {
            let Some(entry) = self.shaders.get(id) else { continue };
            let Some(code) = entry.bytecode.as_ref() else {
                let err = GfxError::Link(format!("shader {id} is not compiled"));
                return Err(self.fail(err));
            };
            let template = Self::shader_template(entry.stage);
            let prefix = template.split("${USER_CODE}").next().unwrap_or_default();
            user_text.push_str(entry.source.strip_prefix(prefix).unwrap_or(&entry.source));
            user_text.push('\n');
            let created = unsafe {
                match entry.stage {
                    ShaderStage::Vertex => {
                        let elements = [
                            D3D11_INPUT_ELEMENT_DESC {
                                SemanticName: s!("POSITION"),
                                SemanticIndex: 0,
                                Format: DXGI_FORMAT_R32G32B32A32_FLOAT,
                                InputSlot: 0,
                                AlignedByteOffset: 0,
                                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                                InstanceDataStepRate: 0,
                            },
                            D3D11_INPUT_ELEMENT_DESC {
                                SemanticName: s!("TEXCOORD"),
                                SemanticIndex: 0,
                                Format: DXGI_FORMAT_R32G32_FLOAT,
                                InputSlot: 0,
                                AlignedByteOffset: 16,
                                InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                                InstanceDataStepRate: 0,
                            },
                        ];
                        self.device
                            .CreateVertexShader(code, None, Some(&mut vs))
                            .and_then(|_| {
                                self.device.CreateInputLayout(&elements, code, Some(&mut layout))
                            })
                    }
                    ShaderStage::Fragment => self.device.CreatePixelShader(code, None, Some(&mut ps)),
                }
            };
            if let Err(e) = created {
                let err = GfxError::Link(e.to_string());
                return Err(self.fail(err));
            }
        }
        if vs.is_none() || ps.is_none() {
            let err = GfxError::Link("program needs a vertex and a fragment shader".to_string());
            return Err(self.fail(err));
        }
        if let Some(p) = self.programs.get_mut(program.0) {
            p.vs = vs;
            p.ps = ps;
            p.layout = layout;
            p.user_text = user_text;
        }
        Ok(())
    }

    fn use_program(&mut self, program: &D11Program) {
        self.program = Some(program.0);
    }

    fn delete_program(&mut self, program: D11Program) {
        if self.program == Some(program.0) {
            self.program = None;
        }
        self.programs.remove(program.0);
    }

    fn active_uniforms(&self, program: &D11Program) -> Vec<String> {
        let Some(p) = self.programs.get(program.0) else {
            return Vec::new();
        };
        STANDARD_UNIFORMS
            .iter()
            .map(|u| u.name)
            .chain(CHANNEL_UNIFORMS)
            .filter(|name| mentions(&p.user_text, name))
            .map(str::to_string)
            .collect()
    }

    fn uniform_location(&self, program: &D11Program, name: &str) -> Option<D11Uniform> {
        self.programs.get(program.0)?;
        if let Some(ch) = CHANNEL_UNIFORMS.iter().position(|c| *c == name) {
            return Some(D11Uniform::Sampler {
                program: program.0,
                channel: ch as u8,
            });
        }
        crate::gfx::standard_uniform(name).map(|slot| D11Uniform::Slot {
            program: program.0,
            slot: *slot,
        })
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn gen_texture(&mut self) -> GfxResult<D11Texture> {
        Ok(D11Texture(self.textures.insert(TexEntry::default())))
    }

    fn active_texture(&mut self, unit: u32) {
        self.active_unit = (unit as usize).min(CHANNEL_COUNT - 1);
    }

    fn bind_texture_ro(&mut self, _kind: TexKind, tex: &D11Texture) {
        self.units[self.active_unit] = Some(tex.0);
    }

    fn bind_texture_rw(&mut self, _kind: TexKind, tex: &D11Texture) {
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
        if let TexTarget::CubeFace(f) = target
            && f >= 6
        {
            return Err(GfxError::resource(format!("cube face {f} out of range")));
        }
        let mut layout = *image;
        if target != TexTarget::Tex3D {
            layout.size.d = 0;
        }
        if let Some(d) = data
            && d.len() != layout.byte_len()
        {
            return Err(GfxError::resource(format!(
                "texture upload of {} bytes, expected {}",
                d.len(),
                layout.byte_len()
            )));
        }
        let kind = target.kind();
        let reuse = self
            .textures
            .get(id)
            .is_some_and(|t| t.kind == Some(kind) && t.image == Some(layout) && t.resource.is_some());
        if !reuse {
            let (resource, srv) = self.create_texture_resource(target, &layout, data)?;
            let entry = self
                .textures
                .get_mut(id)
                .ok_or_else(|| GfxError::invalid_handle(format!("texture {id}")))?;
            entry.kind = Some(kind);
            entry.image = Some(layout);
            entry.resource = Some(resource);
            entry.srv = Some(srv);
            if !matches!(target, TexTarget::CubeFace(_)) {
                return Ok(());
            }
        }
        let Some(d) = data else { return Ok(()) };
        let widened = widen(d, &layout);
        let stored = storage_channels(layout.channels);
        let row_pitch = layout.sample.byte_len(layout.size.w as usize, stored) as u32;
        let subresource = match target {
            TexTarget::CubeFace(f) => f as u32,
            _ => 0,
        };
        let res = self
            .textures
            .get(id)
            .and_then(|t| t.resource.as_ref())
            .ok_or_else(|| GfxError::resource("texture storage missing"))?
            .as_resource()?;
        unsafe {
            self.ctx.UpdateSubresource(
                &res,
                subresource,
                None,
                widened.as_ptr() as *const c_void,
                row_pitch,
                row_pitch * layout.size.h,
            );
        }
        Ok(())
    }

    fn tex_parameters(&mut self, _kind: TexKind, filter: Filter, wrap: Wrap) {
        let Some(id) = self.rw_texture else { return };
        let filter = match filter {
            Filter::Nearest => D3D11_FILTER_MIN_MAG_MIP_POINT,
            Filter::Linear | Filter::Mipmap => D3D11_FILTER_MIN_MAG_MIP_LINEAR,
        };
        let address = match wrap {
            Wrap::Clamp => D3D11_TEXTURE_ADDRESS_CLAMP,
            Wrap::Repeat => D3D11_TEXTURE_ADDRESS_WRAP,
        };
        let desc = D3D11_SAMPLER_DESC {
            Filter: filter,
            AddressU: address,
            AddressV: address,
            AddressW: address,
            MaxAnisotropy: 1,
            ComparisonFunc: D3D11_COMPARISON_NEVER,
            MaxLOD: f32::MAX,
            ..Default::default()
        };
        let mut sampler = None;
        if let Err(e) = unsafe { self.device.CreateSamplerState(&desc, Some(&mut sampler)) } {
            self.last_error = Some(format!("CreateSamplerState: {e}"));
            return;
        }
        if let Some(t) = self.textures.get_mut(id) {
            t.sampler = sampler;
        }
    }

    fn generate_mipmap(&mut self, _kind: TexKind) {
        // Textures are created with a single level; `Filter::Mipmap` samples linearly.
    }

    fn delete_texture(&mut self, tex: D11Texture) {
        if tex.0 == 0 {
            return;
        }
        self.units
            .iter_mut()
            .filter(|u| **u == Some(tex.0))
            .for_each(|u| *u = None);
        if self.rw_texture == Some(tex.0) {
            self.rw_texture = None;
        }
        self.textures.remove(tex.0);
    }

    fn create_framebuffer(&mut self) -> GfxResult<D11Framebuffer> {
        Ok(D11Framebuffer(self.framebuffers.insert(FbEntry::default())))
    }

    fn bind_framebuffer(&mut self, fb: &D11Framebuffer) {
        self.draw_fb = fb.0;
    }

    fn bind_framebuffer_ro(&mut self, fb: &D11Framebuffer) {
        self.read_fb = fb.0;
    }

    fn bind_framebuffer_default(&mut self) {
        self.draw_fb = 0;
        self.read_fb = 0;
    }

    fn unbind_framebuffer(&mut self) {
        self.bind_framebuffer_default();
    }

    fn framebuffer_texture_2d(&mut self, target: TexTarget, tex: &D11Texture) -> GfxResult<()> {
        if self.draw_fb == 0 {
            return Err(GfxError::invalid_handle("cannot re-attach the default framebuffer"));
        }
        self.attach_color(self.draw_fb, tex.0, target)
    }

    fn create_renderbuffer(&mut self) -> GfxResult<D11Renderbuffer> {
        Ok(D11Renderbuffer(self.renderbuffers.insert(RbEntry::default())))
    }

    fn renderbuffer_storage(&mut self, rb: &D11Renderbuffer, size: Size2) -> GfxResult<()> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: size.w,
            Height: size.h,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_D24_UNORM_S8_UINT,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: D3D11_BIND_DEPTH_STENCIL.0 as u32,
            ..Default::default()
        };
        let mut tex = None;
        let mut dsv = None;
        unsafe {
            self.device
                .CreateTexture2D(&desc, None, Some(&mut tex))
                .map_err(|e| gfx_err("CreateTexture2D(depth)", e))?;
            let tex = tex.ok_or_else(|| GfxError::resource("depth texture missing"))?;
            self.device
                .CreateDepthStencilView(&tex, None, Some(&mut dsv))
                .map_err(|e| gfx_err("CreateDepthStencilView", e))?;
        }
        let entry = self
            .renderbuffers
            .get_mut(rb.0)
            .ok_or_else(|| GfxError::invalid_handle(format!("renderbuffer {}", rb.0)))?;
        entry.size = size;
        entry.dsv = dsv;
        Ok(())
    }

    fn framebuffer_renderbuffer(&mut self, rb: &D11Renderbuffer) -> GfxResult<()> {
        let dsv = self
            .renderbuffers
            .get(rb.0)
            .and_then(|r| r.dsv.clone())
            .ok_or_else(|| GfxError::invalid_handle(format!("renderbuffer {} has no storage", rb.0)))?;
        let fb = self
            .framebuffers
            .get_mut(self.draw_fb)
            .ok_or_else(|| GfxError::invalid_handle("bound framebuffer"))?;
        fb.dsv = Some(dsv);
        Ok(())
    }

    fn framebuffer_complete(&self) -> bool {
        self.framebuffers
            .get(self.draw_fb)
            .is_some_and(|f| f.rtv.is_some())
    }

    fn delete_framebuffer(&mut self, fb: D11Framebuffer) {
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

    fn delete_renderbuffer(&mut self, rb: D11Renderbuffer) {
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
        let (tex, layer, image) = self.color_image(self.read_fb)?;
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
        let data = self.download(tex, layer, &image)?;
        raster::read_region(
            &data,
            src_size,
            storage_channels(image.channels),
            image.sample,
            origin,
            size,
            channels,
            sample,
            out,
        );
        Ok(())
    }

    fn gen_vertex_array(&mut self) -> GfxResult<D11VertexArray> {
        Ok(D11VertexArray(self.vertex_arrays.insert(VaEntry::default())))
    }

    fn gen_vertex_buffer(&mut self) -> GfxResult<D11VertexBuffer> {
        Ok(D11VertexBuffer(self.buffers.insert(None)))
    }

    fn gen_element_buffer(&mut self) -> GfxResult<D11ElementBuffer> {
        Ok(D11ElementBuffer(self.buffers.insert(None)))
    }

    fn bind_vertex_array(&mut self, vao: &D11VertexArray) {
        self.vao = Some(vao.0);
    }

    fn vertex_buffer_data(&mut self, vbo: &D11VertexBuffer, vertices: &[Vertex]) -> GfxResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let buf = upload_buffer(&self.device, bytes, D3D11_BIND_VERTEX_BUFFER)?;
        let slot = self
            .buffers
            .get_mut(vbo.0)
            .ok_or_else(|| GfxError::invalid_handle(format!("vertex buffer {}", vbo.0)))?;
        *slot = Some(buf);
        if let Some(vao) = self.vao.and_then(|id| self.vertex_arrays.get_mut(id)) {
            vao.vbo = Some(vbo.0);
        }
        Ok(())
    }

    fn element_buffer_data(&mut self, ebo: &D11ElementBuffer, indices: &[u32]) -> GfxResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        let buf = upload_buffer(&self.device, bytes, D3D11_BIND_INDEX_BUFFER)?;
        let slot = self
            .buffers
            .get_mut(ebo.0)
            .ok_or_else(|| GfxError::invalid_handle(format!("element buffer {}", ebo.0)))?;
        *slot = Some(buf);
        if let Some(vao) = self.vao.and_then(|id| self.vertex_arrays.get_mut(id)) {
            vao.ebo = Some(ebo.0);
        }
        Ok(())
    }

    fn draw_vertex_elements(&mut self, count: u32) -> GfxResult<()> {
        let pid = self
            .program
            .ok_or_else(|| GfxError::invalid_handle("no program in use"))?;
        let program = self
            .programs
            .get(pid)
            .ok_or_else(|| GfxError::invalid_handle(format!("program {pid}")))?;
        let (Some(vs), Some(ps), Some(layout)) = (&program.vs, &program.ps, &program.layout) else {
            return Err(GfxError::invalid_handle(format!("program {pid} is not linked")));
        };
        let vao = self
            .vao
            .and_then(|id| self.vertex_arrays.get(id))
            .ok_or_else(|| GfxError::invalid_handle("no vertex array bound"))?;
        let vbo = vao
            .vbo
            .and_then(|id| self.buffers.get(id))
            .cloned()
            .flatten()
            .ok_or_else(|| GfxError::invalid_handle("vertex array has no vertex buffer"))?;
        let ebo = vao
            .ebo
            .and_then(|id| self.buffers.get(id))
            .cloned()
            .flatten()
            .ok_or_else(|| GfxError::invalid_handle("vertex array has no element buffer"))?;
        let fb = self
            .framebuffers
            .get(self.draw_fb)
            .ok_or_else(|| GfxError::invalid_handle("bound framebuffer"))?;
        let (_, _, image) = self.color_image(self.draw_fb)?;
        let (vx, vy, vs_size) = self.viewport.unwrap_or((0, 0, image.size.size2()));

        let srvs: [Option<ID3D11ShaderResourceView>; CHANNEL_COUNT] = std::array::from_fn(|i| {
            self.units[i]
                .and_then(|id| self.textures.get(id))
                .and_then(|t| t.srv.clone())
        });
        let samplers: [Option<ID3D11SamplerState>; CHANNEL_COUNT] = std::array::from_fn(|i| {
            self.units[i]
                .and_then(|id| self.textures.get(id))
                .and_then(|t| t.sampler.clone())
        });
        let stride = std::mem::size_of::<Vertex>() as u32;
        let offset = 0u32;
        let vbos = [Some(vbo)];
        unsafe {
            self.ctx.UpdateSubresource(
                &self.constant_buffer,
                0,
                None,
                program.constants.as_ptr() as *const c_void,
                0,
                0,
            );
            self.ctx.IASetInputLayout(layout);
            self.ctx.IASetVertexBuffers(
                0,
                1,
                Some(vbos.as_ptr()),
                Some(&stride),
                Some(&offset),
            );
            self.ctx.IASetIndexBuffer(&ebo, DXGI_FORMAT_R32_UINT, 0);
            self.ctx
                .IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            self.ctx.VSSetShader(vs, None);
            self.ctx.PSSetShader(ps, None);
            let cbs = [Some(self.constant_buffer.clone())];
            self.ctx.VSSetConstantBuffers(0, Some(&cbs));
            self.ctx.PSSetConstantBuffers(0, Some(&cbs));
            self.ctx.PSSetShaderResources(0, Some(&srvs));
            self.ctx.PSSetSamplers(0, Some(&samplers));
            self.ctx.OMSetRenderTargets(Some(&[fb.rtv.clone()]), fb.dsv.as_ref());
            self.ctx.RSSetViewports(Some(&[D3D11_VIEWPORT {
                TopLeftX: vx as f32,
                TopLeftY: vy as f32,
                Width: vs_size.w as f32,
                Height: vs_size.h as f32,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            }]));
            self.ctx
                .RSSetState(&self.raster_states[usize::from(self.cull_back)]);
            self.ctx
                .OMSetDepthStencilState(&self.depth_states[usize::from(self.depth_test)], 0);
            self.ctx.DrawIndexed(count, 0, 0);
            let empty: [Option<ID3D11ShaderResourceView>; CHANNEL_COUNT] = Default::default();
            self.ctx.PSSetShaderResources(0, Some(&empty));
        }
        Ok(())
    }

    fn delete_vertex_array(&mut self, vao: D11VertexArray) {
        if self.vao == Some(vao.0) {
            self.vao = None;
        }
        self.vertex_arrays.remove(vao.0);
    }

    fn delete_vertex_buffer(&mut self, vbo: D11VertexBuffer) {
        self.buffers.remove(vbo.0);
    }

    fn delete_element_buffer(&mut self, ebo: D11ElementBuffer) {
        self.buffers.remove(ebo.0);
    }

    fn set_uniform(&mut self, loc: &D11Uniform, value: UniformValue) {
        let D11Uniform::Slot { program, slot } = *loc else {
            // Sampler channels are bound to the texture slot of the same index.
            return;
        };
        let Some(p) = self.programs.get_mut(program) else {
            return;
        };
        let flat: &mut [f32; 1024] = bytemuck::cast_mut(&mut *p.constants);
        let start = slot.register as usize * 4 + slot.component as usize;
        let values: Vec<f32> = match value {
            UniformValue::Mat4(m) => m.to_vec(),
            other => other.as_vec4()[..(slot.len as usize).min(4)].to_vec(),
        };
        for (dst, v) in flat[start..].iter_mut().zip(values) {
            *dst = v;
        }
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    fn clear_buffers(&mut self, color: bool, depth: bool) {
        let Some(fb) = self.framebuffers.get(self.draw_fb) else {
            return;
        };
        unsafe {
            if color && let Some(rtv) = fb.rtv.as_ref() {
                self.ctx.ClearRenderTargetView(rtv, self.clear_color.as_ptr());
            }
            if depth && let Some(dsv) = fb.dsv.as_ref() {
                self.ctx
                    .ClearDepthStencilView(dsv, D3D11_CLEAR_DEPTH.0 as u32, 1.0, 0);
            }
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
        let image = TexImage::new_2d(self.size, 4, SampleType::U8);
        match self.download(0, 0, &image) {
            Ok(frame) => self.presented = Some(frame),
            Err(e) => self.last_error = Some(e.to_string()),
        }
        self.frames += 1;
    }
}

fn upload_buffer(device: &ID3D11Device, bytes: &[u8], bind: D3D11_BIND_FLAG) -> GfxResult<ID3D11Buffer> {
    let desc = D3D11_BUFFER_DESC {
        ByteWidth: bytes.len() as u32,
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: bind.0 as u32,
        ..Default::default()
    };
    let init = D3D11_SUBRESOURCE_DATA {
        pSysMem: bytes.as_ptr() as *const c_void,
        SysMemPitch: 0,
        SysMemSlicePitch: 0,
    };
    let mut buf = None;
    unsafe { device.CreateBuffer(&desc, Some(&init), Some(&mut buf)) }
        .map_err(|e| gfx_err("CreateBuffer", e))?;
    buf.ok_or_else(|| GfxError::resource("buffer missing"))
}
