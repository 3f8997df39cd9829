//! Built-in shader library for the software rasterizer.
//!
//! Soft shader sources are plain text carrying `#pragma builtin <name>`; the last directive in a
//! source selects the program body. Anything else in the source is ignored.

use crate::gfx::ShaderStage;
use crate::gfx::soft::raster::{Fragment, TexView};
use crate::packet::RenderState;

pub(crate) const VERTEX_TEMPLATE: &str = "// atomgraph soft vertex stage\n${USER_CODE}\n";
pub(crate) const FRAGMENT_TEMPLATE: &str = "// atomgraph soft fragment stage\n${USER_CODE}\n";

const PRAGMA: &str = "#pragma builtin";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexBuiltin {
    /// Position and texture coordinate unchanged.
    Passthrough,
    /// `iProjection * iView * position`.
    Transform,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentBuiltin {
    /// Flat pink, used when no fragment code is configured.
    Default,
    Copy,
    Invert,
    Solid,
    Gradient,
    Mix,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Vertex(VertexBuiltin),
    Fragment(FragmentBuiltin),
}

impl Builtin {
    pub fn uniforms(self) -> &'static [&'static str] {
        match self {
            Self::Vertex(VertexBuiltin::Passthrough) => &[],
            Self::Vertex(VertexBuiltin::Transform) => &["iView", "iProjection"],
            Self::Fragment(FragmentBuiltin::Default) => &[],
            Self::Fragment(FragmentBuiltin::Copy | FragmentBuiltin::Invert) => {
                &["iChannel0", "iResolution"]
            }
            Self::Fragment(FragmentBuiltin::Solid) => &["iColor"],
            Self::Fragment(FragmentBuiltin::Gradient) => &["iResolution", "iTime"],
            Self::Fragment(FragmentBuiltin::Mix) => {
                &["iChannel0", "iChannel1", "iResolution", "iMix"]
            }
        }
    }
}

/// Source text selecting a built-in, as returned by `Gfx::builtin_user_code`.
pub(crate) fn user_code(stage: ShaderStage, name: &str) -> Option<&'static str> {
    Some(match (stage, name) {
        (ShaderStage::Vertex, "passthrough") => "#pragma builtin passthrough",
        (ShaderStage::Vertex, "transform") => "#pragma builtin transform",
        (ShaderStage::Fragment, "default") => "#pragma builtin default",
        (ShaderStage::Fragment, "copy") => "#pragma builtin copy",
        (ShaderStage::Fragment, "invert") => "#pragma builtin invert",
        (ShaderStage::Fragment, "solid") => "#pragma builtin solid",
        (ShaderStage::Fragment, "gradient") => "#pragma builtin gradient",
        (ShaderStage::Fragment, "mix") => "#pragma builtin mix",
        _ => return None,
    })
}

/// Resolve the built-in named by a shader source.
pub(crate) fn parse_source(stage: ShaderStage, source: &str) -> Result<Builtin, String> {
    let name = source
        .lines()
        .filter_map(|l| l.trim().strip_prefix(PRAGMA))
        .map(str::trim)
        .next_back()
        .ok_or_else(|| format!("missing '{PRAGMA} <name>' directive"))?;
    let builtin = match (stage, name) {
        (ShaderStage::Vertex, "passthrough") => Builtin::Vertex(VertexBuiltin::Passthrough),
        (ShaderStage::Vertex, "transform") => Builtin::Vertex(VertexBuiltin::Transform),
        (ShaderStage::Fragment, "default") => Builtin::Fragment(FragmentBuiltin::Default),
        (ShaderStage::Fragment, "copy") => Builtin::Fragment(FragmentBuiltin::Copy),
        (ShaderStage::Fragment, "invert") => Builtin::Fragment(FragmentBuiltin::Invert),
        (ShaderStage::Fragment, "solid") => Builtin::Fragment(FragmentBuiltin::Solid),
        (ShaderStage::Fragment, "gradient") => Builtin::Fragment(FragmentBuiltin::Gradient),
        (ShaderStage::Fragment, "mix") => Builtin::Fragment(FragmentBuiltin::Mix),
        (stage, name) => return Err(format!("unknown built-in {stage:?} shader '{name}'")),
    };
    Ok(builtin)
}

/// Uniform values resolved once per draw call.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FrameUniforms {
    pub resolution: [f32; 3],
    pub time: f32,
    pub mix: f32,
    pub color: [f32; 4],
    pub view: [f32; 16],
    pub projection: [f32; 16],
    /// Sampler unit per `iChannelN`.
    pub channels: [usize; 4],
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            resolution: [0.0; 3],
            time: 0.0,
            mix: 0.5,
            color: [1.0; 4],
            view: RenderState::IDENTITY,
            projection: RenderState::IDENTITY,
            channels: [0, 1, 2, 3],
        }
    }
}

impl FrameUniforms {
    pub fn from_slots(slots: &[(&'static str, Option<crate::gfx::UniformValue>)]) -> Self {
        use crate::gfx::UniformValue;

        let mut out = Self::default();
        for (name, value) in slots {
            let Some(value) = value else { continue };
            let v = value.as_vec4();
            match *name {
                "iResolution" => out.resolution = [v[0], v[1], v[2]],
                "iTime" => out.time = v[0],
                "iMix" => out.mix = v[0],
                "iColor" => out.color = v,
                "iView" => {
                    if let UniformValue::Mat4(m) = value {
                        out.view = *m;
                    }
                }
                "iProjection" => {
                    if let UniformValue::Mat4(m) = value {
                        out.projection = *m;
                    }
                }
                "iChannel0" => out.channels[0] = value.as_i32().max(0) as usize,
                "iChannel1" => out.channels[1] = value.as_i32().max(0) as usize,
                "iChannel2" => out.channels[2] = value.as_i32().max(0) as usize,
                "iChannel3" => out.channels[3] = value.as_i32().max(0) as usize,
                _ => {}
            }
        }
        out
    }
}

fn mat_vec(m: &[f32; 16], v: [f32; 4]) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (r, o) in out.iter_mut().enumerate() {
        *o = (0..4).map(|c| m[c * 4 + r] * v[c]).sum();
    }
    out
}

impl VertexBuiltin {
    pub fn run(self, position: [f32; 4], u: &FrameUniforms) -> [f32; 4] {
        match self {
            Self::Passthrough => position,
            Self::Transform => mat_vec(&u.projection, mat_vec(&u.view, position)),
        }
    }
}

/// Sampler access for one draw call.
pub(crate) struct ShadeEnv<'a> {
    pub uniforms: FrameUniforms,
    pub units: [Option<TexView<'a>>; 4],
}

impl ShadeEnv<'_> {
    fn channel(&self, ch: usize, uv: [f32; 2]) -> [f32; 4] {
        self.uniforms
            .channels
            .get(ch)
            .and_then(|unit| self.units.get(*unit))
            .and_then(Option::as_ref)
            .map(|view| view.sample(uv))
            .unwrap_or([0.0, 0.0, 0.0, 1.0])
    }

    fn screen_uv(&self, frag: &Fragment) -> [f32; 2] {
        let [w, h, _] = self.uniforms.resolution;
        if w > 0.0 && h > 0.0 {
            [frag.coord[0] / w, frag.coord[1] / h]
        } else {
            frag.uv
        }
    }
}

impl FragmentBuiltin {
    pub fn shade(self, frag: &Fragment, env: &ShadeEnv<'_>) -> [f32; 4] {
        match self {
            Self::Default => [0.94, 0.19, 0.39, 1.0],
            Self::Copy => env.channel(0, env.screen_uv(frag)),
            Self::Invert => {
                let c = env.channel(0, env.screen_uv(frag));
                [1.0 - c[0], 1.0 - c[1], 1.0 - c[2], c[3]]
            }
            Self::Solid => env.uniforms.color,
            Self::Gradient => {
                let uv = env.screen_uv(frag);
                [uv[0], uv[1], 0.5 + 0.5 * env.uniforms.time.sin(), 1.0]
            }
            Self::Mix => {
                let uv = env.screen_uv(frag);
                let a = env.channel(0, uv);
                let b = env.channel(1, uv);
                let t = env.uniforms.mix.clamp(0.0, 1.0);
                std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
            }
        }
    }
}
