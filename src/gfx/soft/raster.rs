//! Texel codecs, sampling and triangle rasterization for the software backend.

use rayon::prelude::*;

use crate::foundation::core::{Filter, SampleType, Size2, Wrap};
use crate::gfx::soft::shaders::{FragmentBuiltin, ShadeEnv};

/// Decode texel `index` of a tightly packed buffer into RGBA floats.
///
/// Missing channels follow the GL convention: green/blue read 0, alpha reads 1.
pub(crate) fn decode_texel(data: &[u8], index: usize, channels: u8, sample: SampleType) -> [f32; 4] {
    let mut out = [0.0, 0.0, 0.0, 1.0];
    let ch = channels as usize;
    let base = index * ch * sample.size();
    for (c, o) in out.iter_mut().enumerate().take(ch.min(4)) {
        let at = base + c * sample.size();
        *o = match sample {
            SampleType::U8 => data.get(at).map(|b| *b as f32 / 255.0).unwrap_or(0.0),
            SampleType::U16 => data
                .get(at..at + 2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]) as f32 / 65535.0)
                .unwrap_or(0.0),
            SampleType::F32 => data
                .get(at..at + 4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .unwrap_or(0.0),
        };
    }
    out
}

/// Encode RGBA floats into one texel.
pub(crate) fn encode_texel(rgba: [f32; 4], channels: u8, sample: SampleType, out: &mut [u8]) {
    for (c, v) in rgba.iter().enumerate().take(channels as usize) {
        let at = c * sample.size();
        match sample {
            SampleType::U8 => out[at] = (v.clamp(0.0, 1.0) * 255.0).round() as u8,
            SampleType::U16 => {
                let q = (v.clamp(0.0, 1.0) * 65535.0).round() as u16;
                out[at..at + 2].copy_from_slice(&q.to_le_bytes());
            }
            SampleType::F32 => out[at..at + 4].copy_from_slice(&v.to_le_bytes()),
        }
    }
}

/// Borrowed view of one texture layer for sampling.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TexView<'a> {
    pub data: &'a [u8],
    pub size: Size2,
    pub channels: u8,
    pub sample: SampleType,
    pub filter: Filter,
    pub wrap: Wrap,
}

impl TexView<'_> {
    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let (w, h) = (self.size.w as i64, self.size.h as i64);
        let (x, y) = match self.wrap {
            Wrap::Clamp => (x.clamp(0, w - 1), y.clamp(0, h - 1)),
            Wrap::Repeat => (x.rem_euclid(w), y.rem_euclid(h)),
        };
        decode_texel(
            self.data,
            (y * w + x) as usize,
            self.channels,
            self.sample,
        )
    }

    /// Sample at normalized coordinates; `v = 0` is the first stored row.
    pub fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        if self.size.is_empty() {
            return [0.0, 0.0, 0.0, 1.0];
        }
        let x = uv[0] * self.size.w as f32;
        let y = uv[1] * self.size.h as f32;
        match self.filter {
            Filter::Nearest => self.texel(x.floor() as i64, y.floor() as i64),
            Filter::Linear | Filter::Mipmap => {
                let (fx, fy) = (x - 0.5, y - 0.5);
                let (x0, y0) = (fx.floor(), fy.floor());
                let (tx, ty) = (fx - x0, fy - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let a = self.texel(x0, y0);
                let b = self.texel(x0 + 1, y0);
                let c = self.texel(x0, y0 + 1);
                let d = self.texel(x0 + 1, y0 + 1);
                std::array::from_fn(|i| {
                    let top = a[i] + (b[i] - a[i]) * tx;
                    let bottom = c[i] + (d[i] - c[i]) * tx;
                    top + (bottom - top) * ty
                })
            }
        }
    }
}

/// Re-encode a region of `src` into another channel/sample layout.
///
/// Identical layouts are copied byte for byte.
#[allow(clippy::too_many_arguments)]
pub(crate) fn read_region(
    src: &[u8],
    src_size: Size2,
    src_channels: u8,
    src_sample: SampleType,
    origin: (u32, u32),
    size: Size2,
    channels: u8,
    sample: SampleType,
    out: &mut [u8],
) {
    let src_px = src_sample.byte_len(1, src_channels);
    let dst_px = sample.byte_len(1, channels);
    let same = src_channels == channels && src_sample == sample;
    for row in 0..size.h as usize {
        let sy = origin.1 as usize + row;
        for col in 0..size.w as usize {
            let sx = origin.0 as usize + col;
            let si = sy * src_size.w as usize + sx;
            let di = row * size.w as usize + col;
            let dst = &mut out[di * dst_px..(di + 1) * dst_px];
            if same {
                dst.copy_from_slice(&src[si * src_px..(si + 1) * src_px]);
            } else {
                encode_texel(decode_texel(src, si, src_channels, src_sample), channels, sample, dst);
            }
        }
    }
}

/// Fill every texel with one color.
pub(crate) fn fill(data: &mut [u8], rgba: [f32; 4], channels: u8, sample: SampleType) {
    let px = sample.byte_len(1, channels);
    if px == 0 {
        return;
    }
    let mut texel = vec![0u8; px];
    encode_texel(rgba, channels, sample, &mut texel);
    for chunk in data.chunks_exact_mut(px) {
        chunk.copy_from_slice(&texel);
    }
}

/// Post-vertex-shader vertex.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ClipVertex {
    pub position: [f32; 4],
    pub uv: [f32; 2],
}

/// Fragment inputs.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Fragment {
    /// Window coordinates of the pixel center.
    pub coord: [f32; 2],
    pub uv: [f32; 2],
}

/// Color (and optional depth) storage for one draw.
pub(crate) struct RenderTarget<'a> {
    pub color: &'a mut [u8],
    pub depth: Option<&'a mut [f32]>,
    pub size: Size2,
    pub channels: u8,
    pub sample: SampleType,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RasterState {
    pub viewport: (u32, u32, Size2),
    pub depth_test: bool,
    pub cull_back: bool,
}

/// Screen-space triangle ready for scan conversion.
struct Setup {
    x: [f32; 3],
    y: [f32; 3],
    z: [f32; 3],
    inv_w: [f32; 3],
    uv_w: [[f32; 2]; 3],
    inv_area: f32,
    min_x: u32,
    max_x: u32,
    min_y: u32,
    max_y: u32,
}

fn edge(ax: f32, ay: f32, bx: f32, by: f32, px: f32, py: f32) -> f32 {
    (bx - ax) * (py - ay) - (by - ay) * (px - ax)
}

fn setup(tri: &[ClipVertex; 3], state: &RasterState, target: Size2) -> Option<Setup> {
    if tri.iter().any(|v| v.position[3] <= 0.0) {
        return None;
    }
    let (vx, vy, vs) = state.viewport;
    let mut s = Setup {
        x: [0.0; 3],
        y: [0.0; 3],
        z: [0.0; 3],
        inv_w: [0.0; 3],
        uv_w: [[0.0; 2]; 3],
        inv_area: 0.0,
        min_x: 0,
        max_x: 0,
        min_y: 0,
        max_y: 0,
    };
    for (i, v) in tri.iter().enumerate() {
        let inv_w = 1.0 / v.position[3];
        s.x[i] = vx as f32 + (v.position[0] * inv_w * 0.5 + 0.5) * vs.w as f32;
        s.y[i] = vy as f32 + (v.position[1] * inv_w * 0.5 + 0.5) * vs.h as f32;
        s.z[i] = v.position[2] * inv_w * 0.5 + 0.5;
        s.inv_w[i] = inv_w;
        s.uv_w[i] = [v.uv[0] * inv_w, v.uv[1] * inv_w];
    }
    let area = edge(s.x[0], s.y[0], s.x[1], s.y[1], s.x[2], s.y[2]);
    if area == 0.0 || (state.cull_back && area < 0.0) {
        return None;
    }
    s.inv_area = 1.0 / area;

    let clip_w = (vx + vs.w).min(target.w);
    let clip_h = (vy + vs.h).min(target.h);
    let lo = |v: &[f32; 3], floor: u32| {
        v.iter().copied().fold(f32::MAX, f32::min).floor().max(floor as f32) as u32
    };
    let hi = |v: &[f32; 3], ceil: u32| {
        v.iter().copied().fold(f32::MIN, f32::max).ceil().clamp(0.0, ceil as f32) as u32
    };
    s.min_x = lo(&s.x, vx);
    s.max_x = hi(&s.x, clip_w);
    s.min_y = lo(&s.y, vy);
    s.max_y = hi(&s.y, clip_h);
    (s.min_x < s.max_x && s.min_y < s.max_y).then_some(s)
}

#[allow(clippy::too_many_arguments)]
fn shade_row(
    y: u32,
    row: &mut [u8],
    mut depth: Option<&mut [f32]>,
    tris: &[Setup],
    px_bytes: usize,
    target: &(u8, SampleType),
    state: &RasterState,
    fragment: FragmentBuiltin,
    env: &ShadeEnv<'_>,
) {
    let py = y as f32 + 0.5;
    for t in tris.iter().filter(|t| y >= t.min_y && y < t.max_y) {
        for x in t.min_x..t.max_x {
            let px = x as f32 + 0.5;
            let w0 = edge(t.x[1], t.y[1], t.x[2], t.y[2], px, py) * t.inv_area;
            let w1 = edge(t.x[2], t.y[2], t.x[0], t.y[0], px, py) * t.inv_area;
            let w2 = edge(t.x[0], t.y[0], t.x[1], t.y[1], px, py) * t.inv_area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let z = w0 * t.z[0] + w1 * t.z[1] + w2 * t.z[2];
            if state.depth_test
                && let Some(d) = depth.as_deref_mut()
            {
                let slot = &mut d[x as usize];
                if z >= *slot {
                    continue;
                }
                *slot = z;
            }
            let inv_w = w0 * t.inv_w[0] + w1 * t.inv_w[1] + w2 * t.inv_w[2];
            let uv = std::array::from_fn(|i| {
                (w0 * t.uv_w[0][i] + w1 * t.uv_w[1][i] + w2 * t.uv_w[2][i]) / inv_w
            });
            let frag = Fragment {
                coord: [px, py],
                uv,
            };
            let rgba = fragment.shade(&frag, env);
            let at = x as usize * px_bytes;
            encode_texel(rgba, target.0, target.1, &mut row[at..at + px_bytes]);
        }
    }
}

/// Rasterize a triangle list into `target`, rows in parallel.
pub(crate) fn draw_triangles(
    target: RenderTarget<'_>,
    tris: &[[ClipVertex; 3]],
    state: &RasterState,
    fragment: FragmentBuiltin,
    env: &ShadeEnv<'_>,
) {
    let setups: Vec<Setup> = tris
        .iter()
        .filter_map(|t| setup(t, state, target.size))
        .collect();
    if setups.is_empty() {
        return;
    }
    let px_bytes = target.sample.byte_len(1, target.channels);
    let row_bytes = px_bytes * target.size.w as usize;
    if row_bytes == 0 {
        return;
    }
    let layout = (target.channels, target.sample);
    match target.depth {
        Some(depth) => target
            .color
            .par_chunks_mut(row_bytes)
            .zip(depth.par_chunks_mut(target.size.w as usize))
            .enumerate()
            .for_each(|(y, (row, drow))| {
                shade_row(
                    y as u32, row, Some(drow), &setups, px_bytes, &layout, state, fragment, env,
                )
            }),
        None => target
            .color
            .par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| {
                shade_row(
                    y as u32, row, None, &setups, px_bytes, &layout, state, fragment, env,
                )
            }),
    }
}
