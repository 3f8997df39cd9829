use crate::foundation::error::{GraphError, GraphResult};

/// 2D size in pixels (or samples for 1xN audio rows).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Size2 {
    /// Width.
    pub w: u32,
    /// Height.
    pub h: u32,
}

impl Size2 {
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// Number of texels.
    pub fn area(self) -> usize {
        (self.w as usize).saturating_mul(self.h as usize)
    }

    pub fn is_empty(self) -> bool {
        self.w == 0 || self.h == 0
    }
}

impl std::fmt::Display for Size2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.w, self.h)
    }
}

/// 3D size; `d == 0` denotes a plain 2D extent.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Size3 {
    /// Width.
    pub w: u32,
    /// Height.
    pub h: u32,
    /// Depth (slices).
    pub d: u32,
}

impl Size3 {
    pub const fn new(w: u32, h: u32, d: u32) -> Self {
        Self { w, h, d }
    }

    pub fn size2(self) -> Size2 {
        Size2::new(self.w, self.h)
    }

    /// Number of texels, counting a 2D extent as a single slice.
    pub fn volume(self) -> usize {
        self.size2().area().saturating_mul(self.d.max(1) as usize)
    }
}

impl From<Size2> for Size3 {
    fn from(s: Size2) -> Self {
        Self::new(s.w, s.h, 0)
    }
}

impl std::fmt::Display for Size3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.w, self.h, self.d)
    }
}

/// Per-channel sample storage type.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    /// 8-bit unsigned normalized.
    U8,
    /// 16-bit unsigned normalized, little endian.
    U16,
    /// 32-bit float, little endian.
    F32,
}

impl SampleType {
    /// Bytes per channel sample.
    pub const fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::F32 => 4,
        }
    }

    /// Byte length of a tightly packed buffer.
    pub fn byte_len(self, texels: usize, channels: u8) -> usize {
        texels
            .saturating_mul(channels as usize)
            .saturating_mul(self.size())
    }
}

/// Texture minification/magnification filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
    Mipmap,
}

impl Filter {
    /// Parse the `filter` configuration value (`nearest|linear|mipmap`).
    pub fn parse(s: &str) -> GraphResult<Self> {
        match s {
            "nearest" => Ok(Self::Nearest),
            "linear" => Ok(Self::Linear),
            "mipmap" => Ok(Self::Mipmap),
            other => Err(GraphError::config(format!(
                "invalid filter string '{other}'"
            ))),
        }
    }
}

/// Texture coordinate wrap mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Wrap {
    #[default]
    Clamp,
    Repeat,
}

impl Wrap {
    /// Parse the `wrap` configuration value (`clamp|repeat`).
    pub fn parse(s: &str) -> GraphResult<Self> {
        match s {
            "clamp" => Ok(Self::Clamp),
            "repeat" => Ok(Self::Repeat),
            other => Err(GraphError::config(format!("invalid wrap string '{other}'"))),
        }
    }
}

/// Flip rows of a tightly packed image in place.
pub fn flip_rows_in_place(data: &mut [u8], row_bytes: usize) {
    if row_bytes == 0 {
        return;
    }
    let rows = data.len() / row_bytes;
    for y in 0..rows / 2 {
        let (top, bottom) = data.split_at_mut((rows - 1 - y) * row_bytes);
        top[y * row_bytes..(y + 1) * row_bytes].swap_with_slice(&mut bottom[..row_bytes]);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
