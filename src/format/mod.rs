//! Connection formats and the negotiation vocabulary.
//!
//! A [`ValueFormat`] describes what travels on one edge. Zero-valued numeric fields and `None`
//! sample types act as wildcards inside accept/offer lists; a negotiated format is always
//! concrete (see [`ValueFormat::is_concrete`]) or [`ValueFormat::Null`].

pub mod negotiate;

use crate::foundation::core::{SampleType, Size2, Size3};

/// Value domain of a format tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Video,
    Audio,
    Volume,
    Gpu,
    Input,
    Draw,
    Sync,
}

/// Payload kind inside a [`Domain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    RawVideo,
    Pcm,
    Voxels,
    Framebuffer,
    RenderState,
    Keyboard,
    Commands,
    Order,
    Receipt,
}

/// `(domain, kind)` pair used to match ports before comparing format details.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatTag {
    pub domain: Domain,
    pub kind: Kind,
}

impl FormatTag {
    pub const fn new(domain: Domain, kind: Kind) -> Self {
        Self { domain, kind }
    }
}

/// Raw video frame layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    pub size: Size2,
    pub channels: u8,
    pub sample: Option<SampleType>,
    /// Frames are cubemap faces delivered in sequence order.
    pub cubemap: bool,
}

impl VideoFormat {
    pub const fn new(size: Size2, channels: u8, sample: SampleType) -> Self {
        Self {
            size,
            channels,
            sample: Some(sample),
            cubemap: false,
        }
    }

    pub const fn rgba8(w: u32, h: u32) -> Self {
        Self::new(Size2::new(w, h), 4, SampleType::U8)
    }

    pub const fn rgb8(w: u32, h: u32) -> Self {
        Self::new(Size2::new(w, h), 3, SampleType::U8)
    }

    /// Wildcard accepting any video with `channels` channels.
    pub const fn any_with_channels(channels: u8) -> Self {
        Self {
            size: Size2::new(0, 0),
            channels,
            sample: None,
            cubemap: false,
        }
    }

    pub fn with_cubemap(mut self, cubemap: bool) -> Self {
        self.cubemap = cubemap;
        self
    }

    /// Byte length of one frame (one face for cubemaps).
    pub fn frame_bytes(&self) -> usize {
        self.sample
            .map(|s| s.byte_len(self.size.area(), self.channels))
            .unwrap_or(0)
    }
}

/// PCM block layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample: Option<SampleType>,
    /// Sample rate in Hz.
    pub rate: u32,
    pub channels: u8,
    /// Sample frames per packet.
    pub samples: u32,
}

impl AudioFormat {
    pub const fn new(sample: SampleType, rate: u32, channels: u8, samples: u32) -> Self {
        Self {
            sample: Some(sample),
            rate,
            channels,
            samples,
        }
    }

    pub const fn any() -> Self {
        Self {
            sample: None,
            rate: 0,
            channels: 0,
            samples: 0,
        }
    }

    pub fn with_sample(mut self, sample: SampleType) -> Self {
        self.sample = Some(sample);
        self
    }

    /// Byte length of one interleaved packet.
    pub fn packet_bytes(&self) -> usize {
        self.sample
            .map(|s| s.byte_len(self.samples as usize, self.channels))
            .unwrap_or(0)
    }
}

/// Voxel block layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VolumeFormat {
    pub size: Size3,
    pub channels: u8,
    pub sample: Option<SampleType>,
}

impl VolumeFormat {
    pub fn frame_bytes(&self) -> usize {
        self.sample
            .map(|s| s.byte_len(self.size.volume(), self.channels))
            .unwrap_or(0)
    }
}

/// Framebuffer handle format. Size and layout are advisory: the handle carries a stage whose
/// descriptor is authoritative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FboFormat {
    pub size: Size2,
    pub channels: u8,
    pub sample: Option<SampleType>,
}

/// Draw-command stream format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DrawFormat {
    /// Target canvas size; zero means "decided by the consumer".
    pub size: Size2,
}

/// What travels on a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ValueFormat {
    /// Explicitly no format (unconnected or failed edge).
    #[default]
    Null,
    Video(VideoFormat),
    Audio(AudioFormat),
    Volume(VolumeFormat),
    Fbo(FboFormat),
    /// Render-state snapshot handle.
    State,
    Keyboard,
    Program(DrawFormat),
    /// Content-free synchronization tick.
    Order,
    /// Content-free acknowledgement tick.
    Receipt,
}

impl ValueFormat {
    pub const fn video_rgba8(w: u32, h: u32) -> Self {
        Self::Video(VideoFormat::rgba8(w, h))
    }

    pub const fn video_rgb8(w: u32, h: u32) -> Self {
        Self::Video(VideoFormat::rgb8(w, h))
    }

    pub const fn any_fbo() -> Self {
        Self::Fbo(FboFormat {
            size: Size2::new(0, 0),
            channels: 0,
            sample: None,
        })
    }

    pub fn tag(&self) -> Option<FormatTag> {
        let (domain, kind) = match self {
            Self::Null => return None,
            Self::Video(_) => (Domain::Video, Kind::RawVideo),
            Self::Audio(_) => (Domain::Audio, Kind::Pcm),
            Self::Volume(_) => (Domain::Volume, Kind::Voxels),
            Self::Fbo(_) => (Domain::Gpu, Kind::Framebuffer),
            Self::State => (Domain::Gpu, Kind::RenderState),
            Self::Keyboard => (Domain::Input, Kind::Keyboard),
            Self::Program(_) => (Domain::Draw, Kind::Commands),
            Self::Order => (Domain::Sync, Kind::Order),
            Self::Receipt => (Domain::Sync, Kind::Receipt),
        };
        Some(FormatTag::new(domain, kind))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video(_))
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio(_))
    }

    pub fn is_volume(&self) -> bool {
        matches!(self, Self::Volume(_))
    }

    pub fn is_fbo(&self) -> bool {
        matches!(self, Self::Fbo(_))
    }

    /// Content-free sync formats (`Order` and `Receipt`).
    pub fn is_order(&self) -> bool {
        matches!(self, Self::Order | Self::Receipt)
    }

    /// A format is concrete when every layout field is fixed.
    ///
    /// Handle formats (`Fbo`, `State`, `Keyboard`, `Program`) and sync formats carry no byte
    /// layout of their own and are always concrete.
    pub fn is_concrete(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Video(v) => !v.size.is_empty() && v.channels > 0 && v.sample.is_some(),
            Self::Audio(a) => {
                a.sample.is_some() && a.rate > 0 && a.channels > 0 && a.samples > 0
            }
            Self::Volume(v) => {
                v.size.volume() > 0 && v.size.d > 0 && v.channels > 0 && v.sample.is_some()
            }
            Self::Fbo(_)
            | Self::State
            | Self::Keyboard
            | Self::Program(_)
            | Self::Order
            | Self::Receipt => true,
        }
    }

    /// Combine two formats into the most specific one satisfying both, or `None` when they
    /// conflict.
    pub fn merge(&self, other: &Self) -> Option<Self> {
        Some(match (self, other) {
            (Self::Video(a), Self::Video(b)) => {
                if a.cubemap != b.cubemap {
                    return None;
                }
                Self::Video(VideoFormat {
                    size: merge_size2(a.size, b.size)?,
                    channels: merge_num(a.channels, b.channels)?,
                    sample: merge_sample(a.sample, b.sample)?,
                    cubemap: a.cubemap,
                })
            }
            (Self::Audio(a), Self::Audio(b)) => Self::Audio(AudioFormat {
                sample: merge_sample(a.sample, b.sample)?,
                rate: merge_num(a.rate, b.rate)?,
                channels: merge_num(a.channels, b.channels)?,
                samples: merge_num(a.samples, b.samples)?,
            }),
            (Self::Volume(a), Self::Volume(b)) => Self::Volume(VolumeFormat {
                size: Size3::new(
                    merge_num(a.size.w, b.size.w)?,
                    merge_num(a.size.h, b.size.h)?,
                    merge_num(a.size.d, b.size.d)?,
                ),
                channels: merge_num(a.channels, b.channels)?,
                sample: merge_sample(a.sample, b.sample)?,
            }),
            (Self::Fbo(a), Self::Fbo(b)) => Self::Fbo(FboFormat {
                size: merge_size2(a.size, b.size)?,
                channels: merge_num(a.channels, b.channels)?,
                sample: merge_sample(a.sample, b.sample)?,
            }),
            (Self::Program(a), Self::Program(b)) => Self::Program(DrawFormat {
                size: merge_size2(a.size, b.size)?,
            }),
            (a, b) if a == b && !a.is_null() => *a,
            _ => return None,
        })
    }

    /// Expected payload byte length for byte-carrying formats.
    pub fn payload_bytes(&self) -> Option<usize> {
        match self {
            Self::Video(v) => Some(v.frame_bytes()),
            Self::Audio(a) => Some(a.packet_bytes()),
            Self::Volume(v) => Some(v.frame_bytes()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn sample(s: Option<SampleType>) -> &'static str {
            match s {
                Some(SampleType::U8) => "u8",
                Some(SampleType::U16) => "u16",
                Some(SampleType::F32) => "f32",
                None => "*",
            }
        }
        match self {
            Self::Null => f.write_str("null"),
            Self::Video(v) => write!(
                f,
                "video({} ch={} {}{})",
                v.size,
                v.channels,
                sample(v.sample),
                if v.cubemap { " cubemap" } else { "" }
            ),
            Self::Audio(a) => write!(
                f,
                "audio({} {}Hz ch={} n={})",
                sample(a.sample),
                a.rate,
                a.channels,
                a.samples
            ),
            Self::Volume(v) => write!(
                f,
                "volume({} ch={} {})",
                v.size,
                v.channels,
                sample(v.sample)
            ),
            Self::Fbo(b) => write!(f, "fbo({} ch={})", b.size, b.channels),
            Self::State => f.write_str("state"),
            Self::Keyboard => f.write_str("keyboard"),
            Self::Program(p) => write!(f, "program({})", p.size),
            Self::Order => f.write_str("order"),
            Self::Receipt => f.write_str("receipt"),
        }
    }
}

fn merge_num<T: Copy + PartialEq + Default>(a: T, b: T) -> Option<T> {
    let zero = T::default();
    if a == zero {
        Some(b)
    } else if b == zero || a == b {
        Some(a)
    } else {
        None
    }
}

fn merge_size2(a: Size2, b: Size2) -> Option<Size2> {
    Some(Size2::new(merge_num(a.w, b.w)?, merge_num(a.h, b.h)?))
}

fn merge_sample(a: Option<SampleType>, b: Option<SampleType>) -> Option<Option<SampleType>> {
    match (a, b) {
        (None, x) | (x, None) => Some(x),
        (Some(x), Some(y)) if x == y => Some(Some(x)),
        _ => None,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/format/mod.rs"]
mod tests;
