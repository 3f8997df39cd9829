use std::path::PathBuf;

use crate::atom::{Atom, AtomConfig, Environment, PacketIo, TickConfig};
use crate::atoms::texture::{cubemap_face_paths, load_rgba8};
use crate::context::RenderContext;
use crate::foundation::core::Size2;
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::{ValueFormat, VideoFormat};
use crate::gfx::Gfx;
use crate::packet::Packet;

/// One RGBA8 frame, rows first-to-last.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceImage {
    pub size: Size2,
    pub data: Vec<u8>,
}

impl SourceImage {
    pub fn rgba8(size: Size2, data: Vec<u8>) -> GraphResult<Self> {
        if size.is_empty() || data.len() != size.area() * 4 {
            return Err(GraphError::config(format!(
                "image of {size} needs {} RGBA8 bytes, got {}",
                size.area() * 4,
                data.len()
            )));
        }
        Ok(Self { size, data })
    }
}

/// Emits a fixed set of images as raw video, one per tick.
#[derive(Debug, Default)]
pub struct ImageSourceAtom {
    images: Vec<SourceImage>,
    cubemap: bool,
    repeat: bool,
    next: usize,
}

impl ImageSourceAtom {
    /// Source over in-memory frames; configuration may still add `cubemap`/`repeat`.
    pub fn with_images(images: Vec<SourceImage>) -> Self {
        Self {
            images,
            ..Self::default()
        }
    }

    /// Index of the next image to emit, `None` once a non-repeating set is exhausted.
    pub fn next_index(&self) -> Option<usize> {
        (self.next < self.images.len()).then_some(self.next)
    }

    fn format(&self) -> Option<ValueFormat> {
        let first = self.images.first()?;
        Some(ValueFormat::Video(
            VideoFormat::rgba8(first.size.w, first.size.h).with_cubemap(self.cubemap),
        ))
    }

    fn load(&mut self, path: PathBuf) -> GraphResult<()> {
        let paths: Vec<PathBuf> = if self.cubemap {
            cubemap_face_paths(&path).into()
        } else {
            vec![path]
        };
        for p in paths {
            let (size, data) = load_rgba8(&p)?;
            self.images.push(SourceImage { size, data });
        }
        Ok(())
    }
}

impl<G: Gfx> Atom<G> for ImageSourceAtom {
    fn kind(&self) -> &'static str {
        "image_source"
    }

    fn initialize(
        &mut self,
        _ctx: &mut RenderContext<G>,
        cfg: &AtomConfig,
        _env: &Environment,
    ) -> GraphResult<()> {
        self.cubemap = cfg.get_bool("cubemap", self.cubemap)?;
        self.repeat = cfg.get_bool("repeat", self.repeat)?;
        if let Some(path) = cfg.get_str("filepath")? {
            self.images.clear();
            self.load(PathBuf::from(path))?;
        }
        let Some(first) = self.images.first() else {
            return Err(GraphError::config(
                "image_source needs 'filepath' or in-memory images",
            ));
        };
        let size = first.size;
        if let Some(odd) = self.images.iter().position(|img| img.size != size) {
            return Err(GraphError::config(format!(
                "image {odd} is {}, expected {size}",
                self.images[odd].size
            )));
        }
        if self.cubemap && self.images.len() != 6 {
            return Err(GraphError::config(format!(
                "cubemap source needs 6 images, got {}",
                self.images.len()
            )));
        }
        self.next = 0;
        tracing::debug!(images = self.images.len(), size = %size, "image source loaded");
        Ok(())
    }

    fn sink_count(&self) -> usize {
        0
    }

    fn source_count(&self) -> usize {
        1
    }

    fn sink_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        Vec::new()
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        self.format().into_iter().collect()
    }

    fn is_ready(&self, _ctx: &RenderContext<G>, _io: &PacketIo) -> bool {
        self.next_index().is_some()
    }

    fn recv(&mut self, _ctx: &mut RenderContext<G>, ch: usize, _packet: Packet) -> GraphResult<()> {
        Err(GraphError::format(format!("image_source has no sink {ch}")))
    }

    fn send(
        &mut self,
        _ctx: &mut RenderContext<G>,
        _cfg: &TickConfig,
        _ch: usize,
        _fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        let (Some(index), Some(fmt)) = (self.next_index(), self.format()) else {
            return Ok(None);
        };
        let data = self.images[index].data.clone();
        self.next = index + 1;
        if self.repeat && self.next == self.images.len() {
            self.next = 0;
        }
        Ok(Some(Packet::bytes(fmt, index as u64, data)))
    }

    fn uninitialize(&mut self, _ctx: &mut RenderContext<G>) {
        self.next = self.images.len();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/atoms/image_source.rs"]
mod tests;
