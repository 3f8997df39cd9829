//! Backend resource holders owned by atoms.
//!
//! A [`BufferStage`] keeps the native color texture, framebuffer and optional depth buffer for
//! one (mono) or two (stereo) slots. It is initialized exactly once with a fixed layout; later
//! updates must use that layout. `reset` returns it to the uninitialized state.

use crate::foundation::core::{Filter, SampleType, Size2, Wrap};
use crate::foundation::error::{GraphError, GraphResult};
use crate::gfx::{Gfx, TexImage, TexKind, TexTarget};

/// Handle to a stage inside a [`crate::context::RenderContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub u32);

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Texture,
    Cubemap,
    Volume,
    RenderTarget,
}

impl StageKind {
    fn tex_kind(self) -> TexKind {
        match self {
            Self::Texture | Self::RenderTarget => TexKind::Tex2D,
            Self::Cubemap => TexKind::Cube,
            Self::Volume => TexKind::Tex3D,
        }
    }
}

/// Fixed layout of an initialized stage. For cubemaps `image` describes one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StageDesc {
    pub kind: StageKind,
    pub image: TexImage,
    pub filter: Filter,
    pub wrap: Wrap,
}

impl StageDesc {
    pub fn size(&self) -> Size2 {
        self.image.size.size2()
    }
}

struct Framebuffer<G: Gfx> {
    color: G::ColorBuffer,
    fbo: Option<G::FrameBuffer>,
    depth: Option<G::DepthBuffer>,
}

pub struct BufferStage<G: Gfx> {
    slots: usize,
    desc: Option<StageDesc>,
    fbs: Vec<Framebuffer<G>>,
}

impl<G: Gfx> Default for BufferStage<G> {
    fn default() -> Self {
        Self::mono()
    }
}

impl<G: Gfx> std::fmt::Debug for BufferStage<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferStage")
            .field("slots", &self.slots)
            .field("desc", &self.desc)
            .finish()
    }
}

impl<G: Gfx> BufferStage<G> {
    pub fn mono() -> Self {
        Self {
            slots: 1,
            desc: None,
            fbs: Vec::new(),
        }
    }

    /// Two slots (left/right eye) sharing one layout.
    pub fn stereo() -> Self {
        Self {
            slots: 2,
            ..Self::mono()
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots
    }

    pub fn is_initialized(&self) -> bool {
        self.desc.is_some()
    }

    pub fn desc(&self) -> Option<&StageDesc> {
        self.desc.as_ref()
    }

    pub fn color(&self, slot: usize) -> Option<&G::ColorBuffer> {
        self.fbs.get(slot).map(|fb| &fb.color)
    }

    pub fn framebuffer(&self, slot: usize) -> Option<&G::FrameBuffer> {
        self.fbs.get(slot).and_then(|fb| fb.fbo.as_ref())
    }

    pub fn initialize_texture(
        &mut self,
        gfx: &mut G,
        image: TexImage,
        data: Option<&[u8]>,
        filter: Filter,
        wrap: Wrap,
    ) -> GraphResult<()> {
        let image = flat(image);
        self.begin(image, data.map(<[u8]>::len), image.byte_len())?;
        let desc = StageDesc {
            kind: StageKind::Texture,
            image,
            filter,
            wrap,
        };
        self.build(gfx, desc, |gfx| {
            gfx.set_texture(TexTarget::Tex2D, &image, data)?;
            Ok(())
        })
    }

    /// Upload six faces (+X, -X, +Y, -Y, +Z, -Z) at once. Fewer or more faces is an error.
    pub fn initialize_cubemap(
        &mut self,
        gfx: &mut G,
        image: TexImage,
        faces: &[&[u8]],
        filter: Filter,
        wrap: Wrap,
    ) -> GraphResult<()> {
        if faces.len() != 6 {
            return Err(GraphError::stage(format!(
                "cubemap needs exactly 6 faces, got {}",
                faces.len()
            )));
        }
        let image = flat(image);
        for face in faces {
            self.begin(image, Some(face.len()), image.byte_len())?;
        }
        let desc = StageDesc {
            kind: StageKind::Cubemap,
            image,
            filter,
            wrap,
        };
        self.build(gfx, desc, |gfx| {
            for (i, face) in faces.iter().enumerate() {
                gfx.set_texture(TexTarget::CubeFace(i as u8), &image, Some(*face))?;
            }
            Ok(())
        })
    }

    pub fn initialize_volume(
        &mut self,
        gfx: &mut G,
        image: TexImage,
        data: Option<&[u8]>,
        filter: Filter,
        wrap: Wrap,
    ) -> GraphResult<()> {
        if image.size.d == 0 {
            return Err(GraphError::stage("volume stage needs a depth"));
        }
        self.begin(image, data.map(<[u8]>::len), image.byte_len())?;
        let desc = StageDesc {
            kind: StageKind::Volume,
            image,
            filter,
            wrap,
        };
        self.build(gfx, desc, |gfx| {
            gfx.set_texture(TexTarget::Tex3D, &image, data)?;
            Ok(())
        })
    }

    /// Allocate an empty color target, optionally with a depth buffer.
    pub fn initialize_render_target(
        &mut self,
        gfx: &mut G,
        size: Size2,
        channels: u8,
        sample: SampleType,
        depth: bool,
    ) -> GraphResult<()> {
        let image = TexImage::new_2d(size, channels, sample);
        self.begin(image, None, image.byte_len())?;
        let desc = StageDesc {
            kind: StageKind::RenderTarget,
            image,
            filter: Filter::Linear,
            wrap: Wrap::Clamp,
        };
        self.build(gfx, desc, |gfx| {
            gfx.set_texture(TexTarget::Tex2D, &image, None)?;
            Ok(())
        })?;
        if depth {
            for i in 0..self.fbs.len() {
                if let Err(e) = self.attach_depth(gfx, i, size) {
                    self.release(gfx);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Update a 2D stage in place. The layout must match the initialized one.
    pub fn read_texture(&mut self, gfx: &mut G, image: TexImage, data: &[u8]) -> GraphResult<()> {
        let desc = self.expect_layout(&[StageKind::Texture, StageKind::RenderTarget], flat(image))?;
        check_len(data.len(), desc.image.byte_len())?;
        self.upload(gfx, desc, TexTarget::Tex2D, data)
    }

    pub fn read_cube_face(
        &mut self,
        gfx: &mut G,
        face: u8,
        image: TexImage,
        data: &[u8],
    ) -> GraphResult<()> {
        let desc = self.expect_layout(&[StageKind::Cubemap], flat(image))?;
        if face >= 6 {
            return Err(GraphError::stage(format!("cube face {face} out of range")));
        }
        check_len(data.len(), desc.image.byte_len())?;
        self.upload(gfx, desc, TexTarget::CubeFace(face), data)
    }

    pub fn read_volume(&mut self, gfx: &mut G, image: TexImage, data: &[u8]) -> GraphResult<()> {
        let desc = self.expect_layout(&[StageKind::Volume], image)?;
        check_len(data.len(), desc.image.byte_len())?;
        self.upload(gfx, desc, TexTarget::Tex3D, data)
    }

    /// Read the whole color attachment of `slot` into `out`, converting to `channels`/`sample`.
    pub fn read_pixels(
        &self,
        gfx: &mut G,
        slot: usize,
        channels: u8,
        sample: SampleType,
        out: &mut [u8],
    ) -> GraphResult<()> {
        let desc = self
            .desc
            .ok_or_else(|| GraphError::stage("read from an uninitialized stage"))?;
        let fbo = self
            .framebuffer(slot)
            .ok_or_else(|| GraphError::stage(format!("stage slot {slot} has no framebuffer")))?;
        gfx.bind_framebuffer_ro(fbo);
        let res = gfx.read_pixels((0, 0), desc.size(), channels, sample, out);
        gfx.unbind_framebuffer();
        res.map_err(GraphError::from)
    }

    /// Bind slot 0's color texture for sampling on texture `unit`.
    pub fn bind_input(&self, gfx: &mut G, unit: u32) -> GraphResult<()> {
        let desc = self
            .desc
            .ok_or_else(|| GraphError::stage("bind of an uninitialized stage"))?;
        let color = self
            .color(0)
            .ok_or_else(|| GraphError::stage("stage has no color buffer"))?;
        gfx.active_texture(unit);
        gfx.bind_texture_ro(desc.kind.tex_kind(), color);
        Ok(())
    }

    /// Bind `slot` as the draw framebuffer and set the viewport to the stage size.
    pub fn bind_target(&self, gfx: &mut G, slot: usize) -> GraphResult<()> {
        let desc = self
            .desc
            .ok_or_else(|| GraphError::stage("draw into an uninitialized stage"))?;
        let fbo = self
            .framebuffer(slot)
            .ok_or_else(|| GraphError::stage(format!("stage slot {slot} has no framebuffer")))?;
        gfx.bind_framebuffer(fbo);
        gfx.set_viewport((0, 0), desc.size());
        Ok(())
    }

    /// Release everything and allow re-initialization with a new layout.
    pub fn reset(&mut self, gfx: &mut G) {
        self.release(gfx);
    }

    /// Textures go first, then framebuffers, then depth buffers.
    pub fn release(&mut self, gfx: &mut G) {
        let fbs = std::mem::take(&mut self.fbs);
        let mut fbos = Vec::new();
        let mut depths = Vec::new();
        for fb in fbs {
            gfx.delete_texture(fb.color);
            fbos.extend(fb.fbo);
            depths.extend(fb.depth);
        }
        for fbo in fbos {
            gfx.delete_framebuffer(fbo);
        }
        for rb in depths {
            gfx.delete_renderbuffer(rb);
        }
        self.desc = None;
    }

    fn begin(&self, image: TexImage, len: Option<usize>, expected: usize) -> GraphResult<()> {
        if let Some(desc) = &self.desc {
            return Err(GraphError::stage(format!(
                "stage already initialized as {:?} {}",
                desc.kind, desc.image.size
            )));
        }
        if image.size.size2().is_empty() || image.channels == 0 {
            return Err(GraphError::stage(format!(
                "invalid stage layout {} ch={}",
                image.size, image.channels
            )));
        }
        match len {
            Some(len) => check_len(len, expected),
            None => Ok(()),
        }
    }

    fn build(
        &mut self,
        gfx: &mut G,
        desc: StageDesc,
        mut fill: impl FnMut(&mut G) -> GraphResult<()>,
    ) -> GraphResult<()> {
        for _ in 0..self.slots {
            if let Err(e) = self.build_slot(gfx, desc, &mut fill) {
                self.release(gfx);
                return Err(e);
            }
        }
        self.desc = Some(desc);
        tracing::debug!(kind = ?desc.kind, size = %desc.image.size, channels = desc.image.channels, "stage initialized");
        Ok(())
    }

    fn build_slot(
        &mut self,
        gfx: &mut G,
        desc: StageDesc,
        fill: &mut impl FnMut(&mut G) -> GraphResult<()>,
    ) -> GraphResult<()> {
        let kind = desc.kind.tex_kind();
        let color = gfx.gen_texture()?;
        gfx.bind_texture_rw(kind, &color);
        let filled = fill(gfx);
        if filled.is_ok() {
            gfx.tex_parameters(kind, desc.filter, desc.wrap);
            if desc.filter == Filter::Mipmap {
                gfx.generate_mipmap(kind);
            }
        }
        gfx.unbind_texture(kind);
        if let Err(e) = filled {
            gfx.delete_texture(color);
            return Err(e);
        }

        // Volumes are sampled only; everything else can be read back or drawn into.
        let fbo = if desc.kind == StageKind::Volume {
            None
        } else {
            let fbo = gfx.create_framebuffer()?;
            gfx.bind_framebuffer(&fbo);
            let target = match desc.kind {
                StageKind::Cubemap => TexTarget::CubeFace(0),
                _ => TexTarget::Tex2D,
            };
            let attached = gfx.framebuffer_texture_2d(target, &color);
            gfx.unbind_framebuffer();
            if let Err(e) = attached {
                gfx.delete_texture(color);
                gfx.delete_framebuffer(fbo);
                return Err(e.into());
            }
            Some(fbo)
        };
        self.fbs.push(Framebuffer {
            color,
            fbo,
            depth: None,
        });
        Ok(())
    }

    fn attach_depth(&mut self, gfx: &mut G, slot: usize, size: Size2) -> GraphResult<()> {
        let rb = gfx.create_renderbuffer()?;
        let fb = &mut self.fbs[slot];
        let Some(fbo) = fb.fbo.as_ref() else {
            gfx.delete_renderbuffer(rb);
            return Err(GraphError::stage("depth buffer needs a framebuffer"));
        };
        gfx.bind_framebuffer(fbo);
        let res = gfx
            .renderbuffer_storage(&rb, size)
            .and_then(|()| gfx.framebuffer_renderbuffer(&rb));
        gfx.unbind_framebuffer();
        fb.depth = Some(rb);
        res.map_err(GraphError::from)
    }

    fn expect_layout(&self, kinds: &[StageKind], image: TexImage) -> GraphResult<StageDesc> {
        let desc = self
            .desc
            .ok_or_else(|| GraphError::stage("update of an uninitialized stage"))?;
        if !kinds.contains(&desc.kind) {
            return Err(GraphError::stage(format!(
                "stage is {:?}, update expects one of {kinds:?}",
                desc.kind
            )));
        }
        if desc.image != image {
            return Err(GraphError::stage(format!(
                "layout mismatch: stage {} ch={} {:?}, update {} ch={} {:?}",
                desc.image.size,
                desc.image.channels,
                desc.image.sample,
                image.size,
                image.channels,
                image.sample
            )));
        }
        Ok(desc)
    }

    fn upload(
        &mut self,
        gfx: &mut G,
        desc: StageDesc,
        target: TexTarget,
        data: &[u8],
    ) -> GraphResult<()> {
        let kind = desc.kind.tex_kind();
        for fb in &self.fbs {
            gfx.bind_texture_rw(kind, &fb.color);
            let res = gfx.set_texture(target, &desc.image, Some(data));
            if res.is_ok() && desc.filter == Filter::Mipmap {
                gfx.generate_mipmap(kind);
            }
            gfx.unbind_texture(kind);
            res?;
        }
        Ok(())
    }
}

/// 2D layouts carry `d == 0`.
fn flat(mut image: TexImage) -> TexImage {
    image.size.d = 0;
    image
}

fn check_len(len: usize, expected: usize) -> GraphResult<()> {
    if len == expected {
        Ok(())
    } else {
        Err(GraphError::stage(format!(
            "stage data is {len} bytes, expected {expected}"
        )))
    }
}

#[cfg(test)]
#[path = "../tests/unit/stage.rs"]
mod tests;
