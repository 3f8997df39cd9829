use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::atom::{Atom, AtomConfig, Environment, PacketIo, PostInit, TickConfig, edge_error};
use crate::atoms::{stage_format, stage_packet};
use crate::context::RenderContext;
use crate::foundation::core::{Filter, SampleType, Size2, Size3, Wrap, flip_rows_in_place};
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::{ValueFormat, VideoFormat, VolumeFormat};
use crate::gfx::{Gfx, TexImage};
use crate::packet::{Packet, Payload};
use crate::stage::{StageId, StageKind};

/// Decode an image file into tightly packed RGBA8 rows, first row first.
pub fn load_rgba8(path: &Path) -> GraphResult<(Size2, Vec<u8>)> {
    let img = image::open(path)
        .with_context(|| format!("decode image {}", path.display()))?
        .to_rgba8();
    let (w, h) = img.dimensions();
    Ok((Size2::new(w, h), img.into_raw()))
}

/// Face files of a cubemap: `<title>.<ext>`, then `<title>_1.<ext>` .. `<title>_5.<ext>`.
pub fn cubemap_face_paths(first: &Path) -> [PathBuf; 6] {
    let dir = first.parent().unwrap_or_else(|| Path::new(""));
    let title = first
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = first
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    std::array::from_fn(|i| {
        if i == 0 {
            first.to_path_buf()
        } else {
            dir.join(format!("{title}_{i}{ext}"))
        }
    })
}

/// Configuration-time transforms: optional vertical flip of every face, then the cubemap
/// top/bottom (faces 2 and 3) swap.
pub fn prepare_faces(faces: &mut [Vec<u8>], row_bytes: usize, vflip: bool, swap_top_bottom: bool) {
    if vflip {
        for face in faces.iter_mut() {
            flip_rows_in_place(face, row_bytes);
        }
    }
    if swap_top_bottom && faces.len() == 6 {
        faces.swap(2, 3);
    }
}

struct Pending {
    image: TexImage,
    faces: Vec<Vec<u8>>,
}

/// Uploads images (from disk or from a video sink) into a stage and emits its handle.
#[derive(Default)]
pub struct TextureAtom {
    filter: Filter,
    wrap: Wrap,
    filepath: Option<PathBuf>,
    vflip: bool,
    swap_top_bottom: bool,
    cubemap: bool,
    stage: Option<StageId>,
    preload: Option<Pending>,
    collected: Vec<Vec<u8>>,
    collect_image: Option<TexImage>,
    seq: u64,
}

impl TextureAtom {
    fn load_preload(&self) -> GraphResult<Option<Pending>> {
        let Some(path) = &self.filepath else {
            return Ok(None);
        };
        let paths: Vec<PathBuf> = if self.cubemap {
            cubemap_face_paths(path).into()
        } else {
            vec![path.clone()]
        };
        let mut size = None;
        let mut faces = Vec::with_capacity(paths.len());
        for p in &paths {
            let (s, data) = load_rgba8(p)?;
            if size.is_some_and(|prev| prev != s) {
                return Err(GraphError::config(format!(
                    "cubemap face {} is {s}, expected {}",
                    p.display(),
                    size.unwrap_or_default()
                )));
            }
            size = Some(s);
            faces.push(data);
        }
        let size = size.unwrap_or_default();
        prepare_faces(&mut faces, size.w as usize * 4, self.vflip, self.swap_top_bottom);
        Ok(Some(Pending {
            image: TexImage::new_2d(size, 4, SampleType::U8),
            faces,
        }))
    }

    fn upload_preload<G: Gfx>(&mut self, ctx: &mut RenderContext<G>) -> GraphResult<()> {
        let Some(pending) = self.preload.take() else {
            return Ok(());
        };
        self.upload(ctx, pending)
    }

    fn upload<G: Gfx>(&mut self, ctx: &mut RenderContext<G>, pending: Pending) -> GraphResult<()> {
        let id = self
            .stage
            .ok_or_else(|| GraphError::stage("texture atom is not initialized"))?;
        let (gfx, stage) = ctx.stage_with_gfx(id)?;
        let cube = pending.faces.len() == 6 && self.cubemap;
        if !stage.is_initialized() {
            if cube {
                let refs: Vec<&[u8]> = pending.faces.iter().map(Vec::as_slice).collect();
                stage.initialize_cubemap(gfx, pending.image, &refs, self.filter, self.wrap)
            } else if pending.image.size.d > 0 {
                let data = pending.faces.first().map(Vec::as_slice);
                stage.initialize_volume(gfx, pending.image, data, self.filter, self.wrap)
            } else if self.cubemap {
                Err(GraphError::stage(format!(
                    "cubemap needs exactly 6 faces, got {}",
                    pending.faces.len()
                )))
            } else {
                let data = pending.faces.first().map(Vec::as_slice);
                stage.initialize_texture(gfx, pending.image, data, self.filter, self.wrap)
            }
        } else {
            match stage.desc().map(|d| d.kind) {
                Some(StageKind::Cubemap) => {
                    for (i, face) in pending.faces.iter().enumerate() {
                        stage.read_cube_face(gfx, i as u8, pending.image, face)?;
                    }
                    Ok(())
                }
                Some(StageKind::Volume) => match pending.faces.first() {
                    Some(data) => stage.read_volume(gfx, pending.image, data),
                    None => Ok(()),
                },
                _ => match pending.faces.first() {
                    Some(data) => stage.read_texture(gfx, pending.image, data),
                    None => Ok(()),
                },
            }
        }
    }

    fn recv_video<G: Gfx>(
        &mut self,
        ctx: &mut RenderContext<G>,
        video: VideoFormat,
        seq: u64,
        data: Vec<u8>,
    ) -> GraphResult<()> {
        let sample = video
            .sample
            .ok_or_else(|| GraphError::format("video packet without a sample type"))?;
        let image = TexImage::new_2d(video.size, video.channels, sample);
        let row_bytes = sample.byte_len(video.size.w as usize, video.channels);
        if data.len() != image.byte_len() {
            return Err(GraphError::format(format!(
                "video packet is {} bytes, {video:?} needs {}",
                data.len(),
                image.byte_len()
            )));
        }

        if !self.cubemap {
            let mut faces = vec![data];
            prepare_faces(&mut faces, row_bytes, self.vflip, false);
            return self.upload(ctx, Pending { image, faces });
        }

        // Faces arrive in sequence order; sequence 0 restarts the set.
        if seq == 0 || self.collect_image != Some(image) {
            self.collected.clear();
            self.collect_image = Some(image);
        }
        if seq as usize != self.collected.len() {
            tracing::warn!(seq, have = self.collected.len(), "cubemap face out of order, restarting");
            self.collected.clear();
            return Ok(());
        }
        self.collected.push(data);
        if self.collected.len() < 6 {
            return Ok(());
        }
        let mut faces = std::mem::take(&mut self.collected);
        prepare_faces(&mut faces, row_bytes, self.vflip, self.swap_top_bottom);
        self.upload(ctx, Pending { image, faces })
    }
}

impl<G: Gfx> Atom<G> for TextureAtom {
    fn kind(&self) -> &'static str {
        "texture"
    }

    fn initialize(
        &mut self,
        ctx: &mut RenderContext<G>,
        cfg: &AtomConfig,
        _env: &Environment,
    ) -> GraphResult<()> {
        self.filter = cfg.get_filter("filter")?;
        self.wrap = cfg.get_wrap("wrap")?;
        self.vflip = cfg.get_bool("vflip", false)?;
        self.swap_top_bottom = cfg.get_bool("swap_top_bottom", false)?;
        self.cubemap = cfg.get_bool("cubemap", false)?;
        self.filepath = cfg.get_str("filepath")?.map(PathBuf::from);
        self.stage = Some(ctx.create_stage(false));
        Ok(())
    }

    fn sink_count(&self) -> usize {
        1
    }

    fn source_count(&self) -> usize {
        1
    }

    fn sink_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        vec![
            ValueFormat::Video(VideoFormat::any_with_channels(4).with_cubemap(self.cubemap)),
            ValueFormat::Video(VideoFormat::any_with_channels(0).with_cubemap(self.cubemap)),
            ValueFormat::Volume(VolumeFormat {
                size: Size3::default(),
                channels: 0,
                sample: None,
            }),
        ]
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        vec![ValueFormat::any_fbo()]
    }

    fn post_initialize(
        &mut self,
        _ctx: &mut RenderContext<G>,
        _post: &mut PostInit,
    ) -> GraphResult<()> {
        self.preload = self.load_preload()?;
        if let Some(p) = &self.preload {
            tracing::debug!(faces = p.faces.len(), size = %p.image.size, "texture preloaded");
        }
        Ok(())
    }

    fn is_ready(&self, ctx: &RenderContext<G>, io: &PacketIo) -> bool {
        self.preload.is_some()
            || io.has_packet(0)
            || self.stage.is_some_and(|id| ctx.stage_ready(id))
    }

    fn recv(&mut self, ctx: &mut RenderContext<G>, _ch: usize, mut packet: Packet) -> GraphResult<()> {
        self.upload_preload(ctx)?;
        let result = match (packet.format, &mut packet.payload) {
            (ValueFormat::Video(video), Payload::Bytes(data)) => {
                let data = std::mem::take(data);
                self.recv_video(ctx, video, packet.seq, data)
            }
            (ValueFormat::Volume(vol), Payload::Bytes(data)) => {
                let sample = vol
                    .sample
                    .ok_or_else(|| GraphError::format("volume packet without a sample type"))?;
                let image = TexImage {
                    size: vol.size,
                    channels: vol.channels,
                    sample,
                };
                let faces = vec![std::mem::take(data)];
                self.upload(ctx, Pending { image, faces })
            }
            (fmt, payload) => Err(GraphError::format(format!(
                "texture cannot take {fmt} with a {} payload",
                payload.tag()
            ))),
        };
        result.map_err(edge_error)
    }

    fn send(
        &mut self,
        ctx: &mut RenderContext<G>,
        _cfg: &TickConfig,
        _ch: usize,
        _fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        self.upload_preload(ctx)?;
        let packet = stage_packet(ctx, self.stage, self.seq);
        if packet.is_some() {
            self.seq += 1;
        }
        Ok(packet)
    }

    fn uninitialize(&mut self, ctx: &mut RenderContext<G>) {
        if let Some(id) = self.stage.take() {
            ctx.release_stage(id);
        }
        self.preload = None;
        self.collected.clear();
    }
}

impl TextureAtom {
    /// Current output format, once the stage holds an image.
    pub fn output_format<G: Gfx>(&self, ctx: &RenderContext<G>) -> Option<ValueFormat> {
        stage_format(ctx, self.stage?)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/atoms/texture.rs"]
mod tests;
