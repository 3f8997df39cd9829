//! Concrete node kinds.

mod audio;
mod capture;
mod draw_replay;
mod image_source;
mod keyboard;
mod present;
mod readback;
mod shader;
mod texture;
mod tone_source;

pub use audio::AudioAtom;
pub use capture::CaptureAtom;
pub use draw_replay::DrawReplayAtom;
pub use image_source::{ImageSourceAtom, SourceImage};
pub use keyboard::{KEY_TEXTURE_SIZE, KeyboardAtom};
pub use present::PresentAtom;
pub use readback::{ReadbackAtom, ReadbackMode};
pub use shader::ShaderAtom;
pub use texture::{TextureAtom, cubemap_face_paths, load_rgba8, prepare_faces};
pub use tone_source::ToneSourceAtom;

use crate::context::RenderContext;
use crate::format::{FboFormat, ValueFormat};
use crate::gfx::Gfx;
use crate::packet::Packet;
use crate::stage::StageId;

/// Fbo format advertising a stage's current layout.
pub(crate) fn stage_format<G: Gfx>(ctx: &RenderContext<G>, id: StageId) -> Option<ValueFormat> {
    let desc = ctx.stage(id).ok()?.desc().copied()?;
    Some(ValueFormat::Fbo(FboFormat {
        size: desc.size(),
        channels: desc.image.channels,
        sample: Some(desc.image.sample),
    }))
}

/// Handle packet for an initialized stage, `None` while the stage is empty.
pub(crate) fn stage_packet<G: Gfx>(
    ctx: &RenderContext<G>,
    id: Option<StageId>,
    seq: u64,
) -> Option<Packet> {
    let id = id?;
    stage_format(ctx, id).map(|fmt| Packet::stage(fmt, seq, id))
}
