use super::*;
use crate::foundation::core::{Filter, SampleType, Size2, Wrap};
use crate::gfx::TexImage;
use crate::gfx::soft::SoftGfx;

#[test]
fn stages_are_created_looked_up_and_released() {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(2, 2)));
    let baseline = ctx.gfx.live_textures();
    let id = ctx.create_stage(false);
    assert!(!ctx.stage_ready(id));

    let (gfx, stage) = ctx.stage_with_gfx(id).unwrap();
    stage
        .initialize_texture(
            gfx,
            TexImage::new_2d(Size2::new(2, 2), 4, SampleType::U8),
            None,
            Filter::Linear,
            Wrap::Clamp,
        )
        .unwrap();
    assert!(ctx.stage_ready(id));
    assert_eq!(ctx.gfx.live_textures(), baseline + 1);

    ctx.release_stage(id);
    assert!(ctx.stage(id).is_err());
    assert_eq!(ctx.live_stages(), 0);
    assert_eq!(ctx.gfx.live_textures(), baseline);
}

#[test]
fn stereo_flag_selects_slot_count() {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(1, 1)));
    let mono = ctx.create_stage(false);
    let stereo = ctx.create_stage(true);
    assert_eq!(ctx.stage(mono).unwrap().slot_count(), 1);
    assert_eq!(ctx.stage_mut(stereo).unwrap().slot_count(), 2);
    assert!(matches!(
        ctx.stage(StageId(42)),
        Err(GraphError::Stage(_))
    ));
}

#[test]
fn into_gfx_releases_remaining_stages() {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(1, 1)));
    let baseline = ctx.gfx.live_textures();
    let id = ctx.create_stage(false);
    let (gfx, stage) = ctx.stage_with_gfx(id).unwrap();
    stage
        .initialize_render_target(gfx, Size2::new(2, 2), 4, SampleType::U8, false)
        .unwrap();
    let gfx = ctx.into_gfx();
    assert_eq!(gfx.live_textures(), baseline);
}
