use super::*;
use crate::gfx::soft::SoftGfx;

fn rgba(size: Size2, seed: u8) -> Vec<u8> {
    (0..size.area() * 4)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[test]
fn texture_initialize_then_read_back_is_identity() {
    let size = Size2::new(8, 4);
    let mut gfx = SoftGfx::new(Size2::new(1, 1));
    let mut stage = BufferStage::<SoftGfx>::mono();
    let image = TexImage::new_2d(size, 4, SampleType::U8);
    let data = rgba(size, 3);
    stage
        .initialize_texture(&mut gfx, image, Some(&data), Filter::Nearest, Wrap::Clamp)
        .unwrap();

    let mut out = vec![0; data.len()];
    stage
        .read_pixels(&mut gfx, 0, 4, SampleType::U8, &mut out)
        .unwrap();
    assert_eq!(out, data);

    // Same bytes in, same bytes out.
    stage.read_texture(&mut gfx, image, &data).unwrap();
    stage
        .read_pixels(&mut gfx, 0, 4, SampleType::U8, &mut out)
        .unwrap();
    assert_eq!(out, data);

    let next = rgba(size, 99);
    stage.read_texture(&mut gfx, image, &next).unwrap();
    stage
        .read_pixels(&mut gfx, 0, 4, SampleType::U8, &mut out)
        .unwrap();
    assert_eq!(out, next);
}

#[test]
fn layout_is_fixed_after_initialization() {
    let mut gfx = SoftGfx::new(Size2::new(1, 1));
    let mut stage = BufferStage::<SoftGfx>::mono();
    let image = TexImage::new_2d(Size2::new(2, 2), 4, SampleType::U8);
    stage
        .initialize_texture(&mut gfx, image, None, Filter::Linear, Wrap::Clamp)
        .unwrap();

    let err = stage
        .initialize_texture(&mut gfx, image, None, Filter::Linear, Wrap::Clamp)
        .unwrap_err();
    assert!(matches!(err, GraphError::Stage(_)));

    let other = TexImage::new_2d(Size2::new(4, 2), 4, SampleType::U8);
    assert!(stage.read_texture(&mut gfx, other, &[0; 32]).is_err());
    assert!(stage.read_texture(&mut gfx, image, &[0; 3]).is_err());

    stage.reset(&mut gfx);
    assert!(!stage.is_initialized());
    stage
        .initialize_texture(&mut gfx, other, None, Filter::Linear, Wrap::Clamp)
        .unwrap();
    assert_eq!(stage.desc().unwrap().size(), Size2::new(4, 2));
}

#[test]
fn cubemap_needs_exactly_six_faces() {
    let size = Size2::new(2, 2);
    let mut gfx = SoftGfx::new(Size2::new(1, 1));
    let mut stage = BufferStage::<SoftGfx>::mono();
    let image = TexImage::new_2d(size, 4, SampleType::U8);
    let faces: Vec<Vec<u8>> = (0..6).map(|i| rgba(size, i * 40)).collect();
    let refs: Vec<&[u8]> = faces.iter().map(Vec::as_slice).collect();

    let err = stage
        .initialize_cubemap(&mut gfx, image, &refs[..5], Filter::Linear, Wrap::Clamp)
        .unwrap_err();
    assert!(err.to_string().contains("exactly 6 faces"));
    assert!(!stage.is_initialized());

    stage
        .initialize_cubemap(&mut gfx, image, &refs, Filter::Linear, Wrap::Clamp)
        .unwrap();
    let bytes = gfx.texture_bytes(stage.color(0).unwrap()).unwrap();
    assert_eq!(bytes, faces.concat().as_slice());

    let face_len = image.byte_len();
    stage
        .read_cube_face(&mut gfx, 4, image, &faces[0])
        .unwrap();
    let bytes = gfx.texture_bytes(stage.color(0).unwrap()).unwrap();
    assert_eq!(&bytes[4 * face_len..5 * face_len], faces[0].as_slice());
    assert!(stage.read_cube_face(&mut gfx, 6, image, &faces[0]).is_err());
}

#[test]
fn volume_stage_has_no_framebuffer() {
    let mut gfx = SoftGfx::new(Size2::new(1, 1));
    let mut stage = BufferStage::<SoftGfx>::mono();
    let image = TexImage {
        size: crate::foundation::core::Size3::new(2, 2, 3),
        channels: 1,
        sample: SampleType::U8,
    };
    let data: Vec<u8> = (0..12).collect();
    stage
        .initialize_volume(&mut gfx, image, Some(&data), Filter::Linear, Wrap::Repeat)
        .unwrap();
    assert!(stage.framebuffer(0).is_none());
    let mut out = [0u8; 4];
    assert!(stage.read_pixels(&mut gfx, 0, 1, SampleType::U8, &mut out).is_err());
    stage.read_volume(&mut gfx, image, &data).unwrap();
}

#[test]
fn stereo_render_target_allocates_two_slots_and_releases_all() {
    let mut gfx = SoftGfx::new(Size2::new(1, 1));
    let textures = gfx.live_textures();
    let framebuffers = gfx.live_framebuffers();

    let mut stage = BufferStage::<SoftGfx>::stereo();
    stage
        .initialize_render_target(&mut gfx, Size2::new(4, 4), 4, SampleType::U8, true)
        .unwrap();
    assert_eq!(stage.slot_count(), 2);
    assert!(stage.framebuffer(1).is_some());
    assert_eq!(gfx.live_textures(), textures + 2);

    stage.bind_target(&mut gfx, 1).unwrap();
    gfx.clear([0.0, 1.0, 0.0, 1.0]);
    gfx.clear_buffers(true, true);
    let mut out = vec![0; 16 * 4];
    stage
        .read_pixels(&mut gfx, 1, 4, SampleType::U8, &mut out)
        .unwrap();
    assert!(out.chunks_exact(4).all(|p| p == [0, 255, 0, 255]));

    stage.release(&mut gfx);
    assert_eq!(gfx.live_textures(), textures);
    assert_eq!(gfx.live_framebuffers(), framebuffers);
}
