use super::*;
use crate::gfx::{FullscreenQuad, builtin_program, compile_stage, link_shaders};

fn rgba_pattern(size: Size2) -> Vec<u8> {
    (0..size.area() * 4).map(|i| (i * 7 % 251) as u8).collect()
}

fn render_target(gfx: &mut SoftGfx, size: Size2) -> (SoftTexture, SoftFramebuffer) {
    let tex = gfx.gen_texture().unwrap();
    gfx.bind_texture_rw(TexKind::Tex2D, &tex);
    gfx.set_texture(
        TexTarget::Tex2D,
        &TexImage::new_2d(size, 4, SampleType::U8),
        None,
    )
    .unwrap();
    let fb = gfx.create_framebuffer().unwrap();
    gfx.bind_framebuffer(&fb);
    gfx.framebuffer_texture_2d(TexTarget::Tex2D, &tex).unwrap();
    assert!(gfx.framebuffer_complete());
    (tex, fb)
}

#[test]
fn canonical_template_pair_compiles_links_and_activates() {
    let mut gfx = SoftGfx::new(Size2::new(4, 4));
    let vs = compile_stage(
        &mut gfx,
        ShaderStage::Vertex,
        SoftGfx::builtin_user_code(ShaderStage::Vertex, "passthrough").unwrap(),
    )
    .unwrap();
    let fs = compile_stage(
        &mut gfx,
        ShaderStage::Fragment,
        SoftGfx::builtin_user_code(ShaderStage::Fragment, "default").unwrap(),
    )
    .unwrap();
    let program = link_shaders(&mut gfx, &[&vs, &fs]).unwrap();
    gfx.use_program(&program);
    assert!(gfx.last_error().is_none());
}

#[test]
fn unknown_builtin_fails_compile_and_records_error() {
    let mut gfx = SoftGfx::new(Size2::new(1, 1));
    let err = compile_stage(&mut gfx, ShaderStage::Fragment, "#pragma builtin nope").unwrap_err();
    assert!(matches!(err, GfxError::Compile { stage: ShaderStage::Fragment, .. }));
    assert!(gfx.last_error().unwrap().contains("nope"));

    let err = compile_stage(&mut gfx, ShaderStage::Vertex, "void main() {}").unwrap_err();
    assert!(err.to_string().contains("#pragma builtin"));
}

#[test]
fn last_pragma_wins() {
    let mut gfx = SoftGfx::new(Size2::new(1, 1));
    let fs = compile_stage(
        &mut gfx,
        ShaderStage::Fragment,
        "#pragma builtin copy\n#pragma builtin solid",
    )
    .unwrap();
    let vs = compile_stage(&mut gfx, ShaderStage::Vertex, "#pragma builtin passthrough").unwrap();
    let p = link_shaders(&mut gfx, &[&vs, &fs]).unwrap();
    assert_eq!(gfx.active_uniforms(&p), vec!["iColor".to_string()]);
}

#[test]
fn link_without_fragment_fails() {
    let mut gfx = SoftGfx::new(Size2::new(1, 1));
    let vs = compile_stage(&mut gfx, ShaderStage::Vertex, "#pragma builtin passthrough").unwrap();
    let err = link_shaders(&mut gfx, &[&vs]).unwrap_err();
    assert!(matches!(err, GfxError::Link(_)));
    assert!(gfx.last_error().is_some());
}

#[test]
fn upload_then_read_pixels_is_identity() {
    let size = Size2::new(16, 8);
    let mut gfx = SoftGfx::new(size);
    let (tex, fb) = render_target(&mut gfx, size);
    let data = rgba_pattern(size);
    gfx.bind_texture_rw(TexKind::Tex2D, &tex);
    gfx.set_texture(
        TexTarget::Tex2D,
        &TexImage::new_2d(size, 4, SampleType::U8),
        Some(&data),
    )
    .unwrap();
    gfx.bind_framebuffer_ro(&fb);
    let mut out = vec![0; data.len()];
    gfx.read_pixels((0, 0), size, 4, SampleType::U8, &mut out)
        .unwrap();
    assert_eq!(out, data);
}

#[test]
fn upload_rejects_wrong_length_and_face_index() {
    let mut gfx = SoftGfx::new(Size2::new(1, 1));
    let tex = gfx.gen_texture().unwrap();
    gfx.bind_texture_rw(TexKind::Tex2D, &tex);
    let image = TexImage::new_2d(Size2::new(2, 2), 4, SampleType::U8);
    assert!(gfx.set_texture(TexTarget::Tex2D, &image, Some(&[0; 3])).is_err());
    assert!(
        gfx.set_texture(TexTarget::CubeFace(6), &image, Some(&[0; 16]))
            .is_err()
    );
}

#[test]
fn solid_quad_fills_target_and_conversion_reads_u16() {
    let size = Size2::new(8, 8);
    let mut gfx = SoftGfx::new(size);
    let (_tex, fb) = render_target(&mut gfx, size);
    let program = builtin_program(&mut gfx, "passthrough", "solid").unwrap();
    gfx.use_program(&program);
    let loc = gfx.uniform_location(&program, "iColor").unwrap();
    gfx.uniform4fv(&loc, &[1.0, 0.0, 0.0, 1.0]);
    let quad = FullscreenQuad::new(&mut gfx).unwrap();
    gfx.bind_framebuffer(&fb);
    quad.draw(&mut gfx).unwrap();

    gfx.bind_framebuffer_ro(&fb);
    let mut out = vec![0; size.area() * 4];
    gfx.read_pixels((0, 0), size, 4, SampleType::U8, &mut out)
        .unwrap();
    assert!(out.chunks_exact(4).all(|p| p == [255, 0, 0, 255]));

    let mut wide = vec![0; 2 * 2];
    gfx.read_pixels((0, 0), Size2::new(2, 1), 1, SampleType::U16, &mut wide)
        .unwrap();
    assert_eq!(wide, vec![0xff, 0xff, 0xff, 0xff]);
}

#[test]
fn copy_program_reproduces_source_texture() {
    let size = Size2::new(32, 16);
    let mut gfx = SoftGfx::new(size);
    let src = gfx.gen_texture().unwrap();
    let data = rgba_pattern(size);
    gfx.bind_texture_rw(TexKind::Tex2D, &src);
    gfx.set_texture(
        TexTarget::Tex2D,
        &TexImage::new_2d(size, 4, SampleType::U8),
        Some(&data),
    )
    .unwrap();
    gfx.tex_parameters(TexKind::Tex2D, Filter::Nearest, Wrap::Clamp);

    let (_dst, fb) = render_target(&mut gfx, size);
    let program = builtin_program(&mut gfx, "passthrough", "copy").unwrap();
    gfx.use_program(&program);
    let res = gfx.uniform_location(&program, "iResolution").unwrap();
    gfx.uniform3fv(&res, &[size.w as f32, size.h as f32, 1.0]);
    gfx.active_texture(0);
    gfx.bind_texture_ro(TexKind::Tex2D, &src);
    let quad = FullscreenQuad::new(&mut gfx).unwrap();
    gfx.bind_framebuffer(&fb);
    gfx.set_viewport((0, 0), size);
    quad.draw(&mut gfx).unwrap();

    gfx.bind_framebuffer_ro(&fb);
    let mut out = vec![0; data.len()];
    gfx.read_pixels((0, 0), size, 4, SampleType::U8, &mut out)
        .unwrap();
    assert_eq!(out, data);
}

#[test]
fn backface_culling_drops_clockwise_triangles() {
    let size = Size2::new(4, 4);
    let mut gfx = SoftGfx::new(size);
    let (_tex, fb) = render_target(&mut gfx, size);
    let program = builtin_program(&mut gfx, "passthrough", "default").unwrap();
    gfx.use_program(&program);

    let vao = gfx.gen_vertex_array().unwrap();
    let vbo = gfx.gen_vertex_buffer().unwrap();
    let ebo = gfx.gen_element_buffer().unwrap();
    gfx.bind_vertex_array(&vao);
    gfx.vertex_buffer_data(&vbo, &FullscreenQuad::<SoftGfx>::VERTICES)
        .unwrap();
    // Clockwise winding.
    gfx.element_buffer_data(&ebo, &[0, 2, 1, 0, 3, 2]).unwrap();

    gfx.bind_framebuffer(&fb);
    gfx.clear([0.0, 0.0, 0.0, 0.0]);
    gfx.clear_buffers(true, false);
    gfx.set_triangle_backside_culling(true);
    gfx.draw_vertex_elements(6).unwrap();
    gfx.bind_framebuffer_ro(&fb);
    let mut out = vec![0; size.area() * 4];
    gfx.read_pixels((0, 0), size, 4, SampleType::U8, &mut out)
        .unwrap();
    assert!(out.iter().all(|b| *b == 0));

    gfx.set_triangle_backside_culling(false);
    gfx.draw_vertex_elements(6).unwrap();
    gfx.read_pixels((0, 0), size, 4, SampleType::U8, &mut out)
        .unwrap();
    assert!(out.chunks_exact(4).all(|p| p[3] == 255));
}

#[test]
fn depth_test_keeps_nearest_fragment() {
    let size = Size2::new(4, 4);
    let mut gfx = SoftGfx::new(size);
    let program = builtin_program(&mut gfx, "passthrough", "solid").unwrap();
    gfx.use_program(&program);
    let color = gfx.uniform_location(&program, "iColor").unwrap();

    let near: Vec<Vertex> = FullscreenQuad::<SoftGfx>::VERTICES
        .iter()
        .map(|v| Vertex {
            position: [v.position[0], v.position[1], -0.5, 1.0],
            ..*v
        })
        .collect();
    let vao = gfx.gen_vertex_array().unwrap();
    let vbo = gfx.gen_vertex_buffer().unwrap();
    let ebo = gfx.gen_element_buffer().unwrap();
    gfx.bind_vertex_array(&vao);
    gfx.element_buffer_data(&ebo, &FullscreenQuad::<SoftGfx>::INDICES)
        .unwrap();

    gfx.bind_framebuffer_default();
    gfx.set_depth_test(true);
    gfx.clear_buffers(true, true);
    gfx.vertex_buffer_data(&vbo, &near).unwrap();
    gfx.uniform4fv(&color, &[0.0, 1.0, 0.0, 1.0]);
    gfx.draw_vertex_elements(6).unwrap();
    gfx.vertex_buffer_data(&vbo, &FullscreenQuad::<SoftGfx>::VERTICES)
        .unwrap();
    gfx.uniform4fv(&color, &[1.0, 0.0, 0.0, 1.0]);
    gfx.draw_vertex_elements(6).unwrap();

    gfx.activate_next_frame();
    let frame = gfx.presented_frame().unwrap();
    assert!(frame.chunks_exact(4).all(|p| p == [0, 255, 0, 255]));
    assert_eq!(gfx.frames_presented(), 1);
}

#[test]
fn deleting_resources_frees_slots_but_keeps_default() {
    let mut gfx = SoftGfx::new(Size2::new(2, 2));
    let before = gfx.live_textures();
    let tex = gfx.gen_texture().unwrap();
    assert_eq!(gfx.live_textures(), before + 1);
    gfx.delete_texture(tex);
    gfx.delete_texture(SoftTexture(0));
    assert_eq!(gfx.live_textures(), before);
}

#[test]
fn fullscreen_quad_releases_partial_allocations() {
    let mut gfx = SoftGfx::new(Size2::new(2, 2));
    for budget in 0..3 {
        gfx.set_geometry_budget(Some(budget));
        assert!(FullscreenQuad::<SoftGfx>::new(&mut gfx).is_err());
        assert_eq!(gfx.live_geometry(), 0, "budget {budget}");
        assert!(gfx.last_error().is_some_and(|e| e.contains("geometry budget")));
    }
    gfx.set_geometry_budget(Some(3));
    let quad = FullscreenQuad::<SoftGfx>::new(&mut gfx).unwrap();
    assert_eq!(gfx.live_geometry(), 3);
    quad.release(&mut gfx);
    assert_eq!(gfx.live_geometry(), 0);
}
