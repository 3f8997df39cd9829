use super::*;
use crate::atoms::TextureAtom;
use crate::gfx::soft::SoftGfx;
use serde_json::json;

fn ctx() -> RenderContext<SoftGfx> {
    RenderContext::new(SoftGfx::new(Size2::new(4, 4)))
}

fn shader(ctx: &mut RenderContext<SoftGfx>, cfg: serde_json::Value) -> ShaderAtom<SoftGfx> {
    let mut atom = ShaderAtom::default();
    let cfg = AtomConfig::from_value(cfg).unwrap();
    atom.initialize(ctx, &cfg, &Environment::new()).unwrap();
    atom.post_initialize(ctx, &mut PostInit::default()).unwrap();
    atom
}

fn read_rgba(ctx: &mut RenderContext<SoftGfx>, id: StageId, size: Size2) -> Vec<u8> {
    let mut out = vec![0; size.area() * 4];
    let (gfx, stage) = ctx.stage_with_gfx(id).unwrap();
    stage.read_pixels(gfx, 0, 4, SampleType::U8, &mut out).unwrap();
    out
}

#[test]
fn solid_program_fills_render_target() {
    let mut ctx = ctx();
    let mut atom = shader(
        &mut ctx,
        json!({"width": 3, "height": 2, "shader.frag.name": "solid", "color": [1.0, 0.0, 0.0, 1.0]}),
    );
    assert!(atom.failure().is_none());
    assert_eq!(atom.uniform_names(), vec!["iColor"]);
    assert!(atom.is_ready(&ctx, &PacketIo::default()));

    let pkt = atom
        .send(&mut ctx, &TickConfig::default(), 0, &ValueFormat::any_fbo())
        .unwrap()
        .unwrap();
    let id = pkt.payload.as_stage().unwrap();
    let out = read_rgba(&mut ctx, id, Size2::new(3, 2));
    assert!(out.chunks(4).all(|px| px == [255, 0, 0, 255]));
}

#[test]
fn invert_samples_bound_input() {
    let mut ctx = ctx();
    let mut tex = TextureAtom::default();
    Atom::<SoftGfx>::initialize(&mut tex, &mut ctx, &AtomConfig::new(), &Environment::new())
        .unwrap();
    let fmt = ValueFormat::video_rgba8(2, 2);
    let pixels = vec![10, 20, 30, 255, 0, 0, 0, 255, 255, 255, 255, 255, 100, 150, 200, 255];
    tex.recv(&mut ctx, 0, Packet::bytes(fmt, 0, pixels.clone()))
        .unwrap();
    let handle = tex
        .send(&mut ctx, &TickConfig::default(), 0, &ValueFormat::any_fbo())
        .unwrap()
        .unwrap();

    let mut atom = shader(&mut ctx, json!({"inputs": 1, "shader.frag.name": "invert"}));
    assert_eq!(atom.sink_count(), 2);
    let io = PacketIo::new(vec![
        crate::atom::SinkIo {
            connected: true,
            queued: 0,
        },
        crate::atom::SinkIo::default(),
    ]);
    assert!(!atom.is_ready(&ctx, &io));
    atom.recv(&mut ctx, 0, handle).unwrap();
    assert!(atom.is_ready(&ctx, &io));

    let pkt = atom
        .send(&mut ctx, &TickConfig::default(), 0, &ValueFormat::any_fbo())
        .unwrap()
        .unwrap();
    let out = read_rgba(&mut ctx, pkt.payload.as_stage().unwrap(), Size2::new(2, 2));
    for (got, src) in out.chunks(4).zip(pixels.chunks(4)) {
        for c in 0..3 {
            assert!((got[c] as i32 - (255 - src[c]) as i32).abs() <= 1, "{got:?} vs {src:?}");
        }
    }
}

#[test]
fn render_happens_once_per_frame() {
    let mut ctx = ctx();
    let mut atom = shader(&mut ctx, json!({"width": 2, "height": 2}));
    let tick = TickConfig {
        frame: 3,
        ..TickConfig::default()
    };
    atom.send(&mut ctx, &tick, 0, &ValueFormat::any_fbo()).unwrap();
    assert_eq!(atom.rendered_frame, Some(3));
    atom.finalize(&mut ctx, &tick).unwrap();
    assert_eq!(atom.rendered_frame, Some(3));
}

#[test]
fn finalize_renders_without_downstream() {
    let mut ctx = ctx();
    let mut atom = shader(&mut ctx, json!({"width": 2, "height": 2}));
    atom.finalize(&mut ctx, &TickConfig::default()).unwrap();
    assert!(ctx.stage_ready(atom.target().unwrap()));
}

#[test]
fn state_packet_lands_on_last_sink() {
    let mut ctx = ctx();
    let mut atom = shader(&mut ctx, json!({"width": 2, "height": 2, "shader.vtx.name": "transform"}));
    assert_eq!(atom.sink_formats(0), vec![ValueFormat::State]);
    let mut state = RenderState::default();
    state.view[12] = 0.5;
    atom.recv(
        &mut ctx,
        0,
        Packet::new(ValueFormat::State, 0, Payload::State(state)),
    )
    .unwrap();
    assert_eq!(atom.state, state);

    let err = atom
        .recv(&mut ctx, 0, Packet::bytes(ValueFormat::video_rgba8(1, 1), 0, vec![0; 4]))
        .unwrap_err();
    assert!(err.is_edge_local());
}

#[test]
fn unknown_builtin_is_a_config_error() {
    let mut ctx = ctx();
    let mut atom = ShaderAtom::<SoftGfx>::default();
    let cfg = AtomConfig::new()
        .with("width", 2)
        .with("height", 2)
        .with("shader.frag.name", "plasma");
    let err = atom
        .initialize(&mut ctx, &cfg, &Environment::new())
        .unwrap_err();
    assert!(matches!(err, GraphError::Config(_)));
}

#[test]
fn compile_failure_disables_output() {
    let dir = std::env::temp_dir().join(format!("atomgraph_shader_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("broken.frag");
    std::fs::write(&path, "void main() {}\n").unwrap();

    let mut ctx = ctx();
    let mut atom = shader(
        &mut ctx,
        json!({"width": 2, "height": 2, "shader.frag.path": path.to_string_lossy()}),
    );
    assert!(atom.failure().is_some());
    assert!(!atom.is_ready(&ctx, &PacketIo::default()));
    assert!(
        atom.send(&mut ctx, &TickConfig::default(), 0, &ValueFormat::any_fbo())
            .unwrap()
            .is_none()
    );
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_size_without_inputs_is_rejected() {
    let mut ctx = ctx();
    let mut atom = ShaderAtom::<SoftGfx>::default();
    assert!(
        atom.initialize(&mut ctx, &AtomConfig::new(), &Environment::new())
            .is_err()
    );
}

#[test]
fn uninitialize_releases_program_and_stage() {
    let mut ctx = ctx();
    let mut atom = shader(&mut ctx, json!({"width": 2, "height": 2}));
    atom.finalize(&mut ctx, &TickConfig::default()).unwrap();
    let textures = ctx.gfx.live_textures();
    atom.uninitialize(&mut ctx);
    assert_eq!(ctx.live_stages(), 0);
    assert!(ctx.gfx.live_textures() < textures);
}
