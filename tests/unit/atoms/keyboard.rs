use super::*;
use crate::gfx::soft::SoftGfx;

fn setup() -> (RenderContext<SoftGfx>, KeyboardAtom, SharedKeyState) {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(4, 4)));
    let mut env = Environment::new();
    let keys = env.add_keyboard("main");
    let mut atom = KeyboardAtom::default();
    let cfg = AtomConfig::new().with("target", "main");
    Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &cfg, &env).unwrap();
    (ctx, atom, keys)
}

fn tick(ctx: &mut RenderContext<SoftGfx>, atom: &mut KeyboardAtom) -> Vec<u8> {
    let pkt = atom
        .send(ctx, &TickConfig::default(), 0, &ValueFormat::Keyboard)
        .unwrap()
        .unwrap();
    assert_eq!(pkt.format, ValueFormat::Keyboard);
    let id = pkt.payload.as_stage().unwrap();
    let tex = *ctx.stage(id).unwrap().color(0).unwrap();
    ctx.gfx.texture_bytes(&tex).unwrap().to_vec()
}

fn row(data: &[u8], r: usize, key: usize) -> u8 {
    data[r * 256 + key]
}

#[test]
fn rows_track_down_pressed_and_toggle() {
    let (mut ctx, mut atom, keys) = setup();
    let a = b'A' as usize;

    keys.lock().unwrap().press(b'A');
    let t1 = tick(&mut ctx, &mut atom);
    assert_eq!(t1.len(), KEY_TEXTURE_SIZE.area());
    assert_eq!((row(&t1, 0, a), row(&t1, 1, a), row(&t1, 2, a)), (255, 255, 255));

    // Held: still down, no new press edge.
    let t2 = tick(&mut ctx, &mut atom);
    assert_eq!((row(&t2, 0, a), row(&t2, 1, a), row(&t2, 2, a)), (255, 0, 255));

    keys.lock().unwrap().release(b'A');
    let t3 = tick(&mut ctx, &mut atom);
    assert_eq!((row(&t3, 0, a), row(&t3, 1, a), row(&t3, 2, a)), (0, 0, 255));

    keys.lock().unwrap().press(b'A');
    let t4 = tick(&mut ctx, &mut atom);
    assert_eq!((row(&t4, 0, a), row(&t4, 1, a), row(&t4, 2, a)), (255, 255, 0));
    assert_eq!(row(&t4, 0, b'B' as usize), 0);
}

#[test]
fn stage_is_single_channel_u8() {
    let (mut ctx, mut atom, _keys) = setup();
    let pkt = atom
        .send(&mut ctx, &TickConfig::default(), 0, &ValueFormat::Keyboard)
        .unwrap()
        .unwrap();
    let desc = *ctx.stage(pkt.payload.as_stage().unwrap()).unwrap().desc().unwrap();
    assert_eq!(desc.size(), KEY_TEXTURE_SIZE);
    assert_eq!(desc.image.channels, 1);
    assert_eq!(desc.image.sample, SampleType::U8);
    assert_eq!(desc.filter, Filter::Nearest);
}

#[test]
fn target_is_required_and_must_exist() {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(1, 1)));
    let mut atom = KeyboardAtom::default();
    let env = Environment::new();
    let missing = Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &AtomConfig::new(), &env);
    assert!(matches!(missing, Err(GraphError::Config(_))));
    let cfg = AtomConfig::new().with("target", "nobody");
    let unknown = Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &cfg, &env);
    assert!(unknown.unwrap_err().to_string().contains("nobody"));
}
