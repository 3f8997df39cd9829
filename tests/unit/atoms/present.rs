use super::*;
use crate::atoms::TextureAtom;
use crate::foundation::core::Size2;
use crate::gfx::soft::SoftGfx;

fn uploaded(ctx: &mut RenderContext<SoftGfx>, data: Vec<u8>) -> (TextureAtom, Packet) {
    let mut tex = TextureAtom::default();
    let cfg = AtomConfig::new().with("filter", "nearest");
    Atom::<SoftGfx>::initialize(&mut tex, ctx, &cfg, &Environment::new()).unwrap();
    let fmt = ValueFormat::video_rgba8(2, 2);
    tex.recv(ctx, 0, Packet::bytes(fmt, 0, data)).unwrap();
    let handle = tex
        .send(ctx, &TickConfig::default(), 0, &ValueFormat::any_fbo())
        .unwrap()
        .unwrap();
    (tex, handle)
}

fn present(ctx: &mut RenderContext<SoftGfx>) -> PresentAtom<SoftGfx> {
    let mut atom = PresentAtom::default();
    atom.initialize(ctx, &AtomConfig::new(), &Environment::new())
        .unwrap();
    atom.post_initialize(ctx, &mut PostInit::default()).unwrap();
    atom
}

#[test]
fn finalize_blits_stage_and_presents() {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(2, 2)));
    let data: Vec<u8> = vec![
        255, 0, 0, 255, 0, 255, 0, 255, //
        0, 0, 255, 255, 255, 255, 255, 255,
    ];
    let (_tex, handle) = uploaded(&mut ctx, data.clone());
    let mut atom = present(&mut ctx);

    assert!(!atom.is_ready(&ctx, &PacketIo::default()));
    atom.recv(&mut ctx, 0, handle).unwrap();
    assert!(atom.is_ready(&ctx, &PacketIo::default()));
    atom.finalize(&mut ctx, &TickConfig::default()).unwrap();

    assert_eq!(atom.presented(), 1);
    assert_eq!(ctx.gfx.frames_presented(), 1);
    let frame = ctx.gfx.presented_frame().unwrap();
    for (got, want) in frame.iter().zip(&data) {
        assert!((*got as i32 - *want as i32).abs() <= 1, "{frame:?}");
    }
}

#[test]
fn blit_scales_stage_to_the_window() {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(4, 4)));
    let data: Vec<u8> = vec![
        255, 0, 0, 255, 0, 255, 0, 255, //
        0, 0, 255, 255, 255, 255, 255, 255,
    ];
    let (_tex, handle) = uploaded(&mut ctx, data.clone());
    let mut atom = present(&mut ctx);
    atom.recv(&mut ctx, 0, handle).unwrap();
    atom.finalize(&mut ctx, &TickConfig::default()).unwrap();

    let frame = ctx.gfx.presented_frame().unwrap();
    assert_eq!(frame.len(), 4 * 4 * 4);
    for y in 0..4 {
        for x in 0..4 {
            let got = &frame[(y * 4 + x) * 4..][..4];
            let want = &data[((y / 2) * 2 + x / 2) * 4..][..4];
            for c in 0..4 {
                assert!((got[c] as i32 - want[c] as i32).abs() <= 1, "({x},{y}) {got:?}");
            }
        }
    }
}

#[test]
fn nothing_presented_without_a_stage() {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(2, 2)));
    let mut atom = present(&mut ctx);
    atom.finalize(&mut ctx, &TickConfig::default()).unwrap();
    assert_eq!(ctx.gfx.frames_presented(), 0);
    assert!(
        atom.recv(&mut ctx, 0, Packet::tick(ValueFormat::Order, 0))
            .unwrap_err()
            .is_edge_local()
    );
}

#[test]
fn bad_clear_color_is_a_config_error() {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(1, 1)));
    let mut atom = PresentAtom::<SoftGfx>::default();
    let cfg = AtomConfig::new().with("clear", "black");
    assert!(atom.initialize(&mut ctx, &cfg, &Environment::new()).is_err());
}
