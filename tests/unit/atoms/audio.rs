use super::*;
use crate::gfx::soft::SoftGfx;

fn setup() -> (RenderContext<SoftGfx>, AudioAtom) {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(1, 1)));
    let mut atom = AudioAtom::default();
    Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &AtomConfig::new(), &Environment::new())
        .unwrap();
    (ctx, atom)
}

fn f32_format() -> ValueFormat {
    ValueFormat::Audio(AudioFormat::new(SampleType::F32, 48_000, 2, 4))
}

fn u16_format() -> ValueFormat {
    ValueFormat::Audio(AudioFormat::new(SampleType::U16, 48_000, 2, 4))
}

#[test]
fn post_initialize_requests_u16_for_float_sinks() {
    let (mut ctx, mut atom) = setup();
    assert!(Atom::<SoftGfx>::negotiate_sink_format(&mut atom, 0, &f32_format()));
    let mut post = PostInit::new(vec![f32_format()]);
    atom.post_initialize(&mut ctx, &mut post).unwrap();
    assert_eq!(post.requests(), &[(0, u16_format())]);

    let mut already = PostInit::new(vec![u16_format()]);
    atom.post_initialize(&mut ctx, &mut already).unwrap();
    assert!(already.requests().is_empty());
}

#[test]
fn stores_one_row_texture_per_block() {
    let (mut ctx, mut atom) = setup();
    assert!(Atom::<SoftGfx>::negotiate_sink_format(&mut atom, 0, &u16_format()));
    let samples: Vec<u16> = (0..8).map(|i| i * 1000).collect();
    let bytes: Vec<u8> = bytemuck::cast_slice(&samples).to_vec();
    atom.recv(&mut ctx, 0, Packet::bytes(u16_format(), 0, bytes.clone()))
        .unwrap();

    let pkt = atom
        .send(&mut ctx, &TickConfig::default(), 0, &ValueFormat::any_fbo())
        .unwrap()
        .unwrap();
    let stage = ctx.stage(pkt.payload.as_stage().unwrap()).unwrap();
    let desc = *stage.desc().unwrap();
    assert_eq!(desc.size(), Size2::new(4, 1));
    assert_eq!(desc.image.channels, 2);
    assert_eq!(desc.image.sample, SampleType::U16);
    let tex = *stage.color(0).unwrap();
    assert_eq!(ctx.gfx.texture_bytes(&tex).unwrap(), bytes.as_slice());
}

#[test]
fn sample_type_other_than_negotiated_fails_edge() {
    let (mut ctx, mut atom) = setup();
    assert!(Atom::<SoftGfx>::negotiate_sink_format(&mut atom, 0, &u16_format()));
    let err = atom
        .recv(&mut ctx, 0, Packet::bytes(f32_format(), 0, vec![0; 32]))
        .unwrap_err();
    assert!(err.is_edge_local());

    let short = atom
        .recv(&mut ctx, 0, Packet::bytes(u16_format(), 0, vec![0; 3]))
        .unwrap_err();
    assert!(short.is_edge_local());
}

#[test]
fn wildcard_formats_are_not_accepted_for_storage() {
    let (_ctx, mut atom) = setup();
    let any = ValueFormat::Audio(AudioFormat::any());
    assert!(!Atom::<SoftGfx>::negotiate_sink_format(&mut atom, 0, &any));
    assert!(!Atom::<SoftGfx>::negotiate_sink_format(
        &mut atom,
        0,
        &ValueFormat::video_rgba8(1, 1)
    ));
}
