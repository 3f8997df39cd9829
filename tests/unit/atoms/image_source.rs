use super::*;
use crate::gfx::soft::SoftGfx;

fn ctx() -> RenderContext<SoftGfx> {
    RenderContext::new(SoftGfx::new(Size2::new(1, 1)))
}

fn frame(seed: u8) -> SourceImage {
    SourceImage::rgba8(Size2::new(2, 1), vec![seed; 8]).unwrap()
}

fn emit(ctx: &mut RenderContext<SoftGfx>, atom: &mut ImageSourceAtom) -> Option<Packet> {
    let fmt = ValueFormat::video_rgba8(2, 1);
    atom.send(ctx, &TickConfig::default(), 0, &fmt).unwrap()
}

#[test]
fn emits_each_image_once_with_index_as_seq() {
    let mut ctx = ctx();
    let mut atom = ImageSourceAtom::with_images(vec![frame(1), frame(2)]);
    Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &AtomConfig::new(), &Environment::new())
        .unwrap();
    assert_eq!(
        Atom::<SoftGfx>::source_formats(&atom, 0),
        vec![ValueFormat::video_rgba8(2, 1)]
    );

    let a = emit(&mut ctx, &mut atom).unwrap();
    let b = emit(&mut ctx, &mut atom).unwrap();
    assert_eq!((a.seq, b.seq), (0, 1));
    assert_eq!(b.payload.as_bytes().unwrap(), &[2; 8]);
    assert!(!Atom::<SoftGfx>::is_ready(&atom, &ctx, &PacketIo::default()));
    assert!(emit(&mut ctx, &mut atom).is_none());
}

#[test]
fn repeat_wraps_to_first_image() {
    let mut ctx = ctx();
    let mut atom = ImageSourceAtom::with_images(vec![frame(1), frame(2)]);
    let cfg = AtomConfig::new().with("repeat", true);
    Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &cfg, &Environment::new()).unwrap();
    let seqs: Vec<u64> = (0..5).map(|_| emit(&mut ctx, &mut atom).unwrap().seq).collect();
    assert_eq!(seqs, vec![0, 1, 0, 1, 0]);
}

#[test]
fn cubemap_sets_flag_and_requires_six_images() {
    let mut ctx = ctx();
    let cfg = AtomConfig::new().with("cubemap", "true");
    let mut short = ImageSourceAtom::with_images(vec![frame(0); 5]);
    assert!(Atom::<SoftGfx>::initialize(&mut short, &mut ctx, &cfg, &Environment::new()).is_err());

    let mut atom = ImageSourceAtom::with_images((0..6).map(frame).collect());
    Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &cfg, &Environment::new()).unwrap();
    let ValueFormat::Video(v) = Atom::<SoftGfx>::source_formats(&atom, 0)[0] else {
        panic!("expected video");
    };
    assert!(v.cubemap);
}

#[test]
fn rejects_mixed_sizes_and_empty_sets() {
    let mut ctx = ctx();
    let big = SourceImage::rgba8(Size2::new(1, 1), vec![0; 4]).unwrap();
    let mut mixed = ImageSourceAtom::with_images(vec![frame(0), big]);
    assert!(
        Atom::<SoftGfx>::initialize(&mut mixed, &mut ctx, &AtomConfig::new(), &Environment::new())
            .is_err()
    );
    let mut empty = ImageSourceAtom::default();
    assert!(
        Atom::<SoftGfx>::initialize(&mut empty, &mut ctx, &AtomConfig::new(), &Environment::new())
            .is_err()
    );
    assert!(SourceImage::rgba8(Size2::new(2, 2), vec![0; 3]).is_err());
}

#[test]
fn loads_images_from_disk() {
    let dir = std::env::temp_dir().join(format!("atomgraph_image_source_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("frame.png");
    let data: Vec<u8> = (0..16).collect();
    image::RgbaImage::from_raw(2, 2, data.clone())
        .unwrap()
        .save(&path)
        .unwrap();

    let mut ctx = ctx();
    let mut atom = ImageSourceAtom::default();
    let cfg = AtomConfig::new().with("filepath", path.to_string_lossy().into_owned());
    Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &cfg, &Environment::new()).unwrap();
    let pkt = atom
        .send(&mut ctx, &TickConfig::default(), 0, &ValueFormat::video_rgba8(2, 2))
        .unwrap()
        .unwrap();
    assert_eq!(pkt.payload.as_bytes().unwrap(), data.as_slice());
    std::fs::remove_dir_all(&dir).ok();
}
