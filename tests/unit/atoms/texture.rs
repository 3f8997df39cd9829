use super::*;
use crate::gfx::soft::SoftGfx;

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "atomgraph_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn write_png(path: &Path, size: Size2, fill: u8) -> Vec<u8> {
    let data: Vec<u8> = (0..size.area() * 4)
        .map(|i| (i as u8).wrapping_add(fill))
        .collect();
    image::RgbaImage::from_raw(size.w, size.h, data.clone())
        .unwrap()
        .save(path)
        .unwrap();
    data
}

fn setup(cfg: AtomConfig) -> (RenderContext<SoftGfx>, TextureAtom) {
    let mut ctx = RenderContext::new(SoftGfx::new(Size2::new(4, 4)));
    let mut atom = TextureAtom::default();
    Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &cfg, &Environment::new()).unwrap();
    (ctx, atom)
}

fn face(size: Size2, seed: u8) -> Vec<u8> {
    vec![seed; size.area() * 4]
}

#[test]
fn face_paths_follow_title_suffix_convention() {
    let paths = cubemap_face_paths(Path::new("/tmp/sky.png"));
    assert_eq!(paths[0], PathBuf::from("/tmp/sky.png"));
    assert_eq!(paths[1], PathBuf::from("/tmp/sky_1.png"));
    assert_eq!(paths[5], PathBuf::from("/tmp/sky_5.png"));
}

#[test]
fn top_bottom_swap_changes_upload_order() {
    let size = Size2::new(2, 2);
    let faces: Vec<Vec<u8>> = (0..6).map(|i| face(size, i * 10)).collect();
    let mut plain = faces.clone();
    prepare_faces(&mut plain, 8, false, false);
    let mut swapped = faces.clone();
    prepare_faces(&mut swapped, 8, false, true);
    assert_eq!(plain, faces);
    assert_ne!(plain.concat(), swapped.concat());
    assert_eq!(swapped[2], faces[3]);
    assert_eq!(swapped[3], faces[2]);
}

#[test]
fn vflip_reverses_rows_before_upload() {
    let mut faces = vec![vec![1, 1, 2, 2, 3, 3]];
    prepare_faces(&mut faces, 2, true, false);
    assert_eq!(faces[0], vec![3, 3, 2, 2, 1, 1]);
}

#[test]
fn video_packet_initializes_then_updates_stage() {
    let (mut ctx, mut atom) = setup(AtomConfig::new());
    let fmt = ValueFormat::video_rgba8(2, 2);
    let size = Size2::new(2, 2);
    let cfg = TickConfig::default();

    assert!(atom.send(&mut ctx, &cfg, 0, &fmt).unwrap().is_none());
    atom.recv(&mut ctx, 0, Packet::bytes(fmt, 0, face(size, 7)))
        .unwrap();
    let pkt = atom.send(&mut ctx, &cfg, 0, &fmt).unwrap().unwrap();
    let id = pkt.payload.as_stage().unwrap();
    assert!(pkt.format.is_fbo());

    atom.recv(&mut ctx, 0, Packet::bytes(fmt, 1, face(size, 9)))
        .unwrap();
    let tex = *ctx.stage(id).unwrap().color(0).unwrap();
    assert_eq!(ctx.gfx.texture_bytes(&tex).unwrap(), face(size, 9).as_slice());

    let bigger = ValueFormat::video_rgba8(4, 4);
    let err = atom
        .recv(&mut ctx, 0, Packet::bytes(bigger, 2, face(Size2::new(4, 4), 1)))
        .unwrap_err();
    assert!(err.is_edge_local());
}

#[test]
fn cubemap_waits_for_six_faces_in_sequence() {
    let cfg = AtomConfig::new().with("cubemap", "true");
    let (mut ctx, mut atom) = setup(cfg);
    let size = Size2::new(2, 2);
    let fmt = ValueFormat::Video(VideoFormat::rgba8(2, 2).with_cubemap(true));
    let tick = TickConfig::default();

    for seq in 0..5 {
        atom.recv(&mut ctx, 0, Packet::bytes(fmt, seq, face(size, seq as u8)))
            .unwrap();
    }
    assert!(atom.send(&mut ctx, &tick, 0, &fmt).unwrap().is_none());

    // Restart from zero and deliver a full set.
    for seq in 0..6 {
        atom.recv(&mut ctx, 0, Packet::bytes(fmt, seq, face(size, 100 + seq as u8)))
            .unwrap();
    }
    let pkt = atom.send(&mut ctx, &tick, 0, &fmt).unwrap().unwrap();
    let stage = ctx.stage(pkt.payload.as_stage().unwrap()).unwrap();
    assert_eq!(stage.desc().unwrap().kind, StageKind::Cubemap);
}

#[test]
fn preload_reads_file_and_uploads_on_first_send() {
    let dir = temp_dir("texture_preload");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("img.png");
    let size = Size2::new(3, 2);
    let data = write_png(&path, size, 5);

    let cfg = AtomConfig::new()
        .with("filepath", path.to_string_lossy().into_owned())
        .with("filter", "nearest");
    let (mut ctx, mut atom) = setup(cfg);
    let mut post = PostInit::default();
    atom.post_initialize(&mut ctx, &mut post).unwrap();
    assert!(Atom::<SoftGfx>::is_ready(&atom, &ctx, &PacketIo::default()));

    let fmt = ValueFormat::any_fbo();
    let pkt = atom
        .send(&mut ctx, &TickConfig::default(), 0, &fmt)
        .unwrap()
        .unwrap();
    let id = pkt.payload.as_stage().unwrap();
    let mut out = vec![0; data.len()];
    let (gfx, stage) = ctx.stage_with_gfx(id).unwrap();
    stage.read_pixels(gfx, 0, 4, SampleType::U8, &mut out).unwrap();
    assert_eq!(out, data);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_preload_file_fails_post_initialize() {
    let cfg = AtomConfig::new().with("filepath", "/nonexistent/atomgraph.png");
    let (mut ctx, mut atom) = setup(cfg);
    let mut post = PostInit::default();
    assert!(atom.post_initialize(&mut ctx, &mut post).is_err());
}

#[test]
fn uninitialize_releases_stage() {
    let (mut ctx, mut atom) = setup(AtomConfig::new());
    let fmt = ValueFormat::video_rgba8(1, 1);
    atom.recv(&mut ctx, 0, Packet::bytes(fmt, 0, vec![1, 2, 3, 4]))
        .unwrap();
    assert_eq!(ctx.live_stages(), 1);
    Atom::<SoftGfx>::uninitialize(&mut atom, &mut ctx);
    assert_eq!(ctx.live_stages(), 0);
}
