use super::*;
use crate::atoms::{AudioAtom, ImageSourceAtom, SourceImage};
use crate::foundation::core::{SampleType, Size2};
use crate::format::AudioFormat;
use crate::gfx::soft::SoftGfx;
use crate::packet::{Packet, Payload};

fn soft() -> SoftGfx {
    SoftGfx::new(Size2::new(4, 4))
}

fn checker(size: Size2) -> SourceImage {
    let data = (0..size.area() * 4).map(|i| (i * 7 % 251) as u8).collect();
    SourceImage::rgba8(size, data).unwrap()
}

#[test]
fn assembly_rejects_bad_links() {
    let mut p = Pipeline::new(soft());
    let a = p.add_kind("a", "tone_source", AtomConfig::new()).unwrap();
    let b = p.add_kind("b", "capture", AtomConfig::new()).unwrap();
    assert!(p.add_kind("a", "capture", AtomConfig::new()).is_err());
    assert!(p.add_kind("c", "mixer", AtomConfig::new()).is_err());

    let ok = p
        .connect(Endpoint::new(a, 0), Endpoint::new(b, 0), LinkPolicy::default())
        .unwrap();
    assert_eq!(p.link_state(ok), Some(&LinkState::Pending));
    assert!(
        p.connect(Endpoint::new(a, 0), Endpoint::new(b, 0), LinkPolicy::default())
            .is_err()
    );
    assert!(
        p.connect(Endpoint::new(a, 0), Endpoint::new(a, 0), LinkPolicy::default())
            .is_err()
    );
    assert!(
        p.connect(Endpoint::new(a, 0), Endpoint::new(9, 0), LinkPolicy::default())
            .is_err()
    );
}

#[test]
fn port_out_of_range_fails_initialize() {
    let mut p = Pipeline::new(soft());
    let a = p.add_kind("a", "tone_source", AtomConfig::new()).unwrap();
    let b = p.add_kind("b", "capture", AtomConfig::new()).unwrap();
    p.connect(Endpoint::new(a, 1), Endpoint::new(b, 0), LinkPolicy::default())
        .unwrap();
    assert!(matches!(p.initialize(), Err(GraphError::Validation(_))));
    assert!(!p.is_running());
}

#[test]
fn config_error_aborts_assembly() {
    let mut p = Pipeline::new(soft());
    p.add_kind("ok", "tone_source", AtomConfig::new()).unwrap();
    p.add_kind("bad", "shader", AtomConfig::new()).unwrap();
    assert!(matches!(p.initialize(), Err(GraphError::Config(_))));
    assert!(p.tick().is_err());
}

#[test]
fn tick_requires_initialize() {
    let mut p = Pipeline::new(soft());
    p.add_kind("a", "tone_source", AtomConfig::new()).unwrap();
    assert!(matches!(p.tick(), Err(GraphError::Validation(_))));
    p.initialize().unwrap();
    assert!(p.add_kind("late", "capture", AtomConfig::new()).is_err());
    assert_eq!(p.tick().unwrap().frame, 0);
    assert_eq!(p.tick().unwrap().frame, 1);
}

#[test]
fn audio_sink_forces_u16_upstream() {
    let mut env = Environment::new();
    let out = env.add_capture("out");
    let mut p = Pipeline::with_environment(soft(), env);
    let tone = p.add_kind("tone", "tone_source", AtomConfig::new()).unwrap();
    let audio = p
        .add_atom("audio", Box::new(AudioAtom::default()), AtomConfig::new())
        .unwrap();
    let cap = p
        .add_kind("cap", "capture", AtomConfig::new().with("target", "out"))
        .unwrap();
    let l0 = p
        .connect(Endpoint::new(tone, 0), Endpoint::new(audio, 0), LinkPolicy::default())
        .unwrap();
    let l1 = p
        .connect(Endpoint::new(audio, 0), Endpoint::new(cap, 0), LinkPolicy::default())
        .unwrap();
    p.initialize().unwrap();

    let expected = AudioFormat::new(SampleType::U16, 48_000, 2, 1024);
    assert_eq!(p.links()[l0].format, ValueFormat::Audio(expected));
    assert!(p.links()[l1].is_active());
    assert!(p.links()[l1].format.is_fbo());

    let stats = p.tick().unwrap();
    assert_eq!(stats.ran, 3);
    assert_eq!(stats.routed, 2);
    let got = out.lock().unwrap();
    assert_eq!(got.len(), 1);
    assert!(matches!(got[0].payload, Payload::Stage(_)));
}

#[test]
fn disjoint_formats_fail_the_edge_only() {
    let mut env = Environment::new();
    env.add_keyboard("kb");
    let mut p = Pipeline::with_environment(soft(), env);
    let kb = p
        .add_kind("kb", "keyboard", AtomConfig::new().with("target", "kb"))
        .unwrap();
    let rb = p
        .add_kind("rb", "readback", AtomConfig::new().with("width", 4).with("height", 4))
        .unwrap();
    let link = p
        .connect(Endpoint::new(kb, 0), Endpoint::new(rb, 0), LinkPolicy::default())
        .unwrap();
    p.initialize().unwrap();

    assert!(matches!(p.link_state(link), Some(LinkState::Failed(_))));
    assert!(p.links()[link].format.is_null());
    let stats = p.tick().unwrap();
    assert_eq!(stats.routed, 0);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn order_is_topological_with_smallest_index_first() {
    let mut p = Pipeline::new(soft());
    let cap = p.add_kind("cap", "capture", AtomConfig::new()).unwrap();
    let tone = p.add_kind("tone", "tone_source", AtomConfig::new()).unwrap();
    let other = p.add_kind("other", "tone_source", AtomConfig::new()).unwrap();
    p.connect(Endpoint::new(tone, 0), Endpoint::new(cap, 0), LinkPolicy::default())
        .unwrap();
    p.initialize().unwrap();
    assert_eq!(p.order(), &[tone, cap, other]);
    assert_eq!(p.atom_id(other), Some("other"));
    assert_eq!(p.atom_kind(cap), Some("capture"));
}

/// Emits an order tick every time it is asked.
#[derive(Default)]
struct Ticker {
    seq: u64,
}

impl Atom<SoftGfx> for Ticker {
    fn kind(&self) -> &'static str {
        "ticker"
    }

    fn initialize(
        &mut self,
        _ctx: &mut RenderContext<SoftGfx>,
        _cfg: &AtomConfig,
        _env: &Environment,
    ) -> GraphResult<()> {
        Ok(())
    }

    fn sink_count(&self) -> usize {
        0
    }

    fn source_count(&self) -> usize {
        1
    }

    fn sink_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        Vec::new()
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        vec![ValueFormat::Order]
    }

    fn is_ready(&self, _ctx: &RenderContext<SoftGfx>, _io: &PacketIo) -> bool {
        true
    }

    fn recv(
        &mut self,
        _ctx: &mut RenderContext<SoftGfx>,
        _ch: usize,
        _packet: Packet,
    ) -> GraphResult<()> {
        Ok(())
    }

    fn send(
        &mut self,
        _ctx: &mut RenderContext<SoftGfx>,
        _cfg: &TickConfig,
        _ch: usize,
        fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        self.seq += 1;
        Ok(Some(Packet::tick(*fmt, self.seq)))
    }

    fn uninitialize(&mut self, _ctx: &mut RenderContext<SoftGfx>) {}
}

/// Accepts order ticks but never becomes ready.
struct Stalled;

impl Atom<SoftGfx> for Stalled {
    fn kind(&self) -> &'static str {
        "stalled"
    }

    fn initialize(
        &mut self,
        _ctx: &mut RenderContext<SoftGfx>,
        _cfg: &AtomConfig,
        _env: &Environment,
    ) -> GraphResult<()> {
        Ok(())
    }

    fn sink_count(&self) -> usize {
        1
    }

    fn source_count(&self) -> usize {
        0
    }

    fn sink_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        vec![ValueFormat::Order]
    }

    fn source_formats(&self, _ch: usize) -> Vec<ValueFormat> {
        Vec::new()
    }

    fn is_ready(&self, _ctx: &RenderContext<SoftGfx>, _io: &PacketIo) -> bool {
        false
    }

    fn recv(
        &mut self,
        _ctx: &mut RenderContext<SoftGfx>,
        _ch: usize,
        _packet: Packet,
    ) -> GraphResult<()> {
        Ok(())
    }

    fn send(
        &mut self,
        _ctx: &mut RenderContext<SoftGfx>,
        _cfg: &TickConfig,
        _ch: usize,
        _fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        Ok(None)
    }

    fn uninitialize(&mut self, _ctx: &mut RenderContext<SoftGfx>) {}
}

#[test]
fn full_queue_applies_backpressure() {
    let mut p = Pipeline::new(soft());
    let src = p
        .add_atom("src", Box::new(Ticker::default()), AtomConfig::new())
        .unwrap();
    let dst = p.add_atom("dst", Box::new(Stalled), AtomConfig::new()).unwrap();
    let link = p
        .connect(
            Endpoint::new(src, 0),
            Endpoint::new(dst, 0),
            LinkPolicy {
                credits: 1,
                queue: 2,
            },
        )
        .unwrap();
    p.initialize().unwrap();

    let routed: Vec<usize> = p.run(4).unwrap().iter().map(|s| s.routed).collect();
    assert_eq!(routed, vec![1, 1, 0, 0]);
    let conn = p.links()[link].connection().unwrap();
    assert_eq!(p.router().queued(conn), 2);
    let handle = p.router().find_port(src, Direction::Source, 0).unwrap();
    assert!(!p.router().has_outstanding(handle));
    assert_eq!(p.router().available_credits(handle), 1);
}

#[test]
fn uninitialize_releases_every_stage() {
    let mut p = Pipeline::new(soft());
    let img = p
        .add_atom(
            "img",
            Box::new(ImageSourceAtom::with_images(vec![checker(Size2::new(2, 2))])),
            AtomConfig::new(),
        )
        .unwrap();
    let tex = p.add_kind("tex", "texture", AtomConfig::new()).unwrap();
    let sh = p
        .add_kind(
            "sh",
            "shader",
            AtomConfig::new()
                .with("inputs", 1)
                .with("shader.frag.name", "invert"),
        )
        .unwrap();
    p.connect(Endpoint::new(img, 0), Endpoint::new(tex, 0), LinkPolicy::default())
        .unwrap();
    p.connect(Endpoint::new(tex, 0), Endpoint::new(sh, 0), LinkPolicy::default())
        .unwrap();
    p.initialize().unwrap();
    p.run(3).unwrap();
    assert!(p.context().live_stages() >= 2);
    p.uninitialize();
    assert_eq!(p.context().live_stages(), 0);
    assert_eq!(p.context().gfx.live_textures(), 1);
    assert_eq!(p.context().gfx.live_framebuffers(), 1);
    assert!(!p.is_running());
}
