use super::*;
use crate::format::negotiate::negotiate;
use crate::gfx::soft::SoftGfx;

fn ctx() -> RenderContext<SoftGfx> {
    RenderContext::new(SoftGfx::new(Size2::new(1, 1)))
}

#[test]
fn stores_packets_in_registered_handle() {
    let mut ctx = ctx();
    let mut env = Environment::new();
    let handle = env.add_capture("out");
    let mut atom = CaptureAtom::default();
    let cfg = AtomConfig::new().with("target", "out");
    Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &cfg, &env).unwrap();

    let fmt = ValueFormat::video_rgba8(1, 1);
    atom.recv(&mut ctx, 0, Packet::bytes(fmt, 7, vec![1, 2, 3, 4]))
        .unwrap();
    let stored = handle.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].seq, 7);
}

#[test]
fn limit_keeps_most_recent() {
    let mut ctx = ctx();
    let mut atom = CaptureAtom::default();
    let cfg = AtomConfig::new().with("limit", 2);
    Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &cfg, &Environment::new()).unwrap();
    for seq in 0..5 {
        atom.recv(&mut ctx, 0, Packet::tick(ValueFormat::Order, seq))
            .unwrap();
    }
    let seqs: Vec<u64> = atom.handle().lock().unwrap().iter().map(|p| p.seq).collect();
    assert_eq!(seqs, vec![3, 4]);
}

#[test]
fn accepts_every_domain() {
    let offers = [
        ValueFormat::video_rgb8(4, 4),
        ValueFormat::Audio(AudioFormat::new(
            crate::foundation::core::SampleType::U16,
            44_100,
            2,
            64,
        )),
        ValueFormat::any_fbo(),
        ValueFormat::Keyboard,
        ValueFormat::State,
        ValueFormat::Receipt,
    ];
    for offer in offers {
        assert_eq!(negotiate(&CaptureAtom::accept_all(), &[offer]).unwrap(), offer);
    }
}

#[test]
fn unknown_target_is_rejected() {
    let mut ctx = ctx();
    let mut atom = CaptureAtom::default();
    let cfg = AtomConfig::new().with("target", "missing");
    assert!(Atom::<SoftGfx>::initialize(&mut atom, &mut ctx, &cfg, &Environment::new()).is_err());
}
