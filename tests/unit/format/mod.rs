use super::*;

#[test]
fn tags_cover_every_non_null_format() {
    assert_eq!(ValueFormat::Null.tag(), None);
    assert_eq!(
        ValueFormat::video_rgba8(1, 1).tag(),
        Some(FormatTag::new(Domain::Video, Kind::RawVideo))
    );
    assert_eq!(
        ValueFormat::any_fbo().tag(),
        Some(FormatTag::new(Domain::Gpu, Kind::Framebuffer))
    );
    assert_eq!(
        ValueFormat::Receipt.tag(),
        Some(FormatTag::new(Domain::Sync, Kind::Receipt))
    );
    assert!(ValueFormat::Order.is_order());
    assert!(ValueFormat::Receipt.is_order());
}

#[test]
fn wildcards_merge_to_the_specific_side() {
    let any_rgba = ValueFormat::Video(VideoFormat::any_with_channels(4));
    let merged = any_rgba.merge(&ValueFormat::video_rgba8(64, 32)).unwrap();
    assert_eq!(merged, ValueFormat::video_rgba8(64, 32));
    assert!(merged.is_concrete());
    assert!(!any_rgba.is_concrete());
}

#[test]
fn conflicting_fields_do_not_merge() {
    let a = ValueFormat::video_rgba8(64, 64);
    assert!(a.merge(&ValueFormat::video_rgb8(64, 64)).is_none());
    assert!(a.merge(&ValueFormat::video_rgba8(32, 64)).is_none());
    let cube = ValueFormat::Video(VideoFormat::rgba8(64, 64).with_cubemap(true));
    assert!(a.merge(&cube).is_none());
    assert!(a.merge(&ValueFormat::Order).is_none());
    assert!(ValueFormat::Null.merge(&ValueFormat::Null).is_none());
}

#[test]
fn audio_sample_type_is_part_of_the_layout() {
    let f32 = ValueFormat::Audio(AudioFormat::new(SampleType::F32, 44100, 2, 1024));
    let u16 = ValueFormat::Audio(AudioFormat::new(SampleType::U16, 44100, 2, 1024));
    assert!(f32.merge(&u16).is_none());
    assert_eq!(
        ValueFormat::Audio(AudioFormat::any()).merge(&u16),
        Some(u16)
    );
    assert_eq!(u16.payload_bytes(), Some(1024 * 2 * 2));
}

#[test]
fn fbo_is_concrete_without_a_size() {
    assert!(ValueFormat::any_fbo().is_concrete());
    assert!(ValueFormat::Keyboard.is_concrete());
    assert!(!ValueFormat::Null.is_concrete());
}

#[test]
fn display_is_compact() {
    assert_eq!(
        ValueFormat::video_rgba8(256, 256).to_string(),
        "video(256x256 ch=4 u8)"
    );
    assert_eq!(ValueFormat::Null.to_string(), "null");
}
