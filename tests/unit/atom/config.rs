use super::*;
use serde_json::json;

#[test]
fn booleans_accept_json_and_string_forms() {
    let cfg = AtomConfig::from_value(json!({
        "a": true,
        "b": "true",
        "c": "false",
        "d": "yes"
    }))
    .unwrap();
    assert!(cfg.get_bool("a", false).unwrap());
    assert!(cfg.get_bool("b", false).unwrap());
    assert!(!cfg.get_bool("c", true).unwrap());
    assert!(cfg.get_bool("missing", true).unwrap());
    assert!(matches!(cfg.get_bool("d", false), Err(GraphError::Config(_))));
}

#[test]
fn dotted_keys_resolve_flat_then_nested() {
    let cfg = AtomConfig::from_value(json!({
        "shader.vtx.name": "transform",
        "shader": {"frag": {"name": "copy"}, "vtx": {"name": "ignored"}}
    }))
    .unwrap();
    assert_eq!(cfg.get_str("shader.vtx.name").unwrap(), Some("transform"));
    assert_eq!(cfg.get_str("shader.frag.name").unwrap(), Some("copy"));
    assert_eq!(cfg.get_str("shader.geom.name").unwrap(), None);
}

#[test]
fn numbers_and_required_keys() {
    let cfg = AtomConfig::new()
        .with("width", 64)
        .with("rate", "48000")
        .with("freq", 440.5)
        .with("name", "");
    assert_eq!(cfg.get_u32("width", 0).unwrap(), 64);
    assert_eq!(cfg.get_u32("rate", 0).unwrap(), 48000);
    assert_eq!(cfg.get_u32("height", 7).unwrap(), 7);
    assert_eq!(cfg.get_f64("freq", 0.0).unwrap(), 440.5);
    assert!(cfg.get_u32("freq", 0).is_err());
    assert!(cfg.require_str("name").is_err());
    assert!(cfg.require_str("target").unwrap_err().to_string().contains("target"));
}

#[test]
fn filter_and_wrap_parse_with_defaults() {
    let cfg = AtomConfig::new().with("filter", "nearest").with("wrap", "bogus");
    assert_eq!(cfg.get_filter("filter").unwrap(), Filter::Nearest);
    assert_eq!(cfg.get_filter("other").unwrap(), Filter::Linear);
    assert!(cfg.get_wrap("wrap").is_err());
}

#[test]
fn non_object_config_is_rejected() {
    assert!(AtomConfig::from_value(json!([1, 2])).is_err());
    assert_eq!(
        AtomConfig::from_value(serde_json::Value::Null).unwrap(),
        AtomConfig::default()
    );
}
