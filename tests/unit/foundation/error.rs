use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        GraphError::config("x")
            .to_string()
            .contains("configuration error:")
    );
    assert!(
        GraphError::negotiation("x")
            .to_string()
            .contains("negotiation error:")
    );
    assert!(GraphError::format("x").to_string().contains("format error:"));
    assert!(GraphError::stage("x").to_string().contains("stage error:"));
    assert!(GraphError::credit("x").to_string().contains("credit error:"));
    assert!(
        GraphError::validation("x")
            .to_string()
            .contains("validation error:")
    );
}

#[test]
fn backend_errors_convert_and_keep_log() {
    let err: GraphError = GfxError::Compile {
        stage: ShaderStage::Fragment,
        log: "unknown builtin 'nope'".to_string(),
    }
    .into();
    let msg = err.to_string();
    assert!(msg.starts_with("backend error:"));
    assert!(msg.contains("Fragment"));
    assert!(msg.contains("unknown builtin 'nope'"));
}

#[test]
fn only_negotiation_and_format_errors_are_edge_local() {
    assert!(GraphError::negotiation("x").is_edge_local());
    assert!(GraphError::format("x").is_edge_local());
    assert!(!GraphError::config("x").is_edge_local());
    assert!(!GraphError::from(GfxError::resource("x")).is_edge_local());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = GraphError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn only_credit_and_validation_errors_escape_a_tick() {
    assert!(GraphError::credit("x").is_pipeline_fatal());
    assert!(GraphError::validation("x").is_pipeline_fatal());
    assert!(!GraphError::stage("x").is_pipeline_fatal());
    assert!(!GraphError::format("x").is_pipeline_fatal());
    assert!(!GraphError::from(GfxError::resource("x")).is_pipeline_fatal());
}
