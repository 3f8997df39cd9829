use super::*;

#[test]
fn template_expansion_replaces_marker() {
    let src = expand_template("head\n${USER_CODE}\ntail", "body");
    assert_eq!(src, "head\nbody\ntail");
}

#[test]
fn standard_uniform_registers_do_not_overlap() {
    let mut used = std::collections::HashSet::new();
    for u in STANDARD_UNIFORMS {
        let first = u.register as u32 * 4 + u.component as u32;
        for c in first..first + u.len as u32 {
            assert!(used.insert(c), "{} overlaps component {c}", u.name);
        }
    }
    assert_eq!(standard_uniform("iTime").map(|u| u.register), Some(1));
    assert!(standard_uniform("iChannel0").is_none());
}

#[test]
fn uniform_values_widen_to_vec4() {
    assert_eq!(UniformValue::I2([1, 2]).as_vec4(), [1.0, 2.0, 0.0, 0.0]);
    assert_eq!(UniformValue::F1(0.5).as_vec4()[0], 0.5);
    assert_eq!(UniformValue::F1(3.0).as_i32(), 3);
}

#[test]
fn vertex_is_plain_old_data() {
    let quad = FullscreenQuad::<soft::SoftGfx>::VERTICES;
    let bytes: &[u8] = bytemuck::cast_slice(&quad);
    assert_eq!(bytes.len(), 4 * std::mem::size_of::<Vertex>());
    assert_eq!(std::mem::size_of::<Vertex>(), 24);
}
