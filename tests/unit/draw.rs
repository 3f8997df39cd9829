use super::*;

fn pixel(data: &[u8], size: Size2, x: u32, y: u32) -> [u8; 4] {
    let i = (y * size.w + x) as usize * 4;
    [data[i], data[i + 1], data[i + 2], data[i + 3]]
}

#[test]
fn commands_deserialize_from_tagged_json() {
    let json = serde_json::json!([
        {"op": "clear", "color": [0, 0, 0, 255]},
        {"op": "fill_rect", "x": 1.0, "y": 2.0, "w": 3.0, "h": 4.0, "color": [255, 0, 0, 255]},
        {"op": "fill_path", "path": "M0 0 L4 0 L4 4 Z", "color": [0, 255, 0, 255]}
    ]);
    let cmds = parse_commands(&json).unwrap();
    assert_eq!(cmds.len(), 3);
    assert_eq!(
        cmds[1],
        DrawCommand::FillRect {
            x: 1.0,
            y: 2.0,
            w: 3.0,
            h: 4.0,
            color: [255, 0, 0, 255]
        }
    );
    assert!(parse_commands(&serde_json::json!([{"op": "spin"}])).is_err());
}

#[test]
fn fill_rect_covers_expected_pixels() {
    let size = Size2::new(8, 8);
    let out = replay(
        size,
        &[
            DrawCommand::Clear {
                color: [0, 0, 255, 255],
            },
            DrawCommand::FillRect {
                x: 0.0,
                y: 0.0,
                w: 4.0,
                h: 8.0,
                color: [255, 0, 0, 255],
            },
        ],
    )
    .unwrap();
    assert_eq!(out.len(), size.area() * 4);
    assert_eq!(pixel(&out, size, 1, 1), [255, 0, 0, 255]);
    assert_eq!(pixel(&out, size, 6, 6), [0, 0, 255, 255]);
}

#[test]
fn only_commands_after_last_clear_survive() {
    let size = Size2::new(4, 4);
    let out = replay(
        size,
        &[
            DrawCommand::FillRect {
                x: 0.0,
                y: 0.0,
                w: 4.0,
                h: 4.0,
                color: [255, 255, 255, 255],
            },
            DrawCommand::Clear {
                color: [10, 20, 30, 255],
            },
        ],
    )
    .unwrap();
    assert!(out.chunks_exact(4).all(|p| p == [10, 20, 30, 255]));
}

#[test]
fn untouched_canvas_is_transparent() {
    let size = Size2::new(16, 16);
    let out = replay(
        size,
        &[DrawCommand::FillEllipse {
            cx: 8.0,
            cy: 8.0,
            rx: 3.0,
            ry: 3.0,
            color: [0, 255, 0, 255],
        }],
    )
    .unwrap();
    assert_eq!(pixel(&out, size, 0, 0), [0, 0, 0, 0]);
    assert_eq!(pixel(&out, size, 8, 8), [0, 255, 0, 255]);
}

#[test]
fn invalid_path_and_empty_canvas_are_config_errors() {
    let bad = DrawCommand::FillPath {
        path: "M 0 0 X 1 2".to_string(),
        color: [0; 4],
    };
    assert!(matches!(
        replay(Size2::new(2, 2), &[bad]),
        Err(GraphError::Config(_))
    ));
    assert!(replay(Size2::new(0, 2), &[]).is_err());
}
