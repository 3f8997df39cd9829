//! Recorded draw commands and their CPU replay.
//!
//! Commands are plain serde data so they can travel inside `Program` packets or sit in a node's
//! JSON configuration. Replay rasterizes with `vello_cpu` into straight-alpha RGBA8 rows, first
//! row first.

use crate::foundation::core::Size2;
use crate::foundation::error::{GraphError, GraphResult};

/// One recorded 2D drawing operation. Colors are straight-alpha RGBA8.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    /// Replace the whole canvas. Commands recorded before the last `Clear` have no effect.
    Clear { color: [u8; 4] },
    FillRect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: [u8; 4],
    },
    FillEllipse {
        cx: f64,
        cy: f64,
        rx: f64,
        ry: f64,
        color: [u8; 4],
    },
    StrokeLine {
        from: [f64; 2],
        to: [f64; 2],
        width: f64,
        color: [u8; 4],
    },
    /// Filled SVG path data (`M`, `L`, `C`, `Z`, ...).
    FillPath { path: String, color: [u8; 4] },
}

/// Parse a JSON array of commands.
pub fn parse_commands(value: &serde_json::Value) -> GraphResult<Vec<DrawCommand>> {
    serde_json::from_value(value.clone())
        .map_err(|e| GraphError::config(format!("invalid draw commands: {e}")))
}

const TOLERANCE: f64 = 0.1;

/// Rasterize `commands` onto a transparent `size` canvas.
pub fn replay(size: Size2, commands: &[DrawCommand]) -> GraphResult<Vec<u8>> {
    let w: u16 = size
        .w
        .try_into()
        .map_err(|_| GraphError::config("draw canvas width exceeds u16"))?;
    let h: u16 = size
        .h
        .try_into()
        .map_err(|_| GraphError::config("draw canvas height exceeds u16"))?;
    if size.is_empty() {
        return Err(GraphError::config("draw canvas must not be empty"));
    }

    let start = commands
        .iter()
        .rposition(|c| matches!(c, DrawCommand::Clear { .. }))
        .unwrap_or(0);

    let mut ctx = vello_cpu::RenderContext::new(w, h);
    for cmd in &commands[start..] {
        draw_command(&mut ctx, size, cmd)?;
    }
    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut pixmap);

    let mut out = pixmap.data_as_u8_slice().to_vec();
    unpremultiply_in_place(&mut out);
    Ok(out)
}

fn draw_command(
    ctx: &mut vello_cpu::RenderContext,
    size: Size2,
    cmd: &DrawCommand,
) -> GraphResult<()> {
    use vello_cpu::kurbo::{Ellipse, Line, Point, Rect, Shape, Stroke};

    match cmd {
        DrawCommand::Clear { color } => {
            set_color(ctx, *color);
            ctx.fill_rect(&Rect::new(0.0, 0.0, f64::from(size.w), f64::from(size.h)));
        }
        DrawCommand::FillRect { x, y, w, h, color } => {
            set_color(ctx, *color);
            ctx.fill_rect(&Rect::new(*x, *y, x + w, y + h));
        }
        DrawCommand::FillEllipse {
            cx,
            cy,
            rx,
            ry,
            color,
        } => {
            set_color(ctx, *color);
            let ellipse = Ellipse::new(Point::new(*cx, *cy), (*rx, *ry), 0.0);
            ctx.fill_path(&ellipse.to_path(TOLERANCE));
        }
        DrawCommand::StrokeLine {
            from,
            to,
            width,
            color,
        } => {
            set_color(ctx, *color);
            ctx.set_stroke(Stroke::new(*width));
            let line = Line::new(Point::new(from[0], from[1]), Point::new(to[0], to[1]));
            ctx.stroke_path(&line.to_path(TOLERANCE));
        }
        DrawCommand::FillPath { path, color } => {
            let parsed = kurbo::BezPath::from_svg(path)
                .map_err(|e| GraphError::config(format!("invalid svg path '{path}': {e}")))?;
            set_color(ctx, *color);
            ctx.fill_path(&bezpath_to_cpu(&parsed));
        }
    }
    Ok(())
}

fn set_color(ctx: &mut vello_cpu::RenderContext, [r, g, b, a]: [u8; 4]) {
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
}

fn point_to_cpu(p: kurbo::Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

fn unpremultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u32::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/draw.rs"]
mod tests;
