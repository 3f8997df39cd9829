use crate::atom::{Atom, AtomConfig, Environment, PacketIo, SharedKeyState, TickConfig};
use crate::context::RenderContext;
use crate::foundation::core::{Filter, SampleType, Size2, Wrap};
use crate::foundation::error::{GraphError, GraphResult};
use crate::format::ValueFormat;
use crate::gfx::{Gfx, TexImage};
use crate::packet::Packet;
use crate::stage::StageId;

/// Key texture layout: one texel per key code, rows `down`, `pressed`, `toggled`.
pub const KEY_TEXTURE_SIZE: Size2 = Size2::new(256, 3);

const ON: u8 = 255;

/// Bridges an external [`crate::atom::KeyState`] into a key texture each tick.
#[derive(Default)]
pub struct KeyboardAtom {
    target: String,
    keys: Option<SharedKeyState>,
    prev: Option<[bool; 256]>,
    toggled: Vec<bool>,
    stage: Option<StageId>,
    seq: u64,
}

impl KeyboardAtom {
    /// Texture rows for the current key snapshot; advances the edge and toggle state.
    fn rows(&mut self, down: [bool; 256]) -> Vec<u8> {
        let prev = self.prev.unwrap_or([false; 256]);
        if self.toggled.len() != 256 {
            self.toggled = vec![false; 256];
        }
        let mut data = vec![0; KEY_TEXTURE_SIZE.area()];
        let (row_down, rest) = data.split_at_mut(256);
        let (row_pressed, row_toggle) = rest.split_at_mut(256);
        for key in 0..256 {
            let pressed = down[key] && !prev[key];
            if pressed {
                self.toggled[key] = !self.toggled[key];
            }
            row_down[key] = if down[key] { ON } else { 0 };
            row_pressed[key] = if pressed { ON } else { 0 };
            row_toggle[key] = if self.toggled[key] { ON } else { 0 };
        }
        self.prev = Some(down);
        data
    }

    fn snapshot(&self) -> [bool; 256] {
        match self.keys.as_ref().map(|k| k.lock()) {
            Some(Ok(state)) => state.snapshot(),
            Some(Err(poisoned)) => poisoned.into_inner().snapshot(),
            None => [false; 256],
        }
    }
}

impl<G: Gfx> Atom<G> for KeyboardAtom {
    fn kind(&self) -> &'static str {
        "keyboard"
    }

    fn initialize(
        &mut self,
        ctx: &mut RenderContext<G>,
        cfg: &AtomConfig,
        env: &Environment,
    ) -> GraphResult<()> {
        let target = cfg.require_str("target")?;
        let keys = env.keyboard(target).ok_or_else(|| {
            GraphError::config(format!("keyboard target '{target}' is not registered"))
        })?;
        self.target = target.to_string();
        self.keys = Some(keys);
        self.stage = Some(ctx.create_stage(false));
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
        vec![ValueFormat::Keyboard]
    }

    fn is_ready(&self, _ctx: &RenderContext<G>, _io: &PacketIo) -> bool {
        self.keys.is_some()
    }

    fn recv(&mut self, _ctx: &mut RenderContext<G>, ch: usize, _packet: Packet) -> GraphResult<()> {
        Err(GraphError::format(format!("keyboard has no sink {ch}")))
    }

    fn send(
        &mut self,
        ctx: &mut RenderContext<G>,
        _cfg: &TickConfig,
        _ch: usize,
        _fmt: &ValueFormat,
    ) -> GraphResult<Option<Packet>> {
        let Some(id) = self.stage else {
            return Ok(None);
        };
        let data = self.rows(self.snapshot());
        let image = TexImage::new_2d(KEY_TEXTURE_SIZE, 1, SampleType::U8);
        let (gfx, stage) = ctx.stage_with_gfx(id)?;
        if stage.is_initialized() {
            stage.read_texture(gfx, image, &data)?;
        } else {
            stage.initialize_texture(gfx, image, Some(&data), Filter::Nearest, Wrap::Clamp)?;
        }
        let packet = Packet::stage(ValueFormat::Keyboard, self.seq, id);
        self.seq += 1;
        tracing::trace!(target = %self.target, seq = packet.seq, "key texture updated");
        Ok(Some(packet))
    }

    fn uninitialize(&mut self, ctx: &mut RenderContext<G>) {
        if let Some(id) = self.stage.take() {
            ctx.release_stage(id);
        }
        self.keys = None;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/atoms/keyboard.rs"]
mod tests;
