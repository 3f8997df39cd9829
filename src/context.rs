use crate::foundation::error::{GraphError, GraphResult};
use crate::gfx::Gfx;
use crate::gfx::slab::Slab;
use crate::stage::{BufferStage, StageId};

/// Backend value plus the arena of stages created by atoms.
///
/// Every HAL call goes through `gfx`; there is no ambient device state. A context is used from
/// one thread at a time, independent pipelines own independent contexts.
pub struct RenderContext<G: Gfx> {
    pub gfx: G,
    stages: Slab<BufferStage<G>>,
}

impl<G: Gfx> RenderContext<G> {
    pub fn new(gfx: G) -> Self {
        Self {
            gfx,
            stages: Slab::new(),
        }
    }

    pub fn create_stage(&mut self, stereo: bool) -> StageId {
        let stage = if stereo {
            BufferStage::stereo()
        } else {
            BufferStage::mono()
        };
        StageId(self.stages.insert(stage))
    }

    pub fn stage(&self, id: StageId) -> GraphResult<&BufferStage<G>> {
        self.stages
            .get(id.0)
            .ok_or_else(|| GraphError::stage(format!("unknown {id}")))
    }

    pub fn stage_mut(&mut self, id: StageId) -> GraphResult<&mut BufferStage<G>> {
        self.stages
            .get_mut(id.0)
            .ok_or_else(|| GraphError::stage(format!("unknown {id}")))
    }

    /// Split borrow of the backend and one stage.
    pub fn stage_with_gfx(&mut self, id: StageId) -> GraphResult<(&mut G, &mut BufferStage<G>)> {
        let stage = self
            .stages
            .get_mut(id.0)
            .ok_or_else(|| GraphError::stage(format!("unknown {id}")))?;
        Ok((&mut self.gfx, stage))
    }

    /// Whether `id` names an initialized stage.
    pub fn stage_ready(&self, id: StageId) -> bool {
        self.stages.get(id.0).is_some_and(BufferStage::is_initialized)
    }

    /// Release a stage's backend resources and free its id.
    pub fn release_stage(&mut self, id: StageId) {
        if let Some(mut stage) = self.stages.remove(id.0) {
            stage.release(&mut self.gfx);
        }
    }

    pub fn live_stages(&self) -> usize {
        self.stages.live()
    }

    pub fn into_gfx(mut self) -> G {
        let ids: Vec<u32> = (0..self.stages.capacity() as u32).collect();
        for id in ids {
            self.release_stage(StageId(id));
        }
        self.gfx
    }
}

#[cfg(test)]
#[path = "../tests/unit/context.rs"]
mod tests;
