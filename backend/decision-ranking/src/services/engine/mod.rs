// ============================================
// Ranking Engine seam
// ============================================
//
// The reinforcement-learning engine is opaque to this crate. It may be an
// embedded model or a remote service; either way it receives a serialized
// decision context and returns action probabilities over the actions it
// was shown.

use crate::models::ActionFlags;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine rejected request: {0}")]
    Rejected(String),

    #[error("Engine internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// One ranked entry from the engine.
///
/// `action_index` is 0-based into the list of actions the engine was shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionProbability {
    pub action_index: usize,
    pub probability: f32,
}

impl ActionProbability {
    pub fn new(action_index: usize, probability: f32) -> Self {
        Self {
            action_index,
            probability,
        }
    }
}

/// Engine output for one slot of a multi-slot decision
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDecision {
    pub slot_id: String,
    /// 0-based index into the full action list
    pub chosen_action_index: usize,
    /// 0-based indices into the slot's rankable actions
    pub ranking: Vec<ActionProbability>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RankingEngine: Send + Sync {
    /// Rank the actions in `context_json`; the first entry is the chosen action
    async fn choose_rank(
        &self,
        event_id: &str,
        context_json: &str,
        flags: ActionFlags,
    ) -> Result<Vec<ActionProbability>>;

    /// Rank every slot in `context_json` in one call
    async fn choose_multi_slot(
        &self,
        event_id: &str,
        context_json: &str,
        flags: ActionFlags,
    ) -> Result<Vec<SlotDecision>>;

    /// Activate an event that was ranked with [`ActionFlags::Deferred`]
    async fn activate(&self, event_id: &str) -> Result<()>;

    /// Report the observed outcome of a single-slot event
    async fn report_outcome(&self, event_id: &str, outcome: f32) -> Result<()>;

    /// Report the observed outcome of one slot of a multi-slot event
    async fn report_slot_outcome(&self, event_id: &str, slot_id: &str, outcome: f32)
        -> Result<()>;
}
