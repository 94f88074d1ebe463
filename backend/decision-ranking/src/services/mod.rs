pub mod context;
pub mod engine;
pub mod event_id;
pub mod partition;
pub mod rank;
pub mod reconcile;

pub use engine::{ActionProbability, EngineError, RankingEngine, SlotDecision};
pub use event_id::{EventIdGenerator, UuidEventIdGenerator};
pub use rank::{RankError, RankProcessor};
pub use reconcile::{EngineRanking, ReconcileError};
