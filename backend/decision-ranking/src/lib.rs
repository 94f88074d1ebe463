pub mod config;
pub mod models;
pub mod services;
pub mod telemetry;

pub use config::RankConfig;
pub use models::{
    ActionFlags, FeaturePayload, MultiSlotRankOptions, MultiSlotRankResult, RankOptions,
    RankResult, RankableAction, RankedAction, SlotOptions, SlotResult,
};
pub use services::{
    ActionProbability, EngineError, EngineRanking, EventIdGenerator, RankError, RankProcessor,
    RankingEngine, ReconcileError, SlotDecision, UuidEventIdGenerator,
};
