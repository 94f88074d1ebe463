//! Rank Processor
//!
//! Client-side front end to the ranking engine.
//!
//! # Workflow
//! 1. Validate actions (unique, non-empty ids) and assign an event id
//! 2. Partition actions into rankable and excluded
//! 3. Serialize the decision context
//! 4. Call the engine, bounded by the configured timeout
//! 5. Reconcile the engine ranking back onto the caller's action order
//!
//! Each call is independent; nothing is shared between calls apart from the
//! injected engine and id generator. Engine failures are returned as-is and
//! never retried here.

use crate::config::RankConfig;
use crate::models::{
    ActionFlags, MultiSlotRankOptions, MultiSlotRankResult, RankOptions, RankResult, SlotOptions,
    SlotResult,
};
use crate::services::context::DecisionContext;
use crate::services::engine::{EngineError, RankingEngine, SlotDecision};
use crate::services::event_id::EventIdGenerator;
use crate::services::partition::{self, PartitionError};
use crate::services::reconcile::{self, EngineRanking, ReconcileError};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum RankError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Context serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Engine call timed out after {0:?}")]
    EngineTimeout(Duration),

    #[error("Malformed engine response: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Engine returned no decision for slot {0}")]
    MissingSlotDecision(String),

    #[error("Engine returned more than one decision for slot {0}")]
    DuplicateSlotDecision(String),

    #[error("Engine chose action {action_id} for slot {slot_id}, which excludes it")]
    ExcludedSlotChoice { slot_id: String, action_id: String },
}

impl From<PartitionError> for RankError {
    fn from(err: PartitionError) -> Self {
        RankError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RankError>;

pub struct RankProcessor {
    engine: Arc<dyn RankingEngine>,
    event_ids: Arc<dyn EventIdGenerator>,
    config: RankConfig,
}

impl RankProcessor {
    pub fn new(
        engine: Arc<dyn RankingEngine>,
        event_ids: Arc<dyn EventIdGenerator>,
        config: RankConfig,
    ) -> Self {
        Self {
            engine,
            event_ids,
            config,
        }
    }

    /// Rank `options.actions`, keeping excluded actions at their original positions
    #[instrument(
        skip(self, options),
        fields(
            service = %self.config.service_name,
            event_id = tracing::field::Empty,
            actions = options.actions.len()
        )
    )]
    pub async fn rank(&self, options: RankOptions) -> Result<RankResult> {
        partition::validate_actions(&options.actions)?;

        let event_id = self.resolve_event_id(options.event_id.as_deref());
        tracing::Span::current().record("event_id", event_id.as_str());

        let split = partition::partition(&options.actions, &options.excluded_action_ids);
        debug!(
            rankable = split.rankable.len(),
            excluded = split.excluded.len(),
            "Partitioned actions"
        );

        let context_json =
            DecisionContext::single_slot(&options.context_features, &split).to_json()?;
        let flags = self.flags(options.defer_activation);

        let response = self
            .call_engine(self.engine.choose_rank(&event_id, &context_json, flags))
            .await?;

        let ranking = EngineRanking::from_action_probabilities(&response);
        let reconciled = reconcile::reconcile(&options.actions, &split, &ranking, None)
            .map_err(|e| {
                warn!(error = %e, "Engine returned a malformed ranking");
                e
            })?;

        match &reconciled.chosen_action_id {
            Some(chosen) => info!(chosen = %chosen, ?flags, "Ranked actions"),
            None => info!(?flags, "Ranked request with no rankable actions"),
        }

        Ok(RankResult {
            event_id,
            ranking: reconciled.ranking,
            reward_action_id: reconciled.chosen_action_id,
        })
    }

    /// Rank every slot in one engine call, reconciling each slot against its own exclusions
    #[instrument(
        skip(self, options),
        fields(
            service = %self.config.service_name,
            event_id = tracing::field::Empty,
            actions = options.actions.len(),
            slots = options.slots.len()
        )
    )]
    pub async fn rank_multi_slot(
        &self,
        options: MultiSlotRankOptions,
    ) -> Result<MultiSlotRankResult> {
        partition::validate_actions(&options.actions)?;
        validate_slots(&options)?;

        let event_id = self.resolve_event_id(options.event_id.as_deref());
        tracing::Span::current().record("event_id", event_id.as_str());

        let context_json = DecisionContext::multi_slot(
            &options.context_features,
            &options.actions,
            &options.slots,
        )
        .to_json()?;
        let flags = self.flags(options.defer_activation);

        let response = self
            .call_engine(self.engine.choose_multi_slot(&event_id, &context_json, flags))
            .await?;
        let mut decisions: HashMap<String, SlotDecision> = HashMap::with_capacity(response.len());
        for decision in response {
            let slot_id = decision.slot_id.clone();
            if decisions.insert(slot_id.clone(), decision).is_some() {
                warn!(slot_id = %slot_id, "Engine returned duplicate slot decisions");
                return Err(RankError::DuplicateSlotDecision(slot_id));
            }
        }

        let mut slots = Vec::with_capacity(options.slots.len());
        for slot in &options.slots {
            let decision = decisions
                .remove(&slot.id)
                .ok_or_else(|| RankError::MissingSlotDecision(slot.id.clone()))?;

            let split = partition::partition(&options.actions, &slot.excluded_action_ids);
            if let Some(excluded) = split
                .excluded
                .iter()
                .find(|e| e.original_index == decision.chosen_action_index)
            {
                warn!(
                    slot_id = %slot.id,
                    action_id = %excluded.id(),
                    "Engine chose an excluded action"
                );
                return Err(RankError::ExcludedSlotChoice {
                    slot_id: slot.id.clone(),
                    action_id: excluded.id().to_string(),
                });
            }
            let ranking = EngineRanking::from_action_probabilities(&decision.ranking);
            let reconciled = reconcile::reconcile(
                &options.actions,
                &split,
                &ranking,
                Some(decision.chosen_action_index),
            )
            .map_err(|e| {
                warn!(slot_id = %slot.id, error = %e, "Engine returned a malformed slot ranking");
                e
            })?;

            debug!(
                slot_id = %slot.id,
                chosen = ?reconciled.chosen_action_id,
                "Reconciled slot"
            );

            slots.push(SlotResult {
                slot_id: slot.id.clone(),
                reward_action_id: reconciled.chosen_action_id,
                ranking: reconciled.ranking,
            });
        }

        if !decisions.is_empty() {
            warn!(
                unknown_slots = ?decisions.keys().collect::<Vec<_>>(),
                "Engine returned decisions for unknown slots"
            );
        }

        info!(slots = slots.len(), ?flags, "Ranked multi-slot request");

        Ok(MultiSlotRankResult { event_id, slots })
    }

    /// Activate an event that was ranked with deferred activation
    #[instrument(skip(self))]
    pub async fn activate(&self, event_id: &str) -> Result<()> {
        require_event_id(event_id)?;
        self.call_engine(self.engine.activate(event_id)).await?;
        debug!("Activated event");
        Ok(())
    }

    /// Report the outcome of a single-slot event
    #[instrument(skip(self))]
    pub async fn reward(&self, event_id: &str, value: f32) -> Result<()> {
        validate_reward(event_id, value)?;
        self.call_engine(self.engine.report_outcome(event_id, value)).await
    }

    /// Report the outcome of one slot of a multi-slot event
    #[instrument(skip(self))]
    pub async fn reward_slot(&self, event_id: &str, slot_id: &str, value: f32) -> Result<()> {
        if slot_id.is_empty() {
            return Err(RankError::InvalidInput("slot id must not be empty".to_string()));
        }
        validate_reward(event_id, value)?;
        self.call_engine(self.engine.report_slot_outcome(event_id, slot_id, value)).await
    }

    fn resolve_event_id(&self, requested: Option<&str>) -> String {
        match requested {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.event_ids.generate(),
        }
    }

    fn flags(&self, defer_activation: Option<bool>) -> ActionFlags {
        ActionFlags::from_defer(defer_activation.unwrap_or(self.config.defer_activation))
    }

    /// Await an engine future under the configured timeout
    async fn call_engine<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, EngineError>>,
    {
        let timeout = self.config.engine_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(error = %e, "Engine call failed");
                Err(e.into())
            }
            Err(_) => {
                warn!(?timeout, "Engine call timed out");
                Err(RankError::EngineTimeout(timeout))
            }
        }
    }
}

fn require_event_id(event_id: &str) -> Result<()> {
    if event_id.is_empty() {
        return Err(RankError::InvalidInput("event id must not be empty".to_string()));
    }
    Ok(())
}

fn validate_reward(event_id: &str, value: f32) -> Result<()> {
    require_event_id(event_id)?;
    if !value.is_finite() {
        return Err(RankError::InvalidInput(format!(
            "reward must be a finite number, got {value}"
        )));
    }
    Ok(())
}

fn validate_slots(options: &MultiSlotRankOptions) -> Result<()> {
    let action_ids: HashSet<&str> = options.actions.iter().map(|a| a.id.as_str()).collect();
    let mut seen = HashSet::with_capacity(options.slots.len());

    for SlotOptions {
        id,
        baseline_action_id,
        ..
    } in &options.slots
    {
        if id.is_empty() {
            return Err(RankError::InvalidInput("slot id must not be empty".to_string()));
        }
        if !seen.insert(id.as_str()) {
            return Err(RankError::InvalidInput(format!("duplicate slot id: {id}")));
        }
        if !action_ids.contains(baseline_action_id.as_str()) {
            return Err(RankError::InvalidInput(format!(
                "slot {id} has unknown baseline action {baseline_action_id}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeaturePayload, RankableAction};
    use crate::services::engine::{ActionProbability, MockRankingEngine};
    use crate::services::event_id::UuidEventIdGenerator;
    use tokio_test::{assert_err, assert_ok};

    struct FixedEventId;

    impl EventIdGenerator for FixedEventId {
        fn generate(&self) -> String {
            "generated-event".to_string()
        }
    }

    fn actions(ids: &[&str]) -> Vec<RankableAction> {
        ids.iter()
            .map(|id| {
                RankableAction::new(
                    *id,
                    vec![FeaturePayload::serialize(&serde_json::json!({ "name": id })).unwrap()],
                )
            })
            .collect()
    }

    fn processor(engine: MockRankingEngine) -> RankProcessor {
        RankProcessor::new(
            Arc::new(engine),
            Arc::new(FixedEventId),
            RankConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_rank_generates_event_id_and_sends_rankable_only() {
        let mut engine = MockRankingEngine::new();
        engine
            .expect_choose_rank()
            .withf(|event_id, context_json, flags| {
                event_id == "generated-event"
                    && context_json.contains(r#""id":"A""#)
                    && !context_json.contains(r#""id":"B""#)
                    && *flags == ActionFlags::Default
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![
                    ActionProbability::new(1, 0.7),
                    ActionProbability::new(0, 0.3),
                ])
            });

        let result = processor(engine)
            .rank(RankOptions::new(actions(&["A", "B", "C"])).with_excluded_actions(["B"]))
            .await
            .unwrap();

        assert_eq!(result.event_id, "generated-event");
        assert_eq!(result.reward_action_id.as_deref(), Some("C"));
        let ids: Vec<_> = result.ranking.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B", "A"]);
        assert_eq!(result.ranking[1].probability, None);
    }

    #[tokio::test]
    async fn test_rank_keeps_caller_event_id_and_defers() {
        let mut engine = MockRankingEngine::new();
        engine
            .expect_choose_rank()
            .withf(|event_id, _, flags| event_id == "evt-1" && *flags == ActionFlags::Deferred)
            .returning(|_, _, _| Ok(vec![ActionProbability::new(0, 1.0)]));

        let result = processor(engine)
            .rank(
                RankOptions::new(actions(&["A"]))
                    .with_event_id("evt-1")
                    .with_defer_activation(true),
            )
            .await
            .unwrap();

        assert_eq!(result.event_id, "evt-1");
    }

    #[tokio::test]
    async fn test_configured_defer_default_applies() {
        let mut engine = MockRankingEngine::new();
        engine
            .expect_choose_rank()
            .withf(|_, _, flags| *flags == ActionFlags::Deferred)
            .returning(|_, _, _| Ok(vec![ActionProbability::new(0, 1.0)]));

        let processor = RankProcessor::new(
            Arc::new(engine),
            Arc::new(UuidEventIdGenerator),
            RankConfig::default().with_defer_activation(true),
        );

        assert_ok!(processor.rank(RankOptions::new(actions(&["A"]))).await);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected_before_engine_call() {
        let mut engine = MockRankingEngine::new();
        engine.expect_choose_rank().never();

        let err = processor(engine)
            .rank(RankOptions::new(actions(&["A", "A"])))
            .await
            .unwrap_err();

        assert!(matches!(err, RankError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_engine_error_propagates_unchanged() {
        let mut engine = MockRankingEngine::new();
        engine
            .expect_choose_rank()
            .times(1)
            .returning(|_, _, _| Err(EngineError::Unavailable("model not loaded".to_string())));

        let err = processor(engine)
            .rank(RankOptions::new(actions(&["A", "B"])))
            .await
            .unwrap_err();

        match err {
            RankError::Engine(inner) => {
                assert_eq!(inner, EngineError::Unavailable("model not loaded".to_string()))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_engine_response_fails_loudly() {
        let mut engine = MockRankingEngine::new();
        engine
            .expect_choose_rank()
            .returning(|_, _, _| Ok(vec![ActionProbability::new(0, 1.0)]));

        let err = processor(engine)
            .rank(RankOptions::new(actions(&["A", "B"])))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RankError::Reconcile(ReconcileError::RankableCountMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_all_excluded_still_calls_engine() {
        let mut engine = MockRankingEngine::new();
        engine
            .expect_choose_rank()
            .withf(|_, context_json, _| context_json.contains(r#""_multi":[]"#))
            .times(1)
            .returning(|_, _, _| Ok(vec![]));

        let result = processor(engine)
            .rank(RankOptions::new(actions(&["A", "B"])).with_excluded_actions(["A", "B"]))
            .await
            .unwrap();

        assert_eq!(result.reward_action_id, None);
        assert!(result.ranking.iter().all(|r| r.probability.is_none()));
        assert_eq!(result.ranking.len(), 2);
    }

    #[tokio::test]
    async fn test_rank_multi_slot_uses_slot_chosen_index() {
        let mut engine = MockRankingEngine::new();
        engine
            .expect_choose_multi_slot()
            .withf(|_, context_json, _| context_json.contains("_slots"))
            .returning(|_, _, _| {
                Ok(vec![
                    SlotDecision {
                        slot_id: "side".to_string(),
                        chosen_action_index: 1,
                        ranking: vec![
                            ActionProbability::new(1, 0.8),
                            ActionProbability::new(0, 0.2),
                        ],
                    },
                    SlotDecision {
                        slot_id: "main".to_string(),
                        chosen_action_index: 0,
                        ranking: vec![ActionProbability::new(0, 1.0)],
                    },
                ])
            });

        let options = MultiSlotRankOptions::new(
            actions(&["News", "Sports", "Ent"]),
            vec![
                SlotOptions::new("main", "News", vec![], vec!["Sports".into(), "Ent".into()]),
                SlotOptions::new("side", "Sports", vec![], vec!["Ent".into()]),
            ],
        );

        let result = processor(engine).rank_multi_slot(options).await.unwrap();

        assert_eq!(result.slots.len(), 2);
        assert_eq!(result.slots[0].slot_id, "main");
        assert_eq!(result.slots[0].reward_action_id.as_deref(), Some("News"));
        assert_eq!(result.slots[1].slot_id, "side");
        assert_eq!(result.slots[1].reward_action_id.as_deref(), Some("Sports"));
        let side: Vec<_> = result.slots[1].ranking.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(side, vec!["Sports", "News", "Ent"]);
    }

    #[tokio::test]
    async fn test_rank_multi_slot_missing_decision() {
        let mut engine = MockRankingEngine::new();
        engine
            .expect_choose_multi_slot()
            .returning(|_, _, _| Ok(vec![]));

        let options = MultiSlotRankOptions::new(
            actions(&["News"]),
            vec![SlotOptions::new("main", "News", vec![], vec![])],
        );

        let err = processor(engine).rank_multi_slot(options).await.unwrap_err();
        assert!(matches!(err, RankError::MissingSlotDecision(slot) if slot == "main"));
    }

    #[tokio::test]
    async fn test_rank_multi_slot_rejects_unknown_baseline() {
        let mut engine = MockRankingEngine::new();
        engine.expect_choose_multi_slot().never();

        let options = MultiSlotRankOptions::new(
            actions(&["News"]),
            vec![SlotOptions::new("main", "Weather", vec![], vec![])],
        );

        assert_err!(processor(engine).rank_multi_slot(options).await);
    }

    #[tokio::test]
    async fn test_rank_multi_slot_rejects_duplicate_slots() {
        let mut engine = MockRankingEngine::new();
        engine.expect_choose_multi_slot().never();

        let options = MultiSlotRankOptions::new(
            actions(&["News"]),
            vec![
                SlotOptions::new("main", "News", vec![], vec![]),
                SlotOptions::new("main", "News", vec![], vec![]),
            ],
        );

        let err = processor(engine).rank_multi_slot(options).await.unwrap_err();
        assert!(matches!(err, RankError::InvalidInput(msg) if msg.contains("duplicate slot")));
    }

    #[tokio::test]
    async fn test_reward_and_activate_pass_through() {
        let mut engine = MockRankingEngine::new();
        engine
            .expect_report_slot_outcome()
            .withf(|event_id, slot_id, outcome| {
                event_id == "evt" && slot_id == "main" && (*outcome - 0.8).abs() < f32::EPSILON
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        engine
            .expect_activate()
            .withf(|event_id| event_id == "evt")
            .times(1)
            .returning(|_| Ok(()));

        let processor = processor(engine);
        assert_ok!(processor.reward_slot("evt", "main", 0.8).await);
        assert_ok!(processor.activate("evt").await);
    }

    #[tokio::test]
    async fn test_reward_rejects_non_finite_values() {
        let mut engine = MockRankingEngine::new();
        engine.expect_report_outcome().never();
        engine.expect_report_slot_outcome().never();

        let processor = processor(engine);
        assert_err!(processor.reward("evt", f32::NAN).await);
        assert_err!(processor.reward_slot("evt", "main", f32::INFINITY).await);
        assert_err!(processor.reward("", 1.0).await);
    }
}
