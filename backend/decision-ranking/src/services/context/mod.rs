// ============================================
// Decision Context serializer
// ============================================
//
// Builds the JSON document handed to the ranking engine:
//
//   {
//     "FromUrl": [<shared context features>],
//     "_multi":  [{"id": ..., "features": [...]}, ...],
//     "_slots":  [{"id": ..., "features": [...], "baselineActionId": ..., "excludedActionIds": [...]}]
//   }
//
// Feature payloads are embedded as raw JSON, byte for byte.

use crate::models::{FeaturePayload, RankableAction, SlotOptions};
use crate::services::partition::Partition;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DecisionContext<'a> {
    #[serde(rename = "FromUrl", skip_serializing_if = "is_empty")]
    shared: &'a [FeaturePayload],

    #[serde(rename = "_multi")]
    documents: Vec<ActionDocument<'a>>,

    #[serde(rename = "_slots", skip_serializing_if = "Option::is_none")]
    slots: Option<Vec<SlotDocument<'a>>>,
}

#[derive(Debug, Serialize)]
struct ActionDocument<'a> {
    id: &'a str,
    features: &'a [FeaturePayload],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SlotDocument<'a> {
    id: &'a str,
    features: &'a [FeaturePayload],
    baseline_action_id: &'a str,
    excluded_action_ids: &'a [String],
}

fn is_empty(features: &&[FeaturePayload]) -> bool {
    features.is_empty()
}

impl<'a> From<&'a RankableAction> for ActionDocument<'a> {
    fn from(action: &'a RankableAction) -> Self {
        Self {
            id: &action.id,
            features: &action.features,
        }
    }
}

impl<'a> DecisionContext<'a> {
    /// Context for a single-slot request; only rankable actions are sent
    pub fn single_slot(shared: &'a [FeaturePayload], partition: &Partition<'a>) -> Self {
        Self {
            shared,
            documents: partition.rankable_actions().map(ActionDocument::from).collect(),
            slots: None,
        }
    }

    /// Context for a multi-slot request; every action is sent and each slot
    /// carries its own exclusions
    pub fn multi_slot(
        shared: &'a [FeaturePayload],
        actions: &'a [RankableAction],
        slots: &'a [SlotOptions],
    ) -> Self {
        Self {
            shared,
            documents: actions.iter().map(ActionDocument::from).collect(),
            slots: Some(
                slots
                    .iter()
                    .map(|slot| SlotDocument {
                        id: &slot.id,
                        features: &slot.features,
                        baseline_action_id: &slot.baseline_action_id,
                        excluded_action_ids: &slot.excluded_action_ids,
                    })
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
