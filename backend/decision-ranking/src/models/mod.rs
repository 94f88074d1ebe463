use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;

/// Already-serialized JSON feature fragment.
///
/// Feature payloads are forwarded verbatim into the engine context; this crate
/// only checks that they are syntactically valid JSON.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeaturePayload(Box<RawValue>);

impl FeaturePayload {
    /// Wrap a JSON document without re-encoding it
    pub fn from_json(json: impl Into<String>) -> serde_json::Result<Self> {
        RawValue::from_string(json.into()).map(Self)
    }

    /// Serialize any value into a payload
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        serde_json::value::to_raw_value(value).map(Self)
    }

    pub fn as_json(&self) -> &str {
        self.0.get()
    }
}

impl fmt::Debug for FeaturePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_json())
    }
}

impl PartialEq for FeaturePayload {
    fn eq(&self, other: &Self) -> bool {
        self.as_json() == other.as_json()
    }
}

/// An action offered by the caller for ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankableAction {
    pub id: String,
    #[serde(default)]
    pub features: Vec<FeaturePayload>,
}

impl RankableAction {
    pub fn new(id: impl Into<String>, features: Vec<FeaturePayload>) -> Self {
        Self {
            id: id.into(),
            features,
        }
    }
}

/// A placement within a multi-slot decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotOptions {
    pub id: String,
    #[serde(default)]
    pub features: Vec<FeaturePayload>,
    #[serde(default)]
    pub excluded_action_ids: Vec<String>,
    pub baseline_action_id: String,
}

impl SlotOptions {
    pub fn new(
        id: impl Into<String>,
        baseline_action_id: impl Into<String>,
        features: Vec<FeaturePayload>,
        excluded_action_ids: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            features,
            excluded_action_ids,
            baseline_action_id: baseline_action_id.into(),
        }
    }
}

/// Single-slot rank request
#[derive(Debug, Clone, Default)]
pub struct RankOptions {
    pub context_features: Vec<FeaturePayload>,
    pub actions: Vec<RankableAction>,
    pub excluded_action_ids: Vec<String>,
    /// Generated when absent or empty
    pub event_id: Option<String>,
    /// Falls back to the configured default when unset
    pub defer_activation: Option<bool>,
}

impl RankOptions {
    pub fn new(actions: Vec<RankableAction>) -> Self {
        Self {
            actions,
            ..Default::default()
        }
    }

    pub fn with_context_features(mut self, features: Vec<FeaturePayload>) -> Self {
        self.context_features = features;
        self
    }

    pub fn with_excluded_actions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_action_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_defer_activation(mut self, defer: bool) -> Self {
        self.defer_activation = Some(defer);
        self
    }
}

/// Multi-slot rank request
#[derive(Debug, Clone, Default)]
pub struct MultiSlotRankOptions {
    pub context_features: Vec<FeaturePayload>,
    pub actions: Vec<RankableAction>,
    pub slots: Vec<SlotOptions>,
    pub event_id: Option<String>,
    pub defer_activation: Option<bool>,
}

impl MultiSlotRankOptions {
    pub fn new(actions: Vec<RankableAction>, slots: Vec<SlotOptions>) -> Self {
        Self {
            actions,
            slots,
            ..Default::default()
        }
    }

    pub fn with_context_features(mut self, features: Vec<FeaturePayload>) -> Self {
        self.context_features = features;
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_defer_activation(mut self, defer: bool) -> Self {
        self.defer_activation = Some(defer);
        self
    }
}

/// Activation behaviour requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionFlags {
    #[default]
    Default,
    /// Event is logged but not learned from until activated
    Deferred,
}

impl ActionFlags {
    pub fn from_defer(defer: bool) -> Self {
        if defer {
            ActionFlags::Deferred
        } else {
            ActionFlags::Default
        }
    }
}

/// One entry of the final ranking, in original-list coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedAction {
    pub id: String,
    /// `None` for excluded actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankResult {
    pub event_id: String,
    pub ranking: Vec<RankedAction>,
    /// Engine's chosen action; `None` when nothing was rankable
    pub reward_action_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotResult {
    pub slot_id: String,
    pub reward_action_id: Option<String>,
    pub ranking: Vec<RankedAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSlotRankResult {
    pub event_id: String,
    pub slots: Vec<SlotResult>,
}
