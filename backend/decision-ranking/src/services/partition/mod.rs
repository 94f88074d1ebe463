// ============================================
// Request Partitioner
// ============================================
//
// Splits the caller's actions into the subset sent to the engine
// (rankable) and the subset withheld from it (excluded).
//
// Every action is tagged with its position in the caller's list before
// any filtering happens. That position is the only coordinate the
// reconciler trusts when mapping engine output back; it is never
// recomputed from a filtered list.

use crate::models::RankableAction;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Duplicate action id: {0}")]
    DuplicateActionId(String),

    #[error("Action at position {0} has an empty id")]
    EmptyActionId(usize),
}

pub type Result<T> = std::result::Result<T, PartitionError>;

/// An action paired with its 0-based position in the caller's list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedAction<'a> {
    pub original_index: usize,
    pub action: &'a RankableAction,
}

impl<'a> IndexedAction<'a> {
    pub fn id(&self) -> &'a str {
        &self.action.id
    }
}

/// Rankable/excluded split of one request. Both sides keep original order.
#[derive(Debug, Clone, Default)]
pub struct Partition<'a> {
    pub rankable: Vec<IndexedAction<'a>>,
    pub excluded: Vec<IndexedAction<'a>>,
}

impl<'a> Partition<'a> {
    pub fn has_exclusions(&self) -> bool {
        !self.excluded.is_empty()
    }

    /// Total number of actions across both sides
    pub fn len(&self) -> usize {
        self.rankable.len() + self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rankable_actions(&self) -> impl Iterator<Item = &'a RankableAction> + '_ {
        self.rankable.iter().map(|indexed| indexed.action)
    }
}

/// Reject action lists the reconciler cannot disambiguate.
///
/// Exclusion and result lookup are id-based, so ids must be non-empty and unique.
pub fn validate_actions(actions: &[RankableAction]) -> Result<()> {
    let mut seen = HashSet::with_capacity(actions.len());
    for (position, action) in actions.iter().enumerate() {
        if action.id.is_empty() {
            return Err(PartitionError::EmptyActionId(position));
        }
        if !seen.insert(action.id.as_str()) {
            return Err(PartitionError::DuplicateActionId(action.id.clone()));
        }
    }
    Ok(())
}

/// Split `actions` in a single left-to-right pass.
///
/// Ids in `excluded_ids` that match no action are ignored.
pub fn partition<'a, S>(actions: &'a [RankableAction], excluded_ids: &[S]) -> Partition<'a>
where
    S: AsRef<str>,
{
    let excluded_set: HashSet<&str> = excluded_ids.iter().map(AsRef::as_ref).collect();

    let mut result = Partition {
        rankable: Vec::with_capacity(actions.len()),
        excluded: Vec::new(),
    };

    for (original_index, action) in actions.iter().enumerate() {
        let indexed = IndexedAction {
            original_index,
            action,
        };
        if excluded_set.contains(action.id.as_str()) {
            result.excluded.push(indexed);
        } else {
            result.rankable.push(indexed);
        }
    }

    result
}
