// ============================================
// Result Reconciler
// ============================================
//
// Maps an engine ranking computed over the rankable subset back onto the
// caller's original action list.
//
// Two coordinate systems are in play:
//   - rankable coordinates: 1-based positions into `Partition::rankable`,
//     which is what the engine returns
//   - original coordinates: `IndexedAction::original_index`
//
// Excluded actions are pinned to their original positions and carry no
// probability. Rankable position i of the original list receives whichever
// rankable action the engine placed at rank i.

use crate::models::{RankableAction, RankedAction};
use crate::services::engine::ActionProbability;
use crate::services::partition::{IndexedAction, Partition};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    #[error("Engine returned {indices} ranked indices but {probabilities} probabilities")]
    LengthMismatch { indices: usize, probabilities: usize },

    #[error("Engine ranked {ranked} actions but {rankable} were rankable")]
    RankableCountMismatch { ranked: usize, rankable: usize },

    #[error("Ranked index {index} is outside 1..={rankable}")]
    IndexOutOfRange { index: usize, rankable: usize },

    #[error("Ranked index {0} appears more than once")]
    DuplicateIndex(usize),

    #[error("Chosen action index {index} is outside an action list of {len}")]
    ChosenIndexOutOfRange { index: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Engine output over the rankable subset.
///
/// `ranked_indices` are 1-based into the rankable subset; the first element is
/// the engine's top pick. `probabilities` is aligned by position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineRanking {
    pub ranked_indices: Vec<usize>,
    pub probabilities: Vec<f32>,
}

impl EngineRanking {
    pub fn new(ranked_indices: Vec<usize>, probabilities: Vec<f32>) -> Self {
        Self {
            ranked_indices,
            probabilities,
        }
    }

    /// Convert the engine's 0-based action probabilities into 1-based ranked indices
    pub fn from_action_probabilities(ranking: &[ActionProbability]) -> Self {
        Self {
            ranked_indices: ranking.iter().map(|ap| ap.action_index + 1).collect(),
            probabilities: ranking.iter().map(|ap| ap.probability).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ranked_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked_indices.is_empty()
    }
}

/// Ranking over the original action list plus the engine's chosen action
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub ranking: Vec<RankedAction>,
    pub chosen_action_id: Option<String>,
}

/// Check the engine response against the rankable subset before any index math
fn validate(ranking: &EngineRanking, rankable: usize) -> Result<()> {
    if ranking.ranked_indices.len() != ranking.probabilities.len() {
        return Err(ReconcileError::LengthMismatch {
            indices: ranking.ranked_indices.len(),
            probabilities: ranking.probabilities.len(),
        });
    }
    if ranking.len() != rankable {
        return Err(ReconcileError::RankableCountMismatch {
            ranked: ranking.len(),
            rankable,
        });
    }

    let mut seen = vec![false; rankable];
    for &index in &ranking.ranked_indices {
        if index == 0 || index > rankable {
            return Err(ReconcileError::IndexOutOfRange { index, rankable });
        }
        if std::mem::replace(&mut seen[index - 1], true) {
            return Err(ReconcileError::DuplicateIndex(index));
        }
    }
    Ok(())
}

/// Rankable coordinates (1-based) to the indexed action
fn resolve<'p, 'a>(rankable: &'p [IndexedAction<'a>], rank_index: usize) -> &'p IndexedAction<'a> {
    &rankable[rank_index - 1]
}

/// Rebuild the full ranking in original coordinates.
///
/// `multi_slot_chosen_index` is 0-based in original coordinates and, when
/// present, overrides the engine's first-ranked action as the chosen one.
pub fn reconcile(
    original: &[RankableAction],
    partition: &Partition<'_>,
    ranking: &EngineRanking,
    multi_slot_chosen_index: Option<usize>,
) -> Result<Reconciled> {
    let rankable = &partition.rankable;
    validate(ranking, rankable.len())?;

    let chosen_index = match multi_slot_chosen_index {
        Some(index) => Some(index),
        None => ranking
            .ranked_indices
            .first()
            .map(|&top| resolve(rankable, top).original_index),
    };
    let chosen_action_id = match chosen_index {
        Some(index) => Some(
            original
                .get(index)
                .ok_or(ReconcileError::ChosenIndexOutOfRange {
                    index,
                    len: original.len(),
                })?
                .id
                .clone(),
        ),
        None => None,
    };

    let final_ranking = if !partition.has_exclusions() {
        ranking
            .ranked_indices
            .iter()
            .zip(&ranking.probabilities)
            .map(|(&rank_index, &probability)| RankedAction {
                id: resolve(rankable, rank_index).id().to_string(),
                probability: Some(probability),
            })
            .collect()
    } else {
        // 1-based pointers into `original`, indexed by original position
        let mut new_ranking = vec![0usize; original.len()];
        let mut probabilities: Vec<Option<f32>> = vec![None; original.len()];

        for (i, target) in rankable.iter().enumerate() {
            let chosen = resolve(rankable, ranking.ranked_indices[i]);
            new_ranking[target.original_index] = chosen.original_index + 1;
            probabilities[target.original_index] = Some(ranking.probabilities[i]);
        }
        for excluded in &partition.excluded {
            new_ranking[excluded.original_index] = excluded.original_index + 1;
        }

        new_ranking
            .iter()
            .zip(probabilities)
            .map(|(&pointer, probability)| RankedAction {
                id: original[pointer - 1].id.clone(),
                probability,
            })
            .collect()
    };

    Ok(Reconciled {
        ranking: final_ranking,
        chosen_action_id,
    })
}
