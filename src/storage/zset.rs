//! Sorted Set Structure
//!
//! A sorted set pairs each member with an IEEE-754 double score and keeps
//! members ordered by (score ascending, member bytes ascending). Two
//! structures back it: a member->score map for O(1) lookup and update, and
//! an ordered index keyed by (score, member) for rank and range queries.
//!
//! NaN scores never enter the structure; they are rejected when the command
//! argument is parsed. `f64::total_cmp` then gives the index a total order.

use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};

/// An f64 score with the total ordering the index requires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score(pub f64);

impl Eq for Score {}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A set of (member, score) pairs with deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: HashMap<Bytes, f64>,
    index: BTreeSet<(Score, Bytes)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a member or updates its score.
    ///
    /// Returns `true` when the member was newly inserted, `false` when an
    /// existing member had its score replaced.
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                self.index.remove(&(Score(old), member.clone()));
                self.index.insert((Score(score), member));
                false
            }
            None => {
                self.index.insert((Score(score), member));
                true
            }
        }
    }

    /// Removes a member. Returns `true` when it was present.
    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.index
                    .remove(&(Score(score), Bytes::copy_from_slice(member)));
                true
            }
            None => false,
        }
    }

    /// The score of a member, if present.
    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// The 0-based rank of a member under (score asc, member asc).
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        // Members are unique in the index, so the position of the member is
        // its rank.
        self.scores.get(member)?;
        self.index.iter().position(|(_, m)| m.as_ref() == member)
    }

    /// Members with scores for ranks `start..=stop` (inclusive, in-bounds).
    pub fn range(&self, start: usize, stop: usize) -> Vec<(Bytes, f64)> {
        self.index
            .iter()
            .skip(start)
            .take(stop - start + 1)
            .map(|(score, member)| (member.clone(), score.0))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Renders a score for the wire.
///
/// Integral finite scores keep a trailing `.0` (`2` renders as `"2.0"`);
/// everything else uses the shortest representation that round-trips.
pub fn format_score(score: f64) -> String {
    if score.is_finite() && score == score.trunc() {
        format!("{:.1}", score)
    } else {
        format!("{}", score)
    }
}
