//! Consensus scoring over ranked predictions
//!
//! The prediction service returns one ranked list of candidate identities per
//! feature sample. Each list votes with fixed rank weights: 3 points for the
//! first candidate, 2 for the second, 1 for the third and nothing beyond.
//! The weights are not configurable.
//!
//! Ties on the highest score go to the label seen first across all lists
//! (list order, then rank order). Labels are registered on first sight even
//! when they earn no points, so first-seen order is about appearance, not
//! about scoring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Points awarded for ranks 0, 1 and 2
pub const RANK_WEIGHTS: [u32; 3] = [3, 2, 1];

/// Accumulated score of one label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: u32,
}

/// Label scores in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsensusScores {
    scores: Vec<LabelScore>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ConsensusScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score every ranked list in order
    pub fn from_predictions<R, S>(predictions: &[R]) -> Self
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut scores = Self::new();
        for ranking in predictions {
            scores.add_ranking(ranking.as_ref());
        }
        scores
    }

    /// Add one ranked list (most likely first)
    pub fn add_ranking<S: AsRef<str>>(&mut self, ranking: &[S]) {
        for (rank, label) in ranking.iter().enumerate() {
            let points = RANK_WEIGHTS.get(rank).copied().unwrap_or(0);
            self.add(label.as_ref(), points);
        }
    }

    fn add(&mut self, label: &str, points: u32) {
        match self.index.get(label) {
            Some(&idx) => self.scores[idx].score += points,
            None => {
                self.index.insert(label.to_string(), self.scores.len());
                self.scores.push(LabelScore {
                    label: label.to_string(),
                    score: points,
                });
            }
        }
    }

    pub fn score(&self, label: &str) -> Option<u32> {
        self.index.get(label).map(|&idx| self.scores[idx].score)
    }

    /// Scores in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &LabelScore> {
        self.scores.iter()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Highest-scoring label; ties go to the first-seen label
    pub fn winner(&self) -> Option<&LabelScore> {
        let mut best: Option<&LabelScore> = None;
        for entry in &self.scores {
            match best {
                Some(current) if entry.score <= current.score => {}
                _ => best = Some(entry),
            }
        }
        best
    }
}

/// Reduce ranked prediction lists to a single consensus label.
///
/// Returns `None` when there are no lists or every list is empty.
pub fn calculate_highest_score<R, S>(predictions: &[R]) -> Option<String>
where
    R: AsRef<[S]>,
    S: AsRef<str>,
{
    ConsensusScores::from_predictions(predictions)
        .winner()
        .map(|winner| winner.label.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tie_goes_to_first_seen_label() {
        let predictions = vec![vec!["a", "b", "c"], vec!["b", "a", "c"]];
        let scores = ConsensusScores::from_predictions(&predictions);

        assert_eq!(scores.score("a"), Some(5));
        assert_eq!(scores.score("b"), Some(5));
        assert_eq!(scores.score("c"), Some(2));
        assert_eq!(calculate_highest_score(&predictions), Some("a".to_string()));
    }

    #[test]
    fn test_empty_input() {
        let none: Vec<Vec<String>> = Vec::new();
        assert_eq!(calculate_highest_score(&none), None);

        let all_empty: Vec<Vec<String>> = vec![Vec::new(), Vec::new()];
        assert_eq!(calculate_highest_score(&all_empty), None);
    }

    #[test]
    fn test_clear_winner() {
        let predictions = vec![
            vec!["alice", "bob", "carol"],
            vec!["bob", "alice", "carol"],
            vec!["bob", "carol", "alice"],
        ];
        // alice 3+2+1, bob 2+3+3, carol 1+1+2
        assert_eq!(calculate_highest_score(&predictions), Some("bob".to_string()));
    }

    #[test]
    fn test_ranks_beyond_third_earn_nothing() {
        let predictions = vec![vec!["a", "b", "c", "d", "e"]];
        let scores = ConsensusScores::from_predictions(&predictions);

        assert_eq!(scores.score("d"), Some(0));
        assert_eq!(scores.score("e"), Some(0));
        assert_eq!(scores.len(), 5);
    }

    #[test]
    fn test_unscored_first_sight_still_sets_tie_order() {
        // "z" is first seen at rank 3 of the first list for no points;
        // "y" is first seen later but scores first.
        let predictions = vec![
            vec!["a", "b", "c", "z"],
            vec!["y"],
            vec!["z"],
            vec!["y"],
            vec!["z"],
        ];
        let scores = ConsensusScores::from_predictions(&predictions);

        assert_eq!(scores.score("z"), Some(6));
        assert_eq!(scores.score("y"), Some(6));
        assert_eq!(calculate_highest_score(&predictions), Some("z".to_string()));
    }

    #[test]
    fn test_tie_break_is_not_lexical() {
        let predictions = vec![vec!["zed"], vec!["amy"]];
        assert_eq!(calculate_highest_score(&predictions), Some("zed".to_string()));
    }

    #[test]
    fn test_iteration_preserves_first_seen_order() {
        let predictions = vec![vec!["m", "k"], vec!["j", "m"]];
        let scores = ConsensusScores::from_predictions(&predictions);
        let labels: Vec<&str> = scores.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["m", "k", "j"]);
    }
}
