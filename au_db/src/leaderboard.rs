//! ABOUTME: Leaderboard ranking over per-user aggregates
//! ABOUTME: Total ordering so ranks do not depend on query row order

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::cmp::Ordering;

/// Aggregates for one user with at least one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Standing {
    pub user_id: String,
    pub total_score: i64,
    pub image_count: i64,
    pub like_count: i64,
    pub user_created_at: String,
}

fn compare(a: &Standing, b: &Standing) -> Ordering {
    b.total_score
        .cmp(&a.total_score)
        .then_with(|| b.like_count.cmp(&a.like_count))
        .then_with(|| b.image_count.cmp(&a.image_count))
        .then_with(|| a.user_created_at.cmp(&b.user_created_at))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Sort standings and assign 1-based ranks
///
/// Ties on score fall back to likes received, then image count, then the
/// older account, then user id.
pub fn rank_standings(mut standings: Vec<Standing>) -> Vec<(i64, Standing)> {
    standings.sort_by(compare);
    standings
        .into_iter()
        .enumerate()
        .map(|(i, standing)| (i as i64 + 1, standing))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standing(id: &str, score: i64, likes: i64, images: i64, created: &str) -> Standing {
        Standing {
            user_id: id.to_string(),
            total_score: score,
            image_count: images,
            like_count: likes,
            user_created_at: created.to_string(),
        }
    }

    fn order(ranked: &[(i64, Standing)]) -> Vec<&str> {
        ranked.iter().map(|(_, s)| s.user_id.as_str()).collect()
    }

    #[test]
    fn test_orders_by_score_then_tie_breaks() {
        let ranked = rank_standings(vec![
            standing("low", 10, 50, 9, "2024-01-01T00:00:00Z"),
            standing("tie-few-likes", 80, 1, 3, "2024-01-01T00:00:00Z"),
            standing("tie-more-likes", 80, 4, 1, "2024-03-01T00:00:00Z"),
            standing("top", 95, 0, 1, "2024-05-01T00:00:00Z"),
        ]);

        assert_eq!(order(&ranked), vec!["top", "tie-more-likes", "tie-few-likes", "low"]);
        let ranks: Vec<i64> = ranked.iter().map(|(r, _)| *r).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_image_count_then_account_age_then_id() {
        let ranked = rank_standings(vec![
            standing("b-newer", 50, 2, 2, "2024-02-01T00:00:00Z"),
            standing("more-images", 50, 2, 5, "2024-06-01T00:00:00Z"),
            standing("z-older", 50, 2, 2, "2024-01-01T00:00:00Z"),
            standing("a-newer", 50, 2, 2, "2024-02-01T00:00:00Z"),
        ]);

        assert_eq!(
            order(&ranked),
            vec!["more-images", "z-older", "a-newer", "b-newer"]
        );
    }

    #[test]
    fn test_ranking_independent_of_input_order() {
        let input = vec![
            standing("a", 30, 1, 1, "2024-01-01T00:00:00Z"),
            standing("b", 30, 1, 1, "2024-01-01T00:00:00Z"),
            standing("c", 60, 0, 2, "2024-01-02T00:00:00Z"),
            standing("d", 30, 2, 1, "2024-01-03T00:00:00Z"),
        ];
        let mut reversed = input.clone();
        reversed.reverse();

        assert_eq!(rank_standings(input), rank_standings(reversed));
    }

    #[test]
    fn test_empty_input() {
        assert!(rank_standings(Vec::new()).is_empty());
    }
}
