use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::node::Node;
use crate::task::Task;

use super::{lowest_score, Scheduler};

/// Rotates a cursor across the worker fleet, ignoring the task entirely.
/// The cursor is process-local state and is not carried across restarts.
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        RoundRobin {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for RoundRobin {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn select_candidate_nodes(&self, _task: &Task, nodes: &[Node]) -> Vec<Node> {
        nodes.to_vec()
    }

    /// The node one past the cursor scores 0.0, everyone else 1.0, so the
    /// argmin in `pick` lands on the next node in rotation.
    fn score(&self, _task: &Task, candidates: &[Node]) -> HashMap<String, f64> {
        if candidates.is_empty() {
            return HashMap::new();
        }
        let next = (self.cursor.load(Ordering::SeqCst) + 1) % candidates.len();
        candidates
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), if i == next { 0.0 } else { 1.0 }))
            .collect()
    }

    fn pick(&self, scores: &HashMap<String, f64>, candidates: &[Node]) -> Option<Node> {
        let picked = lowest_score(scores, candidates);
        if picked.is_some() {
            self.cursor.fetch_add(1, Ordering::SeqCst);
        }
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::node;
    use super::*;

    fn fleet() -> Vec<Node> {
        vec![
            node("w1:5556", 1000, 0, 0),
            node("w2:5556", 1000, 0, 0),
            node("w3:5556", 1000, 0, 0),
        ]
    }

    #[test]
    fn candidates_are_all_nodes() {
        let rr = RoundRobin::new();
        let nodes = fleet();
        let task = Task {
            memory: 1_000_000,
            ..Default::default()
        };
        assert_eq!(rr.select_candidate_nodes(&task, &nodes).len(), 3);
    }

    #[test]
    fn rotates_through_the_fleet() {
        let rr = RoundRobin::new();
        let nodes = fleet();
        let task = Task::default();

        let mut picks = Vec::new();
        for _ in 0..6 {
            let candidates = rr.select_candidate_nodes(&task, &nodes);
            let scores = rr.score(&task, &candidates);
            picks.push(rr.pick(&scores, &candidates).unwrap().name);
        }

        assert_eq!(
            picks,
            vec!["w2:5556", "w3:5556", "w1:5556", "w2:5556", "w3:5556", "w1:5556"]
        );
    }

    #[test]
    fn empty_fleet_picks_nothing() {
        let rr = RoundRobin::new();
        let task = Task::default();
        let scores = rr.score(&task, &[]);
        assert!(rr.pick(&scores, &[]).is_none());
    }
}
