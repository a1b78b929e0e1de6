//! Placement: filter candidate nodes, score them, pick the cheapest.

use std::collections::HashMap;

use tracing::warn;

use crate::node::Node;
use crate::task::Task;

mod epvm;
mod roundrobin;

pub use epvm::Epvm;
pub use roundrobin::RoundRobin;

/// One placement capability, three operations. `score` must be total over
/// the candidates it is given; lower scores are better. `pick` takes the
/// argmin and breaks ties lexicographically on node name so placement is
/// deterministic.
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &'static str;
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node>;
    fn score(&self, task: &Task, candidates: &[Node]) -> HashMap<String, f64>;
    fn pick(&self, scores: &HashMap<String, f64>, candidates: &[Node]) -> Option<Node>;
}

/// Choose a scheduler by tag. Unknown tags get EPVM.
pub fn new_scheduler(kind: &str) -> Box<dyn Scheduler> {
    match kind {
        "roundrobin" => Box::new(RoundRobin::new()),
        "epvm" => Box::new(Epvm::new()),
        other => {
            warn!(kind = other, "unknown scheduler type, defaulting to epvm");
            Box::new(Epvm::new())
        }
    }
}

/// Shared argmin with the deterministic tie-break both schedulers use.
fn lowest_score(scores: &HashMap<String, f64>, candidates: &[Node]) -> Option<Node> {
    let mut best: Option<(&Node, f64)> = None;

    for node in candidates {
        let Some(&score) = scores.get(&node.name) else {
            continue;
        };
        best = match best {
            Some((current, current_score))
                if score > current_score
                    || (score == current_score && node.name >= current.name) =>
            {
                Some((current, current_score))
            }
            _ => Some((node, score)),
        };
    }

    best.map(|(node, _)| node.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    pub(crate) fn node(name: &str, memory: u64, allocated: u64, tasks: u64) -> Node {
        let mut node = Node::new(name, "worker");
        node.memory = memory;
        node.memory_allocated = allocated;
        node.task_count = tasks;
        node
    }

    #[test]
    fn factory_defaults_to_epvm() {
        assert_eq!(new_scheduler("epvm").name(), "epvm");
        assert_eq!(new_scheduler("roundrobin").name(), "roundrobin");
        assert_eq!(new_scheduler("whatever").name(), "epvm");
    }

    #[test]
    fn lowest_score_breaks_ties_lexicographically() {
        let candidates = vec![
            node("b:5556", 100, 0, 0),
            node("a:5556", 100, 0, 0),
            node("c:5556", 100, 0, 0),
        ];
        let scores: HashMap<String, f64> = candidates
            .iter()
            .map(|n| (n.name.clone(), 1.0))
            .collect();

        let picked = lowest_score(&scores, &candidates).unwrap();
        assert_eq!(picked.name, "a:5556");
    }

    #[test]
    fn lowest_score_prefers_the_smaller_score() {
        let candidates = vec![node("a:5556", 100, 0, 0), node("b:5556", 100, 0, 0)];
        let mut scores = HashMap::new();
        scores.insert("a:5556".to_string(), 2.0);
        scores.insert("b:5556".to_string(), 0.5);

        let picked = lowest_score(&scores, &candidates).unwrap();
        assert_eq!(picked.name, "b:5556");
    }

    #[test]
    fn lowest_score_on_empty_candidates_is_none() {
        assert!(lowest_score(&HashMap::new(), &[]).is_none());
    }
}
