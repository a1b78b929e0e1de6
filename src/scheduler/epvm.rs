use std::collections::HashMap;

use crate::node::Node;
use crate::task::Task;

use super::{lowest_score, Scheduler};

/// Lieb's square-ice constant, the base of the EPVM marginal cost curve.
const LIEB: f64 = 1.539_600_717_839_002;
/// Task-count pressure is normalized against this nominal per-node load.
const MAX_JOBS: f64 = 4.0;

/// Enhanced Parallel Virtual Machines scoring: the cost of placing a task
/// on a node is the increase in an exponential of the node's memory
/// utilization, so cost climbs steeply as a node approaches saturation.
/// A node whose projected utilization would pass 1.0 is infeasible.
pub struct Epvm;

impl Epvm {
    pub fn new() -> Self {
        Epvm
    }
}

impl Default for Epvm {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory utilization after hypothetically placing the task. Nodes with no
/// observed capacity yet report > 1.0 and fall out as infeasible.
fn projected_utilization(task: &Task, node: &Node) -> f64 {
    if node.memory == 0 {
        return f64::INFINITY;
    }
    (node.memory_allocated + task.memory) as f64 / node.memory as f64
}

fn current_utilization(node: &Node) -> f64 {
    if node.memory == 0 {
        return 1.0;
    }
    node.memory_allocated as f64 / node.memory as f64
}

impl Scheduler for Epvm {
    fn name(&self) -> &'static str {
        "epvm"
    }

    /// Drop nodes that cannot fit the task's memory request. Both ends of
    /// the comparison are MiB.
    fn select_candidate_nodes(&self, task: &Task, nodes: &[Node]) -> Vec<Node> {
        nodes
            .iter()
            .filter(|node| projected_utilization(task, node) <= 1.0)
            .cloned()
            .collect()
    }

    fn score(&self, task: &Task, candidates: &[Node]) -> HashMap<String, f64> {
        candidates
            .iter()
            .map(|node| {
                let projected = projected_utilization(task, node);
                let score = if projected > 1.0 {
                    f64::INFINITY
                } else {
                    let mem_cost = LIEB.powf(projected) - LIEB.powf(current_utilization(node));
                    let jobs_cost = LIEB.powf((node.task_count + 1) as f64 / MAX_JOBS)
                        - LIEB.powf(node.task_count as f64 / MAX_JOBS);
                    mem_cost + jobs_cost
                };
                (node.name.clone(), score)
            })
            .collect()
    }

    fn pick(&self, scores: &HashMap<String, f64>, candidates: &[Node]) -> Option<Node> {
        lowest_score(scores, candidates)
    }
}
