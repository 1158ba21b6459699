use crate::domain::ids::{ProcessKey, ProductSerial, QueueKey};
use crate::domain::router::RoutingPolicy;

/// One resolved step of a process plan: either a concrete process or a
/// capability tag matched against resource processes at routing time.
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    Process(ProcessKey),
    Capability(String),
}

/// A product's required processes, as a linear sequence or a precedence DAG.
/// Both forms run through the same tiny ready-set scheduler: a node is
/// released when all its predecessors have ended, and the lowest declared
/// index wins when several nodes are ready (a product is one physical item
/// and undergoes one process at a time).
#[derive(Debug, Clone)]
pub struct Plan {
    steps: Vec<Requirement>,
    successors: Vec<Vec<usize>>,
    predecessors_left: Vec<usize>,
    done: Vec<bool>,
    ready: Vec<usize>,
    completed: usize,
}

impl Plan {
    pub fn linear(steps: Vec<Requirement>) -> Self {
        let n = steps.len();
        let successors = (0..n).map(|i| if i + 1 < n { vec![i + 1] } else { vec![] }).collect();
        let predecessors_left = (0..n).map(|i| usize::from(i > 0)).collect();
        Plan::from_parts(steps, successors, predecessors_left)
    }

    /// Builds a DAG plan from an adjacency list (`successors[i]` = indices
    /// unlocked by node `i`). Cycle freedom is checked during validation.
    pub fn dag(steps: Vec<Requirement>, successors: Vec<Vec<usize>>) -> Self {
        let mut predecessors_left = vec![0usize; steps.len()];
        for succs in &successors {
            for &s in succs {
                predecessors_left[s] += 1;
            }
        }
        Plan::from_parts(steps, successors, predecessors_left)
    }

    fn from_parts(steps: Vec<Requirement>, successors: Vec<Vec<usize>>, predecessors_left: Vec<usize>) -> Self {
        let ready = predecessors_left
            .iter()
            .enumerate()
            .filter(|(_, left)| **left == 0)
            .map(|(i, _)| i)
            .collect();
        let done = vec![false; steps.len()];
        Plan { steps, successors, predecessors_left, done, ready, completed: 0 }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn requirement(&self, node: usize) -> &Requirement {
        &self.steps[node]
    }

    /// The node the product should request next.
    pub fn next_ready(&self) -> Option<usize> {
        self.ready.iter().copied().min()
    }

    /// Marks `node` ended and releases its successors.
    pub fn complete(&mut self, node: usize) {
        debug_assert!(!self.done[node], "plan node completed twice");
        self.done[node] = true;
        self.completed += 1;
        self.ready.retain(|n| *n != node);
        for i in 0..self.successors[node].len() {
            let succ = self.successors[node][i];
            self.predecessors_left[succ] -= 1;
            if self.predecessors_left[succ] == 0 {
                self.ready.push(succ);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed == self.steps.len()
    }
}

/// Blueprint of one product type, shared by every instance a source mints.
#[derive(Debug, Clone)]
pub struct ProductSpec {
    /// The product type id from the configuration.
    pub type_id: String,
    pub requirements: Vec<Requirement>,
    /// `None` for linear plans; adjacency lists for precedence DAGs.
    pub successors: Option<Vec<Vec<usize>>>,
    pub transport_process: Option<ProcessKey>,
    /// Instances minted so far; used for stable per-type product names.
    pub minted: u64,
}

impl ProductSpec {
    pub fn build_plan(&self) -> Plan {
        match &self.successors {
            None => Plan::linear(self.requirements.clone()),
            Some(adj) => Plan::dag(self.requirements.clone(), adj.clone()),
        }
    }
}

/// A work item traveling through its required processes. Created by a
/// source, destroyed when its sink consumes it; the event log keeps referring
/// to it by serial afterwards.
#[derive(Debug, Clone)]
pub struct Product {
    pub serial: ProductSerial,
    pub name: String,
    pub product_type: String,
    pub plan: Plan,
    pub transport_process: Option<ProcessKey>,
    /// Inherited from the product's source.
    pub routing: RoutingPolicy,
    /// The queue physically holding the product; `None` while it rides a
    /// transport resource.
    pub location: Option<QueueKey>,
    pub created_at: f64,
    /// Monotone step counter; checked against regressions.
    pub steps_completed: u32,
    /// The plan node currently requested or in work.
    pub active_node: Option<usize>,
    pub route_retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(name: &str) -> Requirement {
        Requirement::Capability(name.into())
    }

    #[test]
    fn test_linear_plan_runs_in_order() {
        let mut plan = Plan::linear(vec![cap("a"), cap("b"), cap("c")]);
        assert_eq!(plan.next_ready(), Some(0));
        plan.complete(0);
        assert_eq!(plan.next_ready(), Some(1));
        plan.complete(1);
        plan.complete(2);
        assert!(plan.is_finished());
    }

    #[test]
    fn test_dag_plan_releases_on_all_predecessors() {
        // 0 -> 2, 1 -> 2: node 2 is released only after both end.
        let mut plan = Plan::dag(vec![cap("a"), cap("b"), cap("join")], vec![vec![2], vec![2], vec![]]);
        assert_eq!(plan.next_ready(), Some(0));
        plan.complete(0);
        assert_eq!(plan.next_ready(), Some(1));
        plan.complete(1);
        assert_eq!(plan.next_ready(), Some(2));
        plan.complete(2);
        assert!(plan.is_finished());
    }

    #[test]
    fn test_dag_plan_prefers_lowest_ready_index() {
        let plan = Plan::dag(vec![cap("a"), cap("b")], vec![vec![], vec![]]);
        assert_eq!(plan.next_ready(), Some(0));
    }
}
