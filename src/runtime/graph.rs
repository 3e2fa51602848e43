use std::collections::{BTreeSet, VecDeque};

use log::debug;
use rustc_hash::FxHashMap;

use crate::operation::TensorOperation;

/// Index of an execution node within its graph.
pub type NodeId = usize;

/// Completion state of an execution node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Dependencies not yet satisfied.
    Pending,
    /// All producer dependencies completed.
    Ready,
    /// Picked up by a worker execution slot.
    Executing,
    /// Terminal success.
    Completed,
    /// Terminal failure; propagates to all dependents.
    Failed,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Failed)
    }
}

/// One scheduled tensor operation with its tracked dependencies.
#[derive(Debug)]
pub struct ExecNode {
    op: TensorOperation,
    state: NodeState,
    dependents: Vec<NodeId>,
    unmet: usize,
}

impl ExecNode {
    pub fn op(&self) -> &TensorOperation {
        &self.op
    }

    pub fn state(&self) -> NodeState {
        self.state
    }
}

/// The per-scope dependency DAG of execution nodes.
///
/// A new node depends on the most recent writer of every tensor it reads
/// or writes at insertion time (last-writer-wins). Writers of the same
/// tensor are thereby serialized in submission order, so the state of a
/// tensor's last writer subsumes the states of all its earlier writers.
/// The DAG is acyclic by construction: dependencies always point at
/// previously inserted nodes.
#[derive(Debug, Default)]
pub struct TensorGraph {
    nodes: Vec<ExecNode>,
    last_writer: FxHashMap<String, NodeId>,
    ready: VecDeque<NodeId>,
    outstanding: usize,
    any_failed: bool,
}

impl TensorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &ExecNode {
        &self.nodes[id]
    }

    /// Whether every node has reached a terminal state.
    pub fn is_idle(&self) -> bool {
        self.outstanding == 0
    }

    /// Whether any node has failed so far.
    pub fn has_failure(&self) -> bool {
        self.any_failed
    }

    /// State of the last writer of `tensor`; `None` means no node in this
    /// graph ever wrote it. Because same-tensor writers are serialized, a
    /// completed last writer implies all earlier writers completed, and a
    /// failure anywhere in the chain leaves the last writer failed.
    pub fn tensor_state(&self, tensor: &str) -> Option<NodeState> {
        self.last_writer
            .get(tensor)
            .map(|&id| self.nodes[id].state)
    }

    /// Inserts an operation as a new node, wiring it to the most recent
    /// writer of every tensor it touches. Returns the node id.
    pub fn insert(&mut self, op: TensorOperation) -> NodeId {
        let id = self.nodes.len();

        let mut deps = BTreeSet::new();
        for name in op.reads().iter().chain(op.writes().iter()) {
            if let Some(&writer) = self.last_writer.get(*name) {
                deps.insert(writer);
            }
        }

        let mut unmet = 0;
        let mut inherited_failure = false;
        for &dep in &deps {
            match self.nodes[dep].state {
                NodeState::Completed => {}
                NodeState::Failed => inherited_failure = true,
                _ => {
                    self.nodes[dep].dependents.push(id);
                    unmet += 1;
                }
            }
        }

        let state = if inherited_failure {
            self.any_failed = true;
            NodeState::Failed
        } else if unmet == 0 {
            self.ready.push_back(id);
            self.outstanding += 1;
            NodeState::Ready
        } else {
            self.outstanding += 1;
            NodeState::Pending
        };
        debug!(node = id, op = op.kind(), deps = deps.len(); "inserted execution node");

        for name in op.writes() {
            self.last_writer.insert(name.to_string(), id);
        }
        self.nodes.push(ExecNode {
            op,
            state,
            dependents: Vec::new(),
            unmet,
        });
        id
    }

    /// Hands out the next ready node, transitioning it to `Executing`.
    pub fn pop_ready(&mut self) -> Option<NodeId> {
        while let Some(id) = self.ready.pop_front() {
            if self.nodes[id].state == NodeState::Ready {
                self.nodes[id].state = NodeState::Executing;
                return Some(id);
            }
            // The node failed while queued; skip it.
        }
        None
    }

    /// Records successful execution and releases dependents whose
    /// dependencies are now all satisfied.
    pub fn mark_completed(&mut self, id: NodeId) {
        debug_assert_eq!(self.nodes[id].state, NodeState::Executing);
        self.nodes[id].state = NodeState::Completed;
        self.outstanding -= 1;
        let dependents = std::mem::take(&mut self.nodes[id].dependents);
        for dependent in dependents {
            let node = &mut self.nodes[dependent];
            node.unmet -= 1;
            if node.unmet == 0 && node.state == NodeState::Pending {
                node.state = NodeState::Ready;
                self.ready.push_back(dependent);
            }
        }
    }

    /// Records a failed execution; the failure propagates transitively to
    /// every dependent, which is marked failed without executing.
    pub fn mark_failed(&mut self, id: NodeId) {
        self.any_failed = true;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current];
            if node.state == NodeState::Failed {
                continue;
            }
            debug_assert!(!node.state.is_terminal());
            node.state = NodeState::Failed;
            self.outstanding -= 1;
            stack.extend(std::mem::take(&mut node.dependents));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::tensornetwork::tensor::Tensor;

    fn create(name: &str) -> TensorOperation {
        TensorOperation::Create {
            tensor: Arc::new(Tensor::new(name, vec![2])),
        }
    }

    fn init(name: &str) -> TensorOperation {
        TensorOperation::InitValue {
            tensor: Arc::new(Tensor::new(name, vec![2])),
            value: num_complex::Complex64::ONE,
        }
    }

    fn add(dst: &str, src: &str) -> TensorOperation {
        TensorOperation::Add {
            dst: Arc::new(Tensor::new(dst, vec![2])),
            src: Arc::new(Tensor::new(src, vec![2])),
            permutation: vec![0],
            alpha: num_complex::Complex64::ONE,
            conj_src: false,
        }
    }

    #[test]
    fn test_last_writer_dependencies() {
        let mut graph = TensorGraph::new();
        let create_a = graph.insert(create("A"));
        let create_b = graph.insert(create("B"));
        // B += A depends on both creates.
        let add_ba = graph.insert(add("B", "A"));

        assert_eq!(graph.node(create_a).state(), NodeState::Ready);
        assert_eq!(graph.node(create_b).state(), NodeState::Ready);
        assert_eq!(graph.node(add_ba).state(), NodeState::Pending);

        let first = graph.pop_ready().unwrap();
        graph.mark_completed(first);
        assert_eq!(graph.node(add_ba).state(), NodeState::Pending);

        let second = graph.pop_ready().unwrap();
        graph.mark_completed(second);
        assert_eq!(graph.node(add_ba).state(), NodeState::Ready);

        let third = graph.pop_ready().unwrap();
        assert_eq!(third, add_ba);
        graph.mark_completed(third);
        assert!(graph.is_idle());
        assert_eq!(graph.tensor_state("B"), Some(NodeState::Completed));
    }

    #[test]
    fn test_reader_not_ready_until_writer_completed() {
        let mut graph = TensorGraph::new();
        let write_t = graph.insert(create("T"));
        let read_t = graph.insert(add("U", "T"));
        // Unrelated nodes do not unlock the reader.
        let unrelated = graph.insert(create("V"));

        let mut executed = Vec::new();
        while let Some(id) = graph.pop_ready() {
            executed.push(id);
            if id != read_t {
                graph.mark_completed(id);
            } else {
                // The reader must come after its writer completed.
                assert!(executed.contains(&write_t));
                graph.mark_completed(id);
            }
        }
        assert!(graph.is_idle());
        assert!(executed.contains(&unrelated));
    }

    #[test]
    fn test_failure_propagates_to_dependents() {
        let mut graph = TensorGraph::new();
        let create_a = graph.insert(create("A"));
        let use_a = graph.insert(add("B", "A"));
        let use_b = graph.insert(add("C", "B"));
        let independent = graph.insert(create("D"));

        let id = graph.pop_ready().unwrap();
        assert_eq!(id, create_a);
        graph.mark_failed(id);

        assert_eq!(graph.node(use_a).state(), NodeState::Failed);
        assert_eq!(graph.node(use_b).state(), NodeState::Failed);
        assert_eq!(graph.node(independent).state(), NodeState::Ready);
        assert!(graph.has_failure());

        // A node submitted after the failure inherits it.
        let late = graph.insert(add("E", "C"));
        assert_eq!(graph.node(late).state(), NodeState::Failed);
    }
}
