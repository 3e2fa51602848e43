//! Asynchronous execution of tensor operations over per-scope dependency
//! graphs.
//!
//! Submission is synchronous bookkeeping (graph insertion) and never
//! blocks on numeric execution; a pool of worker execution slots pulls
//! ready nodes and runs them through the node executor. The only
//! suspension points are the `sync` calls.

pub mod graph;

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::errors::{Error, Result};
use crate::operation::{TensorNodeExecutor, TensorOperation};
use crate::runtime::graph::{NodeState, TensorGraph};

/// Name of the scope that is open for the whole runtime lifetime.
pub const BASE_SCOPE: &str = "main";

struct RuntimeState {
    /// Scope stack; the last entry is the current scope.
    scopes: Vec<String>,
    graphs: FxHashMap<String, TensorGraph>,
    shutdown: bool,
}

struct Inner {
    state: Mutex<RuntimeState>,
    /// Signalled when a node may have become ready.
    work: Condvar,
    /// Signalled when a node reached a terminal state.
    done: Condvar,
}

/// The execution runtime: one dependency graph per open scope plus the
/// worker pool driving ready nodes through a [TensorNodeExecutor].
pub struct TensorRuntime {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

impl TensorRuntime {
    /// Starts the runtime with the given executor and worker count (0
    /// picks the available parallelism).
    pub fn new(executor: Arc<dyn TensorNodeExecutor>, num_workers: usize) -> Self {
        let num_workers = if num_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
        } else {
            num_workers
        };

        let mut graphs = FxHashMap::default();
        graphs.insert(BASE_SCOPE.to_string(), TensorGraph::new());
        let inner = Arc::new(Inner {
            state: Mutex::new(RuntimeState {
                scopes: vec![BASE_SCOPE.to_string()],
                graphs,
                shutdown: false,
            }),
            work: Condvar::new(),
            done: Condvar::new(),
        });

        let workers = (0..num_workers)
            .map(|slot| {
                let inner = Arc::clone(&inner);
                let executor = Arc::clone(&executor);
                std::thread::spawn(move || worker_loop(&inner, executor.as_ref(), slot))
            })
            .collect();

        Self { inner, workers }
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        self.inner.state.lock().expect("runtime state poisoned")
    }

    /// Name of the currently open scope.
    pub fn current_scope(&self) -> String {
        self.lock().scopes.last().expect("scope stack non-empty").clone()
    }

    /// Opens a new child scope with its own execution graph.
    pub fn open_scope(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.graphs.contains_key(name) {
            return Err(Error::NameTaken(name.to_string()));
        }
        state.scopes.push(name.to_string());
        state.graphs.insert(name.to_string(), TensorGraph::new());
        Ok(())
    }

    /// Closes the current scope, implicitly synchronizing all its
    /// outstanding nodes, and returns the name of the parent scope. The
    /// base scope can not be closed.
    pub fn close_scope(&self) -> Result<String> {
        {
            let state = self.lock();
            if state.scopes.len() == 1 {
                return Err(Error::Validation(
                    "the base scope can not be closed".to_string(),
                ));
            }
        }
        // Outstanding work must finish before the graph is discarded; a
        // failure inside the scope is still a successful close.
        let _ = self.sync_scope(true);
        let mut state = self.lock();
        let closed = state.scopes.pop().expect("checked above");
        state.graphs.remove(&closed);
        let parent = state.scopes.last().expect("base scope remains").clone();
        debug!(closed, parent; "closed scope");
        Ok(parent)
    }

    /// Inserts an operation into the current scope's graph and returns
    /// immediately; execution proceeds asynchronously.
    pub fn submit(&self, op: TensorOperation) -> Result<()> {
        if !op.is_set() {
            return Err(Error::Validation(format!(
                "operation {} is not fully set",
                op.kind()
            )));
        }
        let mut state = self.lock();
        let scope = state.scopes.last().expect("scope stack non-empty").clone();
        let graph = state.graphs.get_mut(&scope).expect("graph per scope");
        graph.insert(op);
        drop(state);
        self.inner.work.notify_all();
        Ok(())
    }

    /// Blocks (or polls, for `wait = false`) until every node writing
    /// `tensor` in the current scope reached a terminal state. Returns
    /// whether completion has occurred; a failed writer surfaces as
    /// [Error::ExecutionFailure].
    pub fn sync_tensor(&self, tensor: &str, wait: bool) -> Result<bool> {
        let mut state = self.lock();
        loop {
            let scope = state.scopes.last().expect("scope stack non-empty");
            let graph = &state.graphs[scope];
            match graph.tensor_state(tensor) {
                None | Some(NodeState::Completed) => return Ok(true),
                Some(NodeState::Failed) => {
                    return Err(Error::ExecutionFailure {
                        op: "sync".to_string(),
                        tensor: tensor.to_string(),
                        reason: "a writing operation failed".to_string(),
                    })
                }
                Some(_) => {
                    if !wait {
                        return Ok(false);
                    }
                    state = self
                        .inner
                        .done
                        .wait(state)
                        .expect("runtime state poisoned");
                }
            }
        }
    }

    /// Synchronizes every outstanding node of the current scope.
    pub fn sync_scope(&self, wait: bool) -> Result<bool> {
        let mut state = self.lock();
        loop {
            let scope = state.scopes.last().expect("scope stack non-empty");
            let graph = &state.graphs[scope];
            if graph.is_idle() {
                if graph.has_failure() {
                    return Err(Error::ExecutionFailure {
                        op: "sync".to_string(),
                        tensor: format!("scope '{scope}'"),
                        reason: "at least one node failed".to_string(),
                    });
                }
                return Ok(true);
            }
            if !wait {
                return Ok(false);
            }
            state = self
                .inner
                .done
                .wait(state)
                .expect("runtime state poisoned");
        }
    }
}

impl Drop for TensorRuntime {
    fn drop(&mut self) {
        self.lock().shutdown = true;
        self.inner.work.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(inner: &Inner, executor: &dyn TensorNodeExecutor, slot: usize) {
    let mut state = inner.state.lock().expect("runtime state poisoned");
    loop {
        let mut found = None;
        for (scope, graph) in state.graphs.iter_mut() {
            if let Some(id) = graph.pop_ready() {
                found = Some((scope.clone(), id, graph.node(id).op().clone()));
                break;
            }
        }

        match found {
            Some((scope, id, op)) => {
                drop(state);
                debug!(slot, node = id, op = op.kind(); "executing node");
                let outcome = op.accept(executor);
                state = inner.state.lock().expect("runtime state poisoned");
                if let Some(graph) = state.graphs.get_mut(&scope) {
                    match outcome {
                        Ok(()) => graph.mark_completed(id),
                        Err(error) => {
                            warn!(slot, node = id, op = op.kind(); "node failed: {error}");
                            graph.mark_failed(id);
                        }
                    }
                }
                inner.work.notify_all();
                inner.done.notify_all();
            }
            None => {
                if state.shutdown {
                    return;
                }
                state = inner.work.wait(state).expect("runtime state poisoned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use num_complex::Complex64;

    use crate::comm::{ProcessGroup, Rank};
    use crate::operation::{ContractionPattern, SvdAbsorb, SvdPattern, TensorFunctor};
    use crate::tensornetwork::tensor::Tensor;
    use crate::types::DimOffset;

    /// Executor that counts invocations and fails on request.
    #[derive(Default)]
    struct CountingExecutor {
        executed: AtomicUsize,
        fail_on: Option<String>,
    }

    impl CountingExecutor {
        fn run(&self, tensor: &Tensor) -> Result<()> {
            if self.fail_on.as_deref() == Some(tensor.name()) {
                return Err(Error::ExecutionFailure {
                    op: "test".to_string(),
                    tensor: tensor.name().to_string(),
                    reason: "requested failure".to_string(),
                });
            }
            self.executed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl TensorNodeExecutor for CountingExecutor {
        fn create(&self, tensor: &Tensor) -> Result<()> {
            self.run(tensor)
        }
        fn destroy(&self, tensor: &Tensor) -> Result<()> {
            self.run(tensor)
        }
        fn init_value(&self, tensor: &Tensor, _value: Complex64) -> Result<()> {
            self.run(tensor)
        }
        fn init_random(&self, tensor: &Tensor) -> Result<()> {
            self.run(tensor)
        }
        fn add(
            &self,
            dst: &Tensor,
            _src: &Tensor,
            _permutation: &[usize],
            _alpha: Complex64,
            _conj_src: bool,
        ) -> Result<()> {
            self.run(dst)
        }
        fn contract(
            &self,
            dst: &Tensor,
            _left: &Tensor,
            _right: &Tensor,
            _pattern: &ContractionPattern,
            _alpha: Complex64,
            _conj: (bool, bool),
        ) -> Result<()> {
            self.run(dst)
        }
        fn decompose_svd3(
            &self,
            tensor: &Tensor,
            _left: &Tensor,
            _middle: &Tensor,
            _right: &Tensor,
            _pattern: &SvdPattern,
        ) -> Result<()> {
            self.run(tensor)
        }
        fn decompose_svd2(
            &self,
            tensor: &Tensor,
            _left: &Tensor,
            _right: &Tensor,
            _pattern: &SvdPattern,
            _absorb: SvdAbsorb,
        ) -> Result<()> {
            self.run(tensor)
        }
        fn orthogonalize_svd(&self, tensor: &Tensor, _pattern: &SvdPattern) -> Result<()> {
            self.run(tensor)
        }
        fn orthogonalize_mgs(&self, tensor: &Tensor) -> Result<()> {
            self.run(tensor)
        }
        fn transform(&self, tensor: &Tensor, _functor: &dyn TensorFunctor) -> Result<()> {
            self.run(tensor)
        }
        fn slice_extract(
            &self,
            tensor: &Tensor,
            _slice: &Tensor,
            _offsets: &[DimOffset],
        ) -> Result<()> {
            self.run(tensor)
        }
        fn slice_insert(
            &self,
            tensor: &Tensor,
            _slice: &Tensor,
            _offsets: &[DimOffset],
        ) -> Result<()> {
            self.run(tensor)
        }
        fn replicate(&self, _group: &ProcessGroup, tensor: &Tensor, _root: Rank) -> Result<()> {
            self.run(tensor)
        }
        fn broadcast(&self, _group: &ProcessGroup, tensor: &Tensor, _root: Rank) -> Result<()> {
            self.run(tensor)
        }
        fn allreduce(&self, _group: &ProcessGroup, tensor: &Tensor) -> Result<()> {
            self.run(tensor)
        }
    }

    fn create(name: &str) -> TensorOperation {
        TensorOperation::Create {
            tensor: Arc::new(Tensor::new(name, vec![2])),
        }
    }

    fn add(dst: &str, src: &str) -> TensorOperation {
        TensorOperation::Add {
            dst: Arc::new(Tensor::new(dst, vec![2])),
            src: Arc::new(Tensor::new(src, vec![2])),
            permutation: vec![0],
            alpha: Complex64::ONE,
            conj_src: false,
        }
    }

    #[test]
    fn test_submit_and_sync() {
        let executor = Arc::new(CountingExecutor::default());
        let runtime = TensorRuntime::new(executor.clone(), 2);
        runtime.submit(create("A")).unwrap();
        runtime.submit(create("B")).unwrap();
        runtime.submit(add("B", "A")).unwrap();

        assert!(runtime.sync_tensor("B", true).unwrap());
        assert_eq!(executor.executed.load(Ordering::SeqCst), 3);
        assert!(runtime.sync_scope(true).unwrap());
    }

    #[test]
    fn test_failure_surfaces_at_sync_and_spares_independents() {
        let executor = Arc::new(CountingExecutor {
            executed: AtomicUsize::new(0),
            fail_on: Some("A".to_string()),
        });
        let runtime = TensorRuntime::new(executor.clone(), 2);
        runtime.submit(create("A")).unwrap();
        runtime.submit(add("B", "A")).unwrap();
        runtime.submit(create("C")).unwrap();
        runtime.submit(add("D", "C")).unwrap();

        assert!(matches!(
            runtime.sync_tensor("B", true),
            Err(Error::ExecutionFailure { .. })
        ));
        // The independent chain still completes.
        assert!(runtime.sync_tensor("D", true).unwrap());
        // Scope-wide sync reports the failure.
        assert!(matches!(
            runtime.sync_scope(true),
            Err(Error::ExecutionFailure { .. })
        ));
    }

    #[test]
    fn test_nonblocking_sync_polls() {
        let executor = Arc::new(CountingExecutor::default());
        let runtime = TensorRuntime::new(executor, 1);
        // No writers at all: trivially complete.
        assert!(runtime.sync_tensor("missing", false).unwrap());
        runtime.submit(create("A")).unwrap();
        // Polling never errors while the node is in flight.
        let _ = runtime.sync_tensor("A", false).unwrap();
        assert!(runtime.sync_tensor("A", true).unwrap());
    }

    #[test]
    fn test_scopes_isolate_graphs() {
        let executor = Arc::new(CountingExecutor::default());
        let runtime = TensorRuntime::new(executor, 2);
        runtime.submit(create("A")).unwrap();
        runtime.open_scope("child").unwrap();
        assert_eq!(runtime.current_scope(), "child");
        runtime.submit(create("B")).unwrap();
        // Closing the child synchronizes its nodes.
        let parent = runtime.close_scope().unwrap();
        assert_eq!(parent, BASE_SCOPE);
        assert!(runtime.sync_scope(true).unwrap());
        assert!(runtime.close_scope().is_err());
    }

    #[test]
    fn test_validation_error_on_unset_operation() {
        let executor = Arc::new(CountingExecutor::default());
        let runtime = TensorRuntime::new(executor, 1);
        let bad = TensorOperation::Add {
            dst: Arc::new(Tensor::new("B", vec![2])),
            src: Arc::new(Tensor::new("A", vec![3])),
            permutation: vec![0],
            alpha: Complex64::ONE,
            conj_src: false,
        };
        assert!(matches!(
            runtime.submit(bad),
            Err(Error::Validation(_))
        ));
    }
}
