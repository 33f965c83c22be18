//! Worker pool and batch permits.
//!
//! Parallel fan-out is opt-in per node and bounded by the pool: a handler
//! asks for a batch permit, and if no worker is free it declines and the
//! caller falls back to sequential evaluation.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::warn;

/// A rayon-backed worker pool with an availability gate.
pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
    free: AtomicUsize,
    threads: usize,
}

impl WorkerPool {
    /// `threads == 0` disables parallel evaluation; every batch request is
    /// declined.
    pub fn new(threads: usize) -> Self {
        let pool = if threads == 0 {
            None
        } else {
            match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => Some(pool),
                Err(error) => {
                    warn!(%error, "worker pool unavailable, falling back to sequential");
                    None
                }
            }
        };
        Self {
            pool,
            free: AtomicUsize::new(threads),
            threads,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Try to reserve capacity for one batch of tasks. `None` when the pool
    /// is disabled or no worker is free.
    pub fn try_begin_batch(&self) -> Option<BatchPermit<'_>> {
        self.pool.as_ref()?;
        loop {
            let free = self.free.load(Ordering::Acquire);
            if free == 0 {
                return None;
            }
            if self
                .free
                .compare_exchange(free, free - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(BatchPermit { owner: self });
            }
        }
    }
}

/// Reserved batch capacity; releases on drop.
pub struct BatchPermit<'a> {
    owner: &'a WorkerPool,
}

impl BatchPermit<'_> {
    /// Run `count` independent tasks on the pool and collect their results
    /// in task order.
    pub fn run<T, F>(&self, count: usize, task: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        let pool = self
            .owner
            .pool
            .as_ref()
            .expect("permit issued without a pool");
        pool.install(|| (0..count).into_par_iter().map(task).collect())
    }

    /// Run owned tasks (one closure's worth of state each) on the pool.
    pub fn run_tasks<T, I, F>(&self, inputs: Vec<I>, task: F) -> Vec<T>
    where
        T: Send,
        I: Send,
        F: Fn(I) -> T + Sync + Send,
    {
        let pool = self
            .owner
            .pool
            .as_ref()
            .expect("permit issued without a pool");
        pool.install(|| inputs.into_par_iter().map(task).collect())
    }
}

impl Drop for BatchPermit<'_> {
    fn drop(&mut self) {
        self.owner.free.fetch_add(1, Ordering::AcqRel);
    }
}

impl crate::interpreter::Interpreter<'_> {
    /// Concurrency gateway: try to evaluate a node's children on the
    /// worker pool. Declines (returning `None`) when the node does not ask
    /// for parallelism, fewer than two children exist, the interpreter is
    /// detached, or no worker is free — the caller then falls back to
    /// sequential evaluation.
    ///
    /// Each child evaluates an exported copy of its subtree and of the
    /// call stack in a scratch pool; results are imported back into this
    /// pool on join. Frames below the child's unique-access starting depth
    /// are the shared (snapshot) view of this interpreter's scopes.
    pub fn interpret_nodes_concurrently(
        &mut self,
        parent: sylva_tree::NodeId,
        children: &[sylva_tree::NodeId],
    ) -> Option<Vec<sylva_tree::NodeRef>> {
        use crate::interpreter::Interpreter;
        use sylva_tree::{NodePool, NodeRef};

        let wants_parallel = self.pool().node(parent).concurrent
            || self.pool().opcode(parent) == sylva_tree::Opcode::Parallel;
        if !wants_parallel || children.len() < 2 {
            return None;
        }
        self.machine_mut()?;

        struct ChildTask {
            pool: NodePool,
            root: sylva_tree::NodeId,
            stack: sylva_tree::NodeId,
            shared_frames: usize,
            rand: sylva_foundation::RandomStream,
            constraints: Option<crate::constraints::PerformanceConstraints>,
        }

        let mut tasks = Vec::with_capacity(children.len());
        for (index, &child) in children.iter().enumerate() {
            let mut scratch = NodePool::new(self.strings());
            let root = scratch.import_from(self.pool(), child);
            let stack = scratch.import_from(self.pool(), self.call_stack);
            let shared_frames = scratch.child_count(stack);
            scratch.keep(stack);
            tasks.push(ChildTask {
                pool: scratch,
                root,
                stack,
                shared_frames,
                rand: self.rand.substream_advancing(&format!("task-{index}")),
                constraints: self.constraints.clone(),
            });
        }

        let results: Vec<(NodePool, Option<sylva_tree::NodeId>, u64)> = {
            let machine = self.machine_mut()?;
            let permit = machine.workers.try_begin_batch()?;
            permit.run_tasks(tasks, |mut task| {
                let interpreter = Interpreter::detached_with_stack(
                    &mut task.pool,
                    task.rand,
                    task.constraints,
                    task.stack,
                    task.shared_frames,
                );
                let (result, spent) = interpreter.execute_counting(Some(task.root), false);
                (task.pool, result.id, spent)
            })
        };

        let mut out = Vec::with_capacity(results.len());
        for (scratch, result, spent) in results {
            if let Some(constraints) = &mut self.constraints {
                constraints.cur_execution_step =
                    constraints.cur_execution_step.saturating_add(spent);
            }
            match result {
                Some(result) => {
                    let imported = self.pool_mut().import_from(&scratch, result);
                    out.push(NodeRef::new(imported, true));
                }
                None => out.push(NodeRef::null()),
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_pool_declines() {
        let pool = WorkerPool::new(0);
        assert!(pool.try_begin_batch().is_none());
    }

    #[test]
    fn test_capacity_gate() {
        let pool = WorkerPool::new(1);
        let permit = pool.try_begin_batch().expect("one batch fits");
        assert!(pool.try_begin_batch().is_none());
        drop(permit);
        assert!(pool.try_begin_batch().is_some());
    }

    #[test]
    fn test_run_collects_in_order() {
        let pool = WorkerPool::new(2);
        let permit = pool.try_begin_batch().unwrap();
        let results = permit.run(8, |i| i * 2);
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }
}
