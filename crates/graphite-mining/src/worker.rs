//! Mining worker threads.
//!
//! Workers receive tasks over a watch channel and report solutions over an
//! mpsc channel. The nonce space is partitioned by worker id with a random
//! offset inside each partition. Cancellation is cooperative: the flag is
//! checked between nonces, and a worker may finish the nonce it is on.

use crate::solver::CycleSolver;
use graphite_pow::{compact_to_target, hash_meets_target, GraphParams, Proof, HEADER_BYTES};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Nonce-space partitions; workers beyond this wrap around.
const MAX_NONCE_PARTITIONS: u64 = 256;

/// A unit of mining work.
#[derive(Clone, Debug)]
pub struct MiningTask {
    /// Serialized candidate header.
    pub header: [u8; HEADER_BYTES],
    /// Graph parameters for the candidate's height.
    pub params: GraphParams,
    /// Compact difficulty target the proof hash must meet.
    pub bits: u32,
    /// Candidate height, echoed back with solutions.
    pub height: u64,
}

/// A solution found by a worker.
#[derive(Debug)]
pub struct FoundSolution {
    /// The proof, already checked against the task's target.
    pub proof: Proof,
    /// The task it solves.
    pub task: MiningTask,
    /// Id of the worker that found it.
    pub worker_id: usize,
}

/// One mining thread.
struct MiningWorker {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    graphs_searched: Arc<AtomicU64>,
    cycles_found: Arc<AtomicU64>,
}

impl MiningWorker {
    fn spawn(
        id: usize,
        task_rx: watch::Receiver<Option<MiningTask>>,
        solution_tx: mpsc::Sender<FoundSolution>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let graphs_searched = Arc::new(AtomicU64::new(0));
        let cycles_found = Arc::new(AtomicU64::new(0));

        let running_clone = Arc::clone(&running);
        let graphs_clone = Arc::clone(&graphs_searched);
        let cycles_clone = Arc::clone(&cycles_found);

        let handle = thread::Builder::new()
            .name(format!("graphite-miner-{}", id))
            .spawn(move || {
                Self::worker_loop(
                    id,
                    task_rx,
                    solution_tx,
                    running_clone,
                    graphs_clone,
                    cycles_clone,
                );
            })
            .expect("failed to spawn mining worker thread");

        debug!(worker_id = id, "mining worker spawned");
        Self {
            handle: Some(handle),
            running,
            graphs_searched,
            cycles_found,
        }
    }

    fn worker_loop(
        id: usize,
        mut task_rx: watch::Receiver<Option<MiningTask>>,
        solution_tx: mpsc::Sender<FoundSolution>,
        running: Arc<AtomicBool>,
        graphs_searched: Arc<AtomicU64>,
        cycles_found: Arc<AtomicU64>,
    ) {
        // Partition the nonce space, then randomize within the partition so
        // workers sharing one do not duplicate effort.
        let partition = (id as u64) % MAX_NONCE_PARTITIONS;
        let partition_size = u64::MAX / MAX_NONCE_PARTITIONS;
        let random_offset: u64 = rand::thread_rng().gen::<u64>() % (partition_size / 2);
        let nonce_base = partition * partition_size + random_offset;

        let mut solver: Option<(GraphParams, CycleSolver)> = None;

        while running.load(Ordering::Relaxed) {
            let task = task_rx.borrow_and_update().clone();
            let Some(task) = task else {
                thread::sleep(std::time::Duration::from_millis(100));
                continue;
            };

            // Scratchpads are large; only reallocate on a parameter change.
            let rebuild = !matches!(&solver, Some((params, _)) if *params == task.params);
            if rebuild {
                solver = Some((task.params.clone(), CycleSolver::new(task.params.clone())));
            }
            let (_, active_solver) = solver.as_mut().unwrap();

            let target = compact_to_target(task.bits);
            let mut nonce = nonce_base.wrapping_add(graphs_searched.load(Ordering::Relaxed));

            loop {
                // Cancel and new-work checks happen between nonces.
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                match task_rx.has_changed() {
                    Ok(false) => {}
                    Ok(true) => {
                        trace!(worker_id = id, "new work, switching tasks");
                        break;
                    }
                    Err(_) => return, // task source gone, shut down
                }

                graphs_searched.fetch_add(1, Ordering::Relaxed);
                if let Some(proof) = active_solver.try_nonce(&task.header, nonce) {
                    cycles_found.fetch_add(1, Ordering::Relaxed);
                    if hash_meets_target(&proof.hash(), &target) {
                        info!(
                            worker_id = id,
                            height = task.height,
                            nonce,
                            "solution found"
                        );
                        let found = FoundSolution {
                            proof,
                            task: task.clone(),
                            worker_id: id,
                        };
                        if solution_tx.blocking_send(found).is_err() {
                            warn!(worker_id = id, "solution channel closed");
                            return;
                        }
                        break;
                    }
                    trace!(worker_id = id, nonce, "cycle below target");
                }
                nonce = nonce.wrapping_add(1);
            }
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn graphs_searched(&self) -> u64 {
        self.graphs_searched.load(Ordering::Relaxed)
    }

    fn cycles_found(&self) -> u64 {
        self.cycles_found.load(Ordering::Relaxed)
    }

    fn join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MiningWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A pool of mining workers sharing one task feed.
pub struct WorkerPool {
    workers: Vec<MiningWorker>,
    task_tx: watch::Sender<Option<MiningTask>>,
    solution_rx: mpsc::Receiver<FoundSolution>,
}

impl WorkerPool {
    /// Spawn `num_workers` threads (0 means one per CPU).
    pub fn new(num_workers: usize) -> Self {
        let num_workers = if num_workers == 0 {
            num_cpus::get().max(1)
        } else {
            num_workers
        };

        let (task_tx, task_rx) = watch::channel(None);
        let (solution_tx, solution_rx) = mpsc::channel(num_workers * 2);

        let workers = (0..num_workers)
            .map(|id| MiningWorker::spawn(id, task_rx.clone(), solution_tx.clone()))
            .collect();
        info!(num_workers, "mining worker pool started");

        Self {
            workers,
            task_tx,
            solution_rx,
        }
    }

    /// Broadcast a new task to every worker, replacing the current one.
    pub fn broadcast_task(&self, task: MiningTask) {
        if self.task_tx.send(Some(task)).is_err() {
            warn!("no mining workers subscribed");
        }
    }

    /// Clear the task; workers idle.
    pub fn clear_task(&self) {
        let _ = self.task_tx.send(None);
    }

    /// Await the next solution.
    pub async fn recv_solution(&mut self) -> Option<FoundSolution> {
        self.solution_rx.recv().await
    }

    /// Total graphs searched across all workers.
    pub fn graphs_searched(&self) -> u64 {
        self.workers.iter().map(|w| w.graphs_searched()).sum()
    }

    /// Total cycles found across all workers, including those whose proof
    /// hash fell short of the target.
    pub fn cycles_found(&self) -> u64 {
        self.workers.iter().map(|w| w.cycles_found()).sum()
    }

    /// Number of workers.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop and join every worker.
    pub fn shutdown(self) {
        for worker in &self.workers {
            worker.stop();
        }
        for worker in self.workers {
            worker.join();
        }
        info!("mining worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn easy_task() -> MiningTask {
        let mut header = [0x11u8; HEADER_BYTES];
        header[72..76].copy_from_slice(&0x2100_ffffu32.to_le_bytes());
        MiningTask {
            header,
            params: GraphParams::custom(4096, 256, 8, 60).unwrap(),
            bits: 0x2100_ffff,
            height: 1,
        }
    }

    #[tokio::test]
    async fn test_pool_spawns_workers() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.num_workers(), 2);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_worker_finds_solution_on_easy_target() {
        let mut pool = WorkerPool::new(2);
        pool.broadcast_task(easy_task());

        let found = tokio::time::timeout(Duration::from_secs(120), pool.recv_solution())
            .await
            .expect("timed out waiting for a solution")
            .expect("solution channel closed");

        assert_eq!(found.task.height, 1);
        let target = compact_to_target(found.task.bits);
        assert!(hash_meets_target(&found.proof.hash(), &target));
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_workers_idle_without_task() {
        let pool = WorkerPool::new(1);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(pool.graphs_searched(), 0);
        pool.shutdown();
    }
}
