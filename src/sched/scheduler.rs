// src/sched/scheduler.rs

//! The job scheduler: a single coordinating loop that drives the
//! [`JobDag`] ready set through a [`JobRunner`] under a bounded slot
//! budget with load-average backpressure.
//!
//! All shared bookkeeping (slots in use, the running set, the DAG itself)
//! is owned by this loop and mutated nowhere else; runner tasks only
//! report back over the event channel. Ordering guarantee: a job is
//! launched only after every declared prerequisite reached a terminal
//! status; among independent jobs, launch order is ready-set order but
//! completion order is whatever the processes do.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::{JobDag, JobId};
use crate::exec::{ExecutionOutcome, ExecutionResult, JobRunner, LaunchRequest, RunnerEvent};
use crate::sched::load;
use crate::status::Status;

/// Concurrency budget mode.
///
/// Both modes cap the sum of slots of concurrently running jobs at the
/// nominal budget. They differ on jobs whose cost alone exceeds the whole
/// budget: a soft limit defers them and runs them alone once the primary
/// queue drains; a hard limit skips them outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLimit {
    Soft(usize),
    Hard(usize),
}

impl SlotLimit {
    pub fn budget(self) -> usize {
        match self {
            SlotLimit::Soft(n) | SlotLimit::Hard(n) => n.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub slot_limit: SlotLimit,
    /// Do not launch further jobs while the 1-minute load average is at or
    /// above this value. At least one job always runs.
    pub load_ceiling: Option<f64>,
    /// Cadence of the coordinating loop's housekeeping tick.
    pub poll_interval: Duration,
    /// Fraction of a job's max time after which it is reported (once) as
    /// still running.
    pub report_fraction: f64,
    /// Propagate skips/failures to dependents. When false, dependents of a
    /// finished-but-unsuccessful job run independently.
    pub skip_unsatisfied_deps: bool,
    /// Drop all dependency edges before running (diagnostic re-execution).
    pub flatten: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            slot_limit: SlotLimit::Soft(parallelism),
            load_ceiling: None,
            poll_interval: Duration::from_millis(100),
            report_fraction: 0.1,
            skip_unsatisfied_deps: true,
            flatten: false,
        }
    }
}

/// Final state of one job, extracted from the arena for reporting.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub key: String,
    pub name: String,
    pub status: Status,
    pub message: String,
    pub caveats: Vec<String>,
    pub output: String,
    pub duration: Duration,
}

/// Aggregate result of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub jobs: Vec<JobOutcome>,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunReport {
    /// 0 when every job passed or was skipped, non-zero otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 { 0 } else { 1 }
    }

    pub fn outcome(&self, key: &str) -> Option<&JobOutcome> {
        self.jobs.iter().find(|j| j.key == key)
    }
}

/// Coordinator-side bookkeeping for one in-flight job.
struct RunningJob {
    started: Instant,
    slots: usize,
    max_time: Duration,
    reported: bool,
}

pub struct Scheduler {
    dag: JobDag,
    cfg: SchedulerConfig,
    runner: Arc<dyn JobRunner>,
    slots_in_use: usize,
    running: HashMap<JobId, RunningJob>,
    /// Ready jobs waiting for budget/load headroom, in ready-set order.
    queued: VecDeque<JobId>,
    /// Jobs whose cost exceeds the whole budget (soft limit only).
    oversized: VecDeque<JobId>,
}

impl Scheduler {
    pub fn new(dag: JobDag, cfg: SchedulerConfig, runner: Arc<dyn JobRunner>) -> Self {
        Self {
            dag,
            cfg,
            runner,
            slots_in_use: 0,
            running: HashMap::new(),
            queued: VecDeque::new(),
            oversized: VecDeque::new(),
        }
    }

    /// Validate the graph, then run it to completion.
    pub async fn run(mut self) -> RunReport {
        self.dag.resolve_dependencies();
        self.dag.propagate_skips(self.cfg.skip_unsatisfied_deps);
        self.dag.detect_races();
        if self.cfg.flatten {
            let order = self.dag.flatten();
            info!(jobs = order.len(), "dependency gating disabled; graph flattened");
        }

        let ready = self.dag.advance();
        self.enqueue(ready);

        let (events_tx, mut events_rx) = mpsc::channel::<RunnerEvent>(64);
        let mut ticker = tokio::time::interval(self.cfg.poll_interval);

        loop {
            self.launch_eligible(&events_tx);

            if self.running.is_empty() && self.queued.is_empty() && self.oversized.is_empty() {
                break;
            }

            tokio::select! {
                Some(event) = events_rx.recv() => {
                    let RunnerEvent::Completed { id, result } = event;
                    self.finish_job(id, result);
                }
                _ = ticker.tick() => {
                    self.report_long_running();
                }
            }
        }

        self.reconcile_leftovers();
        self.report()
    }

    fn enqueue(&mut self, ids: Vec<JobId>) {
        for id in ids {
            self.dag.job_mut(id).set_queued();
            self.queued.push_back(id);
        }
    }

    /// Launch queued jobs while budget and load allow, then drain at most
    /// one oversized job if everything else is done.
    fn launch_eligible(&mut self, events: &mpsc::Sender<RunnerEvent>) {
        let budget = self.cfg.slot_limit.budget();

        while let Some(&id) = self.queued.front() {
            let slots = self.dag.job(id).slots();

            if slots > budget {
                self.queued.pop_front();
                match self.cfg.slot_limit {
                    SlotLimit::Hard(_) => {
                        warn!(
                            job = %self.dag.job(id).key(),
                            slots,
                            budget,
                            "job cost exceeds the slot budget; skipping"
                        );
                        let job = self.dag.job_mut(id);
                        job.add_caveat("insufficient slots");
                        job.set_terminal(Status::Skip, "insufficient slots");
                        if self.cfg.skip_unsatisfied_deps {
                            self.dag.skip_downstreams(id);
                        }
                        let ready = self.dag.advance();
                        self.enqueue(ready);
                    }
                    SlotLimit::Soft(_) => {
                        debug!(
                            job = %self.dag.job(id).key(),
                            slots,
                            budget,
                            "job cost exceeds the slot budget; deferring"
                        );
                        self.oversized.push_back(id);
                    }
                }
                continue;
            }

            if self.slots_in_use + slots > budget {
                break;
            }

            // Load backpressure, but never starve: with nothing running
            // the front job launches regardless of load.
            if let (Some(ceiling), false) = (self.cfg.load_ceiling, self.running.is_empty()) {
                if let Some(current) = load::load_average_1m() {
                    if current >= ceiling {
                        debug!(load = current, ceiling, "load average at ceiling; holding launches");
                        break;
                    }
                }
            }

            self.queued.pop_front();
            self.launch(id, slots, events);
        }

        // Oversized drain: one at a time, alone, once everything else is done.
        if self.queued.is_empty() && self.running.is_empty() {
            if let Some(id) = self.oversized.pop_front() {
                let slots = self.dag.job(id).slots();
                warn!(
                    job = %self.dag.job(id).key(),
                    slots,
                    budget,
                    "running oversized job alone, exceeding the nominal budget"
                );
                self.dag.job_mut(id).add_caveat("oversized");
                self.launch(id, slots, events);
            }
        }
    }

    fn launch(&mut self, id: JobId, slots: usize, events: &mpsc::Sender<RunnerEvent>) {
        let job = self.dag.job_mut(id);
        job.mark_started();
        // The backend owns the `Queued` → `Running` flip: a local job is
        // running once its process spawns, a batch job only once the
        // remote scheduler says so.
        let request = LaunchRequest {
            id,
            name: job.key(),
            command: job.spec().command(),
            max_time: job.max_time(),
            status: job.status_handle(),
        };
        let max_time = job.max_time();

        self.slots_in_use += slots;
        self.running.insert(
            id,
            RunningJob {
                started: Instant::now(),
                slots,
                max_time,
                reported: false,
            },
        );
        info!(
            job = %request.name,
            slots,
            slots_in_use = self.slots_in_use,
            "launching job"
        );
        self.runner.launch(request, events.clone());
    }

    fn finish_job(&mut self, id: JobId, result: ExecutionResult) {
        let Some(running) = self.running.remove(&id) else {
            warn!(job = %self.dag.job(id).key(), "completion for a job not marked running; ignoring");
            return;
        };
        self.slots_in_use -= running.slots;

        let job = self.dag.job_mut(id);
        job.mark_finished();
        job.append_output(&result.output);
        if let Some(duration) = result.duration {
            job.set_walltime(duration);
        }

        match result.outcome {
            ExecutionOutcome::Exited(code) => {
                let output = job.output();
                let classified = job.spec().classify(code, &output);
                // The predicate must produce a terminal status.
                let status = if classified.is_finished() {
                    classified
                } else {
                    Status::Error
                };
                let message = if status.is_failing() {
                    format!("exit code {code}")
                } else {
                    String::new()
                };
                job.set_terminal(status, message);
            }
            ExecutionOutcome::TimedOut => {
                job.set_terminal(
                    Status::Timeout,
                    format!("exceeded max time of {}s", running.max_time.as_secs()),
                );
            }
            ExecutionOutcome::Error(message) => {
                job.set_terminal(Status::Error, message);
            }
        }

        let status = job.status();
        let key = job.key();
        info!(job = %key, status = status.label(), "job finished");

        if (status.is_failing() || status == Status::Skip) && self.cfg.skip_unsatisfied_deps {
            self.dag.skip_downstreams(id);
        }
        let ready = self.dag.advance();
        self.enqueue(ready);
    }

    /// One-shot progress report for jobs past their report threshold.
    fn report_long_running(&mut self) {
        for (id, running) in self.running.iter_mut() {
            if running.reported {
                continue;
            }
            let threshold = running.max_time.mul_f64(self.cfg.report_fraction);
            if running.started.elapsed() >= threshold {
                running.reported = true;
                info!(
                    job = %self.dag.job(*id).key(),
                    elapsed_secs = running.started.elapsed().as_secs(),
                    "RUNNING..."
                );
            }
        }
    }

    /// Anything left in the live graph after both queues drained never
    /// became runnable: an unsatisfiable dependency. This is the only
    /// fatal condition; it is reported per job and fails the run.
    fn reconcile_leftovers(&mut self) {
        for id in self.dag.unfinished() {
            let job = self.dag.job_mut(id);
            error!(job = %job.key(), "job never became runnable; unsatisfiable dependency");
            job.set_terminal(Status::Error, "unsatisfiable or cyclic dependency");
        }
        self.dag.advance();
    }

    fn report(&self) -> RunReport {
        let mut jobs = Vec::with_capacity(self.dag.len());
        let (mut passed, mut failed, mut skipped) = (0usize, 0usize, 0usize);
        for job in self.dag.jobs() {
            let status = job.status();
            match status {
                Status::Success | Status::Finished => passed += 1,
                Status::Skip | Status::Silent => skipped += 1,
                _ => failed += 1,
            }
            jobs.push(JobOutcome {
                key: job.key(),
                name: job.name().to_string(),
                status,
                message: job.message().to_string(),
                caveats: job.caveats().to_vec(),
                output: job.output(),
                duration: job.timing(),
            });
        }
        // Failures sort after passes so they end up at the bottom of the
        // printed report.
        jobs.sort_by(|a, b| {
            (a.status.sort_value(), &a.key).cmp(&(b.status.sort_value(), &b.key))
        });
        RunReport {
            jobs,
            passed,
            failed,
            skipped,
        }
    }
}
