// src/dag/graph.rs

//! The job dependency graph.
//!
//! Jobs live in a flat arena (`Vec<Job>`) and the graph itself is adjacency
//! over integer [`JobId`] handles, so cycle detection and node removal are
//! index operations with no ownership ambiguity. Two edge sets are kept:
//!
//! - `live`: mutated as the run progresses; finished nodes are removed by
//!   [`JobDag::advance`], which unlocks their dependents.
//! - `full`: the original edge set, used for upstream/downstream queries
//!   and for the producer→consumer check in race detection.
//!
//! Edges point from prerequisite to dependent. Validation failures
//! (unknown or cyclic dependencies, output races) never abort the run:
//! they finalize the offending jobs with an `Error` status and the rest of
//! the graph keeps scheduling.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use petgraph::Direction::{Incoming, Outgoing};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::exec::output::DEFAULT_OUTPUT_LIMIT;
use crate::job::Job;
use crate::spec::JobSpec;
use crate::status::Status;

/// Index of a job in the arena. Stable for the lifetime of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub(crate) usize);

pub struct JobDag {
    jobs: Vec<Job>,
    by_key: HashMap<String, JobId>,
    live: DiGraphMap<JobId, ()>,
    full: DiGraphMap<JobId, ()>,
    output_limit: usize,
}

impl JobDag {
    pub fn new() -> Self {
        Self::with_output_limit(DEFAULT_OUTPUT_LIMIT)
    }

    pub fn with_output_limit(output_limit: usize) -> Self {
        Self {
            jobs: Vec::new(),
            by_key: HashMap::new(),
            live: DiGraphMap::new(),
            full: DiGraphMap::new(),
            output_limit,
        }
    }

    /// Register a job node. Edges are added later by
    /// [`JobDag::resolve_dependencies`].
    pub fn add_job(&mut self, spec: Arc<dyn JobSpec>) -> JobId {
        let id = JobId(self.jobs.len());
        let job = Job::new(id, spec, self.output_limit);
        let key = job.key();
        self.jobs.push(job);
        self.live.add_node(id);
        self.full.add_node(id);
        if self.by_key.contains_key(&key) {
            warn!(job = %key, "duplicate job name; only the first is addressable");
            self.jobs[id.0].set_terminal(Status::Error, "duplicate job name");
        } else {
            self.by_key.insert(key, id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn job(&self, id: JobId) -> &Job {
        &self.jobs[id.0]
    }

    pub fn job_mut(&mut self, id: JobId) -> &mut Job {
        &mut self.jobs[id.0]
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn find(&self, key: &str) -> Option<JobId> {
        self.by_key.get(key).copied()
    }

    /// Direct prerequisites of a job, from the original edge set.
    pub fn upstreams(&self, id: JobId) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.full.neighbors_directed(id, Incoming).collect();
        ids.sort();
        ids
    }

    /// All transitive dependents of a job, from the original edge set.
    pub fn downstreams(&self, id: JobId) -> Vec<JobId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<JobId> = self.full.neighbors_directed(id, Outgoing).collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.full.neighbors_directed(next, Outgoing));
            }
        }
        let mut ids: Vec<JobId> = seen.into_iter().collect();
        ids.sort();
        ids
    }

    /// Insert a prerequisite→dependent edge for every declared prerequisite.
    ///
    /// Unknown prerequisite names and cycle-creating edges do not abort the
    /// run: the jobs involved are finalized with `Error` and everything
    /// else keeps going.
    pub fn resolve_dependencies(&mut self) {
        for i in 0..self.jobs.len() {
            let id = JobId(i);
            let prereqs: Vec<(String, String)> = {
                let job = &self.jobs[i];
                job.spec()
                    .prereqs()
                    .iter()
                    .cloned()
                    .zip(job.prereq_keys())
                    .collect()
            };

            for (name, key) in prereqs {
                let Some(dep) = self.by_key.get(&key).copied() else {
                    warn!(job = %self.jobs[i].key(), prereq = %name, "unknown dependency");
                    self.jobs[i]
                        .set_terminal(Status::Error, format!("unknown dependency '{name}'"));
                    continue;
                };

                if dep == id || has_path_connecting(&self.live, id, dep, None) {
                    let chain = self.cycle_chain(id, dep);
                    warn!(job = %self.jobs[i].key(), chain = %chain, "cyclic dependency");
                    let message = format!("cyclic dependency: {chain}");
                    self.jobs[id.0].set_terminal(Status::Error, message.clone());
                    self.jobs[dep.0].set_terminal(Status::Error, message);
                    continue;
                }

                self.live.add_edge(dep, id, ());
                self.full.add_edge(dep, id, ());
            }
        }
    }

    /// Human-readable chain for the cycle that inserting `dep → id` would
    /// close: the existing downstream path `id → ... → dep`, plus the edge
    /// back to `id`.
    fn cycle_chain(&self, id: JobId, dep: JobId) -> String {
        let path = self.path_between(id, dep).unwrap_or_else(|| vec![id, dep]);
        let mut names: Vec<&str> = path.iter().map(|&n| self.jobs[n.0].name()).collect();
        names.push(self.jobs[id.0].name());
        names.join(" -> ")
    }

    /// DFS path from `from` to `to` over live edges, endpoints included.
    fn path_between(&self, from: JobId, to: JobId) -> Option<Vec<JobId>> {
        if from == to {
            return Some(vec![from]);
        }
        let mut parent: HashMap<JobId, JobId> = HashMap::new();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            for next in self.live.neighbors_directed(node, Outgoing) {
                if next != from && !parent.contains_key(&next) {
                    parent.insert(next, node);
                    if next == to {
                        let mut path = vec![to];
                        let mut cursor = to;
                        while let Some(&prev) = parent.get(&cursor) {
                            path.push(prev);
                            cursor = prev;
                        }
                        path.reverse();
                        return Some(path);
                    }
                    stack.push(next);
                }
            }
        }
        None
    }

    /// Walk the graph in topological order, skipping non-runnable jobs and
    /// propagating terminal states downstream.
    ///
    /// With `skip_deps` set (the default), every still-pending transitive
    /// dependent of a skipped/failed job is marked `Skip` with the caveat
    /// "skipped dependency". With it unset, dependents are left untouched;
    /// the finished node simply drops out of the graph on the next
    /// [`JobDag::advance`] and the children run independently.
    ///
    /// Silent roots have a deliberate asymmetry inherited from the original
    /// harness: only *direct*, non-runnable dependents of a silent job are
    /// themselves silenced; deeper descendants are skipped normally.
    pub fn propagate_skips(&mut self, skip_deps: bool) {
        let order = self.topo_order();
        for id in order {
            {
                let job = &mut self.jobs[id.0];
                if job.status() == Status::Hold && !job.spec().runnable() {
                    if job.spec().silent() {
                        job.set_terminal(Status::Silent, "");
                    } else {
                        job.set_terminal(Status::Skip, "not runnable");
                    }
                }
            }
            if skip_deps && self.jobs[id.0].status().is_finished() {
                self.skip_downstreams(id);
            }
        }
    }

    /// Mark every still-pending transitive dependent of `root` as skipped.
    /// Called both during validation and at run time when a job fails.
    pub fn skip_downstreams(&mut self, root: JobId) {
        let root_silent = self.jobs[root.0].status() == Status::Silent;
        let direct: HashSet<JobId> = self.live.neighbors_directed(root, Outgoing).collect();

        let mut seen = HashSet::new();
        let mut stack: Vec<JobId> = direct.iter().copied().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.live.neighbors_directed(id, Outgoing));

            let job = &mut self.jobs[id.0];
            if job.status() != Status::Hold {
                continue;
            }
            if root_silent && direct.contains(&id) && !job.spec().runnable() {
                job.set_terminal(Status::Silent, "");
            } else {
                debug!(job = %job.key(), "skipping dependent of finished job");
                job.set_terminal(Status::Skip, "skipped dependency");
                job.add_caveat("skipped dependency");
            }
        }
    }

    /// Flag jobs whose declared output files collide.
    ///
    /// Jobs grouped by output path are a legitimate producer→consumer chain
    /// when one is a transitive downstream of another; those members are
    /// removed from the group. Any group still holding more than one entry
    /// is a conflict: the same job declaring a file twice is a duplicate,
    /// unrelated jobs sharing a file are a race.
    pub fn detect_races(&mut self) {
        let mut by_file: HashMap<PathBuf, Vec<JobId>> = HashMap::new();
        for job in &self.jobs {
            if job.status().is_finished() || !job.spec().runnable() {
                continue;
            }
            for path in job.output_paths() {
                by_file.entry(path).or_default().push(job.id());
            }
        }

        for (path, group) in by_file {
            if group.len() < 2 {
                continue;
            }

            let distinct: HashSet<JobId> = group.iter().copied().collect();
            if distinct.len() == 1 {
                let id = group[0];
                warn!(job = %self.jobs[id.0].key(), file = %path.display(), "duplicate output file");
                self.jobs[id.0].set_terminal(
                    Status::Error,
                    format!("duplicate output files: {}", path.display()),
                );
                continue;
            }

            // A member ordered after another member cannot race with it.
            let racers: Vec<JobId> = distinct
                .iter()
                .copied()
                .filter(|&member| {
                    !distinct.iter().any(|&other| {
                        other != member && has_path_connecting(&self.full, other, member, None)
                    })
                })
                .collect();

            if racers.len() > 1 {
                for id in racers {
                    warn!(job = %self.jobs[id.0].key(), file = %path.display(), "output file race");
                    self.jobs[id.0].set_terminal(
                        Status::Error,
                        format!("output file race condition: {}", path.display()),
                    );
                }
            }
        }
    }

    /// Jobs with no unresolved prerequisites that have not been handed to
    /// the scheduler yet.
    pub fn ready_jobs(&self) -> Vec<JobId> {
        let mut ready: Vec<JobId> = self
            .live
            .nodes()
            .filter(|&id| {
                self.jobs[id.0].status() == Status::Hold
                    && self.live.neighbors_directed(id, Incoming).next().is_none()
            })
            .collect();
        ready.sort();
        ready
    }

    /// Remove all finished nodes, unlocking their dependents, and return
    /// the resulting ready set (newly unblocked jobs unioned with whatever
    /// was already ready).
    pub fn advance(&mut self) -> Vec<JobId> {
        let done: Vec<JobId> = self
            .live
            .nodes()
            .filter(|&id| self.jobs[id.0].status().is_finished())
            .collect();
        for id in done {
            self.live.remove_node(id);
        }
        self.ready_jobs()
    }

    /// Drop every dependency edge, returning the nodes in topological order
    /// of the original graph. Used for diagnostic re-execution without
    /// dependency gating.
    pub fn flatten(&mut self) -> Vec<JobId> {
        let order = self.topo_order();
        let edges: Vec<(JobId, JobId)> = self.live.all_edges().map(|(a, b, _)| (a, b)).collect();
        for (a, b) in edges {
            self.live.remove_edge(a, b);
        }
        order
    }

    /// Jobs still present in the live graph, i.e. not yet finished and not
    /// removed by [`JobDag::advance`].
    pub fn unfinished(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .live
            .nodes()
            .filter(|&id| !self.jobs[id.0].status().is_finished())
            .collect();
        ids.sort();
        ids
    }

    /// Topological order of the live graph. The graph is acyclic by
    /// construction (cycle-creating edges are refused), so this cannot
    /// fail in practice.
    fn topo_order(&self) -> Vec<JobId> {
        toposort(&self.live, None).unwrap_or_else(|_| {
            let mut ids: Vec<JobId> = self.live.nodes().collect();
            ids.sort();
            ids
        })
    }
}

impl Default for JobDag {
    fn default() -> Self {
        Self::new()
    }
}
