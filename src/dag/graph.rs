//! JobGraph - prejob edges between named jobs
//!
//! - Arc<str> for cheap cloning of job names
//! - FxHashMap for faster hashing
//! - SmallVec for stack-allocated small prejob lists (0-4 items)
//!
//! Validation:
//! - Duplicate names and unknown prejobs are rejected while building
//! - Cycle detection using DFS three-color algorithm
//!
//! Resolution:
//! - `job_and_dependencies`: post-order closure, dependencies first, job last

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::error::{ConvoyError, Result};

/// Stack-allocated deps: most jobs have 0-4 prejobs
pub type DepVec = SmallVec<[Arc<str>; 4]>;

/// Graph of job dependencies built from prejob declarations
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    /// job -> jobs that list it as a prejob
    successors: FxHashMap<Arc<str>, DepVec>,
    /// job -> its prejobs, in declaration order
    predecessors: FxHashMap<Arc<str>, DepVec>,
    /// All job names in declaration order
    names: Vec<Arc<str>>,
}

impl JobGraph {
    /// Build from `(name, prejobs)` pairs in declaration order
    pub fn build<'a, I>(jobs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a Arc<str>, &'a [Arc<str>])>,
    {
        let jobs: Vec<_> = jobs.into_iter().collect();
        let capacity = jobs.len();

        let mut successors: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut predecessors: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut names: Vec<Arc<str>> = Vec::with_capacity(capacity);

        for (name, _) in &jobs {
            if predecessors.contains_key(name.as_ref()) {
                return Err(ConvoyError::DuplicateJob {
                    name: name.to_string(),
                });
            }
            names.push(Arc::clone(name));
            successors.insert(Arc::clone(name), DepVec::new());
            predecessors.insert(Arc::clone(name), DepVec::new());
        }

        for (name, prejobs) in &jobs {
            let mut seen: FxHashSet<&str> = FxHashSet::default();
            for prejob in prejobs.iter() {
                if !seen.insert(prejob.as_ref()) {
                    continue;
                }
                let Some(prejob_name) = successors
                    .get_key_value(prejob.as_ref())
                    .map(|(k, _)| Arc::clone(k))
                else {
                    return Err(ConvoyError::MissingDependency {
                        job: name.to_string(),
                        dep: prejob.to_string(),
                    });
                };
                if let Some(succ) = successors.get_mut(prejob_name.as_ref()) {
                    succ.push(Arc::clone(name));
                }
                if let Some(preds) = predecessors.get_mut(name.as_ref()) {
                    preds.push(prejob_name);
                }
            }
        }

        Ok(Self {
            successors,
            predecessors,
            names,
        })
    }

    /// Job names in declaration order
    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.predecessors.contains_key(name)
    }

    /// Interned name for `name`, if the job exists
    pub fn resolve(&self, name: &str) -> Option<Arc<str>> {
        self.predecessors
            .get_key_value(name)
            .map(|(k, _)| Arc::clone(k))
    }

    /// Direct prejobs of a job
    #[inline]
    pub fn prejobs(&self, name: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.predecessors
            .get(name)
            .map_or(EMPTY, SmallVec::as_slice)
    }

    /// Jobs that list `name` as a prejob
    #[inline]
    pub fn successors(&self, name: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.successors
            .get(name)
            .map_or(EMPTY, SmallVec::as_slice)
    }

    /// Check if there's a prejob path from `from` down to `to` (BFS)
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }

        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            for next in self.successors(current) {
                if next.as_ref() == to {
                    return true;
                }
                if visited.insert(next.as_ref()) {
                    queue.push_back(next.as_ref());
                }
            }
        }

        false
    }

    /// All transitive prejobs of `name` (excluding `name`)
    pub fn upstream(&self, name: &str) -> FxHashSet<Arc<str>> {
        let mut seen: FxHashSet<Arc<str>> = FxHashSet::default();
        let mut queue: VecDeque<&Arc<str>> = self.prejobs(name).iter().collect();

        while let Some(current) = queue.pop_front() {
            if seen.insert(Arc::clone(current)) {
                queue.extend(self.prejobs(current));
            }
        }

        seen
    }

    /// Detect cycles using DFS with three-color marking.
    ///
    /// Returns `Err(ConvoyError::CycleDetected)` with the cycle path, following
    /// prejob edges from a job down to its dependents.
    pub fn detect_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: FxHashMap<Arc<str>, Color> = self
            .names
            .iter()
            .map(|id| (Arc::clone(id), Color::White))
            .collect();
        let mut stack: Vec<Arc<str>> = Vec::new();

        fn dfs(
            node: Arc<str>,
            successors: &FxHashMap<Arc<str>, DepVec>,
            colors: &mut FxHashMap<Arc<str>, Color>,
            stack: &mut Vec<Arc<str>>,
        ) -> std::result::Result<(), String> {
            colors.insert(Arc::clone(&node), Color::Gray);
            stack.push(Arc::clone(&node));

            if let Some(neighbors) = successors.get(&node) {
                for neighbor in neighbors {
                    match colors.get(neighbor) {
                        Some(Color::Gray) => {
                            let cycle_start = stack
                                .iter()
                                .position(|x| x.as_ref() == neighbor.as_ref())
                                .unwrap_or(0);
                            let cycle: Vec<&str> =
                                stack[cycle_start..].iter().map(|s| s.as_ref()).collect();
                            return Err(format!("{} → {}", cycle.join(" → "), neighbor));
                        }
                        Some(Color::White) | None => {
                            dfs(Arc::clone(neighbor), successors, colors, stack)?;
                        }
                        Some(Color::Black) => {}
                    }
                }
            }

            stack.pop();
            colors.insert(node, Color::Black);
            Ok(())
        }

        for name in &self.names {
            if colors.get(name) == Some(&Color::White) {
                if let Err(cycle) = dfs(
                    Arc::clone(name),
                    &self.successors,
                    &mut colors,
                    &mut stack,
                ) {
                    return Err(ConvoyError::CycleDetected { cycle });
                }
            }
        }

        Ok(())
    }

    /// Ordered, de-duplicated dependency closure of `job`.
    ///
    /// Each name in `extra` is visited first, in the order given, with its own
    /// dependencies ahead of it. Then `job`'s remaining dependencies follow and
    /// `job` itself comes last. Every job appears once.
    pub fn job_and_dependencies(&self, job: &str, extra: &[&str]) -> Result<Vec<Arc<str>>> {
        let mut order: Vec<Arc<str>> = Vec::new();
        let mut done: FxHashSet<Arc<str>> = FxHashSet::default();
        let mut active: FxHashSet<Arc<str>> = FxHashSet::default();

        for name in extra.iter().copied().chain(std::iter::once(job)) {
            let name = self.resolve(name).ok_or_else(|| ConvoyError::UnknownJob {
                name: name.to_string(),
            })?;
            self.visit(name, &mut done, &mut active, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        name: Arc<str>,
        done: &mut FxHashSet<Arc<str>>,
        active: &mut FxHashSet<Arc<str>>,
        order: &mut Vec<Arc<str>>,
    ) -> Result<()> {
        if done.contains(&name) {
            return Ok(());
        }
        if !active.insert(Arc::clone(&name)) {
            return Err(ConvoyError::CycleDetected {
                cycle: format!("{} → {}", name, name),
            });
        }

        for prejob in self.prejobs(&name) {
            self.visit(Arc::clone(prejob), done, active, order)?;
        }

        active.remove(&name);
        done.insert(Arc::clone(&name));
        order.push(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(jobs: &[(&str, &[&str])]) -> Result<JobGraph> {
        let owned: Vec<(Arc<str>, Vec<Arc<str>>)> = jobs
            .iter()
            .map(|(name, deps)| (Arc::from(*name), deps.iter().map(|d| Arc::from(*d)).collect()))
            .collect();
        JobGraph::build(owned.iter().map(|(n, d)| (n, d.as_slice())))
    }

    fn names(list: &[Arc<str>]) -> Vec<&str> {
        list.iter().map(|s| s.as_ref()).collect()
    }

    // ═══════════════════════════════════════════════════════════════
    // CONSTRUCTION
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn test_build_preserves_declaration_order() {
        let g = graph(&[("c", &["a"]), ("a", &[]), ("b", &["a"])]).unwrap();
        assert_eq!(names(g.names()), vec!["c", "a", "b"]);
        assert_eq!(names(g.prejobs("c")), vec!["a"]);
        assert_eq!(names(g.successors("a")), vec!["c", "b"]);
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let err = graph(&[("a", &[]), ("a", &[])]).unwrap_err();
        assert!(matches!(err, ConvoyError::DuplicateJob { name } if name == "a"));
    }

    #[test]
    fn test_unknown_prejob_rejected() {
        let err = graph(&[("a", &["ghost"])]).unwrap_err();
        assert!(matches!(
            err,
            ConvoyError::MissingDependency { job, dep } if job == "a" && dep == "ghost"
        ));
    }

    // ═══════════════════════════════════════════════════════════════
    // CYCLE DETECTION
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn test_detect_cycle_simple() {
        let g = graph(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]).unwrap();
        let err = g.detect_cycles().unwrap_err();
        match err {
            ConvoyError::CycleDetected { cycle } => {
                assert!(cycle.contains("a"));
                assert!(cycle.contains("b"));
                assert!(cycle.contains("c"));
                assert!(cycle.contains("→"));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_detect_self_cycle() {
        let g = graph(&[("a", &["a"])]).unwrap();
        let err = g.detect_cycles().unwrap_err();
        assert!(matches!(err, ConvoyError::CycleDetected { cycle } if cycle == "a → a"));
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let g = graph(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
        ])
        .unwrap();
        assert!(g.detect_cycles().is_ok());
    }

    // ═══════════════════════════════════════════════════════════════
    // PATHS AND CLOSURES
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn test_has_path_follows_prejob_edges() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("x", &[])]).unwrap();
        assert!(g.has_path("a", "c"));
        assert!(!g.has_path("c", "a"));
        assert!(!g.has_path("x", "c"));
        assert!(g.has_path("x", "x"));
    }

    #[test]
    fn test_upstream_is_transitive() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("x", &[])]).unwrap();
        let up = g.upstream("c");
        assert_eq!(up.len(), 2);
        assert!(up.contains("a"));
        assert!(up.contains("b"));
        assert!(!up.contains("x"));
    }

    #[test]
    fn test_job_and_dependencies_post_order() {
        let g = graph(&[
            ("imdb", &[]),
            ("title", &["imdb"]),
            ("year", &["imdb"]),
            ("release", &["title", "year"]),
            ("other", &[]),
        ])
        .unwrap();

        let order = g.job_and_dependencies("release", &[]).unwrap();
        assert_eq!(names(&order), vec!["imdb", "title", "year", "release"]);
    }

    #[test]
    fn test_job_and_dependencies_extra_first() {
        let g = graph(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &[]),
            ("target", &["c"]),
        ])
        .unwrap();

        let order = g.job_and_dependencies("target", &["b"]).unwrap();
        assert_eq!(names(&order), vec!["a", "b", "c", "target"]);
    }

    #[test]
    fn test_job_and_dependencies_each_once() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]).unwrap();
        let order = g.job_and_dependencies("c", &["a", "b"]).unwrap();
        assert_eq!(names(&order), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_job_and_dependencies_unknown_job() {
        let g = graph(&[("a", &[])]).unwrap();
        let err = g.job_and_dependencies("nope", &[]).unwrap_err();
        assert!(matches!(err, ConvoyError::UnknownJob { name } if name == "nope"));
    }
}
