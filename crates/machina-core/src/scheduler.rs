//! Dependency-graph task scheduler.
//!
//! Nodes contribute `(action, depends_on)` edges for a command; the scheduler
//! topologically sorts them, deduplicates actions reachable through several
//! paths, and executes the result strictly sequentially. There is no retry
//! and no rollback here: compensation for partially converged topologies is
//! what the `down` and `destroy` commands are for.

use crate::error::{CoreError, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info};

struct TaskInner {
    label: String,
    action: Box<dyn Fn() -> Result<()>>,
}

/// An identity-comparable action handle.
///
/// Clones share identity: a task cloned into several dependency edges is
/// still one schedulable unit and runs at most once per [`Scheduler::run`].
#[derive(Clone)]
pub struct Task {
    inner: Rc<TaskInner>,
}

impl Task {
    /// Creates a task from a label and an action closure.
    pub fn new(label: impl Into<String>, action: impl Fn() -> Result<()> + 'static) -> Self {
        Self {
            inner: Rc::new(TaskInner {
                label: label.into(),
                action: Box::new(action),
            }),
        }
    }

    /// Human-readable action label, used in logs and error messages.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    fn invoke(&self) -> Result<()> {
        (self.inner.action)()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Task {}

impl std::hash::Hash for Task {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("label", &self.label()).finish()
    }
}

/// One scheduling constraint: `task` runs after every entry in `depends_on`.
#[derive(Debug, Clone)]
pub struct TaskEdge {
    /// The action to schedule.
    pub task: Task,
    /// Actions that must complete first. Empty means unconstrained.
    pub depends_on: Vec<Task>,
}

impl TaskEdge {
    /// An unconstrained action.
    #[must_use]
    pub fn root(task: Task) -> Self {
        Self {
            task,
            depends_on: Vec::new(),
        }
    }

    /// An action with a single dependency.
    #[must_use]
    pub fn after(task: Task, dep: Task) -> Self {
        Self {
            task,
            depends_on: vec![dep],
        }
    }

    /// An action depending on several others.
    #[must_use]
    pub fn after_all(task: Task, deps: Vec<Task>) -> Self {
        Self {
            task,
            depends_on: deps,
        }
    }
}

/// Sequential executor of dependency-ordered tasks.
///
/// Edges accumulate via [`add`](Self::add) and [`append`](Self::append) and
/// are consumed by the next [`run`](Self::run), so one scheduler instance can
/// serve consecutive commands.
#[derive(Default)]
pub struct Scheduler {
    edges: Vec<TaskEdge>,
    num_completed: usize,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one action with an optional dependency.
    pub fn add(&mut self, task: Task, depends_on: Option<Task>) {
        self.edges.push(TaskEdge {
            task,
            depends_on: depends_on.into_iter().collect(),
        });
    }

    /// Adds a batch of edges.
    pub fn append(&mut self, edges: Vec<TaskEdge>) {
        self.edges.extend(edges);
    }

    /// Number of actions that actually ran during the last `run`.
    ///
    /// Callers use this to decide whether a state snapshot is worth
    /// persisting.
    #[must_use]
    pub fn num_completed(&self) -> usize {
        self.num_completed
    }

    /// Sorts the accumulated edges and executes each action exactly once.
    ///
    /// With `abort_on_error` the first failure is wrapped in a task error and
    /// returned immediately, leaving the remaining actions unexecuted (and
    /// already-completed actions in place). Without it the original error is
    /// propagated unchanged.
    ///
    /// # Errors
    ///
    /// Returns a cycle error (and executes nothing) when the dependency graph
    /// is not a DAG, or the failure of the first failing action.
    pub fn run(&mut self, abort_on_error: bool) -> Result<()> {
        let edges = std::mem::take(&mut self.edges);
        self.num_completed = 0;

        let ordered = topo_sort(&edges)?;
        info!(tasks = ordered.len(), "running scheduled tasks");

        let mut performed: HashSet<Task> = HashSet::new();
        for task in ordered {
            if performed.contains(&task) {
                continue;
            }
            debug!(task = task.label(), "executing");
            match task.invoke() {
                Ok(()) => {
                    self.num_completed += 1;
                    performed.insert(task);
                }
                Err(err) if abort_on_error => {
                    return Err(CoreError::Task {
                        action: task.label().to_string(),
                        source: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

/// Kahn's algorithm with first-seen tie order.
///
/// An edge `(task, dep)` means "dep runs first". Tasks are keyed by identity,
/// so the same action referenced from several edges is a single graph node.
/// Ready candidates are drained in first-seen order, which keeps the relative
/// order of independent actions deterministic.
fn topo_sort(edges: &[TaskEdge]) -> Result<Vec<Task>> {
    let mut order: Vec<Task> = Vec::new();
    let mut index: HashMap<Task, usize> = HashMap::new();
    let mut intern = |task: &Task, order: &mut Vec<Task>| -> usize {
        if let Some(&i) = index.get(task) {
            return i;
        }
        let i = order.len();
        order.push(task.clone());
        index.insert(task.clone(), i);
        i
    };

    let mut pairs: HashSet<(usize, usize)> = HashSet::new();
    let mut successors: Vec<Vec<usize>> = Vec::new();
    let mut in_degree: Vec<usize> = Vec::new();

    for edge in edges {
        let t = intern(&edge.task, &mut order);
        if successors.len() <= t {
            successors.resize_with(t + 1, Vec::new);
            in_degree.resize(t + 1, 0);
        }
        for dep in &edge.depends_on {
            let d = intern(dep, &mut order);
            if successors.len() <= d {
                successors.resize_with(d + 1, Vec::new);
                in_degree.resize(d + 1, 0);
            }
            // The same constraint stated twice is a single edge.
            if pairs.insert((d, t)) {
                successors[d].push(t);
                in_degree[t] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(i, _)| i)
        .collect();

    let mut sorted: Vec<Task> = Vec::with_capacity(order.len());
    while let Some(i) = ready.pop_first() {
        sorted.push(order[i].clone());
        for &succ in &successors[i] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.insert(succ);
            }
        }
    }

    if sorted.len() < order.len() {
        let members: Vec<&str> = order
            .iter()
            .enumerate()
            .filter(|&(i, _)| in_degree[i] > 0)
            .map(|(_, t)| t.label())
            .collect();
        return Err(CoreError::Cycle(members.join(", ")));
    }
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recording_task(name: &str, log: &Rc<RefCell<Vec<String>>>) -> Task {
        let log = Rc::clone(log);
        let label = name.to_string();
        let entry = name.to_string();
        Task::new(label, move || {
            log.borrow_mut().push(entry.clone());
            Ok(())
        })
    }

    fn failing_task(name: &str) -> Task {
        Task::new(name.to_string(), || {
            Err(CoreError::provider("boom"))
        })
    }

    #[test]
    fn test_independent_tasks_all_run_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recording_task("a", &log);
        let b = recording_task("b", &log);

        let mut sched = Scheduler::new();
        sched.add(a, None);
        sched.add(b, None);
        sched.run(true).unwrap();

        assert_eq!(sched.num_completed(), 2);
        let mut ran = log.borrow().clone();
        ran.sort();
        assert_eq!(ran, ["a", "b"]);
    }

    #[test]
    fn test_chain_runs_dependencies_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let x = recording_task("x", &log);
        let y = recording_task("y", &log);
        let z = recording_task("z", &log);

        let mut sched = Scheduler::new();
        sched.add(x.clone(), Some(y.clone()));
        sched.add(y, Some(z.clone()));
        sched.add(z, None);
        sched.run(true).unwrap();

        assert_eq!(*log.borrow(), ["z", "y", "x"]);
        assert_eq!(sched.num_completed(), 3);
    }

    #[test]
    fn test_shared_dependency_runs_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let shared = recording_task("shared", &log);
        let a = recording_task("a", &log);
        let b = recording_task("b", &log);

        let mut sched = Scheduler::new();
        sched.add(a, Some(shared.clone()));
        sched.add(b, Some(shared));
        sched.run(true).unwrap();

        assert_eq!(sched.num_completed(), 3);
        let count = log.borrow().iter().filter(|s| *s == "shared").count();
        assert_eq!(count, 1);
        assert_eq!(log.borrow()[0], "shared");
    }

    #[test]
    fn test_cycle_fails_without_executing() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recording_task("a", &log);
        let b = recording_task("b", &log);
        let c = recording_task("c", &log);

        let mut sched = Scheduler::new();
        sched.add(a.clone(), Some(b.clone()));
        sched.add(b, Some(c.clone()));
        sched.add(c, Some(a));

        let err = sched.run(true).unwrap_err();
        assert!(err.is_cycle());
        assert!(log.borrow().is_empty());
        assert_eq!(sched.num_completed(), 0);
    }

    #[test]
    fn test_cycle_error_names_a_member() {
        let a = Task::new("alpha", || Ok(()));
        let b = Task::new("beta", || Ok(()));

        let mut sched = Scheduler::new();
        sched.add(a.clone(), Some(b.clone()));
        sched.add(b, Some(a));

        let err = sched.run(true).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("alpha") || msg.contains("beta"), "{msg}");
    }

    #[test]
    fn test_abort_on_error_stops_and_wraps() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let z = recording_task("z", &log);
        let y = failing_task("y");
        let x = recording_task("x", &log);

        let mut sched = Scheduler::new();
        sched.add(x, Some(y.clone()));
        sched.add(y, Some(z.clone()));
        sched.add(z, None);

        let err = sched.run(true).unwrap_err();
        assert!(matches!(err, CoreError::Task { .. }));
        assert_eq!(*log.borrow(), ["z"]);
        assert_eq!(sched.num_completed(), 1);
    }

    #[test]
    fn test_no_abort_propagates_original_error() {
        let mut sched = Scheduler::new();
        sched.add(failing_task("y"), None);

        let err = sched.run(false).unwrap_err();
        assert!(matches!(err, CoreError::Provider(_)));
    }

    #[test]
    fn test_scheduler_is_reusable_across_runs() {
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut sched = Scheduler::new();
        sched.add(recording_task("first", &log), None);
        sched.run(true).unwrap();
        assert_eq!(sched.num_completed(), 1);

        sched.add(recording_task("second", &log), None);
        sched.run(true).unwrap();
        // Counts only the second run.
        assert_eq!(sched.num_completed(), 1);
        assert_eq!(*log.borrow(), ["first", "second"]);
    }

    #[test]
    fn test_duplicate_edges_count_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recording_task("a", &log);
        let b = recording_task("b", &log);

        let mut sched = Scheduler::new();
        sched.add(b.clone(), Some(a.clone()));
        sched.add(b, Some(a));
        sched.run(true).unwrap();

        assert_eq!(sched.num_completed(), 2);
        assert_eq!(*log.borrow(), ["a", "b"]);
    }
}
