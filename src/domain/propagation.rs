//! Worklist-driven constraint propagation
//!
//! Enforcers never call each other. A task change makes its listeners queue
//! jobs, and the engine drains the queue until a pass changes nothing. Jobs
//! are de-duplicated while queued, and containment jobs run before
//! precedence jobs so a container always reflects its children before its
//! own outgoing edges are evaluated.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace};

use super::graph::{GraphError, GraphState};
use super::id::TaskId;
use super::task::{Span, Task};

/// Default ceiling on jobs run by one propagation wave
pub const DEFAULT_MAX_STEPS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Job {
    /// Enforce a task's incoming dependencies, then queue its successors
    ///
    /// For a container this also enforces each child against the moved
    /// container and queues a shrink, so direct edits end wrapped.
    Settle(TaskId),
    /// Enforce a task's incoming dependencies
    Enforce(TaskId),
    /// Shrink-wrap a container around its children
    Shrink(TaskId),
}

#[derive(Debug, Default)]
pub(crate) struct Worklist {
    containment: VecDeque<TaskId>,
    precedence: VecDeque<Job>,
    queued: HashSet<Job>,
}

impl Worklist {
    /// Queues a job unless an identical one is already waiting
    pub(crate) fn push(&mut self, job: Job) -> bool {
        if !self.queued.insert(job) {
            return false;
        }
        match job {
            Job::Shrink(id) => self.containment.push_back(id),
            Job::Settle(_) | Job::Enforce(_) => self.precedence.push_back(job),
        }
        true
    }

    pub(crate) fn pop(&mut self) -> Option<Job> {
        let job = self
            .containment
            .pop_front()
            .map(Job::Shrink)
            .or_else(|| self.precedence.pop_front())?;
        self.queued.remove(&job);
        Some(job)
    }

    pub(crate) fn len(&self) -> usize {
        self.containment.len() + self.precedence.len()
    }

    pub(crate) fn clear(&mut self) {
        self.containment.clear();
        self.precedence.clear();
        self.queued.clear();
    }
}

/// Limits applied while draining the worklist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationLimits {
    /// Jobs one wave may run before it is abandoned
    pub max_steps: usize,
}

impl Default for PropagationLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Outcome of one propagation wave
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    steps: usize,
    moved: Vec<TaskId>,
}

impl Propagation {
    /// Number of jobs run
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Tasks whose dates were written, in the order they first moved
    pub fn moved(&self) -> &[TaskId] {
        &self.moved
    }

    /// Returns true if no task was moved
    pub fn is_quiet(&self) -> bool {
        self.moved.is_empty()
    }

    /// Folds another wave into this one
    pub fn merge(&mut self, other: Propagation) {
        self.steps += other.steps;
        for id in other.moved {
            self.record_move(id);
        }
    }

    fn record_move(&mut self, id: TaskId) {
        if !self.moved.contains(&id) {
            self.moved.push(id);
        }
    }
}

/// Shared core of a [`TaskGraph`](super::TaskGraph)
///
/// Graph topology and the worklist live in separate cells so listeners can
/// queue work while a structural edit holds the topology.
pub(crate) struct Engine {
    pub(crate) state: RefCell<GraphState>,
    work: RefCell<Worklist>,
    draining: Cell<bool>,
    limits: PropagationLimits,
}

/// Handle listeners use to queue jobs on an engine without owning it
#[derive(Clone)]
pub(crate) struct Notifier(Weak<Engine>);

impl Notifier {
    /// Queues a job and, outside of a running wave, drains it immediately
    pub(crate) fn notify(&self, job: Job) {
        let Some(engine) = self.0.upgrade() else {
            return;
        };

        engine.enqueue(job);
        if engine.draining.get() {
            return;
        }

        match engine.settle(|| ()) {
            Ok(((), propagation)) if !propagation.is_quiet() => {
                debug!(
                    steps = propagation.steps(),
                    moved = propagation.moved().len(),
                    "propagation settled after direct edit"
                );
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "propagation failed after direct edit"),
        }
    }
}

impl Engine {
    pub(crate) fn new(limits: PropagationLimits) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(GraphState::default()),
            work: RefCell::new(Worklist::default()),
            draining: Cell::new(false),
            limits,
        })
    }

    pub(crate) fn notifier(self: &Rc<Self>) -> Notifier {
        Notifier(Rc::downgrade(self))
    }

    pub(crate) fn limits(&self) -> PropagationLimits {
        self.limits
    }

    pub(crate) fn enqueue(&self, job: Job) {
        self.work.borrow_mut().push(job);
    }

    /// Runs `mutate` with propagation held, then drains to a fixed point
    ///
    /// Nested calls only queue work; the outermost call drains it.
    pub(crate) fn settle<T>(
        &self,
        mutate: impl FnOnce() -> T,
    ) -> Result<(T, Propagation), GraphError> {
        let nested = self.draining.replace(true);
        let value = mutate();
        if nested {
            return Ok((value, Propagation::default()));
        }

        let result = self.drain();
        self.draining.set(false);
        result.map(|propagation| (value, propagation))
    }

    fn drain(&self) -> Result<Propagation, GraphError> {
        let mut propagation = Propagation::default();

        loop {
            let next = self.work.borrow_mut().pop();
            let Some(job) = next else {
                break;
            };

            if propagation.steps >= self.limits.max_steps {
                let pending = {
                    let mut work = self.work.borrow_mut();
                    let pending = work.len() + 1;
                    work.clear();
                    pending
                };
                error!(
                    max_steps = self.limits.max_steps,
                    pending, "propagation did not settle; dropping queued work"
                );
                return Err(GraphError::PropagationLimit(self.limits.max_steps));
            }

            propagation.steps += 1;
            self.run(job, &mut propagation);
        }

        trace!(steps = propagation.steps, "propagation settled");
        Ok(propagation)
    }

    fn run(&self, job: Job, propagation: &mut Propagation) {
        match job {
            Job::Settle(id) => {
                let target = self.state.borrow().precedence_target(id);
                apply(id, target, propagation);

                // Every child of a container is enforced inside this job, so
                // the hull is only taken once all of them have moved.
                let (is_container, children) = {
                    let state = self.state.borrow();
                    (state.is_tracked_container(id), state.linked_children(id))
                };
                for child in children {
                    let target = self.state.borrow().precedence_target(child);
                    apply(child, target, propagation);
                }
                if is_container {
                    self.work.borrow_mut().push(Job::Shrink(id));
                }

                let successors = self.state.borrow().successors(id);
                let mut work = self.work.borrow_mut();
                for successor in successors {
                    work.push(Job::Enforce(successor));
                }
            }
            Job::Enforce(id) => {
                let target = self.state.borrow().precedence_target(id);
                apply(id, target, propagation);
            }
            Job::Shrink(id) => {
                let target = self.state.borrow().containment_target(id);
                apply(id, target, propagation);
            }
        }
    }
}

// Runs with no borrow of the graph state held: the write fires listeners.
fn apply(id: TaskId, target: Option<(Task, Span)>, propagation: &mut Propagation) {
    let Some((task, span)) = target else {
        return;
    };

    trace!(task = %task.label(), from = %task.span(), to = %span, "enforcing dates");
    task.set_span(span);
    propagation.record_move(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> TaskId {
        TaskId::next()
    }

    #[test]
    fn worklist_deduplicates_queued_jobs() {
        let mut work = Worklist::default();
        let a = id();

        assert!(work.push(Job::Settle(a)));
        assert!(!work.push(Job::Settle(a)));
        assert!(work.push(Job::Enforce(a)));
        assert_eq!(work.len(), 2);

        assert_eq!(work.pop(), Some(Job::Settle(a)));
        // Popped jobs may be queued again.
        assert!(work.push(Job::Settle(a)));
    }

    #[test]
    fn containment_jobs_run_first() {
        let mut work = Worklist::default();
        let (a, b, c) = (id(), id(), id());

        work.push(Job::Enforce(a));
        work.push(Job::Settle(b));
        work.push(Job::Shrink(c));

        assert_eq!(work.pop(), Some(Job::Shrink(c)));
        assert_eq!(work.pop(), Some(Job::Enforce(a)));
        assert_eq!(work.pop(), Some(Job::Settle(b)));
        assert_eq!(work.pop(), None);
    }

    #[test]
    fn clear_forgets_queued_jobs() {
        let mut work = Worklist::default();
        let a = id();
        work.push(Job::Shrink(a));
        work.clear();

        assert_eq!(work.len(), 0);
        assert!(work.push(Job::Shrink(a)));
    }

    #[test]
    fn propagation_merge_keeps_first_move_order() {
        let (a, b) = (id(), id());
        let mut first = Propagation::default();
        first.steps = 2;
        first.record_move(a);

        let mut second = Propagation::default();
        second.steps = 3;
        second.record_move(b);
        second.record_move(a);

        first.merge(second);
        assert_eq!(first.steps(), 5);
        assert_eq!(first.moved(), &[a, b]);
        assert!(!first.is_quiet());
    }

    #[test]
    fn default_limits() {
        assert_eq!(PropagationLimits::default().max_steps, DEFAULT_MAX_STEPS);
    }
}
