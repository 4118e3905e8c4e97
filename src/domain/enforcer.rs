//! Enforcers that keep task dates consistent
//!
//! A [`PrecedenceEnforcer`] belongs to one task and pushes it later until all
//! of its incoming dependencies hold. A [`ContainmentEnforcer`] belongs to one
//! container and keeps its span equal to the hull of its children. Both only
//! compute targets and queue jobs; the engine applies the writes.

use std::collections::HashMap;

use tracing::trace;

use super::dependency::{compute_implied_end, compute_implied_start, Dependency};
use super::graph::GraphError;
use super::id::TaskId;
use super::propagation::{Job, Notifier};
use super::task::{Span, Subscription, Task};

pub(crate) struct PrecedenceEnforcer {
    task: Task,
    _subscription: Subscription,
}

impl PrecedenceEnforcer {
    /// Starts watching `task`; any change queues a settle job for it
    pub(crate) fn attach(task: &Task, notifier: &Notifier) -> Self {
        let notifier = notifier.clone();
        let subscription = task.subscribe(move |task, change| {
            trace!(task = %task.label(), ?change, "task changed");
            notifier.notify(Job::Settle(task.id()));
        });

        Self {
            task: task.clone(),
            _subscription: subscription,
        }
    }

    /// Span the task must take to honour `incoming`, if it differs from now
    ///
    /// The begin is resolved first and shifts the whole task; the end is then
    /// resolved against the shifted span.
    pub(crate) fn target(&self, incoming: &[&Dependency]) -> Option<Span> {
        let current = self.task.span();

        let begin = compute_implied_start(&self.task, current.begin(), incoming.iter().copied());
        let shifted = current.moved_to(begin);
        let end = compute_implied_end(&self.task, shifted.end(), incoming.iter().copied());
        let target = shifted.resized_to(end);

        (target != current).then_some(target)
    }
}

pub(crate) struct ContainmentEnforcer {
    container: Task,
    registered: HashMap<TaskId, Subscription>,
}

impl ContainmentEnforcer {
    pub(crate) fn new(container: &Task) -> Result<Self, GraphError> {
        if !container.is_container() {
            return Err(GraphError::NotAContainer(container.label()));
        }

        Ok(Self {
            container: container.clone(),
            registered: HashMap::new(),
        })
    }

    /// Subscribes to every child not yet watched, returning how many were new
    pub(crate) fn register_listeners(&mut self, notifier: &Notifier) -> usize {
        let container = self.container.id();
        let mut added = 0;

        for child in self.container.children() {
            if self.registered.contains_key(&child.id()) {
                continue;
            }

            let notifier = notifier.clone();
            let subscription = child.subscribe(move |_, _| notifier.notify(Job::Shrink(container)));
            self.registered.insert(child.id(), subscription);
            added += 1;
        }

        added
    }

    /// Stops watching a child, returning true if it was watched
    pub(crate) fn forget(&mut self, child: TaskId) -> bool {
        self.registered.remove(&child).is_some()
    }

    pub(crate) fn watched(&self) -> usize {
        self.registered.len()
    }

    /// Hull of the children, if it differs from the container's span
    ///
    /// A container without children keeps its dates.
    pub(crate) fn target(&self) -> Option<Span> {
        let Some(hull) = self.container.children_hull() else {
            trace!(container = %self.container.label(), "no children to shrink around");
            return None;
        };

        (hull != self.container.span()).then_some(hull)
    }
}
