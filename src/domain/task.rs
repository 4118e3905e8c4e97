//! Task domain model
//!
//! A task is a span of days. Containers hold child tasks and derive their
//! span from them. [`Task`] is a shared handle: cloning it clones the handle,
//! equality and hashing go by [`TaskId`], and every effective change fires the
//! task's listeners synchronously.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use chrono::{NaiveDate, TimeDelta};
use serde::Serialize;
use thiserror::Error;

use super::id::TaskId;

#[derive(Debug, Error, PartialEq)]
pub enum TaskError {
    #[error("Invalid span for {name}: end {end} is before begin {begin}")]
    InvalidSpan {
        name: String,
        begin: NaiveDate,
        end: NaiveDate,
    },

    #[error("Task is not a container: {0}")]
    NotAContainer(String),

    #[error("Adding {child} under {container} would make a task its own ancestor")]
    HierarchyCycle { container: String, child: String },
}

/// Begin and end date of a task, with `end >= begin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    begin: NaiveDate,
    end: NaiveDate,
}

impl Span {
    /// Creates a span, or `None` if `end` is before `begin`
    pub fn new(begin: NaiveDate, end: NaiveDate) -> Option<Self> {
        (end >= begin).then_some(Self { begin, end })
    }

    pub fn begin(&self) -> NaiveDate {
        self.begin
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Length of the span
    pub fn length(&self) -> TimeDelta {
        self.end - self.begin
    }

    /// Moves the span so it starts at `begin`, keeping its length
    pub fn moved_to(&self, begin: NaiveDate) -> Self {
        let end = begin
            .checked_add_signed(self.length())
            .unwrap_or(NaiveDate::MAX);
        Self { begin, end }
    }

    /// Resizes the span to finish at `end`; an end before the begin collapses it
    pub fn resized_to(&self, end: NaiveDate) -> Self {
        Self {
            begin: self.begin,
            end: end.max(self.begin),
        }
    }

    /// Smallest span covering both spans
    pub fn hull(&self, other: &Span) -> Self {
        Self {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }

    /// Returns true if `other` lies entirely inside this span
    pub fn covers(&self, other: &Span) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.begin, self.end)
    }
}

/// Which fundamental property of a task changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyChange {
    BeginDate,
    EndDate,
    /// Begin and end written together
    Span,
    /// Container child set changed
    Children,
}

type ListenerFn = dyn Fn(&Task, PropertyChange);

#[derive(Default)]
struct Listeners {
    next_slot: u64,
    entries: Vec<(u64, Rc<ListenerFn>)>,
}

struct TaskCell {
    id: TaskId,
    name: String,
    span: Cell<Span>,
    /// `Some` for containers, even when they have no children yet
    children: Option<RefCell<Vec<Task>>>,
    listeners: RefCell<Listeners>,
}

/// Shared handle to a schedulable task
#[derive(Clone)]
pub struct Task(Rc<TaskCell>);

impl Task {
    /// Creates a leaf task
    pub fn new(
        name: impl Into<String>,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, TaskError> {
        Self::build(name.into(), begin, end, None)
    }

    /// Creates a container with no children; add them with [`Task::add_child`]
    pub fn container(
        name: impl Into<String>,
        begin: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, TaskError> {
        Self::build(name.into(), begin, end, Some(RefCell::new(Vec::new())))
    }

    fn build(
        name: String,
        begin: NaiveDate,
        end: NaiveDate,
        children: Option<RefCell<Vec<Task>>>,
    ) -> Result<Self, TaskError> {
        let span = Span::new(begin, end).ok_or_else(|| TaskError::InvalidSpan {
            name: name.clone(),
            begin,
            end,
        })?;

        Ok(Self(Rc::new(TaskCell {
            id: TaskId::next(),
            name,
            span: Cell::new(span),
            children,
            listeners: RefCell::new(Listeners::default()),
        })))
    }

    pub fn id(&self) -> TaskId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Name and ID, for messages
    pub fn label(&self) -> String {
        format!("{} ({})", self.0.name, self.0.id)
    }

    pub fn span(&self) -> Span {
        self.0.span.get()
    }

    pub fn begin_date(&self) -> NaiveDate {
        self.span().begin
    }

    pub fn end_date(&self) -> NaiveDate {
        self.span().end
    }

    /// Moves the task to start at `begin`, keeping its length
    pub fn set_begin_date(&self, begin: NaiveDate) {
        let span = self.span().moved_to(begin);
        self.write(span, PropertyChange::BeginDate);
    }

    /// Changes the end date, keeping the begin; clamped to the begin date
    pub fn set_end_date(&self, end: NaiveDate) {
        let span = self.span().resized_to(end);
        self.write(span, PropertyChange::EndDate);
    }

    /// Writes both dates with a single notification
    pub fn set_span(&self, span: Span) {
        self.write(span, PropertyChange::Span);
    }

    fn write(&self, span: Span, change: PropertyChange) {
        if self.0.span.get() == span {
            return;
        }
        self.0.span.set(span);
        self.fire(change);
    }

    pub fn is_container(&self) -> bool {
        self.0.children.is_some()
    }

    /// Snapshot of the direct children (empty for leaf tasks)
    pub fn children(&self) -> Vec<Task> {
        self.0
            .children
            .as_ref()
            .map(|children| children.borrow().clone())
            .unwrap_or_default()
    }

    /// Appends a child to this container
    ///
    /// Adding a task that is already a child is a no-op.
    pub fn add_child(&self, child: Task) -> Result<(), TaskError> {
        let children = self
            .0
            .children
            .as_ref()
            .ok_or_else(|| TaskError::NotAContainer(self.label()))?;

        if child == *self || child.is_ancestor_of(self) {
            return Err(TaskError::HierarchyCycle {
                container: self.label(),
                child: child.label(),
            });
        }

        if children.borrow().contains(&child) {
            return Ok(());
        }

        children.borrow_mut().push(child);
        self.fire(PropertyChange::Children);
        Ok(())
    }

    /// Removes a direct child, returning true if it was present
    pub fn remove_child(&self, child: &Task) -> bool {
        let Some(children) = self.0.children.as_ref() else {
            return false;
        };

        let removed = {
            let mut children = children.borrow_mut();
            let len_before = children.len();
            children.retain(|c| c != child);
            children.len() != len_before
        };

        if removed {
            self.fire(PropertyChange::Children);
        }
        removed
    }

    /// Returns true if `other` is somewhere below this task
    pub fn is_ancestor_of(&self, other: &Task) -> bool {
        self.descendants().iter().any(|d| d == other)
    }

    /// All tasks below this one, parents before their children
    pub fn descendants(&self) -> Vec<Task> {
        let mut result = Vec::new();
        let mut stack: Vec<Task> = self.children().into_iter().rev().collect();

        while let Some(task) = stack.pop() {
            stack.extend(task.children().into_iter().rev());
            result.push(task);
        }

        result
    }

    /// Earliest begin date among the children
    pub fn smallest_begin_from_children(&self) -> Option<NaiveDate> {
        self.children().iter().map(Task::begin_date).min()
    }

    /// Latest end date among the children
    pub fn biggest_end_from_children(&self) -> Option<NaiveDate> {
        self.children().iter().map(Task::end_date).max()
    }

    /// Span exactly covering all children, or `None` without children
    pub fn children_hull(&self) -> Option<Span> {
        let begin = self.smallest_begin_from_children()?;
        let end = self.biggest_end_from_children()?;
        Span::new(begin, end)
    }

    /// Registers a listener for changes to this task's fundamental properties
    ///
    /// The listener stays registered for as long as the returned
    /// [`Subscription`] is alive.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Task, PropertyChange) + 'static,
    {
        let mut listeners = self.0.listeners.borrow_mut();
        let slot = listeners.next_slot;
        listeners.next_slot += 1;
        listeners.entries.push((slot, Rc::new(listener)));

        Subscription {
            task: Rc::downgrade(&self.0),
            slot,
        }
    }

    /// Number of listeners currently registered
    pub fn listener_count(&self) -> usize {
        self.0.listeners.borrow().entries.len()
    }

    fn fire(&self, change: PropertyChange) {
        // Snapshot so listeners may subscribe or unsubscribe while we iterate.
        let snapshot: Vec<Rc<ListenerFn>> = self
            .0
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(self, change);
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("span", &self.span())
            .field("container", &self.is_container())
            .finish()
    }
}

/// Registration handle returned by [`Task::subscribe`]
///
/// Dropping the handle unregisters the listener.
#[must_use = "dropping a subscription unregisters its listener"]
pub struct Subscription {
    task: Weak<TaskCell>,
    slot: u64,
}

impl Subscription {
    /// Returns true while the listener is still registered on a live task
    pub fn is_active(&self) -> bool {
        self.task.upgrade().is_some_and(|cell| {
            cell.listeners
                .borrow()
                .entries
                .iter()
                .any(|(slot, _)| *slot == self.slot)
        })
    }

    /// Unregisters the listener now
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cell) = self.task.upgrade() {
            cell.listeners
                .borrow_mut()
                .entries
                .retain(|(slot, _)| *slot != self.slot);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("slot", &self.slot)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn counting(task: &Task) -> (Rc<Cell<usize>>, Subscription) {
        let count = Rc::new(Cell::new(0));
        let seen = Rc::clone(&count);
        let subscription = task.subscribe(move |_, _| seen.set(seen.get() + 1));
        (count, subscription)
    }

    #[test]
    fn rejects_inverted_span() {
        let result = Task::new("Bad", day(5), day(2));
        assert!(matches!(result, Err(TaskError::InvalidSpan { .. })));
    }

    #[test]
    fn set_begin_keeps_length() {
        let task = Task::new("Build", day(1), day(4)).unwrap();
        task.set_begin_date(day(10));

        assert_eq!(task.begin_date(), day(10));
        assert_eq!(task.end_date(), day(13));
    }

    #[test]
    fn set_end_resizes_and_clamps() {
        let task = Task::new("Build", day(5), day(8)).unwrap();

        task.set_end_date(day(12));
        assert_eq!(task.span(), Span::new(day(5), day(12)).unwrap());

        task.set_end_date(day(1));
        assert_eq!(task.span(), Span::new(day(5), day(5)).unwrap());
    }

    #[test]
    fn equal_write_does_not_notify() {
        let task = Task::new("Build", day(1), day(4)).unwrap();
        let (count, _subscription) = counting(&task);

        task.set_begin_date(day(1));
        task.set_end_date(day(4));
        assert_eq!(count.get(), 0);

        task.set_begin_date(day(2));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let task = Task::new("Build", day(1), day(4)).unwrap();
        let (count, subscription) = counting(&task);
        assert_eq!(task.listener_count(), 1);
        assert!(subscription.is_active());

        subscription.cancel();
        assert_eq!(task.listener_count(), 0);

        task.set_begin_date(day(3));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn listener_sees_change_kind() {
        let task = Task::new("Build", day(1), day(4)).unwrap();
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&changes);
        let _subscription = task.subscribe(move |_, change| sink.borrow_mut().push(change));

        task.set_begin_date(day(2));
        task.set_end_date(day(9));
        task.set_span(Span::new(day(1), day(2)).unwrap());

        assert_eq!(
            *changes.borrow(),
            vec![
                PropertyChange::BeginDate,
                PropertyChange::EndDate,
                PropertyChange::Span
            ]
        );
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let task = Task::new("Build", day(1), day(4)).unwrap();
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&slot);
        let subscription = task.subscribe(move |_, _| {
            inner.borrow_mut().take();
        });
        *slot.borrow_mut() = Some(subscription);

        task.set_begin_date(day(2));
        assert_eq!(task.listener_count(), 0);
    }

    #[test]
    fn leaf_rejects_children() {
        let leaf = Task::new("Leaf", day(1), day(2)).unwrap();
        let other = Task::new("Other", day(1), day(2)).unwrap();

        assert!(matches!(
            leaf.add_child(other),
            Err(TaskError::NotAContainer(_))
        ));
    }

    #[test]
    fn container_rejects_ancestor_as_child() {
        let outer = Task::container("Outer", day(1), day(2)).unwrap();
        let inner = Task::container("Inner", day(1), day(2)).unwrap();
        outer.add_child(inner.clone()).unwrap();

        assert!(matches!(
            inner.add_child(outer.clone()),
            Err(TaskError::HierarchyCycle { .. })
        ));
        assert!(matches!(
            outer.add_child(outer.clone()),
            Err(TaskError::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn add_and_remove_children_notify() {
        let container = Task::container("Phase", day(1), day(2)).unwrap();
        let child = Task::new("Step", day(3), day(6)).unwrap();
        let (count, _subscription) = counting(&container);

        container.add_child(child.clone()).unwrap();
        container.add_child(child.clone()).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(container.children(), vec![child.clone()]);

        assert!(container.remove_child(&child));
        assert!(!container.remove_child(&child));
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn children_bounds() {
        let container = Task::container("Phase", day(1), day(2)).unwrap();
        assert_eq!(container.children_hull(), None);

        container
            .add_child(Task::new("X", day(2), day(6)).unwrap())
            .unwrap();
        container
            .add_child(Task::new("Y", day(1), day(4)).unwrap())
            .unwrap();

        assert_eq!(container.smallest_begin_from_children(), Some(day(1)));
        assert_eq!(container.biggest_end_from_children(), Some(day(6)));
        assert_eq!(
            container.children_hull(),
            Span::new(day(1), day(6))
        );
    }

    #[test]
    fn descendants_are_preordered() {
        let root = Task::container("Root", day(1), day(2)).unwrap();
        let phase = Task::container("Phase", day(1), day(2)).unwrap();
        let step = Task::new("Step", day(1), day(2)).unwrap();
        let last = Task::new("Last", day(1), day(2)).unwrap();
        phase.add_child(step.clone()).unwrap();
        root.add_child(phase.clone()).unwrap();
        root.add_child(last.clone()).unwrap();

        assert_eq!(root.descendants(), vec![phase, step.clone(), last]);
        assert!(root.is_ancestor_of(&step));
        assert!(!step.is_ancestor_of(&root));
    }

    #[test]
    fn identity_not_value() {
        let a = Task::new("Same", day(1), day(2)).unwrap();
        let b = Task::new("Same", day(1), day(2)).unwrap();

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn span_helpers() {
        let span = Span::new(day(2), day(5)).unwrap();
        let other = Span::new(day(4), day(9)).unwrap();

        assert_eq!(span.length(), TimeDelta::days(3));
        assert_eq!(span.hull(&other), Span::new(day(2), day(9)).unwrap());
        assert!(span.hull(&other).covers(&span));
        assert!(!span.covers(&other));
        assert_eq!(span.to_string(), "2024-03-02..2024-03-05");
    }
}
