//! Task graph with reactive constraint enforcement
//!
//! [`TaskGraph`] owns the tasks and dependencies of a schedule and keeps them
//! consistent: every dependency holds, and every container spans exactly its
//! children. Structural edits validate first, apply second and then drain
//! the propagation worklist; direct date edits on a task in the graph
//! propagate the same way through the task's listeners.
//!
//! Topology is stored in a petgraph [`StableDiGraph`] so node indices stay
//! valid across removals.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use thiserror::Error;
use tracing::{debug, trace};

use super::acyclic::BoundaryGraph;
use super::dependency::{Boundary, Dependency, DependencyType};
use super::enforcer::{ContainmentEnforcer, PrecedenceEnforcer};
use super::id::TaskId;
use super::propagation::{Engine, Job, Notifier, Propagation, PropagationLimits};
use super::task::{Span, Task, TaskError};

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Task not found in graph: {0}")]
    TaskNotFound(String),

    #[error("Task already in graph: {0}")]
    TaskAlreadyPresent(String),

    #[error("Task {0} appears under more than one container")]
    MultipleParents(String),

    #[error("Child {child} of {container} is already in the graph outside it")]
    ForeignChild { container: String, child: String },

    #[error("Task is not a container: {0}")]
    NotAContainer(String),

    #[error("No enforcer registered for task {0}")]
    UnregisteredTask(String),

    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(String),

    #[error("Dependency already exists between these tasks: {0}")]
    DuplicateDependency(String),

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Containment dependency is managed by the graph: {0}")]
    StructuralDependency(String),

    #[error("End of container {0} follows its children and cannot be constrained")]
    DerivedBoundary(String),

    #[error("Adding dependency would create a cycle: {0}")]
    CycleDetected(String),

    #[error("Propagation did not settle within {0} steps")]
    PropagationLimit(usize),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Jobs queued while inserting a subtree
#[derive(Debug, Default)]
struct Inserted {
    /// Containers, deepest first
    shrink: Vec<TaskId>,
    enforce: Vec<TaskId>,
}

impl Inserted {
    fn enqueue(self, engine: &Engine) {
        for id in self.shrink {
            engine.enqueue(Job::Shrink(id));
        }
        for id in self.enforce {
            engine.enqueue(Job::Enforce(id));
        }
    }
}

/// Topology and enforcer registries behind a [`TaskGraph`]
#[derive(Default)]
pub(crate) struct GraphState {
    graph: StableDiGraph<Task, Dependency>,
    nodes: HashMap<TaskId, NodeIndex>,
    precedence: HashMap<TaskId, PrecedenceEnforcer>,
    containment: HashMap<TaskId, ContainmentEnforcer>,
    /// Child to container, for children linked by containment edges
    parents: HashMap<TaskId, TaskId>,
    top_level: Vec<Task>,
}

impl GraphState {
    fn contains(&self, task: &Task) -> bool {
        self.nodes.contains_key(&task.id())
    }

    fn task(&self, id: TaskId) -> Option<&Task> {
        self.nodes
            .get(&id)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    fn require(&self, task: &Task) -> Result<NodeIndex, GraphError> {
        self.nodes
            .get(&task.id())
            .copied()
            .ok_or_else(|| GraphError::TaskNotFound(task.label()))
    }

    fn is_structural(&self, source: TaskId, destination: TaskId) -> bool {
        self.parents.get(&source) == Some(&destination)
            || self.parents.get(&destination) == Some(&source)
    }

    fn find_edge(&self, dependency: &Dependency) -> Option<EdgeIndex> {
        let source = *self.nodes.get(&dependency.source().id())?;
        let destination = *self.nodes.get(&dependency.destination().id())?;
        let edge = self.graph.find_edge(source, destination)?;

        (self.graph.edge_weight(edge)?.kind() == dependency.kind()).then_some(edge)
    }

    pub(crate) fn successors(&self, id: TaskId) -> Vec<TaskId> {
        let Some(idx) = self.nodes.get(&id) else {
            return Vec::new();
        };

        self.graph
            .neighbors_directed(*idx, Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n))
            .map(Task::id)
            .collect()
    }

    pub(crate) fn is_tracked_container(&self, id: TaskId) -> bool {
        self.containment.contains_key(&id)
    }

    /// Children of `id` tied to it by containment edges, in child order
    pub(crate) fn linked_children(&self, id: TaskId) -> Vec<TaskId> {
        let Some(container) = self.task(id) else {
            return Vec::new();
        };

        container
            .children()
            .iter()
            .map(Task::id)
            .filter(|child| self.parents.get(child) == Some(&id))
            .collect()
    }

    fn incoming(&self, idx: NodeIndex) -> Vec<&Dependency> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| edge.weight())
            .collect()
    }

    /// Span a task must move to for its incoming dependencies to hold
    pub(crate) fn precedence_target(&self, id: TaskId) -> Option<(Task, Span)> {
        let (Some(enforcer), Some(idx)) = (self.precedence.get(&id), self.nodes.get(&id)) else {
            trace!(task = %id, "skipping job for a task no longer in the graph");
            return None;
        };

        let span = enforcer.target(&self.incoming(*idx))?;
        Some((self.task(id)?.clone(), span))
    }

    /// Span a container must take to wrap its children
    pub(crate) fn containment_target(&self, id: TaskId) -> Option<(Task, Span)> {
        let Some(enforcer) = self.containment.get(&id) else {
            trace!(task = %id, "skipping job for a container no longer in the graph");
            return None;
        };

        let span = enforcer.target()?;
        Some((self.task(id)?.clone(), span))
    }

    /// Rejects a task subtree that overlaps the graph or repeats a task
    fn check_insertable(&self, task: &Task) -> Result<(), GraphError> {
        let mut seen = HashSet::new();

        for t in std::iter::once(task.clone()).chain(task.descendants()) {
            if self.contains(&t) {
                return Err(GraphError::TaskAlreadyPresent(t.label()));
            }
            if !seen.insert(t.id()) {
                return Err(GraphError::MultipleParents(t.label()));
            }
        }

        Ok(())
    }

    fn insert_subtree(
        &mut self,
        task: &Task,
        notifier: &Notifier,
        jobs: &mut Inserted,
    ) -> Result<(), GraphError> {
        let idx = self.graph.add_node(task.clone());
        self.nodes.insert(task.id(), idx);
        self.precedence
            .insert(task.id(), PrecedenceEnforcer::attach(task, notifier));

        if !task.is_container() {
            return Ok(());
        }

        let mut enforcer = ContainmentEnforcer::new(task)?;
        enforcer.register_listeners(notifier);
        self.containment.insert(task.id(), enforcer);

        for child in task.children() {
            self.insert_subtree(&child, notifier, jobs)?;
            self.link_child(task, &child, jobs)?;
        }

        jobs.shrink.push(task.id());
        Ok(())
    }

    /// Adds the hidden edges tying a child to its container
    fn link_child(
        &mut self,
        container: &Task,
        child: &Task,
        jobs: &mut Inserted,
    ) -> Result<(), GraphError> {
        self.insert_edge(Dependency::hidden(
            child.clone(),
            container.clone(),
            DependencyType::EndEnd,
        ))?;
        self.insert_edge(Dependency::hidden(
            container.clone(),
            child.clone(),
            DependencyType::StartStart,
        ))?;
        self.parents.insert(child.id(), container.id());

        jobs.enforce.push(container.id());
        jobs.enforce.push(child.id());
        Ok(())
    }

    fn insert_edge(&mut self, dependency: Dependency) -> Result<(), GraphError> {
        let source = self.require(dependency.source())?;
        let destination = self.require(dependency.destination())?;
        self.graph.add_edge(source, destination, dependency);
        Ok(())
    }

    /// Removes a task and everything below it, returning surviving successors
    fn remove_subtree(&mut self, task: &Task) -> Vec<TaskId> {
        let mut downstream = Vec::new();
        self.remove_recursive(task, &mut downstream);

        let mut seen = HashSet::new();
        downstream.retain(|id| self.nodes.contains_key(id) && seen.insert(*id));
        downstream
    }

    fn remove_recursive(&mut self, task: &Task, downstream: &mut Vec<TaskId>) {
        let id = task.id();
        let Some(idx) = self.nodes.remove(&id) else {
            return;
        };

        downstream.extend(
            self.graph
                .neighbors_directed(idx, Direction::Outgoing)
                .filter_map(|n| self.graph.node_weight(n))
                .map(Task::id),
        );
        self.graph.remove_node(idx);
        self.precedence.remove(&id);
        self.containment.remove(&id);
        self.top_level.retain(|t| t != task);

        if let Some(parent) = self.parents.remove(&id) {
            if let Some(enforcer) = self.containment.get_mut(&parent) {
                enforcer.forget(id);
            }
        }

        for child in task.children() {
            self.remove_recursive(&child, downstream);
        }
    }

    fn check_dependency(&self, dependency: &Dependency) -> Result<(), GraphError> {
        let source = dependency.source();
        let destination = dependency.destination();
        let source_idx = self.require(source)?;
        let destination_idx = self.require(destination)?;

        if !self.precedence.contains_key(&destination.id()) {
            return Err(GraphError::UnregisteredTask(destination.label()));
        }
        if source == destination {
            return Err(GraphError::SelfDependency(source.label()));
        }
        if self.graph.find_edge(source_idx, destination_idx).is_some() {
            return Err(GraphError::DuplicateDependency(dependency.to_string()));
        }
        if destination.is_container() && dependency.constrains(Boundary::End) {
            return Err(GraphError::DerivedBoundary(destination.label()));
        }

        let mut boundaries = self.boundary_graph();
        boundaries.add_dependency(
            source.id(),
            source.is_container(),
            destination.id(),
            dependency.kind(),
        );
        if boundaries.is_cyclic() {
            return Err(GraphError::CycleDetected(dependency.to_string()));
        }

        Ok(())
    }

    fn boundary_graph(&self) -> BoundaryGraph {
        let mut boundaries = BoundaryGraph::default();

        for task in self.graph.node_weights() {
            boundaries.add_task(task.id(), task.is_container());
        }
        for (child, container) in &self.parents {
            let child_is_container = self.containment.contains_key(child);
            boundaries.add_containment(*container, *child, child_is_container);
        }
        for dependency in self.graph.edge_weights() {
            let source = dependency.source();
            let destination = dependency.destination();
            if self.is_structural(source.id(), destination.id()) {
                continue;
            }
            boundaries.add_dependency(
                source.id(),
                source.is_container(),
                destination.id(),
                dependency.kind(),
            );
        }

        boundaries
    }
}

/// Schedule graph that keeps tasks consistent as they change
pub struct TaskGraph {
    engine: Rc<Engine>,
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    /// Creates an empty graph with default propagation limits
    pub fn new() -> Self {
        Self::with_limits(PropagationLimits::default())
    }

    pub fn with_limits(limits: PropagationLimits) -> Self {
        Self {
            engine: Engine::new(limits),
        }
    }

    pub fn limits(&self) -> PropagationLimits {
        self.engine.limits()
    }

    /// Adds a root-level task and everything below it
    ///
    /// The task joins [`TaskGraph::top_level_tasks`] only once it has been
    /// inserted; a rejected task is not recorded as top-level.
    pub fn add_top_level(&self, task: &Task) -> Result<Propagation, GraphError> {
        let propagation = self.add_task(task)?;
        self.engine.state.borrow_mut().top_level.push(task.clone());
        Ok(propagation)
    }

    /// Adds several root-level tasks in order, stopping at the first error
    pub fn add_top_level_all<'a>(
        &self,
        tasks: impl IntoIterator<Item = &'a Task>,
    ) -> Result<Propagation, GraphError> {
        let mut total = Propagation::default();
        for task in tasks {
            total.merge(self.add_top_level(task)?);
        }
        Ok(total)
    }

    /// Adds several tasks in order, stopping at the first error
    pub fn add_tasks<'a>(
        &self,
        tasks: impl IntoIterator<Item = &'a Task>,
    ) -> Result<Propagation, GraphError> {
        let mut total = Propagation::default();
        for task in tasks {
            total.merge(self.add_task(task)?);
        }
        Ok(total)
    }

    /// Adds a task, its enforcers and, for a container, its whole subtree
    ///
    /// Each child is tied to its container by a hidden end-end edge (child to
    /// container) and a hidden start-start edge (container to child).
    /// Containers are then shrink-wrapped, deepest first.
    pub fn add_task(&self, task: &Task) -> Result<Propagation, GraphError> {
        self.engine.state.borrow().check_insertable(task)?;

        let notifier = self.engine.notifier();
        let (inserted, propagation) = self.engine.settle(|| {
            let mut jobs = Inserted::default();
            self.engine
                .state
                .borrow_mut()
                .insert_subtree(task, &notifier, &mut jobs)?;
            jobs.enqueue(&self.engine);
            Ok::<_, GraphError>(())
        })?;
        inserted?;

        debug!(
            task = %task.label(),
            container = task.is_container(),
            moved = propagation.moved().len(),
            "task added"
        );
        Ok(propagation)
    }

    /// Removes a task, its enforcers, its edges and everything below it
    ///
    /// Tasks that depended on it are enforced again; dates already pushed
    /// stay where they are. A task inside a container is detached from it and
    /// the container shrinks to its remaining children.
    pub fn remove_task(&self, task: &Task) -> Result<Propagation, GraphError> {
        self.engine.state.borrow().require(task)?;

        let ((), propagation) = self.engine.settle(|| {
            let parent = {
                let state = self.engine.state.borrow();
                state
                    .parents
                    .get(&task.id())
                    .and_then(|id| state.task(*id))
                    .cloned()
            };

            let downstream = self.engine.state.borrow_mut().remove_subtree(task);
            for id in downstream {
                self.engine.enqueue(Job::Enforce(id));
            }

            if let Some(parent) = parent {
                parent.remove_child(task);
                self.engine.enqueue(Job::Shrink(parent.id()));
            }
        })?;

        debug!(task = %task.label(), moved = propagation.moved().len(), "task removed");
        Ok(propagation)
    }

    /// Adds a dependency and enforces its destination
    pub fn add_dependency(&self, dependency: Dependency) -> Result<Propagation, GraphError> {
        self.engine.state.borrow().check_dependency(&dependency)?;

        let label = dependency.to_string();
        let destination = dependency.destination().id();
        let (inserted, propagation) = self.engine.settle(|| {
            self.engine.state.borrow_mut().insert_edge(dependency)?;
            self.engine.enqueue(Job::Enforce(destination));
            Ok::<_, GraphError>(())
        })?;
        inserted?;

        debug!(dependency = %label, moved = propagation.moved().len(), "dependency added");
        Ok(propagation)
    }

    /// Removes a user dependency and re-enforces its destination
    ///
    /// The destination keeps its current dates; only its remaining
    /// constraints are applied.
    pub fn remove_dependency(&self, dependency: &Dependency) -> Result<Propagation, GraphError> {
        let edge = {
            let state = self.engine.state.borrow();
            let edge = state
                .find_edge(dependency)
                .ok_or_else(|| GraphError::DependencyNotFound(dependency.to_string()))?;

            let destination = dependency.destination();
            if state.is_structural(dependency.source().id(), destination.id()) {
                return Err(GraphError::StructuralDependency(dependency.to_string()));
            }
            if !state.precedence.contains_key(&destination.id()) {
                return Err(GraphError::UnregisteredTask(destination.label()));
            }
            edge
        };

        let destination = dependency.destination().id();
        let ((), propagation) = self.engine.settle(|| {
            self.engine.state.borrow_mut().graph.remove_edge(edge);
            self.engine.enqueue(Job::Enforce(destination));
        })?;

        debug!(dependency = %dependency, "dependency removed");
        Ok(propagation)
    }

    /// Brings the graph in line after children were added to a container
    ///
    /// Children not yet in the graph are inserted with their subtrees and
    /// tied to the container; every child is then watched, and the container
    /// shrink-wraps around them.
    pub fn children_added_to(&self, container: &Task) -> Result<Propagation, GraphError> {
        let fresh = {
            let state = self.engine.state.borrow();
            state.require(container)?;
            if !container.is_container() {
                return Err(GraphError::NotAContainer(container.label()));
            }
            if !state.containment.contains_key(&container.id()) {
                return Err(GraphError::UnregisteredTask(container.label()));
            }

            let mut fresh = Vec::new();
            for child in container.children() {
                if !state.contains(&child) {
                    state.check_insertable(&child)?;
                    fresh.push(child);
                } else if state.parents.get(&child.id()) != Some(&container.id()) {
                    return Err(GraphError::ForeignChild {
                        container: container.label(),
                        child: child.label(),
                    });
                }
            }
            fresh
        };

        let notifier = self.engine.notifier();
        let (inserted, propagation) = self.engine.settle(|| {
            let mut jobs = Inserted::default();
            let registered = {
                let mut state = self.engine.state.borrow_mut();
                for child in &fresh {
                    state.insert_subtree(child, &notifier, &mut jobs)?;
                    state.link_child(container, child, &mut jobs)?;
                }
                state
                    .containment
                    .get_mut(&container.id())
                    .map(|enforcer| enforcer.register_listeners(&notifier))
                    .unwrap_or_default()
            };

            jobs.shrink.push(container.id());
            jobs.enqueue(&self.engine);
            Ok::<_, GraphError>(registered)
        })?;
        let registered = inserted?;

        debug!(
            container = %container.label(),
            inserted = fresh.len(),
            registered,
            moved = propagation.moved().len(),
            "children added"
        );
        Ok(propagation)
    }

    /// Enforces every dependency and containment rule from scratch
    pub fn enforce_all_restrictions(&self) -> Result<Propagation, GraphError> {
        let ((), propagation) = self.engine.settle(|| {
            let state = self.engine.state.borrow();
            for task in state.graph.node_weights() {
                self.engine.enqueue(Job::Enforce(task.id()));
                if task.is_container() {
                    self.engine.enqueue(Job::Shrink(task.id()));
                }
            }
        })?;

        debug!(
            steps = propagation.steps(),
            moved = propagation.moved().len(),
            "all restrictions enforced"
        );
        Ok(propagation)
    }

    /// Runs direct task edits as a single propagation wave
    ///
    /// Listeners triggered inside `edit` only queue work; it is drained once
    /// `edit` returns, and the result reports what moved.
    pub fn edit(&self, edit: impl FnOnce()) -> Result<Propagation, GraphError> {
        let ((), propagation) = self.engine.settle(edit)?;
        Ok(propagation)
    }

    pub fn contains_task(&self, task: &Task) -> bool {
        self.engine.state.borrow().contains(task)
    }

    /// Returns true if this exact dependency (same endpoints and kind) exists
    pub fn contains_dependency(&self, dependency: &Dependency) -> bool {
        self.engine.state.borrow().find_edge(dependency).is_some()
    }

    /// Snapshot of every task in the graph
    pub fn tasks(&self) -> HashSet<Task> {
        self.engine.state.borrow().graph.node_weights().cloned().collect()
    }

    /// Snapshot of the root-level tasks, in insertion order
    pub fn top_level_tasks(&self) -> Vec<Task> {
        self.engine.state.borrow().top_level.clone()
    }

    /// Snapshot of the dependencies that are meant to be displayed
    pub fn visible_dependencies(&self) -> Vec<Dependency> {
        self.engine
            .state
            .borrow()
            .graph
            .edge_weights()
            .filter(|dependency| dependency.is_visible())
            .cloned()
            .collect()
    }

    /// Snapshot of every dependency, including containment edges
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.engine
            .state
            .borrow()
            .graph
            .edge_weights()
            .cloned()
            .collect()
    }

    /// Dependencies pointing at `task`
    pub fn incoming(&self, task: &Task) -> Vec<Dependency> {
        let state = self.engine.state.borrow();
        match state.nodes.get(&task.id()) {
            Some(idx) => state.incoming(*idx).into_iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Container `task` is tied to, if any
    pub fn parent_of(&self, task: &Task) -> Option<Task> {
        let state = self.engine.state.borrow();
        state
            .parents
            .get(&task.id())
            .and_then(|id| state.task(*id))
            .cloned()
    }

    /// Looks a task up by ID
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.engine.state.borrow().task(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.engine.state.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tasks with a precedence enforcer
    pub fn precedence_enforcers(&self) -> usize {
        self.engine.state.borrow().precedence.len()
    }

    /// Number of containers with a containment enforcer
    pub fn containment_enforcers(&self) -> usize {
        self.engine.state.borrow().containment.len()
    }

    /// Number of children the container's enforcer is watching
    pub fn watched_children(&self, container: &Task) -> usize {
        self.engine
            .state
            .borrow()
            .containment
            .get(&container.id())
            .map(ContainmentEnforcer::watched)
            .unwrap_or_default()
    }

    /// Dependencies whose destination currently violates them
    pub fn unsatisfied_dependencies(&self) -> Vec<Dependency> {
        self.engine
            .state
            .borrow()
            .graph
            .edge_weights()
            .filter(|dependency| !dependency.is_satisfied())
            .cloned()
            .collect()
    }

    /// Containers in the graph whose span is not exactly their children's hull
    pub fn unwrapped_containers(&self) -> Vec<Task> {
        self.engine
            .state
            .borrow()
            .graph
            .node_weights()
            .filter(|task| {
                task.children_hull()
                    .is_some_and(|hull| hull != task.span())
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn task(name: &str, begin: u32, end: u32) -> Task {
        Task::new(name, day(begin), day(end)).unwrap()
    }

    fn container(name: &str, children: &[&Task]) -> Task {
        let c = Task::container(name, day(1), day(1)).unwrap();
        for child in children {
            c.add_child((*child).clone()).unwrap();
        }
        c
    }

    #[test]
    fn empty_graph() {
        let graph = TaskGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert!(graph.tasks().is_empty());
        assert_eq!(graph.limits(), PropagationLimits::default());
    }

    #[test]
    fn add_task_registers_enforcer() {
        let graph = TaskGraph::new();
        let a = task("A", 1, 3);

        let propagation = graph.add_top_level(&a).unwrap();
        assert!(propagation.is_quiet());
        assert!(graph.contains_task(&a));
        assert_eq!(graph.precedence_enforcers(), 1);
        assert_eq!(graph.top_level_tasks(), vec![a.clone()]);
        assert_eq!(a.listener_count(), 1);
    }

    #[test]
    fn add_task_twice_is_rejected() {
        let graph = TaskGraph::new();
        let a = task("A", 1, 3);
        graph.add_task(&a).unwrap();

        assert!(matches!(
            graph.add_task(&a),
            Err(GraphError::TaskAlreadyPresent(_))
        ));
        assert_eq!(a.listener_count(), 1);
    }

    #[test]
    fn rejected_top_level_is_not_recorded() {
        let graph = TaskGraph::new();
        let a = task("A", 1, 3);
        graph.add_task(&a).unwrap();

        assert!(graph.add_top_level(&a).is_err());
        assert!(graph.top_level_tasks().is_empty());

        let b = task("B", 1, 2);
        assert!(graph.add_top_level_all([&b, &a]).is_err());
        assert_eq!(graph.top_level_tasks(), vec![b]);
    }

    #[test]
    fn task_under_two_containers_is_rejected() {
        let shared = task("Shared", 1, 2);
        let left = container("Left", &[&shared]);
        let right = container("Right", &[&shared]);
        let root = container("Root", &[&left, &right]);

        let graph = TaskGraph::new();
        assert!(matches!(
            graph.add_task(&root),
            Err(GraphError::MultipleParents(_))
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn container_insertion_adds_hidden_edges() {
        let x = task("X", 3, 5);
        let y = task("Y", 4, 9);
        let phase = container("Phase", &[&x, &y]);

        let graph = TaskGraph::new();
        graph.add_top_level(&phase).unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.containment_enforcers(), 1);
        assert_eq!(graph.watched_children(&phase), 2);
        assert_eq!(graph.dependencies().len(), 4);
        assert!(graph.visible_dependencies().is_empty());
        assert!(graph.contains_dependency(&Dependency::hidden(
            x.clone(),
            phase.clone(),
            DependencyType::EndEnd
        )));
        assert_eq!(graph.parent_of(&x), Some(phase.clone()));
        assert_eq!(phase.span(), Span::new(day(3), day(9)).unwrap());
        assert_eq!(graph.top_level_tasks(), vec![phase]);
    }

    #[test]
    fn dependency_validation() {
        let graph = TaskGraph::new();
        let a = task("A", 1, 2);
        let b = task("B", 3, 4);
        let outside = task("Outside", 1, 2);
        graph.add_tasks([&a, &b]).unwrap();

        let missing = Dependency::new(a.clone(), outside, DependencyType::EndStart);
        assert!(matches!(
            graph.add_dependency(missing),
            Err(GraphError::TaskNotFound(_))
        ));

        let own = Dependency::new(a.clone(), a.clone(), DependencyType::EndEnd);
        assert!(matches!(
            graph.add_dependency(own),
            Err(GraphError::SelfDependency(_))
        ));

        graph
            .add_dependency(Dependency::new(a.clone(), b.clone(), DependencyType::EndStart))
            .unwrap();
        let again = Dependency::new(a.clone(), b.clone(), DependencyType::StartStart);
        assert!(matches!(
            graph.add_dependency(again),
            Err(GraphError::DuplicateDependency(_))
        ));

        let back = Dependency::new(b, a, DependencyType::EndStart);
        assert!(matches!(
            graph.add_dependency(back),
            Err(GraphError::CycleDetected(_))
        ));
    }

    #[test]
    fn container_end_cannot_be_constrained() {
        let x = task("X", 1, 2);
        let phase = container("Phase", &[&x]);
        let a = task("A", 1, 9);

        let graph = TaskGraph::new();
        graph.add_tasks([&phase, &a]).unwrap();

        let ee = Dependency::new(a.clone(), phase.clone(), DependencyType::EndEnd);
        assert!(matches!(
            graph.add_dependency(ee),
            Err(GraphError::DerivedBoundary(_))
        ));

        let es = Dependency::new(a, phase.clone(), DependencyType::EndStart);
        graph.add_dependency(es).unwrap();
        assert_eq!(phase.begin_date(), day(9));
        assert_eq!(x.begin_date(), day(9));
    }

    #[test]
    fn structural_dependency_cannot_be_removed() {
        let x = task("X", 1, 2);
        let phase = container("Phase", &[&x]);
        let graph = TaskGraph::new();
        graph.add_task(&phase).unwrap();

        let structural = Dependency::hidden(phase.clone(), x.clone(), DependencyType::StartStart);
        assert!(matches!(
            graph.remove_dependency(&structural),
            Err(GraphError::StructuralDependency(_))
        ));

        let unknown = Dependency::new(phase, x, DependencyType::EndStart);
        assert!(matches!(
            graph.remove_dependency(&unknown),
            Err(GraphError::DependencyNotFound(_))
        ));
    }

    #[test]
    fn children_added_to_requires_registered_container() {
        let graph = TaskGraph::new();
        let leaf = task("Leaf", 1, 2);
        let phase = container("Phase", &[]);

        assert!(matches!(
            graph.children_added_to(&phase),
            Err(GraphError::TaskNotFound(_))
        ));

        graph.add_tasks([&leaf, &phase]).unwrap();
        assert!(matches!(
            graph.children_added_to(&leaf),
            Err(GraphError::NotAContainer(_))
        ));
        assert!(graph.children_added_to(&phase).unwrap().is_quiet());
    }

    #[test]
    fn children_added_to_rejects_child_owned_elsewhere() {
        let graph = TaskGraph::new();
        let loose = task("Loose", 1, 2);
        let phase = container("Phase", &[]);
        graph.add_tasks([&loose, &phase]).unwrap();

        phase.add_child(loose.clone()).unwrap();
        assert!(matches!(
            graph.children_added_to(&phase),
            Err(GraphError::ForeignChild { .. })
        ));
    }

    #[test]
    fn propagation_limit_is_reported() {
        let graph = TaskGraph::with_limits(PropagationLimits { max_steps: 2 });
        let tasks: Vec<Task> = (0..6).map(|i| task(&format!("T{i}"), 1, 2)).collect();
        graph.add_tasks(&tasks).unwrap();

        for pair in tasks.windows(2) {
            graph
                .add_dependency(Dependency::new(
                    pair[0].clone(),
                    pair[1].clone(),
                    DependencyType::StartStart,
                ))
                .unwrap();
        }

        let result = graph.edit(|| tasks[0].set_begin_date(day(10)));
        assert_eq!(result, Err(GraphError::PropagationLimit(2)));

        // The graph stays usable once the queue is dropped.
        let full = TaskGraph::new();
        let x = task("X", 1, 2);
        full.add_task(&x).unwrap();
        assert!(full.edit(|| x.set_begin_date(day(3))).unwrap().is_quiet());
    }

    #[test]
    fn dropping_graph_releases_listeners() {
        let x = task("X", 1, 2);
        let phase = container("Phase", &[&x]);
        {
            let graph = TaskGraph::new();
            graph.add_task(&phase).unwrap();
            assert_eq!(x.listener_count(), 2);
        }
        assert_eq!(x.listener_count(), 0);
        assert_eq!(phase.listener_count(), 0);
    }
}
