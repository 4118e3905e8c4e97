//! Cycle detection over task boundaries
//!
//! Containment edges form two-cycles at the task level (container to child
//! and child to container), so cycles are looked for between boundaries
//! instead. Every task contributes a begin and an end point, linked
//! begin to end. A container also gets a floor point that collects the
//! begins of everything inside it: containment may pull a container's begin
//! earlier, but begin-sourced dependencies leaving the container still react
//! to movement inside it.

use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;

use super::dependency::{Boundary, DependencyType};
use super::id::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Point {
    Begin,
    End,
    Floor,
}

impl From<Boundary> for Point {
    fn from(boundary: Boundary) -> Self {
        match boundary {
            Boundary::Begin => Point::Begin,
            Boundary::End => Point::End,
        }
    }
}

type Node = (TaskId, Point);

#[derive(Debug, Default)]
pub(crate) struct BoundaryGraph {
    graph: DiGraphMap<Node, ()>,
}

impl BoundaryGraph {
    pub(crate) fn add_task(&mut self, task: TaskId, is_container: bool) {
        self.graph.add_edge((task, Point::Begin), (task, Point::End), ());
        if is_container {
            self.graph.add_node((task, Point::Floor));
        }
    }

    pub(crate) fn add_containment(&mut self, container: TaskId, child: TaskId, child_is_container: bool) {
        self.graph
            .add_edge((container, Point::Begin), (child, Point::Begin), ());
        self.graph
            .add_edge((child, Point::End), (container, Point::End), ());
        self.graph
            .add_edge((child, Point::Begin), (container, Point::Floor), ());
        if child_is_container {
            self.graph
                .add_edge((child, Point::Floor), (container, Point::Floor), ());
        }
    }

    pub(crate) fn add_dependency(
        &mut self,
        source: TaskId,
        source_is_container: bool,
        destination: TaskId,
        kind: DependencyType,
    ) {
        let to = (destination, Point::from(kind.constrained_boundary()));
        let from = Point::from(kind.source_boundary());

        self.graph.add_edge((source, from), to, ());
        if source_is_container && from == Point::Begin {
            self.graph.add_edge((source, Point::Floor), to, ());
        }
    }

    pub(crate) fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }
}
