//! Precedence dependencies between tasks
//!
//! A dependency says that one boundary of the destination task may never be
//! earlier than one boundary of the source task. The kind names the pair:
//! `StartStart`, `EndEnd`, `StartEnd` (source start constrains destination
//! end) and `EndStart` (source end constrains destination start).
//!
//! Several incoming dependencies on the same boundary compose by taking the
//! latest lower bound, and a boundary is never moved earlier than its current
//! value. Both computations are pure and idempotent.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::task::{Span, Task};

/// One end of a task's span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Begin,
    End,
}

impl Boundary {
    /// Reads this boundary from a span
    pub fn of(self, span: &Span) -> NaiveDate {
        match self {
            Boundary::Begin => span.begin(),
            Boundary::End => span.end(),
        }
    }
}

/// Which boundary of the source constrains which boundary of the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    StartStart,
    EndEnd,
    StartEnd,
    /// Destination starts after the source ends
    #[default]
    EndStart,
}

impl DependencyType {
    pub const ALL: [DependencyType; 4] = [
        DependencyType::StartStart,
        DependencyType::EndEnd,
        DependencyType::StartEnd,
        DependencyType::EndStart,
    ];

    /// Boundary of the source the constraint is read from
    pub fn source_boundary(&self) -> Boundary {
        match self {
            DependencyType::StartStart | DependencyType::StartEnd => Boundary::Begin,
            DependencyType::EndEnd | DependencyType::EndStart => Boundary::End,
        }
    }

    /// Boundary of the destination the constraint applies to
    pub fn constrained_boundary(&self) -> Boundary {
        match self {
            DependencyType::StartStart | DependencyType::EndStart => Boundary::Begin,
            DependencyType::EndEnd | DependencyType::StartEnd => Boundary::End,
        }
    }

    /// Returns a short display label for the dependency type
    pub fn label(&self) -> &'static str {
        match self {
            DependencyType::StartStart => "SS",
            DependencyType::EndEnd => "EE",
            DependencyType::StartEnd => "SE",
            DependencyType::EndStart => "ES",
        }
    }
}

/// Directed precedence edge between two tasks
///
/// Equality and hashing use `(source, destination, kind)`; visibility does
/// not take part.
#[derive(Clone)]
pub struct Dependency {
    source: Task,
    destination: Task,
    kind: DependencyType,
    visible: bool,
}

impl Dependency {
    /// Creates a user-visible dependency
    pub fn new(source: Task, destination: Task, kind: DependencyType) -> Self {
        Self {
            source,
            destination,
            kind,
            visible: true,
        }
    }

    /// Creates a dependency that drives propagation but is not displayed
    pub fn hidden(source: Task, destination: Task, kind: DependencyType) -> Self {
        Self {
            visible: false,
            ..Self::new(source, destination, kind)
        }
    }

    pub fn source(&self) -> &Task {
        &self.source
    }

    pub fn destination(&self) -> &Task {
        &self.destination
    }

    pub fn kind(&self) -> DependencyType {
        self.kind
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Returns true if this dependency constrains `boundary` of its destination
    pub fn constrains(&self, boundary: Boundary) -> bool {
        self.kind.constrained_boundary() == boundary
    }

    /// Earliest date the constrained boundary may take, given the source's
    /// current dates
    pub fn implied_date(&self) -> NaiveDate {
        self.kind.source_boundary().of(&self.source.span())
    }

    /// Returns true if the destination currently honours this dependency
    pub fn is_satisfied(&self) -> bool {
        let boundary = self.kind.constrained_boundary();
        boundary.of(&self.destination.span()) >= self.implied_date()
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.kind == other.kind
    }
}

impl Eq for Dependency {}

impl Hash for Dependency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.destination.hash(state);
        self.kind.hash(state);
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("source", &self.source.id())
            .field("destination", &self.destination.id())
            .field("kind", &self.kind)
            .field("visible", &self.visible)
            .finish()
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -{}-> {}",
            self.source.name(),
            self.kind.label(),
            self.destination.name()
        )
    }
}

/// Begin date `task` must take given its incoming dependencies
///
/// Returns `current_begin` unchanged when nothing constrains the begin.
pub fn compute_implied_start<'a>(
    task: &Task,
    current_begin: NaiveDate,
    incoming: impl IntoIterator<Item = &'a Dependency>,
) -> NaiveDate {
    implied(task, Boundary::Begin, current_begin, incoming)
}

/// End date `task` must take given its incoming dependencies
///
/// Returns `current_end` unchanged when nothing constrains the end.
pub fn compute_implied_end<'a>(
    task: &Task,
    current_end: NaiveDate,
    incoming: impl IntoIterator<Item = &'a Dependency>,
) -> NaiveDate {
    implied(task, Boundary::End, current_end, incoming)
}

fn implied<'a>(
    task: &Task,
    boundary: Boundary,
    current: NaiveDate,
    incoming: impl IntoIterator<Item = &'a Dependency>,
) -> NaiveDate {
    incoming
        .into_iter()
        .filter(|dependency| dependency.constrains(boundary))
        .inspect(|dependency| debug_assert_eq!(dependency.destination(), task))
        .map(Dependency::implied_date)
        .fold(current, NaiveDate::max)
}
