//! Property tests over random schedules with nested containers

use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use gantt_graph::{Dependency, DependencyType, GraphError, Span, Task, TaskGraph};
use proptest::prelude::*;

fn day(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 1)
        .unwrap()
        .checked_add_days(Days::new(n))
        .unwrap()
}

type Edge = (usize, usize, DependencyType);

/// Leaves wrapped in `Group`, and the part of them nested in `Inner`
#[derive(Debug, Clone, Copy)]
struct Grouping {
    first: usize,
    last: usize,
    inner: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
struct Shape {
    /// Begin offset and length per leaf task
    spans: Vec<(u64, u64)>,
    /// Endpoints index the leaves, then `Group`, then `Inner`
    edges: Vec<Edge>,
    group: Option<Grouping>,
}

fn grouping(n: usize) -> impl Strategy<Value = Grouping> {
    (0..n, 0..n, prop::option::of((0..n, 0..n))).prop_map(|(a, b, inner)| {
        let (first, last) = (a.min(b), a.max(b));
        let width = last - first + 1;
        let inner = inner.map(|(c, d)| {
            let (c, d) = (first + c % width, first + d % width);
            (c.min(d), c.max(d))
        });
        Grouping { first, last, inner }
    })
}

fn shape() -> impl Strategy<Value = Shape> {
    prop::collection::vec((0u64..30, 0u64..6), 2..9).prop_flat_map(|spans| {
        let n = spans.len();
        let kind = prop::sample::select(DependencyType::ALL.to_vec());
        let edges = prop::collection::vec((0..n + 2, 0..n + 2, kind), 0..(3 * n));
        let group = prop::option::of(grouping(n));

        (Just(spans), edges, group).prop_map(|(spans, edges, group)| Shape {
            spans,
            edges: edges.into_iter().filter(|(i, j, _)| i != j).collect(),
            group,
        })
    })
}

struct Built {
    graph: TaskGraph,
    leaves: Vec<Task>,
    /// Leaves, then whichever containers exist
    all: Vec<Task>,
    accepted: Vec<Dependency>,
}

fn build(shape: &Shape) -> Built {
    let leaves: Vec<Task> = shape
        .spans
        .iter()
        .enumerate()
        .map(|(i, (offset, length))| {
            Task::new(format!("T{i}"), day(*offset), day(offset + length)).unwrap()
        })
        .collect();

    let mut group = None;
    let mut inner = None;
    let mut top = Vec::new();

    if let Some(g) = shape.group {
        let outer = Task::container("Group", day(0), day(0)).unwrap();
        let nested = g.inner.map(|(a, b)| {
            let nested = Task::container("Inner", day(0), day(0)).unwrap();
            for leaf in &leaves[a..=b] {
                nested.add_child(leaf.clone()).unwrap();
            }
            (a, b, nested)
        });

        for (i, leaf) in leaves.iter().enumerate().take(g.last + 1).skip(g.first) {
            match &nested {
                Some((a, _, nested)) if i == *a => outer.add_child(nested.clone()).unwrap(),
                Some((a, b, _)) if (*a..=*b).contains(&i) => {}
                _ => outer.add_child(leaf.clone()).unwrap(),
            }
        }

        top.push(outer.clone());
        group = Some(outer);
        inner = nested.map(|(_, _, nested)| nested);
    }
    let grouped = |i: usize| shape.group.is_some_and(|g| (g.first..=g.last).contains(&i));
    top.extend(
        leaves
            .iter()
            .enumerate()
            .filter(|(i, _)| !grouped(*i))
            .map(|(_, leaf)| leaf.clone()),
    );

    let graph = TaskGraph::new();
    graph.add_top_level_all(&top).unwrap();

    let n = leaves.len();
    let at = |i: usize| match i {
        i if i < n => Some(leaves[i].clone()),
        i if i == n => group.clone(),
        _ => inner.clone(),
    };

    let mut pairs = HashSet::new();
    let mut accepted = Vec::new();
    for (i, j, kind) in &shape.edges {
        let (Some(source), Some(destination)) = (at(*i), at(*j)) else {
            continue;
        };
        if !pairs.insert((*i, *j)) {
            continue;
        }

        let dependency = Dependency::new(source, destination, *kind);
        match graph.add_dependency(dependency.clone()) {
            Ok(_) => accepted.push(dependency),
            Err(
                GraphError::CycleDetected(_)
                | GraphError::DerivedBoundary(_)
                | GraphError::DuplicateDependency(_),
            ) => {}
            Err(e) => panic!("unexpected rejection of {dependency}: {e}"),
        }
    }

    let mut all = leaves.clone();
    all.extend(group);
    all.extend(inner);

    Built {
        graph,
        leaves,
        all,
        accepted,
    }
}

fn spans(tasks: &[Task]) -> Vec<Span> {
    tasks.iter().map(Task::span).collect()
}

fn assert_consistent(graph: &TaskGraph) -> Result<(), TestCaseError> {
    prop_assert!(graph.unsatisfied_dependencies().is_empty());
    prop_assert!(graph.unwrapped_containers().is_empty());
    Ok(())
}

proptest! {
    #[test]
    fn accepted_dependencies_hold(shape in shape()) {
        let built = build(&shape);

        assert_consistent(&built.graph)?;
        let visible = built.graph.visible_dependencies();
        prop_assert_eq!(visible.len(), built.accepted.len());
        for dependency in &built.accepted {
            prop_assert!(visible.contains(dependency));
        }
        for task in built.all.iter().filter(|t| !t.children().is_empty()) {
            prop_assert_eq!(Some(task.span()), task.children_hull());
        }
    }

    #[test]
    fn settled_graph_is_a_fixed_point(shape in shape()) {
        let built = build(&shape);
        let before = spans(&built.all);

        let propagation = built.graph.enforce_all_restrictions().unwrap();

        prop_assert!(propagation.is_quiet());
        prop_assert_eq!(spans(&built.all), before);
    }

    #[test]
    fn enforcement_never_moves_leaves_earlier(shape in shape()) {
        let built = build(&shape);

        for (task, (offset, length)) in built.leaves.iter().zip(shape.spans.iter().copied()) {
            prop_assert!(task.begin_date() >= day(offset));
            prop_assert!(task.span().length().num_days() >= length as i64);
        }
    }

    #[test]
    fn direct_edits_keep_invariants(
        shape in shape(),
        edits in prop::collection::vec(
            (any::<prop::sample::Index>(), any::<bool>(), 0u64..40),
            1..6,
        ),
    ) {
        let built = build(&shape);

        for (index, move_begin, date) in edits {
            let task = index.get(&built.all);
            if move_begin {
                task.set_begin_date(day(date));
            } else {
                task.set_end_date(day(date));
            }
            assert_consistent(&built.graph)?;
        }

        prop_assert!(built.graph.enforce_all_restrictions().unwrap().is_quiet());
    }

    #[test]
    fn removal_leaves_no_trace(shape in shape(), victim in any::<prop::sample::Index>()) {
        let built = build(&shape);
        let victim = victim.get(&built.leaves).clone();
        let parent = built.graph.parent_of(&victim);
        let count = built.graph.len();

        built.graph.remove_task(&victim).unwrap();

        prop_assert!(!built.graph.contains_task(&victim));
        prop_assert_eq!(built.graph.len(), count - 1);
        prop_assert_eq!(victim.listener_count(), 0);
        prop_assert!(built
            .graph
            .dependencies()
            .iter()
            .all(|d| d.source() != &victim && d.destination() != &victim));
        if let Some(parent) = parent {
            prop_assert!(!parent.children().contains(&victim));
        }
        assert_consistent(&built.graph)?;
    }
}
