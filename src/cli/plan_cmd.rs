//! Plan commands (settle, check, move)
//!
//! Every command loads the plan into a graph first, which enforces all of its
//! constraints. The commands differ in what they report and whether the
//! result is written back.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::output::Output;
use crate::storage::{Config, LoadedPlan, Plan, PlanStore, ScheduleRow};

/// Requested change for `gantt move`
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub task: String,
    pub begin: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

fn load(config: &Config, path: &Path) -> Result<(PlanStore, Plan, LoadedPlan)> {
    let store = PlanStore::new(path);
    let plan = store.read()?;
    let loaded = plan
        .build(config.limits())
        .with_context(|| format!("Failed to build plan: {}", path.display()))?;

    debug!(
        plan = %path.display(),
        tasks = loaded.graph().len(),
        dependencies = loaded.graph().visible_dependencies().len(),
        "plan loaded"
    );
    Ok((store, plan, loaded))
}

fn write_back(store: &PlanStore, plan: &Plan, loaded: &LoadedPlan) -> Result<()> {
    store.write(&plan.with_dates_from(loaded))?;
    info!(plan = %store.path().display(), "settled dates written");
    Ok(())
}

fn print_schedule(rows: &[&ScheduleRow]) {
    println!("{:<32} {:<12} END", "TASK", "BEGIN");
    println!("{}", "-".repeat(56));
    for row in rows {
        let name = format!("{}{}", "  ".repeat(row.depth), row.name);
        println!("{:<32} {:<12} {}", name, row.begin, row.end);
    }
}

/// Prints the settled schedule
pub fn settle(output: &Output, config: &Config, path: &Path, write: bool) -> Result<()> {
    let (store, plan, loaded) = load(config, path)?;
    let schedule = loaded.schedule();

    if write {
        write_back(&store, &plan, &loaded)?;
    }

    if output.is_json() {
        output.data(&serde_json::json!({
            "plan": path.display().to_string(),
            "written": write,
            "tasks": schedule,
        }));
    } else {
        print_schedule(&schedule.iter().collect::<Vec<_>>());
        if write {
            println!();
            output.success(&format!("Wrote settled dates to {}", path.display()));
        }
    }

    Ok(())
}

/// Lists tasks whose declared dates differ from the settled ones
pub fn check(output: &Output, config: &Config, path: &Path) -> Result<()> {
    let (_, plan, loaded) = load(config, path)?;
    let drift = plan.drift(&loaded);

    if output.is_json() {
        output.data(&serde_json::json!({
            "plan": path.display().to_string(),
            "consistent": drift.is_empty(),
            "violations": drift,
        }));
    } else if drift.is_empty() {
        println!("All {} tasks satisfy their constraints.", loaded.graph().len());
    } else {
        println!("{:<24} {:<24} SETTLED", "TASK", "DECLARED");
        println!("{}", "-".repeat(72));
        for d in &drift {
            println!(
                "{:<24} {:<24} {}",
                d.name,
                d.declared.to_string(),
                d.settled
            );
        }
    }

    if !drift.is_empty() {
        bail!("{} task(s) violate their constraints", drift.len());
    }
    Ok(())
}

/// Moves one task and reports everything that moved with it
pub fn move_task(
    output: &Output,
    config: &Config,
    path: &Path,
    request: MoveRequest,
    write: bool,
) -> Result<()> {
    if request.begin.is_none() && request.end.is_none() {
        bail!("Nothing to move: pass --begin and/or --end");
    }

    let (store, plan, loaded) = load(config, path)?;
    let task = loaded
        .task(&request.task)
        .cloned()
        .ok_or_else(|| anyhow!("Unknown task: {}", request.task))?;
    let before = task.span();

    let propagation = loaded.graph().edit(|| {
        if let Some(begin) = request.begin {
            task.set_begin_date(begin);
        }
        if let Some(end) = request.end {
            task.set_end_date(end);
        }
    })?;

    let after = task.span();
    if request.begin.is_some_and(|begin| begin != after.begin())
        || request.end.is_some_and(|end| end != after.end())
    {
        warn!(
            task = %request.task,
            requested_begin = ?request.begin,
            requested_end = ?request.end,
            settled = %after,
            "constraints kept the task from taking the requested dates"
        );
    }

    let schedule = loaded.schedule();
    let by_id: HashMap<_, _> = schedule.iter().map(|row| (row.id, row)).collect();
    let moved: Vec<&ScheduleRow> = propagation
        .moved()
        .iter()
        .filter(|id| **id != task.id())
        .filter_map(|id| by_id.get(id).copied())
        .collect();

    if write {
        write_back(&store, &plan, &loaded)?;
    }

    if output.is_json() {
        output.data(&serde_json::json!({
            "task": request.task,
            "from": before,
            "to": after,
            "steps": propagation.steps(),
            "moved": moved,
            "written": write,
        }));
    } else {
        println!("Moved {}: {} -> {}", request.task, before, after);
        if moved.is_empty() {
            println!("No other task moved.");
        } else {
            println!("{} task(s) moved with it:", moved.len());
            print_schedule(&moved);
        }
        if write {
            println!();
            output.success(&format!("Wrote new dates to {}", path.display()));
        }
    }

    Ok(())
}
