//! Plan files
//!
//! A plan is a tree of tasks plus a list of dependencies between them, named
//! by task name:
//!
//! ```yaml
//! tasks:
//!   - name: Design
//!     begin: 2024-03-01
//!     end: 2024-03-05
//!     children:
//!       - { name: Sketch, begin: 2024-03-01, end: 2024-03-02 }
//!   - { name: Build, begin: 2024-03-01, end: 2024-03-08 }
//! dependencies:
//!   - { from: Design, to: Build, type: end_start }
//! ```
//!
//! Plans are YAML by default; `.json` and `.toml` files use those formats
//! (TOML dates are quoted strings). A task with a `children` key is a
//! container, even if the list is empty. Reads take a shared lock and writes
//! go through a locked temp file and an atomic rename.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    Dependency, DependencyType, GraphError, PropagationLimits, Span, Task, TaskError, TaskGraph,
    TaskId,
};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Task name used more than once: {0}")]
    DuplicateName(String),

    #[error("Dependency refers to unknown task: {0}")]
    UnknownTask(String),

    #[error("Invalid dependency {from} -> {to}: {source}")]
    Dependency {
        from: String,
        to: String,
        #[source]
        source: GraphError,
    },

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// File format of a plan, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Yaml,
    Json,
    Toml,
}

impl PlanFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => PlanFormat::Json,
            Some(ext) if ext.eq_ignore_ascii_case("toml") => PlanFormat::Toml,
            _ => PlanFormat::Yaml,
        }
    }

    pub fn parse(&self, content: &str) -> Result<Plan> {
        let plan = match self {
            PlanFormat::Yaml => serde_yaml::from_str(content).context("Invalid YAML plan")?,
            PlanFormat::Json => serde_json::from_str(content).context("Invalid JSON plan")?,
            PlanFormat::Toml => toml::from_str(content).context("Invalid TOML plan")?,
        };
        Ok(plan)
    }

    pub fn render(&self, plan: &Plan) -> Result<String> {
        let content = match self {
            PlanFormat::Yaml => serde_yaml::to_string(plan).context("Failed to serialize plan")?,
            PlanFormat::Json => {
                let mut json =
                    serde_json::to_string_pretty(plan).context("Failed to serialize plan")?;
                json.push('\n');
                json
            }
            PlanFormat::Toml => toml::to_string_pretty(plan).context("Failed to serialize plan")?,
        };
        Ok(content)
    }
}

/// A task tree plus dependencies, as written in a plan file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Plan {
    #[serde(default)]
    pub tasks: Vec<PlanTask>,

    #[serde(default)]
    pub dependencies: Vec<PlanDependency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    pub name: String,
    pub begin: NaiveDate,
    pub end: NaiveDate,

    /// Present for containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<PlanTask>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDependency {
    pub from: String,
    pub to: String,

    #[serde(rename = "type", default)]
    pub kind: DependencyType,
}

/// One task of a settled schedule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRow {
    pub id: TaskId,
    pub name: String,
    pub depth: usize,
    pub container: bool,
    pub begin: NaiveDate,
    pub end: NaiveDate,
}

/// A task whose settled dates differ from the plan's
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Drift {
    pub name: String,
    pub declared: Span,
    pub settled: Span,
}

/// A plan turned into a live, settled graph
pub struct LoadedPlan {
    graph: TaskGraph,
    tasks: HashMap<String, Task>,
    /// Task names in plan order, with their depth
    order: Vec<(String, usize)>,
}

impl Plan {
    /// Builds and settles the graph this plan describes
    pub fn build(&self, limits: PropagationLimits) -> Result<LoadedPlan, PlanError> {
        let graph = TaskGraph::with_limits(limits);
        let mut tasks = HashMap::new();
        let mut order = Vec::new();

        let roots = self
            .tasks
            .iter()
            .map(|entry| entry.instantiate(0, &mut tasks, &mut order))
            .collect::<Result<Vec<_>, _>>()?;
        graph.add_top_level_all(&roots)?;

        for dep in &self.dependencies {
            let lookup = |name: &String| {
                tasks
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PlanError::UnknownTask(name.clone()))
            };
            let dependency = Dependency::new(lookup(&dep.from)?, lookup(&dep.to)?, dep.kind);

            graph
                .add_dependency(dependency)
                .map_err(|source| PlanError::Dependency {
                    from: dep.from.clone(),
                    to: dep.to.clone(),
                    source,
                })?;
        }

        graph.enforce_all_restrictions()?;

        Ok(LoadedPlan {
            graph,
            tasks,
            order,
        })
    }

    /// Copy of this plan carrying the loaded graph's current dates
    pub fn with_dates_from(&self, loaded: &LoadedPlan) -> Plan {
        Plan {
            tasks: self
                .tasks
                .iter()
                .map(|task| task.with_dates_from(loaded))
                .collect(),
            dependencies: self.dependencies.clone(),
        }
    }

    /// Tasks whose dates in the loaded graph differ from this plan's
    pub fn drift(&self, loaded: &LoadedPlan) -> Vec<Drift> {
        let mut drift = Vec::new();
        for task in &self.tasks {
            task.collect_drift(loaded, &mut drift);
        }
        drift
    }
}

impl PlanTask {
    fn instantiate(
        &self,
        depth: usize,
        tasks: &mut HashMap<String, Task>,
        order: &mut Vec<(String, usize)>,
    ) -> Result<Task, PlanError> {
        if tasks.contains_key(&self.name) {
            return Err(PlanError::DuplicateName(self.name.clone()));
        }

        let task = match &self.children {
            Some(_) => Task::container(&self.name, self.begin, self.end)?,
            None => Task::new(&self.name, self.begin, self.end)?,
        };
        tasks.insert(self.name.clone(), task.clone());
        order.push((self.name.clone(), depth));

        for child in self.children.iter().flatten() {
            let child = child.instantiate(depth + 1, tasks, order)?;
            task.add_child(child)?;
        }

        Ok(task)
    }

    fn with_dates_from(&self, loaded: &LoadedPlan) -> PlanTask {
        let (begin, end) = match loaded.task(&self.name) {
            Some(task) => (task.begin_date(), task.end_date()),
            None => (self.begin, self.end),
        };

        PlanTask {
            name: self.name.clone(),
            begin,
            end,
            children: self.children.as_ref().map(|children| {
                children
                    .iter()
                    .map(|child| child.with_dates_from(loaded))
                    .collect()
            }),
        }
    }

    fn collect_drift(&self, loaded: &LoadedPlan, drift: &mut Vec<Drift>) {
        if let (Some(task), Some(declared)) =
            (loaded.task(&self.name), Span::new(self.begin, self.end))
        {
            let settled = task.span();
            if settled != declared {
                drift.push(Drift {
                    name: self.name.clone(),
                    declared,
                    settled,
                });
            }
        }

        for child in self.children.iter().flatten() {
            child.collect_drift(loaded, drift);
        }
    }
}

impl LoadedPlan {
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Looks up a task by its plan name
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Name of the task with `id`, if it came from this plan
    pub fn name_of(&self, id: TaskId) -> Option<&str> {
        self.graph.task(id).and_then(|task| {
            self.tasks
                .get_key_value(task.name())
                .map(|(name, _)| name.as_str())
        })
    }

    /// Current dates of every task, in plan order
    pub fn schedule(&self) -> Vec<ScheduleRow> {
        self.order
            .iter()
            .filter_map(|(name, depth)| {
                let task = self.tasks.get(name)?;
                Some(ScheduleRow {
                    id: task.id(),
                    name: name.clone(),
                    depth: *depth,
                    container: task.is_container(),
                    begin: task.begin_date(),
                    end: task.end_date(),
                })
            })
            .collect()
    }
}

/// Reads and writes a plan file
pub struct PlanStore {
    path: PathBuf,
    format: PlanFormat,
}

impl PlanStore {
    /// Creates a store for `path`, picking the format from its extension
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = PlanFormat::from_path(&path);
        Self { path, format }
    }

    /// Returns the path to the plan file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> PlanFormat {
        self.format
    }

    /// Reads the plan under a shared lock
    pub fn read(&self) -> Result<Plan> {
        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open plan: {}", self.path.display()))?;

        file.lock_shared()
            .context("Failed to acquire read lock on plan")?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("Failed to read plan: {}", self.path.display()))?;

        // Lock is released when file is dropped
        self.format
            .parse(&content)
            .with_context(|| format!("Failed to parse plan: {}", self.path.display()))
    }

    /// Replaces the plan file atomically
    pub fn write(&self, plan: &Plan) -> Result<()> {
        let content = self.format.render(plan)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let temp_path = self.temp_path();
        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .context("Failed to acquire write lock on plan")?;

            let mut writer = BufWriter::new(&file);
            writer
                .write_all(content.as_bytes())
                .context("Failed to write plan")?;
            writer.flush().context("Failed to flush plan")?;
        }

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
