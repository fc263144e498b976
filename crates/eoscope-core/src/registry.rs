//! Name-to-task lookup.

use std::fmt::Write as _;

use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::{EoError, Result};
use crate::iterate::Strategy;
use crate::task::{Task, TaskCategory};

/// Static description of a task kind plus its constructor.
#[derive(Clone, Copy)]
pub struct TaskDescriptor {
    pub name: &'static str,
    pub category: TaskCategory,
    pub strategy: Strategy,
    /// Name of the config struct the task reads.
    pub config_type: &'static str,
    pub description: &'static str,
    pub build: fn(&AnalysisConfig) -> Box<dyn Task>,
}

impl std::fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("strategy", &self.strategy)
            .field("config_type", &self.config_type)
            .finish()
    }
}

/// Append-only set of task descriptors, in registration order.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<TaskDescriptor>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in task.
    pub fn with_builtin_tasks() -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in crate::tasks::builtin() {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, descriptor: TaskDescriptor) -> Result<()> {
        if self.tasks.iter().any(|t| t.name == descriptor.name) {
            return Err(EoError::DuplicateName(descriptor.name.to_string()));
        }
        debug!(task = descriptor.name, "Registered task");
        self.tasks.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&TaskDescriptor> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| EoError::UnknownTask(name.to_string()))
    }

    /// Construct the named task with `config`.
    pub fn build(&self, name: &str, config: &AnalysisConfig) -> Result<Box<dyn Task>> {
        Ok((self.get(name)?.build)(config))
    }

    pub fn list_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name).collect()
    }

    pub fn descriptors(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// One header record, then one record per task.
    pub fn describe_csv(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(["name", "category", "strategy", "config", "description"])?;
        for t in &self.tasks {
            let category = t.category.to_string();
            let strategy = t.strategy.to_string();
            wtr.write_record([t.name, &category, &strategy, t.config_type, t.description])?;
        }
        let bytes = wtr.into_inner().map_err(|e| EoError::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| EoError::Config(format!("task catalogue is not UTF-8: {e}")))
    }

    pub fn describe_markdown(&self) -> String {
        let mut out = String::from(
            "| Name | Category | Strategy | Config | Description |\n|---|---|---|---|---|\n",
        );
        for t in &self.tasks {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                t.name,
                t.category,
                t.strategy,
                t.config_type,
                t.description.replace('|', "\\|")
            );
        }
        out
    }
}
