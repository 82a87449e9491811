//! Work plan data model: tasks, dependency validation, cycle detection.
//!
//! A [`WorkPlan`] is the unit of work handed to the orchestrator subprocess.
//! It is edited freely until launch, validated, and then treated as
//! immutable for the duration of a run.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Execution mode of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Parallel,
    Sequential,
    Blocking,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Parallel => write!(f, "parallel"),
            TaskKind::Sequential => write!(f, "sequential"),
            TaskKind::Blocking => write!(f, "blocking"),
        }
    }
}

/// Current state of a task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Active => write!(f, "active"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl TaskStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

pub const MAX_PRIORITY: u8 = 10;

/// A single unit of work in a [`WorkPlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, rename = "type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub agent: crate::event::AgentRole,
    /// 0-10, higher is more urgent.
    #[serde(default)]
    pub priority: u8,
}

impl Task {
    pub fn new(id: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            dependencies: Vec::new(),
            kind: TaskKind::default(),
            agent: crate::event::AgentRole::default(),
            priority: 5,
        }
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Check that the task is well-formed on its own.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Validation("task id cannot be empty".to_string()));
        }
        if self.description.is_empty() {
            return Err(Error::Validation(format!(
                "task {} description cannot be empty",
                self.id
            )));
        }
        if self.priority > MAX_PRIORITY {
            return Err(Error::Validation(format!(
                "task {} priority must be between 0 and {}, got {}",
                self.id, MAX_PRIORITY, self.priority
            )));
        }
        Ok(())
    }
}

/// A structured decomposition of work into dependency-ordered tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkPlan {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tasks: Vec<Task>,
    #[serde(rename = "maxConcurrent")]
    pub max_concurrent: usize,
}

impl WorkPlan {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            tasks: Vec::new(),
            max_concurrent: 4,
        }
    }

    /// A small template plan used by the editor view before a real plan is loaded.
    pub fn sample() -> Self {
        let mut plan = Self::new("sample-plan", "Template work plan");
        plan.tasks = vec![
            Task::new("design", "Design the feature"),
            Task::new("implement", "Implement the feature").with_dependencies(&["design"]),
            Task::new("review", "Review the implementation").with_dependencies(&["implement"]),
        ];
        plan
    }

    /// Check that the plan is well-formed, fully resolved, and acyclic.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Validation(
                "work plan name cannot be empty".to_string(),
            ));
        }
        if self.tasks.is_empty() {
            return Err(Error::Validation(
                "work plan must contain at least one task".to_string(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !seen.insert(task.id.as_str()) {
                return Err(Error::Validation(format!("duplicate task id: {}", task.id)));
            }
        }

        for task in &self.tasks {
            for dep in &task.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(Error::Validation(format!(
                        "task {} depends on non-existent task {}",
                        task.id, dep
                    )));
                }
            }
        }

        self.detect_cycles()?;

        if self.max_concurrent < 1 {
            return Err(Error::Validation(format!(
                "maxConcurrent must be at least 1, got {}",
                self.max_concurrent
            )));
        }

        Ok(())
    }

    /// Three-color depth-first search over tasks in declaration order.
    ///
    /// Edges follow dependency references (task -> dependency). Meeting a
    /// gray successor reports that exact back-edge; the message therefore
    /// depends on declaration order, which is deterministic and intentional.
    fn detect_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let adjacency: HashMap<&str, &[String]> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.dependencies.as_slice()))
            .collect();

        let mut colors: HashMap<&str, Color> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), Color::White))
            .collect();

        fn visit<'a>(
            id: &'a str,
            adjacency: &HashMap<&'a str, &'a [String]>,
            colors: &mut HashMap<&'a str, Color>,
        ) -> Result<()> {
            colors.insert(id, Color::Gray);

            if let Some(deps) = adjacency.get(id) {
                for dep in deps.iter() {
                    match colors.get(dep.as_str()) {
                        Some(Color::Gray) => {
                            return Err(Error::Validation(format!(
                                "circular dependency detected: {} -> {}",
                                id, dep
                            )));
                        }
                        Some(Color::White) => visit(dep.as_str(), adjacency, colors)?,
                        _ => {}
                    }
                }
            }

            colors.insert(id, Color::Black);
            Ok(())
        }

        for task in &self.tasks {
            if colors.get(task.id.as_str()) == Some(&Color::White) {
                visit(task.id.as_str(), &adjacency, &mut colors)?;
            }
        }

        Ok(())
    }

    /// Reverse adjacency: for each task id, the ids of tasks that depend on it.
    ///
    /// Used by the graph view and by scheduling logic alike. Validates first,
    /// so the result is always fully resolved.
    pub fn dependency_graph(&self) -> Result<HashMap<String, Vec<String>>> {
        self.validate()?;

        let mut graph: HashMap<String, Vec<String>> = self
            .tasks
            .iter()
            .map(|t| (t.id.clone(), Vec::new()))
            .collect();

        for task in &self.tasks {
            for dep in &task.dependencies {
                if let Some(dependents) = graph.get_mut(dep) {
                    dependents.push(task.id.clone());
                }
            }
        }

        Ok(graph)
    }

    pub fn find_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate a plan document.
    pub fn from_json(data: &str) -> Result<Self> {
        let plan: Self = serde_json::from_str(data)?;
        plan.validate()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(tasks: Vec<Task>) -> WorkPlan {
        WorkPlan {
            name: "test-plan".to_string(),
            description: "A test plan".to_string(),
            tasks,
            max_concurrent: 4,
        }
    }

    // Task validation

    #[test]
    fn test_task_validate_ok() {
        assert!(Task::new("a", "do a").validate().is_ok());
    }

    #[test]
    fn test_task_validate_empty_id() {
        let result = Task::new("", "do something").validate();
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_task_validate_empty_description() {
        let err = Task::new("a", "").validate().unwrap_err();
        assert!(err.to_string().contains("description"));
    }

    #[test]
    fn test_task_validate_priority_out_of_range() {
        let mut task = Task::new("a", "do a");
        task.priority = 11;
        let err = task.validate().unwrap_err();
        assert!(err.to_string().contains("priority"));
    }

    #[test]
    fn test_task_validate_priority_bounds() {
        let mut task = Task::new("a", "do a");
        task.priority = 0;
        assert!(task.validate().is_ok());
        task.priority = MAX_PRIORITY;
        assert!(task.validate().is_ok());
    }

    // Plan validation

    #[test]
    fn test_validate_empty_name() {
        let mut plan = plan_with(vec![Task::new("a", "do a")]);
        plan.name = String::new();
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_validate_no_tasks() {
        let plan = plan_with(vec![]);
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("at least one task"));
    }

    #[test]
    fn test_validate_duplicate_task_id() {
        let plan = plan_with(vec![Task::new("a", "first"), Task::new("a", "second")]);
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate task id: a"));
    }

    #[test]
    fn test_validate_missing_dependency_names_both() {
        let plan = plan_with(vec![Task::new("a", "do a").with_dependencies(&["ghost"])]);
        let err = plan.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("a"));
        assert!(msg.contains("ghost"));
    }

    #[test]
    fn test_validate_max_concurrent_zero() {
        let mut plan = plan_with(vec![Task::new("a", "do a")]);
        plan.max_concurrent = 0;
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("maxConcurrent"));
    }

    #[test]
    fn test_validate_diamond_ok() {
        // A <- B, A <- C, {B,C} <- D: 4 nodes, 4 dependency edges, no cycle
        let plan = plan_with(vec![
            Task::new("a", "do a"),
            Task::new("b", "do b").with_dependencies(&["a"]),
            Task::new("c", "do c").with_dependencies(&["a"]),
            Task::new("d", "do d").with_dependencies(&["b", "c"]),
        ]);
        assert!(plan.validate().is_ok());
        let edge_count: usize = plan.tasks.iter().map(|t| t.dependencies.len()).sum();
        assert_eq!(plan.tasks.len(), 4);
        assert_eq!(edge_count, 4);
    }

    // Cycle detection

    #[test]
    fn test_cycle_two_nodes_names_back_edge() {
        let plan = plan_with(vec![
            Task::new("a", "do a").with_dependencies(&["b"]),
            Task::new("b", "do b").with_dependencies(&["a"]),
        ]);
        let err = plan.validate().unwrap_err();
        // DFS starts at "a" in declaration order: a -> b -> a is the back-edge
        assert_eq!(
            err.to_string(),
            "Validation error: circular dependency detected: b -> a"
        );
    }

    #[test]
    fn test_cycle_self_loop() {
        let plan = plan_with(vec![Task::new("a", "do a").with_dependencies(&["a"])]);
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("a -> a"));
    }

    #[test]
    fn test_cycle_three_nodes() {
        let plan = plan_with(vec![
            Task::new("a", "do a").with_dependencies(&["b"]),
            Task::new("b", "do b").with_dependencies(&["c"]),
            Task::new("c", "do c").with_dependencies(&["a"]),
        ]);
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("circular dependency"));
    }

    #[test]
    fn test_cycle_in_disconnected_component() {
        let plan = plan_with(vec![
            Task::new("a", "do a"),
            Task::new("b", "do b").with_dependencies(&["c"]),
            Task::new("c", "do c").with_dependencies(&["b"]),
        ]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_no_cycle_shared_dependency() {
        // Two tasks sharing a dependency is not a cycle
        let plan = plan_with(vec![
            Task::new("base", "base work"),
            Task::new("x", "do x").with_dependencies(&["base"]),
            Task::new("y", "do y").with_dependencies(&["base"]),
        ]);
        assert!(plan.validate().is_ok());
    }

    // Dependency graph

    #[test]
    fn test_dependency_graph_reverse_adjacency() {
        let plan = plan_with(vec![
            Task::new("a", "do a"),
            Task::new("b", "do b").with_dependencies(&["a"]),
            Task::new("c", "do c").with_dependencies(&["a"]),
            Task::new("d", "do d").with_dependencies(&["b", "c"]),
        ]);
        let graph = plan.dependency_graph().unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph["a"], vec!["b".to_string(), "c".to_string()]);
        assert_eq!(graph["b"], vec!["d".to_string()]);
        assert_eq!(graph["c"], vec!["d".to_string()]);
        assert!(graph["d"].is_empty());
    }

    #[test]
    fn test_dependency_graph_rejects_invalid_plan() {
        let plan = plan_with(vec![Task::new("a", "do a").with_dependencies(&["nope"])]);
        assert!(plan.dependency_graph().is_err());
    }

    // Serialization

    #[test]
    fn test_plan_json_roundtrip() {
        let plan = plan_with(vec![
            Task::new("a", "do a"),
            Task::new("b", "do b").with_dependencies(&["a"]),
        ]);
        let json = plan.to_json().unwrap();
        let parsed = WorkPlan::from_json(&json).unwrap();
        assert_eq!(parsed.name, plan.name);
        assert_eq!(parsed.tasks.len(), 2);
        assert_eq!(parsed.tasks[1].dependencies, vec!["a".to_string()]);
        assert_eq!(parsed.max_concurrent, 4);
    }

    #[test]
    fn test_plan_json_wire_field_names() {
        let plan = plan_with(vec![Task::new("a", "do a")]);
        let json = plan.to_json().unwrap();
        assert!(json.contains("\"maxConcurrent\""));
        assert!(json.contains("\"type\""));
    }

    #[test]
    fn test_plan_from_json_rejects_invalid() {
        let json = r#"{"name":"","tasks":[{"id":"a","description":"x"}],"maxConcurrent":1}"#;
        assert!(WorkPlan::from_json(json).is_err());
    }

    #[test]
    fn test_task_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskKind::Sequential).unwrap(),
            r#""sequential""#
        );
        let parsed: TaskKind = serde_json::from_str(r#""blocking""#).unwrap();
        assert_eq!(parsed, TaskKind::Blocking);
    }

    #[test]
    fn test_task_status_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Active.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_sample_plan_is_valid() {
        assert!(WorkPlan::sample().validate().is_ok());
    }

    #[test]
    fn test_find_task() {
        let plan = plan_with(vec![Task::new("a", "do a")]);
        assert!(plan.find_task("a").is_some());
        assert!(plan.find_task("z").is_none());
    }
}
