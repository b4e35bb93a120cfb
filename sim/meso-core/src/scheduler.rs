//! The task scheduler ordering the work of one time step.
//!
//! Tasks are named groups of work items with optional periods (a task item
//! fires on steps divisible by its period). Dependencies are declared as
//! "runs before these tasks" / "runs after those tasks"; `compile`
//! resolves them into a deterministic topological order, preferring
//! high-priority tasks among the ready ones. The compiled graph can be
//! exported as GraphML for inspection.

use std::io::Cursor;

use meso_types::{Result, SimError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Identifier of a task.
pub type TaskId = usize;

/// One scheduled work item: the payload plus its firing period.
#[derive(Debug, Clone)]
pub struct WorkEntry<W> {
    /// Payload executed by the simulation loop.
    pub item: W,
    /// Fire on steps divisible by this; `1` means every step.
    pub every: i64,
}

#[derive(Debug, Clone)]
struct Task<W> {
    label: String,
    entries: Vec<WorkEntry<W>>,
    runs_before: Vec<TaskId>,
    runs_after: Vec<TaskId>,
    high_priority: bool,
}

/// A compiled task in execution order.
#[derive(Debug, Clone)]
pub struct CompiledTask<W> {
    /// Task id.
    pub id: TaskId,
    /// Label for logs and the graph export.
    pub label: String,
    /// Work entries.
    pub entries: Vec<WorkEntry<W>>,
}

/// Scheduler of one step's task graph.
#[derive(Debug)]
pub struct TaskScheduler<W> {
    tasks: Vec<Task<W>>,
    compiled: Vec<TaskId>,
}

impl<W: Clone> Default for TaskScheduler<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Clone> TaskScheduler<W> {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            compiled: Vec::new(),
        }
    }

    /// Create a named task and return its id.
    pub fn create_task(&mut self, label: &str) -> TaskId {
        self.tasks.push(Task {
            label: label.to_owned(),
            entries: Vec::new(),
            runs_before: Vec::new(),
            runs_after: Vec::new(),
            high_priority: false,
        });
        self.tasks.len() - 1
    }

    /// Add a work item to a task.
    pub fn add_item(&mut self, task: TaskId, item: W, every: i64) {
        self.tasks[task].entries.push(WorkEntry {
            item,
            every: every.max(1),
        });
    }

    /// Declare that `task` runs before all of `before` and after all of
    /// `after`.
    pub fn add_dependency(&mut self, task: TaskId, before: &[TaskId], after: &[TaskId]) {
        self.tasks[task].runs_before.extend_from_slice(before);
        self.tasks[task].runs_after.extend_from_slice(after);
    }

    /// Mark a task as high priority: among ready tasks it is scheduled
    /// first.
    pub fn set_high_priority(&mut self, task: TaskId) {
        self.tasks[task].high_priority = true;
    }

    /// Label of a task.
    #[must_use]
    pub fn label(&self, task: TaskId) -> &str {
        &self.tasks[task].label
    }

    fn edges(&self) -> Vec<(TaskId, TaskId)> {
        let mut edges = Vec::new();
        for (id, task) in self.tasks.iter().enumerate() {
            for &b in &task.runs_before {
                edges.push((id, b));
            }
            for &a in &task.runs_after {
                edges.push((a, id));
            }
        }
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Resolve the dependency graph into a deterministic execution order.
    ///
    /// # Errors
    ///
    /// A dependency cycle.
    pub fn compile(&mut self) -> Result<()> {
        let n = self.tasks.len();
        let edges = self.edges();
        let mut indegree = vec![0usize; n];
        let mut successors: Vec<Vec<TaskId>> = vec![Vec::new(); n];
        for &(from, to) in &edges {
            indegree[to] += 1;
            successors[from].push(to);
        }

        let mut order = Vec::with_capacity(n);
        let mut ready: Vec<TaskId> = (0..n).filter(|&i| indegree[i] == 0).collect();

        while !ready.is_empty() {
            // High priority first, then insertion order.
            let pick_pos = ready
                .iter()
                .enumerate()
                .min_by_key(|&(_, &id)| (!self.tasks[id].high_priority, id))
                .map(|(pos, _)| pos)
                .unwrap_or(0);
            let id = ready.remove(pick_pos);
            order.push(id);
            for &next in &successors[id] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.push(next);
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.tasks[i].label.as_str())
                .collect();
            return Err(SimError::TaskGraph {
                reason: format!("dependency cycle involving: {}", stuck.join(", ")),
            });
        }

        self.compiled = order;
        Ok(())
    }

    /// The compiled schedule: tasks in execution order with their work
    /// entries.
    #[must_use]
    pub fn plan(&self) -> Vec<CompiledTask<W>> {
        self.compiled
            .iter()
            .map(|&id| CompiledTask {
                id,
                label: self.tasks[id].label.clone(),
                entries: self.tasks[id].entries.clone(),
            })
            .collect()
    }

    /// Export the task graph as GraphML. With `only_nonempty`, tasks
    /// without work items are skipped (the "current simulation" view);
    /// otherwise every task appears (the full static graph).
    ///
    /// # Errors
    ///
    /// I/O failures.
    pub fn save_dependency_graph_graphml(&self, fname: &str, only_nonempty: bool) -> Result<()> {
        let included: Vec<bool> = self
            .tasks
            .iter()
            .map(|t| !only_nonempty || !t.entries.is_empty())
            .collect();

        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        let write = |e: std::result::Result<_, quick_xml::Error>| {
            e.map_err(|err| SimError::invalid_config(format!("graphml write failed: {err}")))
        };

        write(writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None))))?;

        let mut graphml = BytesStart::new("graphml");
        graphml.push_attribute(("xmlns", "http://graphml.graphdrawing.org/xmlns"));
        write(writer.write_event(Event::Start(graphml)))?;

        let mut key = BytesStart::new("key");
        key.push_attribute(("id", "label"));
        key.push_attribute(("for", "node"));
        key.push_attribute(("attr.name", "label"));
        key.push_attribute(("attr.type", "string"));
        write(writer.write_event(Event::Empty(key)))?;

        let mut graph = BytesStart::new("graph");
        graph.push_attribute(("id", "tasks"));
        graph.push_attribute(("edgedefault", "directed"));
        write(writer.write_event(Event::Start(graph)))?;

        for (id, task) in self.tasks.iter().enumerate() {
            if !included[id] {
                continue;
            }
            let mut node = BytesStart::new("node");
            node.push_attribute(("id", format!("n{id}").as_str()));
            write(writer.write_event(Event::Start(node)))?;
            let mut data = BytesStart::new("data");
            data.push_attribute(("key", "label"));
            write(writer.write_event(Event::Start(data)))?;
            write(writer.write_event(Event::Text(BytesText::new(&task.label))))?;
            write(writer.write_event(Event::End(BytesEnd::new("data"))))?;
            write(writer.write_event(Event::End(BytesEnd::new("node"))))?;
        }

        for (from, to) in self.edges() {
            if !included[from] || !included[to] {
                continue;
            }
            let mut edge = BytesStart::new("edge");
            edge.push_attribute(("source", format!("n{from}").as_str()));
            edge.push_attribute(("target", format!("n{to}").as_str()));
            write(writer.write_event(Event::Empty(edge)))?;
        }

        write(writer.write_event(Event::End(BytesEnd::new("graph"))))?;
        write(writer.write_event(Event::End(BytesEnd::new("graphml"))))?;

        let path = format!("{fname}.graphml");
        std::fs::write(&path, writer.into_inner().into_inner())
            .map_err(|e| SimError::io(&path, e))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn build_diamond() -> TaskScheduler<&'static str> {
        // a -> b, a -> c, b -> d, c -> d
        let mut s = TaskScheduler::new();
        let a = s.create_task("a");
        let b = s.create_task("b");
        let c = s.create_task("c");
        let d = s.create_task("d");
        s.add_item(a, "A", 1);
        s.add_item(d, "D", 1);
        s.add_dependency(a, &[b, c], &[]);
        s.add_dependency(d, &[], &[b, c]);
        s
    }

    #[test]
    fn test_topological_order() {
        let mut s = build_diamond();
        s.compile().unwrap();
        let plan = s.plan();
        let order: Vec<&str> = plan.iter().map(|t| t.label.as_str()).collect();
        let pos = |l: &str| order.iter().position(|&x| x == l).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("a") < pos("c"));
        assert!(pos("b") < pos("d"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn test_priority_preference() {
        let mut s: TaskScheduler<()> = TaskScheduler::new();
        let a = s.create_task("a");
        let b = s.create_task("b");
        let _ = a;
        s.set_high_priority(b);
        s.compile().unwrap();
        assert_eq!(s.plan()[0].label, "b");
    }

    #[test]
    fn test_cycle_detected() {
        let mut s: TaskScheduler<()> = TaskScheduler::new();
        let a = s.create_task("a");
        let b = s.create_task("b");
        s.add_dependency(a, &[b], &[]);
        s.add_dependency(b, &[a], &[]);
        let err = s.compile().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_graphml_export() {
        let mut s = build_diamond();
        s.compile().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("tasks").to_string_lossy().into_owned();

        s.save_dependency_graph_graphml(&base, false).unwrap();
        let full = std::fs::read_to_string(format!("{base}.graphml")).unwrap();
        assert!(full.contains("graphml"));
        assert!(full.contains(">b<"));

        s.save_dependency_graph_graphml(&base, true).unwrap();
        let current = std::fs::read_to_string(format!("{base}.graphml")).unwrap();
        // Empty tasks are dropped from the current view.
        assert!(!current.contains(">b<"));
        assert!(current.contains(">a<"));
    }
}
