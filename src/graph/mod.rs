//! Dependency graph visualization: force-directed layout over a validated
//! plan's DAG, pan/zoom viewport, and text-grid rendering.

pub mod canvas;
pub mod layout;
pub mod viewport;

use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyEvent};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::plan::{TaskStatus, WorkPlan};
use crate::util::truncate;
use crate::Result;

use canvas::Canvas;
use layout::ForceLayout;
use viewport::Viewport;

const PAN_STEP: f64 = 5.0;
const ZOOM_IN_FACTOR: f64 = 1.2;
const ZOOM_OUT_FACTOR: f64 = 0.8;
const RESET_STABILIZE_STEPS: usize = 50;
const MAX_LABEL_LEN: usize = 10;
const DETAIL_PANEL_WIDTH: usize = 30;

/// A task node as drawn in the graph.
#[derive(Debug, Clone)]
struct NodeMeta {
    id: String,
    description: String,
    status: TaskStatus,
}

/// Interactive view over a plan's dependency DAG.
///
/// Built once from a validated plan; task statuses are pushed in as events
/// arrive. Rendering goes through a character canvas so the caller only ever
/// sees text.
pub struct GraphView {
    graph: DiGraph<NodeMeta, ()>,
    index: HashMap<String, NodeIndex>,
    layout: ForceLayout,
    viewport: Viewport,
    selected: Option<String>,
}

impl GraphView {
    /// Build the DAG view from a plan. Fails on an invalid plan.
    pub fn new(plan: &WorkPlan) -> Result<Self> {
        plan.validate()?;

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for task in &plan.tasks {
            let node = graph.add_node(NodeMeta {
                id: task.id.clone(),
                description: task.description.clone(),
                status: TaskStatus::Pending,
            });
            index.insert(task.id.clone(), node);
        }

        // Edges point from dependency to dependent.
        for task in &plan.tasks {
            for dep in &task.dependencies {
                let from = index[dep.as_str()];
                let to = index[task.id.as_str()];
                graph.add_edge(from, to, ());
            }
        }

        let edges: Vec<(usize, usize)> = graph
            .edge_indices()
            .filter_map(|e| graph.edge_endpoints(e))
            .map(|(a, b)| (a.index(), b.index()))
            .collect();
        let mut layout = ForceLayout::new(graph.node_count(), edges);
        layout.stabilize(RESET_STABILIZE_STEPS);

        Ok(Self {
            graph,
            index,
            layout,
            viewport: Viewport::new(),
            selected: None,
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn layout_steps(&self) -> u64 {
        self.layout.steps()
    }

    /// Run extra layout iterations.
    pub fn stabilize(&mut self, iterations: usize) {
        self.layout.stabilize(iterations);
    }

    /// Update a node's status; unknown ids are ignored.
    pub fn update_status(&mut self, task_id: &str, status: TaskStatus) {
        if let Some(&node) = self.index.get(task_id) {
            self.graph[node].status = status;
        }
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.index.get(task_id).map(|&n| self.graph[n].status)
    }

    /// Select a node by task id; selecting an unknown id is a no-op.
    pub fn select(&mut self, task_id: &str) {
        if self.index.contains_key(task_id) {
            self.selected = Some(task_id.to_string());
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Advance the selection through nodes in declaration order.
    pub fn select_next(&mut self) {
        if self.graph.node_count() == 0 {
            return;
        }
        let next = match &self.selected {
            None => NodeIndex::new(0),
            Some(id) => {
                let current = self.index[id.as_str()].index();
                NodeIndex::new((current + 1) % self.graph.node_count())
            }
        };
        self.selected = Some(self.graph[next].id.clone());
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.viewport.pan(dx, dy);
    }

    pub fn zoom(&mut self, factor: f64) {
        self.viewport.zoom_by(factor);
    }

    pub fn center(&mut self) {
        self.viewport.center();
    }

    pub fn zoom_level(&self) -> f64 {
        self.viewport.zoom
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('h') | KeyCode::Left => self.pan(-PAN_STEP, 0.0),
            KeyCode::Char('j') | KeyCode::Down => self.pan(0.0, PAN_STEP),
            KeyCode::Char('k') | KeyCode::Up => self.pan(0.0, -PAN_STEP),
            KeyCode::Char('l') | KeyCode::Right => self.pan(PAN_STEP, 0.0),
            KeyCode::Char('+') | KeyCode::Char('=') => self.zoom(ZOOM_IN_FACTOR),
            KeyCode::Char('-') | KeyCode::Char('_') => self.zoom(ZOOM_OUT_FACTOR),
            KeyCode::Char('c') => self.center(),
            KeyCode::Char('r') => {
                self.layout.seed();
                self.layout.stabilize(RESET_STABILIZE_STEPS);
            }
            KeyCode::Enter => self.select_next(),
            KeyCode::Esc => self.clear_selection(),
            _ => {}
        }
    }

    /// Render the graph onto a `width` x `height` text grid. The last two
    /// rows carry the stats and help footers.
    pub fn render(&self, width: usize, height: usize) -> String {
        if self.graph.node_count() == 0 {
            return "No task graph data to display".to_string();
        }
        if width == 0 || height <= 2 {
            return String::new();
        }

        let canvas_height = height - 2;
        let mut canvas = Canvas::new(width, canvas_height);

        self.render_edges(&mut canvas);
        self.render_nodes(&mut canvas);
        if self.selected.is_some() {
            self.render_details(&mut canvas);
        }

        let mut out = canvas.render();
        out.push('\n');
        out.push_str(&self.render_stats());
        out.push('\n');
        out.push_str(self.render_help());
        out
    }

    fn render_edges(&self, canvas: &mut Canvas) {
        for edge in self.graph.edge_indices() {
            let Some((from, to)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let a = self.layout.position(from.index());
            let b = self.layout.position(to.index());
            let (x1, y1) = self.to_screen(a.x, a.y, canvas);
            let (x2, y2) = self.to_screen(b.x, b.y, canvas);

            // Cull edges with both endpoints outside the drawable area.
            if !canvas.contains(x1, y1) && !canvas.contains(x2, y2) {
                continue;
            }
            canvas.draw_line(x1, y1, x2, y2);
        }
    }

    fn render_nodes(&self, canvas: &mut Canvas) {
        for node in self.graph.node_indices() {
            let meta = &self.graph[node];
            let pos = self.layout.position(node.index());
            let (x, y) = self.to_screen(pos.x, pos.y, canvas);
            if !canvas.contains(x, y) {
                continue;
            }
            canvas.draw_text(x, y, &self.node_label(meta));
        }
    }

    /// Bracketed label with a status glyph; the selected node uses angle
    /// brackets instead.
    fn node_label(&self, meta: &NodeMeta) -> String {
        let glyph = match meta.status {
            TaskStatus::Pending => '○',
            TaskStatus::Active => '●',
            TaskStatus::Completed => '✓',
            TaskStatus::Failed => '✗',
        };
        let mut label = meta.id.clone();
        if label.chars().count() > MAX_LABEL_LEN {
            label = format!("{}..", label.chars().take(MAX_LABEL_LEN - 2).collect::<String>());
        }
        if self.selected.as_deref() == Some(meta.id.as_str()) {
            format!("<{} {}>", glyph, label)
        } else {
            format!("[{} {}]", glyph, label)
        }
    }

    fn render_details(&self, canvas: &mut Canvas) {
        let Some(id) = self.selected.as_deref() else {
            return;
        };
        let Some(&node) = self.index.get(id) else {
            return;
        };
        let meta = &self.graph[node];

        let x = canvas.width() as i32 - DETAIL_PANEL_WIDTH as i32;
        if x < 0 {
            return;
        }

        let incoming = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .count();
        let outgoing = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .count();

        let lines = [
            format!("Task: {}", meta.id),
            format!("Status: {}", meta.status),
            format!("Desc: {}", truncate(&meta.description, 25)),
            format!("Deps: {} in, {} out", incoming, outgoing),
        ];
        for (i, line) in lines.iter().enumerate() {
            canvas.draw_text(x, 1 + i as i32, line);
        }
    }

    fn render_stats(&self) -> String {
        format!(
            "Nodes: {}  Edges: {}  Layout: {}  Zoom: {:.1}x  Offset: ({:.0}, {:.0})",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.layout.steps(),
            self.viewport.zoom,
            self.viewport.offset_x,
            self.viewport.offset_y,
        )
    }

    fn render_help(&self) -> &'static str {
        if self.selected.is_some() {
            "[hjkl] Pan  [+-] Zoom  [esc] Clear  [c] Center  [r] Reset"
        } else {
            "[hjkl] Pan  [+-] Zoom  [enter] Select  [c] Center  [r] Reset"
        }
    }

    fn to_screen(&self, x: f64, y: f64, canvas: &Canvas) -> (i32, i32) {
        self.viewport
            .to_screen(x, y, canvas.width(), canvas.height())
    }
}
