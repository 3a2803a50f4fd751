//! Per-panel item renderers

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::config::PanelKind;

/// Turns one item of a collection response into a markup fragment
pub trait ItemRenderer: Send + Sync + std::fmt::Debug {
    /// Field of the response body holding the item array
    fn collection_key(&self) -> &str;

    fn render(&self, item: &Value) -> crate::Result<String>;
}

pub fn renderer_for(kind: PanelKind) -> Arc<dyn ItemRenderer> {
    match kind {
        PanelKind::Activities => Arc::new(ActivityRenderer),
        PanelKind::Tasks => Arc::new(TaskRenderer),
        PanelKind::SubTasks => Arc::new(SubTaskRenderer),
    }
}

/// Activities arrive pre-rendered by the server
#[derive(Debug, Default)]
pub struct ActivityRenderer;

impl ItemRenderer for ActivityRenderer {
    fn collection_key(&self) -> &str {
        "activities"
    }

    fn render(&self, item: &Value) -> crate::Result<String> {
        item.as_str().map(str::to_string).ok_or_else(|| {
            crate::SyncError::Render(format!("activity is not a markup string: {}", item))
        })
    }
}

#[derive(Debug, Deserialize)]
struct TaskRow {
    name: Value,
    #[serde(default)]
    progress: Value,
    #[serde(default)]
    priority: Value,
    #[serde(default)]
    status: Value,
    #[serde(default)]
    deadline: Value,
}

#[derive(Debug, Deserialize)]
struct SubTaskRow {
    #[serde(flatten)]
    task: TaskRow,
    #[serde(default)]
    branches: Vec<Branch>,
}

#[derive(Debug, Deserialize)]
struct Branch {
    name: String,
    url: String,
}

/// One table row per task
#[derive(Debug, Default)]
pub struct TaskRenderer;

impl ItemRenderer for TaskRenderer {
    fn collection_key(&self) -> &str {
        "tasks"
    }

    fn render(&self, item: &Value) -> crate::Result<String> {
        let task = TaskRow::deserialize(item)
            .map_err(|e| crate::SyncError::Render(format!("invalid task: {}", e)))?;
        Ok(format!(
            "<tr><td>{}</td><td>{} %</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            cell(&task.name),
            cell(&task.progress),
            cell(&task.priority),
            cell(&task.status),
            cell(&task.deadline)
        ))
    }
}

/// Sub-task rows drop the progress column and list linked branches
#[derive(Debug, Default)]
pub struct SubTaskRenderer;

impl ItemRenderer for SubTaskRenderer {
    fn collection_key(&self) -> &str {
        "tasks"
    }

    fn render(&self, item: &Value) -> crate::Result<String> {
        let row = SubTaskRow::deserialize(item)
            .map_err(|e| crate::SyncError::Render(format!("invalid sub-task: {}", e)))?;
        let branches: String = row
            .branches
            .iter()
            .map(|b| {
                format!(
                    r#"<p><a href="{}">{}</a></p>"#,
                    escape(&b.url),
                    escape(&b.name)
                )
            })
            .collect();
        Ok(format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            cell(&row.task.name),
            cell(&row.task.priority),
            cell(&row.task.status),
            cell(&row.task.deadline),
            branches
        ))
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => escape(s),
        other => escape(&other.to_string()),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
