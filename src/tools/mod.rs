//! Tool-Call Surface
//!
//! Tools this pipeline exposes to the model during generation sessions.
//! [`ToolSession`] is per-call scratch state threaded explicitly through the
//! streaming consumption - one session per document, never a process-wide
//! singleton, so concurrent workers stay isolated.
//!
//! Every dispatch returns a short machine-readable status string; the model
//! reads these statuses as tool results.

use serde_json::Value;
use tracing::debug;

/// Tool names offered to the model
pub const GENERATE_TOOL: &str = "generate";
pub const READ_TOOL: &str = "read";
pub const WRITE_TOOL: &str = "write";
pub const MULTI_EDIT_TOOL: &str = "multi_edit";

/// Per-session document scratch state for one generation call
#[derive(Debug, Default)]
pub struct ToolSession {
    document: Option<String>,
    summary: Option<String>,
    /// Incidental events collected during the session (reported, not raised)
    events: Vec<String>,
}

impl ToolSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session seeded with an existing document, used by refinement passes
    pub fn with_document(content: impl Into<String>) -> Self {
        Self {
            document: Some(content.into()),
            summary: None,
            events: Vec::new(),
        }
    }

    /// The document produced so far, if any
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// Model-provided summary, if the generate payload carried one
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Dispatch one tool invocation, returning its status string
    pub fn dispatch(&mut self, name: &str, arguments: &Value) -> String {
        let status = match name {
            GENERATE_TOOL => self.generate(arguments),
            READ_TOOL => self.read(),
            WRITE_TOOL => self.write(arguments),
            MULTI_EDIT_TOOL => self.multi_edit(arguments),
            other => {
                self.events.push(format!("unknown tool invoked: {other}"));
                format!("error:unknown-tool:{other}")
            }
        };
        debug!(tool = name, status = %truncate(&status, 80), "tool dispatched");
        status
    }

    /// Once-only document production. A second invocation in the same
    /// session is rejected with a stateful error status.
    fn generate(&mut self, arguments: &Value) -> String {
        if self.document.is_some() {
            self.events
                .push("generate invoked twice in one session".to_string());
            return "error:document-already-generated".to_string();
        }
        let content = arguments.get("content").and_then(Value::as_str);
        match content {
            Some(c) if !c.trim().is_empty() => {
                self.document = Some(c.to_string());
                if let Some(s) = arguments.get("summary").and_then(Value::as_str) {
                    self.summary = Some(s.to_string());
                }
                "ok:generated".to_string()
            }
            _ => "error:empty-content".to_string(),
        }
    }

    /// Return the current document so the model can inspect what it wrote
    fn read(&self) -> String {
        match &self.document {
            Some(doc) => doc.clone(),
            None => "error:no-document".to_string(),
        }
    }

    /// Replace the document wholesale (refinement rewrites go through edits
    /// instead; write exists for initial streaming production)
    fn write(&mut self, arguments: &Value) -> String {
        match arguments.get("content").and_then(Value::as_str) {
            Some(c) if !c.trim().is_empty() => {
                self.document = Some(c.to_string());
                "ok:written".to_string()
            }
            _ => "error:empty-content".to_string(),
        }
    }

    /// Apply a sequence of localized find/replace edits
    fn multi_edit(&mut self, arguments: &Value) -> String {
        let Some(doc) = self.document.clone() else {
            return "error:no-document".to_string();
        };
        let Some(edits) = arguments.get("edits").and_then(Value::as_array) else {
            return "error:missing-edits".to_string();
        };

        let mut updated = doc;
        for (idx, edit) in edits.iter().enumerate() {
            let find = edit.get("find").and_then(Value::as_str).unwrap_or("");
            let replace = edit.get("replace").and_then(Value::as_str).unwrap_or("");
            if find.is_empty() {
                return format!("error:edit-{idx}-empty-target");
            }
            if !updated.contains(find) {
                return format!("error:edit-{idx}-target-not-found");
            }
            updated = updated.replacen(find, replace, 1);
        }

        let applied = edits.len();
        self.document = Some(updated);
        format!("ok:{applied}-edits-applied")
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
