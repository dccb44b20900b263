//! Diagram Integrity Checking and Repair
//!
//! Validates every ```mermaid fenced block embedded in generated Markdown:
//! each block must name a known diagram kind and keep its parentheses
//! balanced. The paired repairer fixes the one defect class the models
//! produce routinely - parentheses inside bracket-delimited node labels -
//! by stripping them (ASCII and full-width) from the label text.
//!
//! Repair is best-effort and heuristic only; callers must re-validate.

use tracing::{debug, warn};

use super::evaluator::diagram_blocks;

/// Diagram kind keywords accepted inside a block
const DIAGRAM_KEYWORDS: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "erDiagram",
    "journey",
    "gantt",
    "mindmap",
    "timeline",
];

/// Result of validating the diagram blocks of one document
#[derive(Debug, Clone)]
pub struct DiagramValidation {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// Pure validator over embedded diagram fences
pub struct DiagramChecker;

impl DiagramChecker {
    /// Validate every diagram block in `content`.
    ///
    /// A document with no diagram block at all is invalid.
    pub fn validate(content: &str) -> DiagramValidation {
        let blocks = diagram_blocks(content);
        if blocks.is_empty() {
            return DiagramValidation {
                valid: false,
                issues: vec!["no diagram detected".to_string()],
            };
        }

        let mut issues = Vec::new();
        for (idx, block) in blocks.iter().enumerate() {
            let n = idx + 1;
            if !DIAGRAM_KEYWORDS.iter().any(|kw| block.contains(kw)) {
                issues.push(format!("diagram block {n} has no recognized diagram kind"));
            }
            let open = block.matches('(').count();
            let close = block.matches(')').count();
            if open != close {
                issues.push(format!(
                    "diagram block {n} has unbalanced parentheses ({open} open, {close} close)"
                ));
            }
        }

        DiagramValidation {
            valid: issues.is_empty(),
            issues,
        }
    }
}

/// Heuristic repairer for the bracket-label parenthesis defect
pub struct DiagramRepairer;

impl DiagramRepairer {
    /// Strip parentheses found inside `[...]` label fragments of every
    /// diagram block, leaving the rest of each block untouched.
    ///
    /// Never errors: a malformed document (e.g. an unterminated fence) is
    /// logged and returned unchanged from the point of malformation on.
    pub fn repair(content: &str) -> String {
        let mut out = Vec::new();
        let mut in_diagram = false;
        for line in content.lines() {
            let trimmed = line.trim_start();
            if in_diagram {
                if trimmed.starts_with("```") {
                    in_diagram = false;
                    out.push(line.to_string());
                } else {
                    out.push(Self::repair_line(line));
                }
            } else {
                if trimmed.starts_with("```")
                    && trimmed
                        .trim_start_matches('`')
                        .trim()
                        .eq_ignore_ascii_case("mermaid")
                {
                    in_diagram = true;
                }
                out.push(line.to_string());
            }
        }
        if in_diagram {
            warn!("diagram repair found an unterminated mermaid fence; trailing block left as-is");
        }
        let mut repaired = out.join("\n");
        if content.ends_with('\n') {
            repaired.push('\n');
        }
        if repaired != content {
            debug!("diagram repair stripped parentheses from bracket labels");
        }
        repaired
    }

    /// Remove ASCII and full-width parentheses inside bracket labels
    fn repair_line(line: &str) -> String {
        let mut result = String::with_capacity(line.len());
        let mut bracket_depth = 0usize;
        for c in line.chars() {
            match c {
                '[' => {
                    bracket_depth += 1;
                    result.push(c);
                }
                ']' => {
                    bracket_depth = bracket_depth.saturating_sub(1);
                    result.push(c);
                }
                '(' | ')' | '\u{FF08}' | '\u{FF09}' if bracket_depth > 0 => {}
                _ => result.push(c),
            }
        }
        result
    }
}
