use crate::boxes::{BoxHeader, NodeId};
use crate::issues::{ParseIssue, Severity};
use crate::known_boxes::BoxDescriptor;
use crate::payload::ParsedPayload;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseEventKind {
    WillStartBox,
    DidFinishBox,
}

/// A rule violation found by a [`Validator`](crate::validate::Validator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub rule_id: &'static str,
    pub severity: Severity,
    pub message: String,
}

/// One box enter or exit, as delivered by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseEvent {
    pub kind: ParseEventKind,
    pub header: BoxHeader,
    pub depth: usize,
    pub descriptor: Option<BoxDescriptor>,
    /// Decoded payload on enter; on exit the synthesized aggregate if one
    /// exists, otherwise the payload decoded on enter.
    pub payload: Option<ParsedPayload>,
    pub issues: Vec<ParseIssue>,
    pub validation_issues: Vec<ValidationIssue>,
}

impl ParseEvent {
    pub fn new(kind: ParseEventKind, header: BoxHeader, depth: usize) -> Self {
        Self {
            kind,
            header,
            depth,
            descriptor: None,
            payload: None,
            issues: Vec::new(),
            validation_issues: Vec::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.header.node_id()
    }

    pub fn offset(&self) -> u64 {
        self.header.start()
    }

    pub fn is_enter(&self) -> bool {
        self.kind == ParseEventKind::WillStartBox
    }

    pub fn is_exit(&self) -> bool {
        self.kind == ParseEventKind::DidFinishBox
    }

    pub fn has_issue(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}
