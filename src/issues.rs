use crate::boxes::NodeId;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// A diagnostic raised while walking or decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub byte_range: Option<Range<u64>>,
    pub affected_node_ids: Vec<NodeId>,
}

impl ParseIssue {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            byte_range: None,
            affected_node_ids: Vec::new(),
        }
    }

    pub fn with_range(mut self, range: Range<u64>) -> Self {
        self.byte_range = Some(range);
        self
    }

    pub fn with_node(mut self, id: NodeId) -> Self {
        if !self.affected_node_ids.contains(&id) {
            self.affected_node_ids.push(id);
        }
        self
    }

    pub fn affects(&self, id: NodeId) -> bool {
        self.affected_node_ids.contains(&id)
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)?;
        if let Some(r) = &self.byte_range {
            write!(f, " @ {}..{}", r.start, r.end)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueMetrics {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub deepest_depth: Option<usize>,
}

impl IssueMetrics {
    pub fn total(&self) -> usize {
        self.info + self.warning + self.error
    }
}

#[derive(Default)]
struct StoreInner {
    issues: Vec<(ParseIssue, usize)>,
    by_node: BTreeMap<NodeId, Vec<usize>>,
    metrics: IssueMetrics,
}

/// Thread-safe sink that keeps every issue a walk reports.
///
/// Share it across threads via `Arc<IssueStore>`.
#[derive(Default)]
pub struct IssueStore {
    inner: Mutex<StoreInner>,
}

impl IssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, issue: ParseIssue, depth: usize) {
        let mut inner = self.inner.lock();
        let idx = inner.issues.len();
        for id in &issue.affected_node_ids {
            inner.by_node.entry(*id).or_default().push(idx);
        }
        match issue.severity {
            Severity::Info => inner.metrics.info += 1,
            Severity::Warning => inner.metrics.warning += 1,
            Severity::Error => inner.metrics.error += 1,
        }
        let deepest = inner.metrics.deepest_depth.map_or(depth, |d| d.max(depth));
        inner.metrics.deepest_depth = Some(deepest);
        inner.issues.push((issue, depth));
    }

    pub fn issues(&self) -> Vec<ParseIssue> {
        self.inner.lock().issues.iter().map(|(i, _)| i.clone()).collect()
    }

    pub fn issues_for_node(&self, id: NodeId) -> Vec<ParseIssue> {
        let inner = self.inner.lock();
        inner
            .by_node
            .get(&id)
            .map(|idxs| idxs.iter().map(|&i| inner.issues[i].0.clone()).collect())
            .unwrap_or_default()
    }

    /// Issues whose byte range overlaps `range`.
    pub fn issues_in_range(&self, range: Range<u64>) -> Vec<ParseIssue> {
        self.inner
            .lock()
            .issues
            .iter()
            .filter(|(i, _)| {
                i.byte_range
                    .as_ref()
                    .is_some_and(|r| r.start < range.end && range.start < r.end)
            })
            .map(|(i, _)| i.clone())
            .collect()
    }

    pub fn metrics(&self) -> IssueMetrics {
        self.inner.lock().metrics.clone()
    }

    pub fn summary(&self) -> String {
        let m = self.metrics();
        format!(
            "{} issue(s): {} error, {} warning, {} info",
            m.total(),
            m.error,
            m.warning,
            m.info
        )
    }

    pub fn len(&self) -> usize {
        self.inner.lock().issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
