//! Iterative depth-first box traversal with corruption guard rails.

use crate::boxes::{BoxHeader, NodeId};
use crate::issues::{ParseIssue, Severity};
use crate::known_boxes::Catalog;
use crate::options::ParseOptions;
use crate::parser::{HeaderError, read_box_header};
use crate::source::ByteSource;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

/// Smallest legal box; any iteration moving the cursor less than this is stalled.
const MIN_ADVANCE: u64 = 8;

/// Bytes of version/flags in front of `meta` children.
const META_PREFIX: u64 = 4;

/// Cooperative cancellation flag shared between a walk and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WalkError {
    #[error("walk cancelled")]
    Cancelled,
    #[error("structural error at {offset}: {source}")]
    Structural {
        offset: u64,
        #[source]
        source: HeaderError,
    },
}

/// Raw traversal output, before payload decoding.
#[derive(Debug, Clone)]
pub enum WalkEvent {
    Enter { header: BoxHeader, depth: usize },
    Exit { header: BoxHeader, depth: usize },
    /// A guard rail or structural failure. `depth` is where it was detected.
    Issue { issue: ParseIssue, depth: usize },
}

struct Frame {
    header: Option<BoxHeader>,
    range: Range<u64>,
    cursor: u64,
    /// Depth assigned to this frame's children.
    child_depth: usize,
    scan: bool,
    stalled: usize,
    zero_length: usize,
    issues: usize,
    furthest: u64,
}

impl Frame {
    fn root(len: u64) -> Self {
        Self::over(None, 0..len, 0, true)
    }

    fn over(header: Option<BoxHeader>, range: Range<u64>, child_depth: usize, scan: bool) -> Self {
        let cursor = range.start;
        Frame {
            header,
            range,
            cursor,
            child_depth,
            scan,
            stalled: 0,
            zero_length: 0,
            issues: 0,
            furthest: cursor,
        }
    }

    fn node_id(&self) -> Option<NodeId> {
        self.header.as_ref().map(|h| h.node_id())
    }

    fn depth(&self) -> usize {
        self.child_depth.saturating_sub(1)
    }

    /// The cursor sits behind bytes this frame already consumed.
    fn regressed(&self) -> bool {
        self.cursor < self.furthest
    }

    /// Account for a child header spanning `offset..end`. A child shorter
    /// than [`MIN_ADVANCE`] is not entered and the cursor is nudged past it.
    fn record_progress(&mut self, offset: u64, end: u64, max_stalls: usize) -> Progress {
        if end.saturating_sub(offset) >= MIN_ADVANCE {
            self.stalled = 0;
            return Progress::Advanced;
        }
        self.stalled += 1;
        self.cursor = offset.saturating_add(MIN_ADVANCE);
        if self.stalled >= max_stalls {
            Progress::Exhausted
        } else {
            Progress::Stalled
        }
    }

    /// Move past a child that ends at `end`.
    fn consume(&mut self, end: u64) {
        self.cursor = end;
        self.furthest = end;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Progress {
    Advanced,
    Stalled,
    /// Too many stalls in a row; the frame is abandoned.
    Exhausted,
}

/// Walks one source. Reusable, but holds no per-walk state between calls.
pub struct Walker {
    options: ParseOptions,
    catalog: Arc<dyn Catalog>,
}

struct Reporter<'a> {
    options: &'a ParseOptions,
    reported: usize,
}

impl Reporter<'_> {
    /// Emit `issue` for `frame`, honouring both the per-frame and the global
    /// budgets. Returns `Err` only when the consumer asked to stop.
    fn report<F>(
        &mut self,
        frame: &mut Frame,
        mut issue: ParseIssue,
        on_event: &mut F,
    ) -> Result<(), WalkError>
    where
        F: FnMut(WalkEvent) -> Result<(), WalkError>,
    {
        if let Some(id) = frame.node_id() {
            issue = issue.with_node(id);
        }
        let depth = frame.depth();

        frame.issues += 1;
        if frame.issues > self.options.max_issues_per_frame {
            return Ok(());
        }
        if frame.issues == self.options.max_issues_per_frame {
            frame.scan = false;
            let mut summary = ParseIssue::new(
                Severity::Warning,
                "guard.issue_budget_exceeded",
                format!(
                    "{} issues in one container; remaining children skipped",
                    self.options.max_issues_per_frame
                ),
            )
            .with_range(frame.cursor..frame.range.end);
            if let Some(id) = frame.node_id() {
                summary = summary.with_node(id);
            }
            self.emit(issue, depth, on_event)?;
            return self.emit(summary, depth, on_event);
        }
        self.emit(issue, depth, on_event)
    }

    fn emit<F>(
        &mut self,
        issue: ParseIssue,
        depth: usize,
        on_event: &mut F,
    ) -> Result<(), WalkError>
    where
        F: FnMut(WalkEvent) -> Result<(), WalkError>,
    {
        let cap = self.options.max_corruption_events;
        if cap > 0 && self.reported >= cap {
            trace!(code = %issue.code, "corruption event budget exhausted; issue suppressed");
            return Ok(());
        }
        self.reported += 1;
        on_event(WalkEvent::Issue { issue, depth })
    }
}

impl Walker {
    pub fn new(options: ParseOptions, catalog: Arc<dyn Catalog>) -> Self {
        Self { options, catalog }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    fn is_container(&self, h: &BoxHeader) -> bool {
        self.catalog
            .descriptor(h)
            .is_some_and(|d| d.is_container)
    }

    /// Traverse `src` depth-first, calling `on_event` for every box enter and
    /// exit and for every issue.
    ///
    /// Returns `Ok(())` once the root frame is exhausted. Cancellation is
    /// checked before every iteration; after it is observed nothing more is
    /// emitted. An `Err` from `on_event` stops the walk and is returned as is.
    pub fn walk<F>(
        &self,
        src: &dyn ByteSource,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<(), WalkError>
    where
        F: FnMut(WalkEvent) -> Result<(), WalkError>,
    {
        let opts = &self.options;
        let mut reporter = Reporter {
            options: opts,
            reported: 0,
        };
        let mut stack = vec![Frame::root(src.len())];

        loop {
            if cancel.is_cancelled() {
                debug!("walk cancelled");
                return Err(WalkError::Cancelled);
            }

            let Some(frame) = stack.last_mut() else {
                return Ok(());
            };

            if !frame.scan || frame.cursor >= frame.range.end {
                let done = stack.pop();
                if let Some(Frame {
                    header: Some(header),
                    child_depth,
                    ..
                }) = done
                {
                    on_event(WalkEvent::Exit {
                        header,
                        depth: child_depth - 1,
                    })?;
                }
                continue;
            }

            if frame.regressed() {
                warn!(cursor = frame.cursor, furthest = frame.furthest, "cursor moved backwards");
                let issue = ParseIssue::new(
                    Severity::Error,
                    "guard.cursor_regression",
                    format!(
                        "cursor {} regressed behind {}; container abandoned",
                        frame.cursor, frame.furthest
                    ),
                )
                .with_range(frame.cursor..frame.furthest);
                frame.scan = false;
                reporter.report(frame, issue, &mut on_event)?;
                continue;
            }

            let offset = frame.cursor;
            let header = match read_box_header(src, offset, Some(&frame.range)) {
                Ok(h) => h,
                Err(e) => {
                    if opts.abort_on_structural_error {
                        debug!(offset, error = %e, "aborting on structural error");
                        return Err(WalkError::Structural { offset, source: e });
                    }
                    debug!(offset, error = %e, "header decode failed; skipping rest of container");
                    let issue = ParseIssue::new(Severity::Error, e.code(), e.to_string())
                        .with_range(offset..frame.range.end);
                    frame.scan = false;
                    reporter.report(frame, issue, &mut on_event)?;
                    continue;
                }
            };

            let max_stalls = opts.max_stalled_iterations_per_frame;
            match frame.record_progress(offset, header.end(), max_stalls) {
                Progress::Advanced => {}
                Progress::Stalled => continue,
                Progress::Exhausted => {
                    warn!(offset, "no forward progress; abandoning container");
                    let issue = ParseIssue::new(
                        Severity::Error,
                        "guard.no_progress",
                        format!("{} iterations without progress", frame.stalled),
                    )
                    .with_range(offset..frame.range.end);
                    frame.scan = false;
                    reporter.report(frame, issue, &mut on_event)?;
                    continue;
                }
            }

            let container = self.is_container(&header);
            if header.payload_len() == 0 && !container {
                frame.zero_length += 1;
                if frame.zero_length > opts.max_zero_length_boxes_per_parent {
                    warn!(offset, "repeated zero-length boxes; halting container");
                    let issue = ParseIssue::new(
                        Severity::Warning,
                        "guard.zero_size_loop",
                        format!(
                            "more than {} zero-length boxes in one container",
                            opts.max_zero_length_boxes_per_parent
                        ),
                    )
                    .with_range(header.range.clone());
                    frame.scan = false;
                    reporter.report(frame, issue, &mut on_event)?;
                    continue;
                }
            }

            let depth = frame.child_depth;
            if depth > opts.max_traversal_depth {
                warn!(offset, depth, "maximum traversal depth exceeded");
                let issue = ParseIssue::new(
                    Severity::Error,
                    "guard.recursion_depth_exceeded",
                    format!("box at depth {} exceeds limit {}", depth, opts.max_traversal_depth),
                )
                .with_range(header.range.clone());
                frame.scan = false;
                reporter.report(frame, issue, &mut on_event)?;
                continue;
            }

            frame.consume(header.end());

            let mut children = header.payload.clone();
            let mut scan = container && !children.is_empty();
            if scan && header.is(b"meta") {
                if header.payload_len() >= META_PREFIX {
                    children.start += META_PREFIX;
                    scan = !children.is_empty();
                } else {
                    scan = false;
                }
            }

            trace!(typ = %header.typ, offset, depth, "enter");
            on_event(WalkEvent::Enter {
                header: header.clone(),
                depth,
            })?;
            stack.push(Frame::over(Some(header), children, depth + 1, scan));
        }
    }
}
