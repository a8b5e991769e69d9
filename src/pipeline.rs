//! Wires the walker, decoders, coordinators and validator into one
//! cancellable event stream.

use crate::boxes::{BoxHeader, NodeId};
use crate::coordinators::CoordinatorSet;
use crate::event::{ParseEvent, ParseEventKind};
use crate::issues::{IssueStore, ParseIssue, Severity};
use crate::known_boxes::{Catalog, KnownBoxCatalog};
use crate::options::ParseOptions;
use crate::parser::HeaderError;
use crate::payload::ParsedPayload;
use crate::registry::{Registry, shared_registry};
use crate::source::ByteSource;
use crate::validate::{BoxValidator, PROMOTED_RULES, Validator};
use crate::walker::{CancellationToken, WalkError, WalkEvent, Walker};
use crossbeam::channel::{self, Receiver};
use std::sync::Arc;
use std::thread;
use tracing::{debug, debug_span, warn};

const DEFAULT_BUFFER: usize = 64;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("parse cancelled")]
    Cancelled,
    #[error("structural error at {offset}: {source}")]
    Structural {
        offset: u64,
        #[source]
        source: HeaderError,
    },
    #[error("failed to start parse worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<WalkError> for PipelineError {
    fn from(e: WalkError) -> Self {
        match e {
            WalkError::Cancelled => PipelineError::Cancelled,
            WalkError::Structural { offset, source } => {
                PipelineError::Structural { offset, source }
            }
        }
    }
}

/// Per-invocation inputs.
#[derive(Default, Clone)]
pub struct ParseContext {
    /// Label for logs, e.g. the file path.
    pub source_descriptor: Option<String>,
    /// Receives every raw and promoted issue.
    pub issue_store: Option<Arc<IssueStore>>,
    /// Overrides the pipeline's options for this run.
    pub options: Option<ParseOptions>,
}

impl ParseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_descriptor(mut self, desc: impl Into<String>) -> Self {
        self.source_descriptor = Some(desc.into());
        self
    }

    pub fn with_issue_store(mut self, store: Arc<IssueStore>) -> Self {
        self.issue_store = Some(store);
        self
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = Some(options);
        self
    }
}

#[derive(Clone)]
pub struct ParsePipeline {
    options: ParseOptions,
    catalog: Arc<dyn Catalog>,
    registry: Option<Arc<Registry>>,
    validator: Option<Arc<dyn Validator>>,
    buffer: usize,
}

impl ParsePipeline {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            catalog: Arc::new(KnownBoxCatalog::new()),
            registry: None,
            validator: None,
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn strict() -> Self {
        Self::new(ParseOptions::strict())
    }

    pub fn tolerant() -> Self {
        Self::new(ParseOptions::tolerant())
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the built-in decoders.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the default [`BoxValidator`].
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Capacity of the channel between the worker and the stream.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Start parsing `source` on a worker thread.
    ///
    /// Dropping the returned stream cancels the walk.
    pub fn events(&self, source: Arc<dyn ByteSource>, ctx: ParseContext) -> EventStream {
        let (tx, rx) = channel::bounded(self.buffer);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let pipeline = self.clone();

        let spawned = thread::Builder::new()
            .name("isowalk-parse".into())
            .spawn(move || {
                let span = debug_span!(
                    "parse",
                    source = ctx.source_descriptor.as_deref().unwrap_or("<unnamed>")
                );
                let _guard = span.enter();
                let result = pipeline.run(source.as_ref(), &ctx, &worker_cancel, |event| {
                    tx.send(Ok(event)).map_err(|_| WalkError::Cancelled)
                });
                if let Err(e) = result {
                    debug!(error = %e, "parse ended early");
                    let _ = tx.send(Err(e.into()));
                }
            });

        let pending_error = match spawned {
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "could not spawn parse worker");
                Some(PipelineError::Spawn(e))
            }
        };

        EventStream {
            rx,
            cancel,
            pending_error,
            done: false,
        }
    }

    /// Run a whole parse on the calling thread, collecting every event.
    pub fn parse_all(
        &self,
        source: &dyn ByteSource,
        ctx: &ParseContext,
    ) -> Result<Vec<ParseEvent>, PipelineError> {
        let mut events = Vec::new();
        self.run(source, ctx, &CancellationToken::new(), |e| {
            events.push(e);
            Ok(())
        })?;
        Ok(events)
    }

    /// Drive one walk, sending every finished event to `sink`.
    pub fn run<F>(
        &self,
        source: &dyn ByteSource,
        ctx: &ParseContext,
        cancel: &CancellationToken,
        sink: F,
    ) -> Result<(), WalkError>
    where
        F: FnMut(ParseEvent) -> Result<(), WalkError>,
    {
        let options = ctx.options.clone().unwrap_or_else(|| self.options.clone());
        let validator: Arc<dyn Validator> = match &self.validator {
            Some(v) => v.clone(),
            None => Arc::new(
                BoxValidator::new(options.payload_validation).with_catalog(self.catalog.clone()),
            ),
        };
        let registry: &Registry = match &self.registry {
            Some(r) => r,
            None => shared_registry(),
        };
        let walker = Walker::new(options.clone(), self.catalog.clone());

        let mut session = Session {
            source,
            options: &options,
            catalog: self.catalog.as_ref(),
            registry,
            validator: validator.as_ref(),
            store: ctx.issue_store.as_deref(),
            coordinators: CoordinatorSet::new(),
            open: Vec::new(),
            sink,
        };
        walker.walk(source, cancel, |event| session.handle(event))
    }
}

struct OpenNode {
    id: NodeId,
    payload: Option<ParsedPayload>,
    issues: Vec<ParseIssue>,
}

struct Session<'a, F> {
    source: &'a dyn ByteSource,
    options: &'a ParseOptions,
    catalog: &'a dyn Catalog,
    registry: &'a Registry,
    validator: &'a dyn Validator,
    store: Option<&'a IssueStore>,
    coordinators: CoordinatorSet,
    open: Vec<OpenNode>,
    sink: F,
}

impl<F> Session<'_, F>
where
    F: FnMut(ParseEvent) -> Result<(), WalkError>,
{
    fn handle(&mut self, event: WalkEvent) -> Result<(), WalkError> {
        match event {
            WalkEvent::Enter { header, depth } => self.enter(header, depth),
            WalkEvent::Exit { header, depth } => self.exit(header, depth),
            WalkEvent::Issue { issue, depth } => {
                self.record(issue, depth);
                Ok(())
            }
        }
    }

    /// Send to the store and buffer on every affected open node.
    fn record(&mut self, issue: ParseIssue, depth: usize) {
        if let Some(store) = self.store {
            store.record(issue.clone(), depth);
        }
        for node in self.open.iter_mut().rev() {
            if issue.affects(node.id) {
                node.issues.push(issue.clone());
            }
        }
    }

    fn decode(&mut self, header: &BoxHeader, depth: usize) -> Option<ParsedPayload> {
        let result = {
            let env = self.coordinators.environment(header);
            self.registry.decode(header, self.source, &env)
        };
        match result? {
            Ok(p) => Some(p),
            Err(e) => {
                let truncated = e
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io| io.kind() == std::io::ErrorKind::UnexpectedEof);
                let (severity, code) = if truncated {
                    (Severity::Warning, "payload.truncated")
                } else {
                    (Severity::Info, "payload.decode_failed")
                };
                debug!(
                    typ = %header.typ,
                    offset = header.start(),
                    error = %e,
                    "payload decode failed"
                );
                let issue = ParseIssue::new(severity, code, format!("{}: {}", header.typ, e))
                    .with_range(header.payload.clone())
                    .with_node(header.node_id());
                self.record(issue, depth);
                None
            }
        }
    }

    fn enter(&mut self, header: BoxHeader, depth: usize) -> Result<(), WalkError> {
        self.coordinators.will_start_box(&header, depth);
        self.open.push(OpenNode {
            id: header.node_id(),
            payload: None,
            issues: Vec::new(),
        });

        let payload = self.decode(&header, depth);
        if let Some(p) = &payload {
            self.coordinators.did_parse_payload(&header, p);
        }

        let issues = match self.open.last_mut() {
            Some(node) => {
                node.payload = payload.clone();
                node.issues.clone()
            }
            None => Vec::new(),
        };

        let mut event = ParseEvent::new(ParseEventKind::WillStartBox, header, depth);
        event.descriptor = self.catalog.descriptor(&event.header);
        event.payload = payload;
        event.issues = issues;
        (self.sink)(event)
    }

    fn exit(&mut self, header: BoxHeader, depth: usize) -> Result<(), WalkError> {
        let synthesized = self.coordinators.did_finish_box(&header);
        let node = match self.open.pop() {
            Some(n) if n.id == header.node_id() => n,
            other => {
                warn!(offset = header.start(), "exit without matching enter");
                if let Some(n) = other {
                    self.open.push(n);
                }
                OpenNode {
                    id: header.node_id(),
                    payload: None,
                    issues: Vec::new(),
                }
            }
        };

        let mut event = ParseEvent::new(ParseEventKind::DidFinishBox, header, depth);
        event.descriptor = self.catalog.descriptor(&event.header);
        event.payload = synthesized.or(node.payload);
        event.issues = node.issues;

        let mut event = self.validator.annotate(event, self.source);
        if !self.options.abort_on_structural_error {
            let promoted: Vec<ParseIssue> = event
                .validation_issues
                .iter()
                .filter(|v| PROMOTED_RULES.contains(&v.rule_id))
                .map(|v| {
                    ParseIssue::new(v.severity, v.rule_id, v.message.clone())
                        .with_range(event.header.range.clone())
                        .with_node(event.node_id())
                })
                .collect();
            for issue in promoted {
                if let Some(store) = self.store {
                    store.record(issue.clone(), depth);
                }
                event.issues.push(issue);
            }
        }
        (self.sink)(event)
    }
}

/// Blocking iterator over pipeline events.
///
/// Yields `Ok` events in walk order and ends after either the last event or
/// one `Err`. Once [`EventStream::cancel`] is called no further events are
/// yielded; the stream ends with [`PipelineError::Cancelled`].
pub struct EventStream {
    rx: Receiver<Result<ParseEvent, PipelineError>>,
    cancel: CancellationToken,
    pending_error: Option<PipelineError>,
    done: bool,
}

impl EventStream {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Iterator for EventStream {
    type Item = Result<ParseEvent, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(e) = self.pending_error.take() {
            self.done = true;
            return Some(Err(e));
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return Some(Err(PipelineError::Cancelled));
        }
        match self.rx.recv() {
            Ok(Ok(event)) => Some(Ok(event)),
            Ok(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            Err(_) => {
                self.done = true;
                None
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
