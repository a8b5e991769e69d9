pub mod boxes;
pub mod coordinators;
pub mod decoders;
pub mod event;
pub mod issues;
pub mod known_boxes;
pub mod options;
pub mod parser;
pub mod payload;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod util;
pub mod validate;
pub mod walker;

pub use boxes::{BoxHeader, BoxKey, FourCC, NodeId};
pub use event::{ParseEvent, ParseEventKind, ValidationIssue};
pub use issues::{IssueMetrics, IssueStore, ParseIssue, Severity};
pub use known_boxes::{BoxDescriptor, Catalog, KnownBox, KnownBoxCatalog};
pub use options::{ParseOptions, PayloadValidation};
pub use parser::{HeaderError, read_box_header};
pub use payload::{Detail, Field, FieldValue, ParsedPayload};
pub use pipeline::{EventStream, ParseContext, ParsePipeline, PipelineError};
pub use registry::{BoxDecoder, DecoderEnv, Registry, default_registry, shared_registry};
pub use source::{ByteSource, FileSource, MemorySource, SourceError};
pub use validate::{BoxValidator, Validator};
pub use walker::{CancellationToken, WalkError, WalkEvent, Walker};
