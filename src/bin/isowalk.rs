use anyhow::anyhow;
use clap::{ArgAction, Parser};
use isowalk::{
    ByteSource, FileSource, FourCC, IssueStore, ParseContext, ParseEvent, ParseOptions,
    ParsePipeline,
    util::{hex_dump, read_payload},
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Corruption-tolerant MP4/ISOBMFF box walker")]
struct Args {
    /// MP4/ISOBMFF file path
    path: PathBuf,

    /// Abort on the first structural error and run every payload rule
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Emit one JSON object per event instead of an indented tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Deepest nesting level to descend into
    #[arg(long)]
    max_depth: Option<usize>,

    /// Zero-length boxes allowed per container before it is abandoned
    #[arg(long)]
    max_zero_length: Option<usize>,

    /// Iterations without forward progress allowed per container
    #[arg(long)]
    max_stalls: Option<usize>,

    /// Print decoded payload fields under each box
    #[arg(long, action = ArgAction::SetTrue)]
    show_fields: bool,

    /// Hex-dump the payload of every box with this four-character code
    #[arg(long)]
    raw: Option<String>,

    /// Bytes to dump per box with --raw (0 means the whole payload)
    #[arg(long, default_value_t = 256)]
    bytes: u64,
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    summary: &'a isowalk::IssueMetrics,
    issues: &'a [isowalk::ParseIssue],
    error: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn options_from(args: &Args) -> ParseOptions {
    let mut options = if args.strict {
        ParseOptions::strict()
    } else {
        ParseOptions::tolerant()
    };
    if let Some(n) = args.max_depth {
        options.max_traversal_depth = n;
    }
    if let Some(n) = args.max_zero_length {
        options.max_zero_length_boxes_per_parent = n;
    }
    if let Some(n) = args.max_stalls {
        options.max_stalled_iterations_per_frame = n;
    }
    options
}

/// Returns `Ok(false)` when the stream ended with an error.
fn run(args: Args) -> anyhow::Result<bool> {
    let raw = match &args.raw {
        Some(s) => Some(
            FourCC::from_str(s)
                .ok_or_else(|| anyhow!("--raw expects a four-character code, got {:?}", s))?,
        ),
        None => None,
    };

    let source: Arc<dyn ByteSource> = Arc::new(FileSource::open(&args.path)?);
    let store = Arc::new(IssueStore::new());
    let ctx = ParseContext::new()
        .with_source_descriptor(args.path.display().to_string())
        .with_issue_store(store.clone());
    let pipeline = ParsePipeline::new(options_from(&args));

    let mut failure = None;
    for item in pipeline.events(source.clone(), ctx) {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                failure = Some(e.to_string());
                break;
            }
        };
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            print_event(&event, args.show_fields);
        }
        if event.is_enter() && raw == Some(event.header.typ) {
            let data = read_payload(source.as_ref(), &event.header, args.bytes)?;
            if args.json {
                let line = serde_json::json!({
                    "offset": event.header.payload.start,
                    "hex": hex::encode(&data),
                });
                println!("{}", line);
            } else {
                print!("{}", hex_dump(&data, event.header.payload.start));
            }
        }
    }

    if args.json {
        let metrics = store.metrics();
        let issues = store.issues();
        let summary = JsonSummary {
            summary: &metrics,
            issues: &issues,
            error: failure.clone(),
        };
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("\n{}", store.summary());
        if let Some(e) = &failure {
            println!("stopped: {}", e);
        }
    }
    Ok(failure.is_none())
}

fn print_event(event: &ParseEvent, show_fields: bool) {
    let indent = "  ".repeat(event.depth);
    let hdr = &event.header;
    if event.is_enter() {
        let name = event
            .descriptor
            .as_ref()
            .map(|d| d.name.as_str())
            .unwrap_or("Unknown Box");
        println!(
            "{indent}{:>8} {:>10} {} ({})",
            format!("{:#x}", hdr.start()),
            hdr.total_size,
            hdr.key(),
            name
        );
        if show_fields {
            if let Some(payload) = &event.payload {
                for f in &payload.fields {
                    println!("{indent}    {} = {}", f.name, f.value);
                }
            }
        }
        return;
    }

    // Exit lines only when there is something to say.
    let synthesized = show_fields && event.descriptor.as_ref().is_some_and(|d| d.is_container);
    if event.issues.is_empty() && event.validation_issues.is_empty() && !synthesized {
        return;
    }
    println!("{indent}  end {}", hdr.key());
    if synthesized {
        if let Some(payload) = &event.payload {
            for f in &payload.fields {
                println!("{indent}    {} = {}", f.name, f.value);
            }
        }
    }
    for issue in &event.issues {
        println!("{indent}  ! {}", issue);
    }
    for v in &event.validation_issues {
        println!("{indent}  ~ [{}] {}: {}", v.severity, v.rule_id, v.message);
    }
}
