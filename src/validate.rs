use crate::event::{ParseEvent, ValidationIssue};
use crate::issues::Severity;
use crate::known_boxes::{Catalog, KnownBoxCatalog};
use crate::options::PayloadValidation;
use crate::payload::{Detail, EditList};
use crate::source::ByteSource;
use std::sync::Arc;

pub const VERSION_RULE: &str = "VR-003";
pub const UNKNOWN_BOX_RULE: &str = "VR-006";
pub const EDIT_LIST_RULE: &str = "VR-014";
pub const FRAGMENT_SEQUENCE_RULE: &str = "VR-016";
pub const TRACK_RUN_RULE: &str = "VR-017";

/// Rules whose violations the pipeline turns into parse issues.
pub const PROMOTED_RULES: &[&str] = &[FRAGMENT_SEQUENCE_RULE, TRACK_RUN_RULE];

/// Annotates events with rule violations.
pub trait Validator: Send + Sync {
    fn annotate(&self, event: ParseEvent, src: &dyn ByteSource) -> ParseEvent;
}

/// Default stateless rule set.
///
/// Version, unknown-type and fragment rules run at every level; edit list
/// checks need [`PayloadValidation::Full`].
pub struct BoxValidator {
    level: PayloadValidation,
    catalog: Arc<dyn Catalog>,
}

impl BoxValidator {
    pub fn new(level: PayloadValidation) -> Self {
        Self {
            level,
            catalog: Arc::new(KnownBoxCatalog::new()),
        }
    }

    /// Judge box types against `catalog` instead of the built-in one.
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = catalog;
        self
    }
}

fn supported_versions(typ: &[u8; 4]) -> Option<&'static [u8]> {
    match typ {
        b"mvhd" | b"tkhd" | b"mdhd" | b"elst" | b"tfdt" | b"mehd" | b"tfra" | b"trun"
        | b"ctts" | b"sidx" => Some(&[0, 1]),
        b"tfhd" | b"mfhd" | b"trex" | b"mfro" | b"hdlr" | b"stts" | b"stsc" | b"stsz"
        | b"stco" | b"co64" | b"stss" => Some(&[0]),
        _ => None,
    }
}

fn violation(rule_id: &'static str, severity: Severity, message: String) -> ValidationIssue {
    ValidationIssue {
        rule_id,
        severity,
        message,
    }
}

impl BoxValidator {
    fn check_version(
        &self,
        event: &ParseEvent,
        src: &dyn ByteSource,
        out: &mut Vec<ValidationIssue>,
    ) {
        let h = &event.header;
        let Some(versions) = supported_versions(&h.typ.0) else {
            return;
        };
        if h.payload_len() < 4 {
            out.push(violation(
                VERSION_RULE,
                Severity::Error,
                format!("{} payload too short for version and flags", h.typ),
            ));
            return;
        }
        match src.read_u8(h.payload.start) {
            Ok(v) if !versions.contains(&v) => out.push(violation(
                VERSION_RULE,
                Severity::Warning,
                format!("{} version {} is not one of {:?}", h.typ, v, versions),
            )),
            Ok(_) => {}
            Err(e) => out.push(violation(
                VERSION_RULE,
                Severity::Error,
                format!("{} version unreadable: {}", h.typ, e),
            )),
        }
    }

    fn check_fragments(&self, event: &ParseEvent, out: &mut Vec<ValidationIssue>) {
        match event.payload.as_ref().and_then(|p| p.detail.as_ref()) {
            Some(Detail::MovieFragmentHeader { sequence_number: 0 }) => out.push(violation(
                FRAGMENT_SEQUENCE_RULE,
                Severity::Warning,
                "movie fragment sequence number is 0".to_string(),
            )),
            Some(Detail::TrackRun(run)) if run.sample_count == 0 => out.push(violation(
                TRACK_RUN_RULE,
                Severity::Error,
                "track run has no samples".to_string(),
            )),
            Some(Detail::TrackRun(run)) => {
                let missing = run.samples_without_duration();
                if missing > 0 {
                    out.push(violation(
                        TRACK_RUN_RULE,
                        Severity::Error,
                        format!("{} sample(s) have no duration and no default applies", missing),
                    ));
                }
            }
            _ => {}
        }
    }

    fn check_edit_list(&self, list: &EditList, out: &mut Vec<ValidationIssue>) {
        for (i, e) in list.entries.iter().enumerate() {
            if e.media_time < -1 {
                out.push(violation(
                    EDIT_LIST_RULE,
                    Severity::Warning,
                    format!("edit {} has media time {}", i + 1, e.media_time),
                ));
            }
            if e.media_rate_fraction != 0 || !matches!(e.media_rate_integer, 0 | 1) {
                out.push(violation(
                    EDIT_LIST_RULE,
                    Severity::Warning,
                    format!("edit {} has unsupported media rate {}", i + 1, e.media_rate()),
                ));
            }
        }
    }
}

impl Validator for BoxValidator {
    fn annotate(&self, mut event: ParseEvent, src: &dyn ByteSource) -> ParseEvent {
        let mut found = Vec::new();
        self.check_version(&event, src, &mut found);
        if self.catalog.descriptor(&event.header).is_none() && event.header.uuid.is_none() {
            found.push(violation(
                UNKNOWN_BOX_RULE,
                Severity::Info,
                format!("unknown box type {}", event.header.typ),
            ));
        }
        self.check_fragments(&event, &mut found);
        if self.level == PayloadValidation::Full {
            let detail = event.payload.as_ref().and_then(|p| p.detail.as_ref());
            if let Some(Detail::EditList(list)) = detail {
                self.check_edit_list(list, &mut found);
            }
        }
        event.validation_issues.extend(found);
        event
    }
}
