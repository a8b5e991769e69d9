use serde::{Deserialize, Serialize};

/// How much payload-level checking runs after structure is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadValidation {
    /// Every validation rule runs.
    Full,
    /// Only structural rules run; payload rules are skipped.
    StructureOnly,
}

/// Walker and pipeline tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Fail the whole walk on the first header decode failure.
    pub abort_on_structural_error: bool,
    /// Upper bound on reported corruption issues; 0 means unlimited.
    pub max_corruption_events: usize,
    pub payload_validation: PayloadValidation,
    pub max_traversal_depth: usize,
    pub max_stalled_iterations_per_frame: usize,
    pub max_zero_length_boxes_per_parent: usize,
    pub max_issues_per_frame: usize,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            abort_on_structural_error: true,
            max_corruption_events: 0,
            payload_validation: PayloadValidation::Full,
            max_traversal_depth: 64,
            max_stalled_iterations_per_frame: 3,
            max_zero_length_boxes_per_parent: 2,
            max_issues_per_frame: 256,
        }
    }

    pub fn tolerant() -> Self {
        Self {
            abort_on_structural_error: false,
            max_corruption_events: 500,
            payload_validation: PayloadValidation::StructureOnly,
            ..Self::strict()
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::tolerant()
    }
}
