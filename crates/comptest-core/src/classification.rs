//! Groupability classification of components

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether, and why not, a component may be merged with others
///
/// Exactly one tag applies to each component. Only [`Groupability::Groupable`]
/// components take part in signature-based grouping; the others are built
/// on their own. None of these is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Groupability {
    /// Explicitly listed as incompatible with merging
    Isolated { reason: String },
    /// Implements a shared resource itself (the bus platforms)
    BaseResourceProvider,
    /// Uses `!extend` / `!remove`, which only work inside its own documents
    StructuralDirectiveUser,
    /// Declares a resource inline instead of through a shared package
    DirectResourceDefiner,
    Groupable,
}

impl Groupability {
    pub fn is_groupable(&self) -> bool {
        matches!(self, Groupability::Groupable)
    }

    /// Short machine-friendly label
    pub fn label(&self) -> &'static str {
        match self {
            Groupability::Isolated { .. } => "isolated",
            Groupability::BaseResourceProvider => "base-resource-provider",
            Groupability::StructuralDirectiveUser => "structural-directive-user",
            Groupability::DirectResourceDefiner => "direct-resource-definer",
            Groupability::Groupable => "groupable",
        }
    }

    /// Human-readable explanation for reports
    pub fn reason(&self) -> String {
        match self {
            Groupability::Isolated { reason } => reason.clone(),
            Groupability::BaseResourceProvider => {
                "Base resource platform component (tested individually)".to_string()
            }
            Groupability::StructuralDirectiveUser => "Uses !extend or !remove directives".to_string(),
            Groupability::DirectResourceDefiner => {
                "Defines buses directly (not via packages) - NEEDS MIGRATION".to_string()
            }
            Groupability::Groupable => "Groupable".to_string(),
        }
    }
}

impl fmt::Display for Groupability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
