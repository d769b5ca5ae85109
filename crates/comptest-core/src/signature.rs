//! Resource signatures used as grouping keys
//!
//! A signature is the canonical encoding of the shared resource packages a
//! component needs on one test target: package names sorted, deduplicated and
//! joined with `+` (e.g. `i2c+uart_19200`).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Separator between package names in a signature
pub const SIGNATURE_SEPARATOR: char = '+';

/// Signature for components that need no shared resources
pub const NO_RESOURCES_SIGNATURE: &str = "no_buses";

/// Prefix of the per-component signatures given to isolated components
pub const ISOLATED_SIGNATURE_PREFIX: &str = "isolated_";

/// Canonical resource signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Build a signature from package names
    ///
    /// Returns `None` when no (non-empty) package names are given; callers
    /// decide whether that means "skip" or [`Signature::no_resources`].
    pub fn from_packages<I, S>(packages: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: BTreeSet<String> = packages
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        if names.is_empty() {
            return None;
        }

        let separator = SIGNATURE_SEPARATOR.to_string();
        let joined: Vec<&str> = names.iter().map(String::as_str).collect();
        Some(Self(joined.join(separator.as_str())))
    }

    /// The reserved signature for components without shared resources
    pub fn no_resources() -> Self {
        Self(NO_RESOURCES_SIGNATURE.to_string())
    }

    /// The reserved per-component signature of an isolated component
    pub fn isolated(component: &str) -> Self {
        Self(format!("{ISOLATED_SIGNATURE_PREFIX}{component}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_no_resources(&self) -> bool {
        self.0 == NO_RESOURCES_SIGNATURE
    }

    pub fn is_isolated(&self) -> bool {
        self.0.starts_with(ISOLATED_SIGNATURE_PREFIX)
    }

    /// Reserved signatures never take part in compatibility merging
    pub fn is_reserved(&self) -> bool {
        self.is_no_resources() || self.is_isolated()
    }

    /// Package names making up this signature (empty for reserved signatures)
    pub fn tokens(&self) -> Vec<&str> {
        if self.is_reserved() {
            return Vec::new();
        }
        self.0
            .split(SIGNATURE_SEPARATOR)
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Tokens grouped by resource kind
    pub fn kinds(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut kinds: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for token in self.tokens() {
            kinds.entry(resource_kind(token)).or_default().insert(token);
        }
        kinds
    }

    /// Check whether two signatures can share one merged build
    ///
    /// For every resource kind present in both, the qualifier sets must be
    /// identical: `uart_9600` conflicts with `uart_19200`, while `ble` and
    /// `uart` never conflict.
    pub fn is_compatible_with(&self, other: &Signature) -> bool {
        let ours = self.kinds();
        let theirs = other.kinds();

        ours.iter().all(|(kind, tokens)| match theirs.get(kind) {
            Some(other_tokens) => tokens == other_tokens,
            None => true,
        })
    }

    /// Signature holding the tokens of both signatures
    pub fn union(&self, other: &Signature) -> Signature {
        let tokens = self.tokens().into_iter().chain(other.tokens());
        Signature::from_packages(tokens).unwrap_or_else(|| self.clone())
    }

    /// Signature of the `part`-th chunk of a split group (1-based)
    pub fn with_part(&self, part: usize) -> Signature {
        Signature(format!("{}_part{}", self.0, part))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Signature {
    /// Parse a signature, canonicalizing token order
    fn from(s: &str) -> Self {
        let candidate = Signature(s.to_string());
        if candidate.is_reserved() {
            return candidate;
        }
        Signature::from_packages(s.split(SIGNATURE_SEPARATOR)).unwrap_or_else(Signature::no_resources)
    }
}

/// Resource kind of a package token: the text before the first underscore
pub fn resource_kind(token: &str) -> &str {
    match token.split_once('_') {
        Some((kind, _)) => kind,
        None => token,
    }
}

/// Free-function form of [`Signature::is_compatible_with`]
pub fn are_compatible(a: &Signature, b: &Signature) -> bool {
    a.is_compatible_with(b)
}
