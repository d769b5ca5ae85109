//! Structural merge directives (`!extend` / `!remove`)
//!
//! Directives only make sense inside the document hierarchy that declares
//! them; a component using them anywhere is never merged with others.

use serde_yaml::Value;

/// Tag marking a list item or value that extends an existing entry
pub const EXTEND_TAG: &str = "!extend";

/// Tag marking a list item or key that removes an existing entry
pub const REMOVE_TAG: &str = "!remove";

/// Kind of structural directive carried by a tagged value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Extend,
    Remove,
}

/// Directive carried directly by this value, if any
pub fn directive_of(value: &Value) -> Option<Directive> {
    let Value::Tagged(tagged) = value else {
        return None;
    };
    match tagged.tag.to_string().as_str() {
        EXTEND_TAG => Some(Directive::Extend),
        REMOVE_TAG => Some(Directive::Remove),
        _ => None,
    }
}

/// Check whether any node of the tree is a structural directive
///
/// Markers may sit at any depth inside mappings, sequences or other tagged
/// values, so the whole tree is searched.
pub fn contains_structural_directive(value: &Value) -> bool {
    if directive_of(value).is_some() {
        return true;
    }
    match value {
        Value::Mapping(map) => map.values().any(contains_structural_directive),
        Value::Sequence(seq) => seq.iter().any(contains_structural_directive),
        Value::Tagged(tagged) => contains_structural_directive(&tagged.value),
        _ => false,
    }
}
