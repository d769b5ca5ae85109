//! Deep merge of YAML documents
//!
//! Mappings merge key by key, sequences concatenate with `id`-based
//! deduplication (first occurrence wins), and scalars are overridden by the
//! newer value unless it is null. Inside a sequence an item whose id is
//! tagged `!extend` merges into the existing item with that id and an item
//! tagged `!remove` deletes it; a `!remove` mapping value deletes the key.

use crate::directive::{directive_of, Directive};
use comptest_core::ID_KEY;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use tracing::trace;

/// Merge `new` on top of `old`
pub fn merge_config(old: Value, new: Value) -> Value {
    match (old, new) {
        (Value::Mapping(old_map), Value::Mapping(new_map)) => {
            Value::Mapping(merge_mappings(old_map, new_map))
        }
        (Value::Sequence(old_seq), Value::Sequence(new_seq)) => {
            Value::Sequence(merge_sequences(old_seq, new_seq))
        }
        (old, Value::Null) => old,
        (_, new) => new,
    }
}

fn merge_mappings(mut result: Mapping, new: Mapping) -> Mapping {
    for (key, value) in new {
        if directive_of(&value) == Some(Directive::Remove) {
            trace!("Removing key {:?}", key);
            result.remove(&key);
            continue;
        }

        match result.get_mut(&key) {
            Some(existing) => {
                let previous = std::mem::replace(existing, Value::Null);
                *existing = merge_config(previous, value);
            }
            None => {
                result.insert(key, value);
            }
        }
    }
    result
}

/// Id of a sequence item, split from the directive that may wrap it
enum ItemId {
    Plain(Value),
    Extend(Value),
    Remove(Value),
}

fn item_id(item: &Value) -> Option<ItemId> {
    let id = item.as_mapping()?.get(ID_KEY)?;
    match (directive_of(id), id) {
        (Some(Directive::Extend), Value::Tagged(tagged)) => Some(ItemId::Extend(tagged.value.clone())),
        (Some(Directive::Remove), Value::Tagged(tagged)) => Some(ItemId::Remove(tagged.value.clone())),
        (None, Value::Null) => None,
        (_, other) => Some(ItemId::Plain(other.clone())),
    }
}

fn plain_id(item: &Value) -> Option<Value> {
    match item_id(item)? {
        ItemId::Plain(id) => Some(id),
        _ => None,
    }
}

fn merge_sequences(mut result: Vec<Value>, new: Vec<Value>) -> Vec<Value> {
    for item in new {
        match item_id(&item) {
            Some(ItemId::Plain(id)) => {
                if result.iter().any(|existing| plain_id(existing).as_ref() == Some(&id)) {
                    trace!("Skipping duplicate id {:?}", id);
                    continue;
                }
                result.push(item);
            }
            Some(ItemId::Extend(id)) => {
                let position = result
                    .iter()
                    .position(|existing| plain_id(existing).as_ref() == Some(&id));
                match position {
                    Some(index) => {
                        let mut patch = item;
                        if let Some(map) = patch.as_mapping_mut() {
                            map.remove(ID_KEY);
                        }
                        let previous = std::mem::replace(&mut result[index], Value::Null);
                        result[index] = merge_config(previous, patch);
                    }
                    None => result.push(item),
                }
            }
            Some(ItemId::Remove(id)) => {
                result.retain(|existing| plain_id(existing).as_ref() != Some(&id));
            }
            None => result.push(item),
        }
    }
    result
}

/// Drop sequence items whose `id` was already seen in the same sequence
///
/// Applies to every sequence held directly by a mapping, recursing through
/// nested mappings. The first occurrence of each id is kept.
pub fn deduplicate_by_id(value: Value) -> Value {
    let Value::Mapping(map) = value else {
        return value;
    };

    let mut result = Mapping::new();
    for (key, value) in map {
        let value = match value {
            Value::Sequence(seq) => {
                let mut seen: HashSet<Value> = HashSet::new();
                let deduped = seq
                    .into_iter()
                    .filter(|item| match plain_id(item) {
                        Some(id) => seen.insert(id),
                        None => true,
                    })
                    .collect();
                Value::Sequence(deduped)
            }
            nested @ Value::Mapping(_) => deduplicate_by_id(nested),
            other => other,
        };
        result.insert(key, value);
    }
    Value::Mapping(result)
}
