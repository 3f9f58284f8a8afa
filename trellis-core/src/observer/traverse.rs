//! Deep dependency collection.

use std::collections::HashSet;

use crate::value::Value;

/// Read every nested property of `value` so that the active subscriber
/// depends on all of them.
///
/// Raw and non-extensible containers are skipped. Each container is visited
/// once, so self-referencing data terminates.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    walk(value, &mut seen);
}

fn walk(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Object(object) => {
            if object.is_raw() || !object.is_extensible() || !seen.insert(object.addr()) {
                return;
            }
            for key in object.keys() {
                if let Some(child) = object.get(&key) {
                    walk(&child, seen);
                }
            }
        }
        Value::Array(array) => {
            if array.is_raw() || !array.is_extensible() || !seen.insert(array.addr()) {
                return;
            }
            for item in array.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}
