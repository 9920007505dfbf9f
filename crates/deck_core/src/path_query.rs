//! A small path language for pulling one value out of a JSON document.
//!
//! `$` is the whole document. Anything else is a list of segments separated by
//! `.` or wrapped in `[...]`, e.g. `result.status.extruder.temperature` or
//! `$.items[0].name`. All-digit segments index into arrays, everything else is
//! a key lookup. A miss anywhere yields `null`, never an error.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathQuery {
    accessors: Vec<Accessor>,
}

impl PathQuery {
    pub fn parse(path: &str) -> Self {
        if path == "$" {
            return Self::default();
        }

        let rest = match path.strip_prefix('$') {
            Some(rest) => rest.strip_prefix('.').unwrap_or(rest),
            None => path,
        };

        let mut accessors = Vec::new();
        let mut current = String::new();
        let mut in_bracket = false;

        for ch in rest.chars() {
            match ch {
                '[' => {
                    push_segment(&mut accessors, &mut current);
                    in_bracket = true;
                }
                ']' => {
                    push_segment(&mut accessors, &mut current);
                    in_bracket = false;
                }
                '.' if !in_bracket => push_segment(&mut accessors, &mut current),
                _ => current.push(ch),
            }
        }
        push_segment(&mut accessors, &mut current);

        Self { accessors }
    }

    pub fn accessors(&self) -> &[Accessor] {
        &self.accessors
    }

    pub fn is_root(&self) -> bool {
        self.accessors.is_empty()
    }

    /// Walks `document`; `None` means the path did not resolve.
    pub fn evaluate<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        let mut current = document;
        for accessor in &self.accessors {
            current = match (accessor, current) {
                (Accessor::Index(index), Value::Array(items)) => items.get(*index)?,
                // Digits against an object are an ordinary key lookup.
                (Accessor::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
                (Accessor::Field(name), Value::Object(map)) => map.get(name)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn push_segment(accessors: &mut Vec<Accessor>, current: &mut String) {
    if current.is_empty() {
        return;
    }
    let segment = std::mem::take(current);
    let accessor = if segment.bytes().all(|b| b.is_ascii_digit()) {
        match segment.parse::<usize>() {
            Ok(index) => Accessor::Index(index),
            Err(_) => Accessor::Field(segment),
        }
    } else {
        Accessor::Field(segment)
    };
    accessors.push(accessor);
}

/// Parses `path` and evaluates it against `document`, mapping misses to `null`.
pub fn extract(path: &str, document: &Value) -> Value {
    PathQuery::parse(path)
        .evaluate(document)
        .cloned()
        .unwrap_or(Value::Null)
}
