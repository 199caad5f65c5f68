//! Binding string parsing.
//!
//! A binding string mixes literal text with `{{ expression }}` regions, for
//! example `Hello {{User.name}}!`. Parsing splits it into ordered segments so
//! that every character of the input lands in exactly one segment.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Matches a `{{ ... }}` region anywhere in a string, lazily.
pub static DATA_BIND_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([\s\S]*?)\}\}").expect("binding regex compiles"));

/// Segments of a binding string and the expression source of each segment.
///
/// `paths` is parallel to `bindings`: a binding segment maps to its inner
/// expression text, a literal segment maps to the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DynamicBindings<'a> {
    pub bindings: Vec<&'a str>,
    pub paths: Vec<&'a str>,
}

impl<'a> DynamicBindings<'a> {
    /// Non-empty expression sources, in segment order.
    pub fn expressions(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.paths.iter().copied().filter(|path| !path.is_empty())
    }
}

/// Splits a binding string into literal and `{{ ... }}` segments.
///
/// Braces are counted from each `{{` opener; a binding closes at the first
/// `}}` that returns the depth to zero, so object literals inside a binding
/// (`{{ {a: 1} }}`) stay in one segment. When a remainder never balances it is
/// kept as a single literal segment. Concatenating the segments reproduces the
/// input; an empty input yields no segments.
///
/// # Example
/// ```rust
/// use rebind_engine::bindings::parse_dynamic_string;
///
/// assert_eq!(parse_dynamic_string("a {{x}} b"), vec!["a ", "{{x}}", " b"]);
/// assert_eq!(parse_dynamic_string("{{ {k: 1} }}"), vec!["{{ {k: 1} }}"]);
/// assert_eq!(parse_dynamic_string("{{broken"), vec!["{{broken"]);
/// ```
pub fn parse_dynamic_string(dynamic_string: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut remainder = dynamic_string;

    while !remainder.is_empty() {
        let Some(start) = remainder.find("{{") else {
            segments.push(remainder);
            break;
        };
        let (prefix, candidate) = remainder.split_at(start);
        let Some(end) = balanced_binding_end(candidate) else {
            segments.push(remainder);
            break;
        };
        if !prefix.is_empty() {
            segments.push(prefix);
        }
        segments.push(&candidate[..end]);
        remainder = &candidate[end..];
    }

    segments
}

/// Byte offset just past the `}}` that closes the binding opening `candidate`.
fn balanced_binding_end(candidate: &str) -> Option<usize> {
    let mut depth: i64 = 0;
    let mut previous = None;
    for (index, byte) in candidate.bytes().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if previous == Some(b'}') && depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
        previous = Some(byte);
    }
    None
}

/// Reports whether a segment has the `{{ ... }}` delimiter shape.
pub fn is_binding_segment(segment: &str) -> bool {
    segment.len() >= 4 && segment.starts_with("{{") && segment.ends_with("}}")
}

/// Parses a binding string into segments and their expression sources.
///
/// The input is trimmed first. Literal segments get an empty expression source.
pub fn get_dynamic_bindings(dynamic_string: &str) -> DynamicBindings<'_> {
    let trimmed = dynamic_string.trim();
    if trimmed.is_empty() {
        return DynamicBindings::default();
    }

    let bindings = parse_dynamic_string(trimmed);
    let paths = bindings
        .iter()
        .map(|segment| if is_binding_segment(segment) { &segment[2..segment.len() - 2] } else { "" })
        .collect();

    DynamicBindings { bindings, paths }
}

/// Reports whether a value is a string containing at least one `{{ ... }}` region.
pub fn is_dynamic_value(value: &Value) -> bool {
    value.as_str().is_some_and(is_dynamic_text)
}

/// Reports whether text contains at least one `{{ ... }}` region.
pub fn is_dynamic_text(text: &str) -> bool {
    DATA_BIND_REGEX.is_match(text)
}
