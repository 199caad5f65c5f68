//! Built-in globals and methods available to expressions.
//!
//! The set mirrors what widget bindings reach for in practice: `Math`
//! helpers, JSON conversion, primitive conversions, and the common string
//! and array methods (with arrow function callbacks for the array ones).

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::ExpressionError;
use super::interpreter::{Evaluation, Flow};
use super::value::{Function, JsValue, string_to_number};

/// Native functions reachable from the global scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    MathAbs,
    MathCeil,
    MathFloor,
    MathRound,
    MathTrunc,
    MathSign,
    MathMax,
    MathMin,
    MathPow,
    MathSqrt,
    JsonStringify,
    JsonParse,
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ArrayIsArray,
    String,
    Number,
    Boolean,
    ParseInt,
    ParseFloat,
    IsNaN,
    IsFinite,
}

const STRING_METHODS: &[&str] = &[
    "toUpperCase",
    "toLowerCase",
    "trim",
    "trimStart",
    "trimEnd",
    "includes",
    "startsWith",
    "endsWith",
    "indexOf",
    "split",
    "slice",
    "substring",
    "replace",
    "replaceAll",
    "concat",
    "charAt",
    "padStart",
    "padEnd",
    "repeat",
    "toString",
];

const ARRAY_METHODS: &[&str] = &[
    "includes",
    "indexOf",
    "join",
    "slice",
    "concat",
    "map",
    "filter",
    "find",
    "findIndex",
    "some",
    "every",
    "reduce",
    "reverse",
    "toString",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

const OBJECT_METHODS: &[&str] = &["hasOwnProperty"];

/// Longest string a built-in may produce, in characters.
pub const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

static FLOAT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(Infinity|(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?)").expect("float prefix regex compiles"));

/// Resolves a global name that is not shadowed by the scope.
pub fn global(name: &str) -> Option<JsValue> {
    Some(match name {
        "Math" => namespace(&[
            ("PI", JsValue::Number(std::f64::consts::PI)),
            ("E", JsValue::Number(std::f64::consts::E)),
            ("abs", function(Builtin::MathAbs)),
            ("ceil", function(Builtin::MathCeil)),
            ("floor", function(Builtin::MathFloor)),
            ("round", function(Builtin::MathRound)),
            ("trunc", function(Builtin::MathTrunc)),
            ("sign", function(Builtin::MathSign)),
            ("max", function(Builtin::MathMax)),
            ("min", function(Builtin::MathMin)),
            ("pow", function(Builtin::MathPow)),
            ("sqrt", function(Builtin::MathSqrt)),
        ]),
        "JSON" => namespace(&[
            ("stringify", function(Builtin::JsonStringify)),
            ("parse", function(Builtin::JsonParse)),
        ]),
        "Object" => namespace(&[
            ("keys", function(Builtin::ObjectKeys)),
            ("values", function(Builtin::ObjectValues)),
            ("entries", function(Builtin::ObjectEntries)),
        ]),
        "Array" => namespace(&[("isArray", function(Builtin::ArrayIsArray))]),
        "String" => function(Builtin::String),
        "Number" => function(Builtin::Number),
        "Boolean" => function(Builtin::Boolean),
        "parseInt" => function(Builtin::ParseInt),
        "parseFloat" => function(Builtin::ParseFloat),
        "isNaN" => function(Builtin::IsNaN),
        "isFinite" => function(Builtin::IsFinite),
        "NaN" => JsValue::Number(f64::NAN),
        "Infinity" => JsValue::Number(f64::INFINITY),
        _ => return None,
    })
}

fn function(builtin: Builtin) -> JsValue {
    JsValue::Function(Function::Builtin(builtin))
}

fn namespace(members: &[(&str, JsValue)]) -> JsValue {
    JsValue::object(members.iter().map(|(key, value)| (key.to_string(), value.clone())).collect::<IndexMap<_, _>>())
}

fn argument(arguments: &[JsValue], index: usize) -> JsValue {
    arguments.get(index).cloned().unwrap_or(JsValue::Undefined)
}

fn number_argument(arguments: &[JsValue], index: usize) -> f64 {
    argument(arguments, index).to_number()
}

fn invalid_string_length() -> ExpressionError {
    ExpressionError::Type {
        message: "Invalid string length".to_string(),
    }
}

pub fn call_builtin(builtin: Builtin, arguments: &[JsValue]) -> Result<JsValue, ExpressionError> {
    let first = || number_argument(arguments, 0);
    Ok(match builtin {
        Builtin::MathAbs => JsValue::Number(first().abs()),
        Builtin::MathCeil => JsValue::Number(first().ceil()),
        Builtin::MathFloor => JsValue::Number(first().floor()),
        Builtin::MathRound => JsValue::Number(js_round(first())),
        Builtin::MathTrunc => JsValue::Number(first().trunc()),
        Builtin::MathSign => {
            let number = first();
            JsValue::Number(if number.is_nan() || number == 0.0 { number } else { number.signum() })
        }
        Builtin::MathMax => JsValue::Number(fold_numbers(arguments, f64::NEG_INFINITY, f64::max)),
        Builtin::MathMin => JsValue::Number(fold_numbers(arguments, f64::INFINITY, f64::min)),
        Builtin::MathPow => JsValue::Number(js_pow(first(), number_argument(arguments, 1))),
        Builtin::MathSqrt => JsValue::Number(first().sqrt()),
        Builtin::JsonStringify => json_stringify(&argument(arguments, 0), &argument(arguments, 2))?,
        Builtin::JsonParse => {
            let text = argument(arguments, 0).to_js_string();
            let parsed: Value = serde_json::from_str(&text).map_err(|error| ExpressionError::Type {
                message: format!("JSON.parse: {error}"),
            })?;
            JsValue::from(&parsed)
        }
        Builtin::ObjectKeys => JsValue::array(own_entries(&argument(arguments, 0)).into_iter().map(|(key, _)| JsValue::string(key)).collect()),
        Builtin::ObjectValues => JsValue::array(own_entries(&argument(arguments, 0)).into_iter().map(|(_, value)| value).collect()),
        Builtin::ObjectEntries => JsValue::array(
            own_entries(&argument(arguments, 0))
                .into_iter()
                .map(|(key, value)| JsValue::array(vec![JsValue::string(key), value]))
                .collect(),
        ),
        Builtin::ArrayIsArray => JsValue::Bool(matches!(argument(arguments, 0), JsValue::Array(_))),
        Builtin::String => match arguments.first() {
            None => JsValue::string(""),
            Some(value) => JsValue::string(value.to_js_string()),
        },
        Builtin::Number => match arguments.first() {
            None => JsValue::Number(0.0),
            Some(value) => JsValue::Number(value.to_number()),
        },
        Builtin::Boolean => JsValue::Bool(argument(arguments, 0).is_truthy()),
        Builtin::ParseInt => JsValue::Number(parse_int(&argument(arguments, 0).to_js_string(), &argument(arguments, 1))),
        Builtin::ParseFloat => JsValue::Number(parse_float(&argument(arguments, 0).to_js_string())),
        Builtin::IsNaN => JsValue::Bool(first().is_nan()),
        Builtin::IsFinite => JsValue::Bool(first().is_finite()),
    })
}

fn fold_numbers(arguments: &[JsValue], initial: f64, pick: fn(f64, f64) -> f64) -> f64 {
    let mut result = initial;
    for value in arguments {
        let number = value.to_number();
        if number.is_nan() {
            return f64::NAN;
        }
        result = pick(result, number);
    }
    result
}

/// `Math.round`: halves round toward positive infinity.
fn js_round(number: f64) -> f64 {
    if !number.is_finite() {
        return number;
    }
    let floor = number.floor();
    if number - floor >= 0.5 { floor + 1.0 } else { floor }
}

/// `**` and `Math.pow`, which differ from `powf` for NaN exponents and `±1 ** ±Infinity`.
pub fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        return f64::NAN;
    }
    base.powf(exponent)
}

fn json_stringify(value: &JsValue, space: &JsValue) -> Result<JsValue, ExpressionError> {
    let Some(json) = value.to_json() else {
        return Ok(JsValue::Undefined);
    };
    let indent = match space {
        JsValue::Number(width) if *width >= 1.0 => " ".repeat(width.min(10.0) as usize),
        JsValue::String(text) => text.chars().take(10).collect(),
        _ => String::new(),
    };
    if indent.is_empty() {
        return Ok(JsValue::string(json.to_string()));
    }

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    json.serialize(&mut serializer).map_err(|error| ExpressionError::Type {
        message: format!("JSON.stringify: {error}"),
    })?;
    Ok(JsValue::string(String::from_utf8_lossy(&buffer).into_owned()))
}

fn own_entries(value: &JsValue) -> Vec<(String, JsValue)> {
    match value {
        JsValue::Object(entries) => entries.iter().map(|(key, value)| (key.clone(), value.clone())).collect(),
        JsValue::Array(items) => items.iter().enumerate().map(|(index, value)| (index.to_string(), value.clone())).collect(),
        JsValue::String(text) => text
            .chars()
            .enumerate()
            .map(|(index, character)| (index.to_string(), JsValue::string(character.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_int(text: &str, radix: &JsValue) -> f64 {
    let trimmed = text.trim_start();
    let (sign, mut digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1.0, &trimmed[1..]),
        Some(b'+') => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };

    let mut radix = match radix {
        JsValue::Undefined => 0,
        other => other.to_number() as u32,
    };
    if (radix == 0 || radix == 16)
        && let Some(rest) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        digits = rest;
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let valid_length = digits.find(|character: char| !character.is_digit(radix)).unwrap_or(digits.len());
    if valid_length == 0 {
        return f64::NAN;
    }
    let magnitude = digits[..valid_length]
        .chars()
        .filter_map(|character| character.to_digit(radix))
        .fold(0.0, |accumulator, digit| accumulator * f64::from(radix) + f64::from(digit));
    sign * magnitude
}

fn parse_float(text: &str) -> f64 {
    match FLOAT_PREFIX.find(text.trim_start()) {
        Some(found) => string_to_number(found.as_str()),
        None => f64::NAN,
    }
}

/// Reports whether `key` names a built-in method of the value's type.
pub fn has_method(target: &JsValue, key: &str) -> bool {
    let methods = match target {
        JsValue::String(_) => STRING_METHODS,
        JsValue::Array(_) => ARRAY_METHODS,
        JsValue::Number(_) => NUMBER_METHODS,
        JsValue::Object(_) => OBJECT_METHODS,
        _ => return false,
    };
    methods.contains(&key)
}

/// Calls a built-in method; `None` when the value has no such method.
pub(super) fn call_method(evaluation: &mut Evaluation<'_>, target: &JsValue, key: &str, arguments: Vec<JsValue>) -> Flow<Option<JsValue>> {
    if !has_method(target, key) {
        return Ok(None);
    }
    let result = match target {
        JsValue::String(text) => string_method(evaluation, text, key, &arguments)?,
        JsValue::Array(items) => array_method(evaluation, target, items, key, &arguments)?,
        JsValue::Number(number) => number_method(*number, key, &arguments)?,
        JsValue::Object(entries) => JsValue::Bool(entries.contains_key(&argument(&arguments, 0).to_property_key())),
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// Resolves a relative index the way `slice` does: negatives count from the end.
fn relative_index(value: &JsValue, length: usize, default: usize) -> usize {
    if matches!(value, JsValue::Undefined) {
        return default;
    }
    let number = value.to_number();
    let number = if number.is_nan() { 0.0 } else { number.trunc() };
    if number < 0.0 {
        (length as f64 + number).max(0.0) as usize
    } else {
        number.min(length as f64) as usize
    }
}

fn clamped_index(value: &JsValue, length: usize, default: usize) -> usize {
    if matches!(value, JsValue::Undefined) {
        return default;
    }
    let number = value.to_number();
    if number.is_nan() {
        return 0;
    }
    number.trunc().clamp(0.0, length as f64) as usize
}

/// Converts a byte offset into a UTF-16 index, as JavaScript reports string positions.
fn utf16_index(text: &str, byte_offset: usize) -> f64 {
    text[..byte_offset].encode_utf16().count() as f64
}

fn string_method(evaluation: &mut Evaluation<'_>, text: &str, key: &str, arguments: &[JsValue]) -> Flow<JsValue> {
    let search = || argument(arguments, 0).to_js_string();
    let characters = || text.chars().collect::<Vec<_>>();
    Ok(match key {
        "toUpperCase" => JsValue::string(text.to_uppercase()),
        "toLowerCase" => JsValue::string(text.to_lowercase()),
        "trim" => JsValue::string(text.trim()),
        "trimStart" => JsValue::string(text.trim_start()),
        "trimEnd" => JsValue::string(text.trim_end()),
        "includes" => JsValue::Bool(text.contains(&search())),
        "startsWith" => JsValue::Bool(text.starts_with(&search())),
        "endsWith" => JsValue::Bool(text.ends_with(&search())),
        "indexOf" => JsValue::Number(text.find(&search()).map(|offset| utf16_index(text, offset)).unwrap_or(-1.0)),
        "split" => {
            let limit = match argument(arguments, 1) {
                JsValue::Undefined => usize::MAX,
                other => other.to_number().max(0.0) as usize,
            };
            let parts: Vec<JsValue> = match argument(arguments, 0) {
                JsValue::Undefined => vec![JsValue::string(text)],
                separator => {
                    let separator = separator.to_js_string();
                    if separator.is_empty() {
                        text.chars().map(|character| JsValue::string(character.to_string())).collect()
                    } else {
                        text.split(separator.as_str()).map(JsValue::string).collect()
                    }
                }
            };
            JsValue::array(parts.into_iter().take(limit).collect())
        }
        "slice" => {
            let characters = characters();
            let start = relative_index(&argument(arguments, 0), characters.len(), 0);
            let end = relative_index(&argument(arguments, 1), characters.len(), characters.len());
            JsValue::string(characters.get(start..end.max(start)).unwrap_or_default().iter().collect::<String>())
        }
        "substring" => {
            let characters = characters();
            let start = clamped_index(&argument(arguments, 0), characters.len(), 0);
            let end = clamped_index(&argument(arguments, 1), characters.len(), characters.len());
            let (start, end) = if start > end { (end, start) } else { (start, end) };
            JsValue::string(characters[start..end].iter().collect::<String>())
        }
        "replace" | "replaceAll" => {
            let pattern = search();
            let replacement = argument(arguments, 1);
            let count = if key == "replace" { 1 } else { usize::MAX };
            let mut result = String::with_capacity(text.len());
            let mut remainder = text;
            let mut replaced = 0;
            while replaced < count
                && let Some(offset) = remainder.find(&pattern)
            {
                result.push_str(&remainder[..offset]);
                let substitute = match &replacement {
                    JsValue::Function(function) => evaluation
                        .call_function(function, vec![JsValue::string(pattern.as_str())])?
                        .to_js_string(),
                    other => other.to_js_string(),
                };
                result.push_str(&substitute);
                replaced += 1;
                if pattern.is_empty() {
                    // An empty pattern matches between every character.
                    let Some(next) = remainder.chars().next() else {
                        remainder = "";
                        break;
                    };
                    result.push(next);
                    remainder = &remainder[next.len_utf8()..];
                } else {
                    remainder = &remainder[offset + pattern.len()..];
                }
            }
            result.push_str(remainder);
            JsValue::string(result)
        }
        "concat" => {
            let mut result = text.to_string();
            for value in arguments {
                result.push_str(&value.to_js_string());
            }
            JsValue::string(result)
        }
        "charAt" => {
            let index = number_argument(arguments, 0);
            let index = if index.is_nan() { 0.0 } else { index.trunc() };
            if index < 0.0 {
                JsValue::string("")
            } else {
                JsValue::string(text.chars().nth(index as usize).map(String::from).unwrap_or_default())
            }
        }
        "padStart" | "padEnd" => {
            let target_length = number_argument(arguments, 0);
            let filler = match argument(arguments, 1) {
                JsValue::Undefined => " ".to_string(),
                other => other.to_js_string(),
            };
            let current = text.chars().count();
            if target_length.is_nan() || target_length <= current as f64 || filler.is_empty() {
                JsValue::string(text)
            } else {
                if target_length > MAX_STRING_LENGTH as f64 {
                    return Err(invalid_string_length().into());
                }
                let padding: String = filler.chars().cycle().take(target_length as usize - current).collect();
                if key == "padStart" {
                    JsValue::string(format!("{padding}{text}"))
                } else {
                    JsValue::string(format!("{text}{padding}"))
                }
            }
        }
        "repeat" => {
            let count = number_argument(arguments, 0);
            if count < 0.0 || count.is_infinite() {
                return Err(ExpressionError::Type {
                    message: format!("Invalid count value: {}", rebind_util::format_js_number(count)),
                }
                .into());
            }
            let count = if count.is_nan() { 0 } else { count as usize };
            let length = text.chars().count().checked_mul(count).ok_or_else(invalid_string_length)?;
            if length > MAX_STRING_LENGTH {
                return Err(invalid_string_length().into());
            }
            JsValue::string(if length == 0 { String::new() } else { text.repeat(count) })
        }
        _ => JsValue::string(text),
    })
}

fn callback(arguments: &[JsValue], method: &str) -> Result<Function, ExpressionError> {
    match arguments.first() {
        Some(JsValue::Function(function)) => Ok(function.clone()),
        other => Err(ExpressionError::Type {
            message: format!(
                "{} is not a function (in Array.prototype.{method})",
                other.map(JsValue::to_js_string).unwrap_or_else(|| "undefined".to_string())
            ),
        }),
    }
}

fn array_method(evaluation: &mut Evaluation<'_>, target: &JsValue, items: &[JsValue], key: &str, arguments: &[JsValue]) -> Flow<JsValue> {
    let invoke = |evaluation: &mut Evaluation<'_>, function: &Function, index: usize| {
        evaluation.call_function(
            function,
            vec![items[index].clone(), JsValue::Number(index as f64), target.clone()],
        )
    };

    Ok(match key {
        "includes" => {
            let needle = argument(arguments, 0);
            JsValue::Bool(items.iter().any(|item| {
                item.strict_equals(&needle)
                    || matches!((item, &needle), (JsValue::Number(a), JsValue::Number(b)) if a.is_nan() && b.is_nan())
            }))
        }
        "indexOf" => {
            let needle = argument(arguments, 0);
            JsValue::Number(
                items
                    .iter()
                    .position(|item| item.strict_equals(&needle))
                    .map(|index| index as f64)
                    .unwrap_or(-1.0),
            )
        }
        "join" | "toString" => {
            let separator = match argument(arguments, 0) {
                JsValue::Undefined => ",".to_string(),
                other if key == "join" => other.to_js_string(),
                _ => ",".to_string(),
            };
            JsValue::string(
                items
                    .iter()
                    .map(|item| if item.is_nullish() { String::new() } else { item.to_js_string() })
                    .collect::<Vec<_>>()
                    .join(&separator),
            )
        }
        "slice" => {
            let start = relative_index(&argument(arguments, 0), items.len(), 0);
            let end = relative_index(&argument(arguments, 1), items.len(), items.len());
            JsValue::array(items.get(start..end.max(start)).unwrap_or_default().to_vec())
        }
        "concat" => {
            let mut combined = items.to_vec();
            for value in arguments {
                match value {
                    JsValue::Array(more) => combined.extend(more.iter().cloned()),
                    other => combined.push(other.clone()),
                }
            }
            JsValue::array(combined)
        }
        "reverse" => JsValue::array(items.iter().rev().cloned().collect()),
        "map" => {
            let function = callback(arguments, key)?;
            let mut mapped = Vec::with_capacity(items.len());
            for index in 0..items.len() {
                mapped.push(invoke(evaluation, &function, index)?);
            }
            JsValue::array(mapped)
        }
        "filter" => {
            let function = callback(arguments, key)?;
            let mut kept = Vec::new();
            for index in 0..items.len() {
                if invoke(evaluation, &function, index)?.is_truthy() {
                    kept.push(items[index].clone());
                }
            }
            JsValue::array(kept)
        }
        "find" | "findIndex" => {
            let function = callback(arguments, key)?;
            for index in 0..items.len() {
                if invoke(evaluation, &function, index)?.is_truthy() {
                    return Ok(if key == "find" {
                        items[index].clone()
                    } else {
                        JsValue::Number(index as f64)
                    });
                }
            }
            if key == "find" { JsValue::Undefined } else { JsValue::Number(-1.0) }
        }
        "some" => {
            let function = callback(arguments, key)?;
            let mut found = false;
            for index in 0..items.len() {
                if invoke(evaluation, &function, index)?.is_truthy() {
                    found = true;
                    break;
                }
            }
            JsValue::Bool(found)
        }
        "every" => {
            let function = callback(arguments, key)?;
            let mut all = true;
            for index in 0..items.len() {
                if !invoke(evaluation, &function, index)?.is_truthy() {
                    all = false;
                    break;
                }
            }
            JsValue::Bool(all)
        }
        "reduce" => {
            let function = callback(arguments, key)?;
            let (mut accumulator, start) = match arguments.get(1) {
                Some(initial) => (initial.clone(), 0),
                None => match items.first() {
                    Some(first) => (first.clone(), 1),
                    None => {
                        return Err(ExpressionError::Type {
                            message: "Reduce of empty array with no initial value".to_string(),
                        }
                        .into());
                    }
                },
            };
            for index in start..items.len() {
                accumulator = evaluation.call_function(
                    &function,
                    vec![accumulator, items[index].clone(), JsValue::Number(index as f64), target.clone()],
                )?;
            }
            accumulator
        }
        _ => JsValue::Undefined,
    })
}

fn number_method(number: f64, key: &str, arguments: &[JsValue]) -> Result<JsValue, ExpressionError> {
    Ok(match key {
        "toFixed" => {
            let digits = match argument(arguments, 0) {
                JsValue::Undefined => 0.0,
                other => other.to_number(),
            };
            if !(0.0..=100.0).contains(&digits) {
                return Err(ExpressionError::Type {
                    message: "toFixed() digits argument must be between 0 and 100".to_string(),
                });
            }
            if !number.is_finite() || number.abs() >= 1e21 {
                JsValue::string(rebind_util::format_js_number(number))
            } else {
                JsValue::string(to_fixed(number, digits as usize))
            }
        }
        _ => JsValue::string(rebind_util::format_js_number(number)),
    })
}

/// Formats with `digits` decimals; exact ties round away from zero.
fn to_fixed(number: f64, digits: usize) -> String {
    const GUARD: usize = 30;
    // Finite doubles below 1e21 show every nonzero digit of a tie within the guard digits.
    let exact = format!("{number:.prec$}", prec = digits + GUARD);
    let (head, tail) = exact.split_at(exact.len() - GUARD);
    if !(tail.starts_with('5') && tail[1..].bytes().all(|byte| byte == b'0')) {
        return format!("{number:.digits$}");
    }

    let mut rounded = head.trim_end_matches('.').as_bytes().to_vec();
    let mut carry = true;
    for byte in rounded.iter_mut().rev() {
        if !carry {
            break;
        }
        match *byte {
            b'9' => *byte = b'0',
            b'0'..=b'8' => {
                *byte += 1;
                carry = false;
            }
            _ => {}
        }
    }
    if carry {
        let position = usize::from(rounded.first() == Some(&b'-'));
        rounded.insert(position, b'1');
    }
    String::from_utf8_lossy(&rounded).into_owned()
}
