//! # Text Processing Utilities
//!
//! Decoding of JavaScript-style escape sequences found in stored binding text.
//! Application definitions persist expressions as JSON strings, so a binding
//! such as `{{ "line\\nbreak" }}` reaches the evaluator with its escapes still
//! encoded.

use std::borrow::Cow;

/// Decodes JavaScript escape sequences in `input`.
///
/// Supports `\n`, `\t`, `\r`, `\b`, `\f`, `\v`, `\0`, `\xHH`, `\uHHHH`,
/// `\u{H...}`, UTF-16 surrogate pairs (`\uD83D\uDE00`) and escaped
/// punctuation (`\'`, `\"`, `\\`, `` \` ``). A backslash followed by any
/// other character yields that character. Malformed hex escapes are kept
/// verbatim. Returns a borrowed string when nothing changed.
///
/// # Example
/// ```rust
/// use rebind_util::text_processing::unescape_js;
///
/// assert_eq!(unescape_js(r"a\tb"), "a\tb");
/// assert_eq!(unescape_js(r"A\x42"), "AB");
/// assert_eq!(unescape_js("plain"), "plain");
/// ```
pub fn unescape_js(input: &str) -> Cow<'_, str> {
    if !input.contains('\\') {
        return Cow::Borrowed(input);
    }

    let mut output = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((index, character)) = chars.next() {
        if character != '\\' {
            output.push(character);
            continue;
        }
        let Some((_, escaped)) = chars.next() else {
            output.push('\\');
            break;
        };
        match escaped {
            'n' => output.push('\n'),
            't' => output.push('\t'),
            'r' => output.push('\r'),
            'b' => output.push('\u{8}'),
            'f' => output.push('\u{c}'),
            'v' => output.push('\u{b}'),
            '0' if !chars.peek().is_some_and(|(_, next)| next.is_ascii_digit()) => output.push('\0'),
            'x' => {
                let start = index + 2;
                match decode_fixed_hex(input, start, 2) {
                    Some(decoded) => {
                        output.push(decoded);
                        skip(&mut chars, 2);
                    }
                    None => output.push_str("\\x"),
                }
            }
            'u' => {
                let start = index + 2;
                if input[start..].starts_with('{') {
                    match decode_braced_hex(input, start) {
                        Some((decoded, consumed)) => {
                            output.push(decoded);
                            skip(&mut chars, consumed);
                        }
                        None => output.push_str("\\u"),
                    }
                } else if let Some(decoded) = decode_surrogate_pair(input, start) {
                    output.push(decoded);
                    skip(&mut chars, 10);
                } else {
                    match decode_fixed_hex(input, start, 4) {
                        Some(decoded) => {
                            output.push(decoded);
                            skip(&mut chars, 4);
                        }
                        None => output.push_str("\\u"),
                    }
                }
            }
            other => output.push(other),
        }
    }

    Cow::Owned(output)
}

fn skip(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, count: usize) {
    for _ in 0..count {
        chars.next();
    }
}

fn decode_hex_unit(input: &str, start: usize, width: usize) -> Option<u32> {
    let digits = input.get(start..start + width)?;
    if !digits.chars().all(|character| character.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

fn decode_fixed_hex(input: &str, start: usize, width: usize) -> Option<char> {
    char::from_u32(decode_hex_unit(input, start, width)?)
}

/// Decodes `HHHH\uHHHH` at `start` when it spells a UTF-16 surrogate pair.
fn decode_surrogate_pair(input: &str, start: usize) -> Option<char> {
    let high = decode_hex_unit(input, start, 4)?;
    if !(0xD800..=0xDBFF).contains(&high) || !input.get(start + 4..)?.starts_with("\\u") {
        return None;
    }
    let low = decode_hex_unit(input, start + 6, 4)?;
    if !(0xDC00..=0xDFFF).contains(&low) {
        return None;
    }
    char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00))
}

/// Decodes `{H...}` starting at `start` (the opening brace). Returns the
/// character and the number of input characters consumed, braces included.
fn decode_braced_hex(input: &str, start: usize) -> Option<(char, usize)> {
    let rest = &input[start + 1..];
    let close = rest.find('}')?;
    let digits = &rest[..close];
    if digits.is_empty() || digits.len() > 6 || !digits.chars().all(|character| character.is_ascii_hexdigit()) {
        return None;
    }
    let decoded = char::from_u32(u32::from_str_radix(digits, 16).ok()?)?;
    Some((decoded, digits.len() + 2))
}
