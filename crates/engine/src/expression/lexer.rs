//! Tokenizer for binding expressions.

use rebind_util::unescape_js;

use super::ExpressionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Ellipsis,
    Question,
    QuestionDot,
    QuestionQuestion,
    Arrow,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Bang,
    EqEq,
    EqEqEq,
    BangEq,
    BangEqEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
}

/// Piece of a template literal as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePiece {
    Text(String),
    /// Source of a `${ ... }` substitution and its byte offset in the expression.
    Substitution(String, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Template(Vec<TemplatePiece>),
    Identifier(String),
    Punct(Punct),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character of the token.
    pub offset: usize,
}

/// Ordered punctuators; longer spellings come first so they win.
const PUNCTUATORS: &[(&str, Punct)] = &[
    ("===", Punct::EqEqEq),
    ("!==", Punct::BangEqEq),
    ("...", Punct::Ellipsis),
    ("**", Punct::StarStar),
    ("==", Punct::EqEq),
    ("!=", Punct::BangEq),
    ("<=", Punct::LtEq),
    (">=", Punct::GtEq),
    ("&&", Punct::AndAnd),
    ("||", Punct::OrOr),
    ("??", Punct::QuestionQuestion),
    ("=>", Punct::Arrow),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    (",", Punct::Comma),
    (":", Punct::Colon),
    (".", Punct::Dot),
    ("?", Punct::Question),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("!", Punct::Bang),
    ("<", Punct::Lt),
    (">", Punct::Gt),
];

/// Splits expression source into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut offset = 0;

    while offset < bytes.len() {
        let rest = &source[offset..];
        let Some(current) = rest.chars().next() else {
            break;
        };

        if current.is_whitespace() {
            offset += current.len_utf8();
            continue;
        }

        let start = offset;
        if current.is_ascii_digit() || (current == '.' && rest[1..].starts_with(|c: char| c.is_ascii_digit())) {
            let (number, length) = lex_number(rest, start)?;
            tokens.push(Token {
                kind: TokenKind::Number(number),
                offset: start,
            });
            offset += length;
            continue;
        }

        if is_identifier_start(current) {
            let length = rest
                .char_indices()
                .find(|(_, character)| !is_identifier_part(*character))
                .map(|(index, _)| index)
                .unwrap_or(rest.len());
            tokens.push(Token {
                kind: TokenKind::Identifier(rest[..length].to_string()),
                offset: start,
            });
            offset += length;
            continue;
        }

        if current == '"' || current == '\'' {
            let (text, length) = lex_string(rest, current, start)?;
            tokens.push(Token {
                kind: TokenKind::String(text),
                offset: start,
            });
            offset += length;
            continue;
        }

        if current == '`' {
            let (pieces, length) = lex_template(rest, start)?;
            tokens.push(Token {
                kind: TokenKind::Template(pieces),
                offset: start,
            });
            offset += length;
            continue;
        }

        // `?.` followed by a digit is a conditional with a decimal operand.
        if rest.starts_with("?.") && !rest[2..].starts_with(|c: char| c.is_ascii_digit()) {
            tokens.push(Token {
                kind: TokenKind::Punct(Punct::QuestionDot),
                offset: start,
            });
            offset += 2;
            continue;
        }
        match PUNCTUATORS.iter().find(|(spelling, _)| rest.starts_with(spelling)) {
            Some((spelling, punct)) => {
                tokens.push(Token {
                    kind: TokenKind::Punct(*punct),
                    offset: start,
                });
                offset += spelling.len();
            }
            None => {
                return Err(ExpressionError::syntax(format!("unexpected character '{current}'"), start));
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: source.len(),
    });
    Ok(tokens)
}

pub fn is_identifier_start(character: char) -> bool {
    character.is_alphabetic() || character == '_' || character == '$'
}

pub fn is_identifier_part(character: char) -> bool {
    character.is_alphanumeric() || character == '_' || character == '$'
}

fn lex_number(rest: &str, start: usize) -> Result<(f64, usize), ExpressionError> {
    let bytes = rest.as_bytes();

    if bytes.len() > 1 && bytes[0] == b'0' && matches!(bytes[1], b'x' | b'X' | b'b' | b'B' | b'o' | b'O') {
        let radix = match bytes[1] {
            b'x' | b'X' => 16,
            b'b' | b'B' => 2,
            _ => 8,
        };
        let digits_length = rest[2..]
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len() - 2);
        let digits = &rest[2..2 + digits_length];
        let value = u64::from_str_radix(digits, radix)
            .map_err(|_| ExpressionError::syntax(format!("invalid number literal '{}'", &rest[..2 + digits_length]), start))?;
        return Ok((value as f64, 2 + digits_length));
    }

    let mut length = 0;
    let mut seen_dot = false;
    let mut seen_exponent = false;
    while length < bytes.len() {
        match bytes[length] {
            b'0'..=b'9' => length += 1,
            b'.' if !seen_dot && !seen_exponent => {
                seen_dot = true;
                length += 1;
            }
            b'e' | b'E' if !seen_exponent => {
                let mut lookahead = length + 1;
                if lookahead < bytes.len() && matches!(bytes[lookahead], b'+' | b'-') {
                    lookahead += 1;
                }
                if lookahead < bytes.len() && bytes[lookahead].is_ascii_digit() {
                    seen_exponent = true;
                    length = lookahead;
                } else {
                    break;
                }
            }
            _ => break,
        }
    }

    if rest[length..].starts_with(is_identifier_start) {
        return Err(ExpressionError::syntax("identifier starts immediately after numeric literal", start + length));
    }

    rest[..length]
        .parse::<f64>()
        .map(|value| (value, length))
        .map_err(|_| ExpressionError::syntax(format!("invalid number literal '{}'", &rest[..length]), start))
}

fn lex_string(rest: &str, quote: char, start: usize) -> Result<(String, usize), ExpressionError> {
    let mut escaped = false;
    for (index, character) in rest.char_indices().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        match character {
            '\\' => escaped = true,
            '\n' => return Err(ExpressionError::syntax("unterminated string literal", start)),
            _ if character == quote => {
                let raw = &rest[1..index];
                return Ok((unescape_js(raw).into_owned(), index + 1));
            }
            _ => {}
        }
    }
    Err(ExpressionError::syntax("unterminated string literal", start))
}

fn lex_template(rest: &str, start: usize) -> Result<(Vec<TemplatePiece>, usize), ExpressionError> {
    let mut pieces = Vec::new();
    let mut text_start = 1;
    let mut index = 1;
    let bytes = rest.as_bytes();

    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 2,
            b'`' => {
                push_template_text(&mut pieces, &rest[text_start..index]);
                return Ok((pieces, index + 1));
            }
            b'$' if bytes.get(index + 1) == Some(&b'{') => {
                push_template_text(&mut pieces, &rest[text_start..index]);
                let source_start = index + 2;
                let source_end = substitution_end(rest, source_start)
                    .ok_or_else(|| ExpressionError::syntax("unterminated template substitution", start + index))?;
                pieces.push(TemplatePiece::Substitution(
                    rest[source_start..source_end].to_string(),
                    start + source_start,
                ));
                index = source_end + 1;
                text_start = index;
            }
            _ => index += 1,
        }
    }

    Err(ExpressionError::syntax("unterminated template literal", start))
}

fn push_template_text(pieces: &mut Vec<TemplatePiece>, raw: &str) {
    if !raw.is_empty() {
        pieces.push(TemplatePiece::Text(unescape_js(raw).into_owned()));
    }
}

/// Finds the `}` closing a `${` substitution, skipping nested braces and quoted text.
fn substitution_end(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut index = from;

    while index < bytes.len() {
        let byte = bytes[index];
        if let Some(open) = quote {
            if byte == b'\\' {
                index += 2;
                continue;
            }
            if byte == open {
                quote = None;
            }
            index += 1;
            continue;
        }
        match byte {
            b'"' | b'\'' | b'`' => quote = Some(byte),
            b'{' => depth += 1,
            b'}' if depth == 0 => return Some(index),
            b'}' => depth -= 1,
            _ => {}
        }
        index += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).expect("tokenize").into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn tokenizes_operators_longest_first() {
        assert_eq!(
            kinds("a === b !== c ?? d?.e ** 2"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Punct(Punct::EqEqEq),
                TokenKind::Identifier("b".into()),
                TokenKind::Punct(Punct::BangEqEq),
                TokenKind::Identifier("c".into()),
                TokenKind::Punct(Punct::QuestionQuestion),
                TokenKind::Identifier("d".into()),
                TokenKind::Punct(Punct::QuestionDot),
                TokenKind::Identifier("e".into()),
                TokenKind::Punct(Punct::StarStar),
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn conditional_before_decimal_is_not_optional_chaining() {
        assert_eq!(
            kinds("a?.5:1"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Punct(Punct::Question),
                TokenKind::Number(0.5),
                TokenKind::Punct(Punct::Colon),
                TokenKind::Number(1.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_numbers() {
        assert_eq!(kinds("0x1F 1.5e3 .25 7"), vec![
            TokenKind::Number(31.0),
            TokenKind::Number(1500.0),
            TokenKind::Number(0.25),
            TokenKind::Number(7.0),
            TokenKind::Eof,
        ]);
        assert!(tokenize("3abc").is_err());
    }

    #[test]
    fn tokenizes_strings_with_escapes() {
        assert_eq!(kinds(r#"'it\'s' "a\nb""#), vec![
            TokenKind::String("it's".into()),
            TokenKind::String("a\nb".into()),
            TokenKind::Eof,
        ]);
        let error = tokenize("'open").expect_err("unterminated");
        assert!(matches!(error, ExpressionError::Syntax { offset: 0, .. }));
    }

    #[test]
    fn tokenizes_template_literals() {
        assert_eq!(kinds("`a ${x + {b: 1}.b} c`"), vec![
            TokenKind::Template(vec![
                TemplatePiece::Text("a ".into()),
                TemplatePiece::Substitution("x + {b: 1}.b".into(), 5),
                TemplatePiece::Text(" c".into()),
            ]),
            TokenKind::Eof,
        ]);
    }

    #[test]
    fn rejects_unknown_characters_with_offset() {
        let error = tokenize("a # b").expect_err("bad char");
        assert_eq!(error, ExpressionError::syntax("unexpected character '#'", 2));
    }
}
