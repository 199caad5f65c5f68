//! Recursive-descent parser for binding expressions.
//!
//! Precedence, lowest first: arrow functions, `?:`, `??`, `||`, `&&`,
//! equality, relational (including `in`), additive, multiplicative, `**`
//! (right associative), unary prefix operators, then member access and calls.

use std::rc::Rc;

use super::ExpressionError;
use super::ast::{ArrayElement, BinaryOperator, Expr, LogicalOperator, ObjectMember, PropertyKey, TemplatePart, UnaryOperator};
use super::lexer::{Punct, TemplatePiece, Token, TokenKind, tokenize};

/// Nesting depth beyond which parsing is refused.
pub const MAX_PARSE_DEPTH: usize = 128;

/// Parses a complete expression.
pub fn parse_expression(source: &str) -> Result<Expr, ExpressionError> {
    parse_nested(source, 0, 0)
}

fn parse_nested(source: &str, base_offset: usize, depth: usize) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source).map_err(|error| error.shifted(base_offset))?;
    let mut parser = Parser {
        tokens,
        position: 0,
        depth,
        base_offset,
    };
    let expression = parser.parse_expression()?;
    match &parser.peek().kind {
        TokenKind::Eof => Ok(expression),
        _ => Err(parser.unexpected()),
    }
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    base_offset: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, distance: usize) -> &TokenKind {
        &self.tokens[(self.position + distance).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn check(&self, punct: Punct) -> bool {
        matches!(self.peek().kind, TokenKind::Punct(found) if found == punct)
    }

    fn eat(&mut self, punct: Punct) -> bool {
        if self.check(punct) {
            self.position += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, punct: Punct, what: &str) -> Result<(), ExpressionError> {
        if self.eat(punct) {
            return Ok(());
        }
        Err(self.error(format!("expected {what}, found {}", describe(&self.peek().kind))))
    }

    fn error(&self, message: String) -> ExpressionError {
        ExpressionError::syntax(message, self.base_offset + self.peek().offset)
    }

    fn unexpected(&self) -> ExpressionError {
        self.error(format!("unexpected {}", describe(&self.peek().kind)))
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(self.error(format!("expression is nested more than {MAX_PARSE_DEPTH} levels deep")));
        }
        Ok(())
    }

    fn parse_expression(&mut self) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let expression = if let Some(parameters) = self.arrow_parameters() {
            self.parse_arrow(parameters)
        } else {
            self.parse_conditional()
        };
        self.depth -= 1;
        expression
    }

    /// Detects `x =>` and `(a, b) =>` heads without consuming them.
    fn arrow_parameters(&self) -> Option<Vec<String>> {
        if let TokenKind::Identifier(name) = self.peek_at(0)
            && matches!(self.peek_at(1), TokenKind::Punct(Punct::Arrow))
        {
            return Some(vec![name.clone()]);
        }
        if !matches!(self.peek_at(0), TokenKind::Punct(Punct::LParen)) {
            return None;
        }

        let mut parameters = Vec::new();
        let mut distance = 1;
        if !matches!(self.peek_at(distance), TokenKind::Punct(Punct::RParen)) {
            loop {
                let TokenKind::Identifier(name) = self.peek_at(distance) else {
                    return None;
                };
                parameters.push(name.clone());
                distance += 1;
                match self.peek_at(distance) {
                    TokenKind::Punct(Punct::Comma) => distance += 1,
                    TokenKind::Punct(Punct::RParen) => break,
                    _ => return None,
                }
            }
        }
        matches!(self.peek_at(distance + 1), TokenKind::Punct(Punct::Arrow)).then_some(parameters)
    }

    fn parse_arrow(&mut self, parameters: Vec<String>) -> Result<Expr, ExpressionError> {
        while !self.eat(Punct::Arrow) {
            self.advance();
        }
        if self.check(Punct::LBrace) {
            return Err(self.error("arrow function block bodies are not supported".to_string()));
        }
        let body = self.parse_expression()?;
        Ok(Expr::Arrow {
            parameters,
            body: Rc::new(body),
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr, ExpressionError> {
        let test = self.parse_coalesce()?;
        if !self.eat(Punct::Question) {
            return Ok(test);
        }
        let consequent = self.parse_expression()?;
        self.expect(Punct::Colon, "':' in conditional expression")?;
        let alternate = self.parse_expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn parse_coalesce(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_or()?;
        while self.eat(Punct::QuestionQuestion) {
            let right = self.parse_or()?;
            left = logical(LogicalOperator::Coalesce, left, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat(Punct::OrOr) {
            let right = self.parse_and()?;
            left = logical(LogicalOperator::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_equality()?;
        while self.eat(Punct::AndAnd) {
            let right = self.parse_equality()?;
            left = logical(LogicalOperator::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_relational()?;
        loop {
            let operator = match self.peek().kind {
                TokenKind::Punct(Punct::EqEq) => BinaryOperator::LooseEqual,
                TokenKind::Punct(Punct::BangEq) => BinaryOperator::LooseNotEqual,
                TokenKind::Punct(Punct::EqEqEq) => BinaryOperator::StrictEqual,
                TokenKind::Punct(Punct::BangEqEq) => BinaryOperator::StrictNotEqual,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = binary(operator, left, right);
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_additive()?;
        loop {
            let operator = match &self.peek().kind {
                TokenKind::Punct(Punct::Lt) => BinaryOperator::Less,
                TokenKind::Punct(Punct::LtEq) => BinaryOperator::LessEqual,
                TokenKind::Punct(Punct::Gt) => BinaryOperator::Greater,
                TokenKind::Punct(Punct::GtEq) => BinaryOperator::GreaterEqual,
                TokenKind::Identifier(keyword) if keyword == "in" => BinaryOperator::In,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(operator, left, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let operator = match self.peek().kind {
                TokenKind::Punct(Punct::Plus) => BinaryOperator::Add,
                TokenKind::Punct(Punct::Minus) => BinaryOperator::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(operator, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_exponent()?;
        loop {
            let operator = match self.peek().kind {
                TokenKind::Punct(Punct::Star) => BinaryOperator::Multiply,
                TokenKind::Punct(Punct::Slash) => BinaryOperator::Divide,
                TokenKind::Punct(Punct::Percent) => BinaryOperator::Remainder,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_exponent()?;
            left = binary(operator, left, right);
        }
    }

    fn parse_exponent(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_unary()?;
        if !self.eat(Punct::StarStar) {
            return Ok(base);
        }
        self.enter()?;
        let exponent = self.parse_exponent();
        self.depth -= 1;
        Ok(binary(BinaryOperator::Exponent, base, exponent?))
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        let operator = match &self.peek().kind {
            TokenKind::Punct(Punct::Bang) => UnaryOperator::Not,
            TokenKind::Punct(Punct::Minus) => UnaryOperator::Negate,
            TokenKind::Punct(Punct::Plus) => UnaryOperator::Plus,
            TokenKind::Identifier(keyword) if keyword == "typeof" => UnaryOperator::TypeOf,
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary {
            operator,
            operand: Box::new(operand?),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expression = self.parse_primary()?;
        let mut in_optional_chain = false;

        loop {
            if self.eat(Punct::Dot) {
                let name = self.parse_property_name()?;
                expression = member(expression, PropertyKey::Named(name), false);
            } else if self.eat(Punct::QuestionDot) {
                in_optional_chain = true;
                if self.eat(Punct::LBracket) {
                    let property = self.parse_expression()?;
                    self.expect(Punct::RBracket, "']'")?;
                    expression = member(expression, PropertyKey::Computed(property), true);
                } else if self.eat(Punct::LParen) {
                    let arguments = self.parse_arguments(Punct::RParen, "')'")?;
                    expression = call(expression, arguments, true);
                } else {
                    let name = self.parse_property_name()?;
                    expression = member(expression, PropertyKey::Named(name), true);
                }
            } else if self.eat(Punct::LBracket) {
                let property = self.parse_expression()?;
                self.expect(Punct::RBracket, "']'")?;
                expression = member(expression, PropertyKey::Computed(property), false);
            } else if self.eat(Punct::LParen) {
                let arguments = self.parse_arguments(Punct::RParen, "')'")?;
                expression = call(expression, arguments, false);
            } else {
                break;
            }
        }

        if in_optional_chain {
            expression = Expr::OptionalChain(Box::new(expression));
        }
        Ok(expression)
    }

    fn parse_property_name(&mut self) -> Result<String, ExpressionError> {
        if let TokenKind::Identifier(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            return Ok(name);
        }
        Err(self.error(format!("expected property name, found {}", describe(&self.peek().kind))))
    }

    /// Parses a comma list with optional spreads and a trailing comma.
    fn parse_arguments(&mut self, close: Punct, what: &str) -> Result<Vec<ArrayElement>, ExpressionError> {
        let mut elements = Vec::new();
        while !self.eat(close) {
            if self.eat(Punct::Ellipsis) {
                elements.push(ArrayElement::Spread(self.parse_expression()?));
            } else {
                elements.push(ArrayElement::Item(self.parse_expression()?));
            }
            if !self.eat(Punct::Comma) {
                self.expect(close, what)?;
                break;
            }
        }
        Ok(elements)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let start = self.position;
        let token = self.advance();
        match token.kind {
            TokenKind::Number(number) => Ok(Expr::Number(number)),
            TokenKind::String(text) => Ok(Expr::String(text)),
            TokenKind::Template(pieces) => self.parse_template(pieces),
            TokenKind::Identifier(name) => Ok(match name.as_str() {
                "true" => Expr::Boolean(true),
                "false" => Expr::Boolean(false),
                "null" => Expr::Null,
                "undefined" => Expr::Undefined,
                _ => Expr::Identifier(name),
            }),
            TokenKind::Punct(Punct::LParen) => {
                let expression = self.parse_expression()?;
                self.expect(Punct::RParen, "')'")?;
                Ok(expression)
            }
            TokenKind::Punct(Punct::LBracket) => {
                self.enter()?;
                let elements = self.parse_arguments(Punct::RBracket, "']' or ','");
                self.depth -= 1;
                Ok(Expr::Array(elements?))
            }
            TokenKind::Punct(Punct::LBrace) => {
                self.enter()?;
                let members = self.parse_object_members();
                self.depth -= 1;
                Ok(Expr::Object(members?))
            }
            _ => {
                self.position = start;
                Err(self.unexpected())
            }
        }
    }

    fn parse_object_members(&mut self) -> Result<Vec<ObjectMember>, ExpressionError> {
        let mut members = Vec::new();
        while !self.eat(Punct::RBrace) {
            if self.eat(Punct::Ellipsis) {
                members.push(ObjectMember::Spread(self.parse_expression()?));
            } else {
                let start = self.position;
                let key = match self.advance().kind {
                    TokenKind::Identifier(name) if !self.check(Punct::Colon) => {
                        members.push(ObjectMember::Property(PropertyKey::Named(name.clone()), Expr::Identifier(name)));
                        if !self.eat(Punct::Comma) {
                            self.expect(Punct::RBrace, "'}' or ','")?;
                            break;
                        }
                        continue;
                    }
                    TokenKind::Identifier(name) | TokenKind::String(name) => PropertyKey::Named(name),
                    TokenKind::Number(number) => PropertyKey::Named(rebind_util::format_js_number(number)),
                    TokenKind::Punct(Punct::LBracket) => {
                        let computed = self.parse_expression()?;
                        self.expect(Punct::RBracket, "']'")?;
                        PropertyKey::Computed(computed)
                    }
                    _ => {
                        self.position = start;
                        return Err(self.error(format!("expected property key, found {}", describe(&self.peek().kind))));
                    }
                };
                self.expect(Punct::Colon, "':' after property key")?;
                members.push(ObjectMember::Property(key, self.parse_expression()?));
            }
            if !self.eat(Punct::Comma) {
                self.expect(Punct::RBrace, "'}' or ','")?;
                break;
            }
        }
        Ok(members)
    }

    fn parse_template(&mut self, pieces: Vec<TemplatePiece>) -> Result<Expr, ExpressionError> {
        let mut parts = Vec::with_capacity(pieces.len());
        for piece in pieces {
            match piece {
                TemplatePiece::Text(text) => parts.push(TemplatePart::Text(text)),
                TemplatePiece::Substitution(source, offset) => {
                    let expression = parse_nested(&source, self.base_offset + offset, self.depth + 1)?;
                    parts.push(TemplatePart::Expression(expression));
                }
            }
        }
        Ok(Expr::Template(parts))
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(number) => format!("number {}", rebind_util::format_js_number(*number)),
        TokenKind::String(_) => "string literal".to_string(),
        TokenKind::Template(_) => "template literal".to_string(),
        TokenKind::Identifier(name) => format!("identifier '{name}'"),
        TokenKind::Punct(punct) => format!("token {punct:?}"),
        TokenKind::Eof => "end of expression".to_string(),
    }
}

fn logical(operator: LogicalOperator, left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn binary(operator: BinaryOperator, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn member(object: Expr, property: PropertyKey, optional: bool) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: Box::new(property),
        optional,
    }
}

fn call(callee: Expr, arguments: Vec<ArrayElement>, optional: bool) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        arguments,
        optional,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Expr {
        parse_expression(source).unwrap_or_else(|error| panic!("{source}: {error}"))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("1 + 2 * 3"),
            binary(
                BinaryOperator::Add,
                Expr::Number(1.0),
                binary(BinaryOperator::Multiply, Expr::Number(2.0), Expr::Number(3.0))
            )
        );
    }

    #[test]
    fn exponent_is_right_associative() {
        assert_eq!(
            parse("2 ** 3 ** 2"),
            binary(
                BinaryOperator::Exponent,
                Expr::Number(2.0),
                binary(BinaryOperator::Exponent, Expr::Number(3.0), Expr::Number(2.0))
            )
        );
    }

    #[test]
    fn parses_member_chains_and_calls() {
        let expression = parse("Table1.tableData[0].name.toUpperCase()");
        let Expr::Call { callee, arguments, optional } = expression else {
            panic!("expected call");
        };
        assert!(arguments.is_empty());
        assert!(!optional);
        assert!(matches!(*callee, Expr::Member { ref property, .. } if **property == PropertyKey::Named("toUpperCase".into())));
    }

    #[test]
    fn optional_chains_are_wrapped_once() {
        let expression = parse("a?.b.c");
        let Expr::OptionalChain(inner) = expression else {
            panic!("expected optional chain");
        };
        assert!(matches!(*inner, Expr::Member { optional: false, .. }));
    }

    #[test]
    fn parses_arrow_functions() {
        assert!(matches!(parse("x => x + 1"), Expr::Arrow { ref parameters, .. } if parameters == &["x"]));
        assert!(matches!(parse("(a, b) => a"), Expr::Arrow { ref parameters, .. } if parameters.len() == 2));
        assert!(matches!(parse("() => ({a: 1})"), Expr::Arrow { ref parameters, .. } if parameters.is_empty()));
        assert!(matches!(parse("(a)"), Expr::Identifier(_)));
    }

    #[test]
    fn parses_object_literals() {
        let expression = parse("{a, 'b c': 1, [k]: 2, ...rest,}");
        let Expr::Object(members) = expression else {
            panic!("expected object");
        };
        assert_eq!(members.len(), 4);
        assert_eq!(
            members[0],
            ObjectMember::Property(PropertyKey::Named("a".into()), Expr::Identifier("a".into()))
        );
    }

    #[test]
    fn parses_template_substitutions() {
        let expression = parse("`n=${count + 1}`");
        let Expr::Template(parts) = expression else {
            panic!("expected template");
        };
        assert_eq!(parts[0], TemplatePart::Text("n=".into()));
        assert!(matches!(parts[1], TemplatePart::Expression(Expr::Binary { .. })));
    }

    #[test]
    fn reports_syntax_errors_with_offsets() {
        let error = parse_expression("1 +").expect_err("incomplete");
        assert!(matches!(error, ExpressionError::Syntax { offset: 3, .. }), "{error:?}");

        let error = parse_expression("a b").expect_err("juxtaposed");
        assert!(matches!(error, ExpressionError::Syntax { offset: 2, .. }), "{error:?}");

        let error = parse_expression("`${1 +}`").expect_err("bad substitution");
        assert!(matches!(error, ExpressionError::Syntax { offset: 6, .. }), "{error:?}");
    }

    #[test]
    fn refuses_excessive_nesting() {
        let source = format!("{}1{}", "(".repeat(MAX_PARSE_DEPTH + 1), ")".repeat(MAX_PARSE_DEPTH + 1));
        let error = parse_expression(&source).expect_err("too deep");
        assert!(error.to_string().contains("nested"), "{error}");
    }
}
