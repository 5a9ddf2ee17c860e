//! Recursive-descent formula parser
//!
//! Precedence, lowest first:
//!
//! ```text
//! comparison := concat (("==" | "!=" | "<" | "<=" | ">" | ">=") concat)?
//! concat     := additive ("&" additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := "-" unary | "!" unary | primary
//! primary    := NUMBER | STRING | true | false | null
//!             | IDENT | IDENT "(" args ")" | "(" comparison ")"
//! ```
//!
//! Nesting depth and node count are bounded here, so evaluating any parsed
//! tree has bounded recursion.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::errors::{FormulaError, FormulaResult};
use super::functions;
use super::lexer::{tokenize, Spanned, Token};

/// Maximum formula text length in bytes
pub const MAX_FORMULA_BYTES: usize = 4096;

/// Maximum expression nesting depth
pub const MAX_DEPTH: usize = 64;

/// Maximum number of syntax tree nodes
pub const MAX_NODES: usize = 1024;

/// Parse formula text into a syntax tree
pub fn parse(text: &str) -> FormulaResult<Expr> {
    if text.len() > MAX_FORMULA_BYTES {
        return Err(FormulaError::LimitExceeded(format!(
            "formula is {} bytes, limit is {}",
            text.len(),
            MAX_FORMULA_BYTES
        )));
    }

    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(FormulaError::syntax(0, "empty formula"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        nodes: 0,
        end: text.len(),
    };
    let expr = parser.comparison()?;

    if let Some(extra) = parser.peek() {
        return Err(FormulaError::syntax(
            extra.offset,
            format!("unexpected {}", describe(&extra.token)),
        ));
    }

    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    nodes: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |s| s.offset)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token, what: &str) -> FormulaResult<()> {
        match self.peek_token() {
            Some(t) if *t == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(FormulaError::syntax(
                self.offset(),
                format!("expected {}, found {}", what, describe(t)),
            )),
            None => Err(FormulaError::syntax(
                self.end,
                format!("expected {}, found end of formula", what),
            )),
        }
    }

    fn node(&mut self, expr: Expr) -> FormulaResult<Expr> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(FormulaError::LimitExceeded(format!(
                "formula has more than {} nodes",
                MAX_NODES
            )));
        }
        Ok(expr)
    }

    fn enter(&mut self) -> FormulaResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::LimitExceeded(format!(
                "formula nests deeper than {}",
                MAX_DEPTH
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn comparison(&mut self) -> FormulaResult<Expr> {
        self.enter()?;
        let left = self.concat()?;
        let op = match self.peek_token() {
            Some(Token::Eq) => Some(BinaryOp::Eq),
            Some(Token::Ne) => Some(BinaryOp::Ne),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Ge) => Some(BinaryOp::Ge),
            _ => None,
        };
        let result = match op {
            Some(op) => {
                self.pos += 1;
                let right = self.concat()?;
                self.node(Expr::Binary(op, Box::new(left), Box::new(right)))?
            }
            None => left,
        };
        self.leave();
        Ok(result)
    }

    fn concat(&mut self) -> FormulaResult<Expr> {
        let mut left = self.additive()?;
        while let Some(Token::Amp) = self.peek_token() {
            self.pos += 1;
            let right = self.additive()?;
            left = self.node(Expr::Binary(BinaryOp::Concat, Box::new(left), Box::new(right)))?;
        }
        Ok(left)
    }

    fn additive(&mut self) -> FormulaResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.term()?;
            left = self.node(Expr::Binary(op, Box::new(left), Box::new(right)))?;
        }
        Ok(left)
    }

    fn term(&mut self) -> FormulaResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = self.node(Expr::Binary(op, Box::new(left), Box::new(right)))?;
        }
        Ok(left)
    }

    fn unary(&mut self) -> FormulaResult<Expr> {
        let op = match self.peek_token() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Bang) => Some(UnaryOp::Not),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                self.enter()?;
                let inner = self.unary()?;
                self.leave();
                self.node(Expr::Unary(op, Box::new(inner)))
            }
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> FormulaResult<Expr> {
        let offset = self.offset();
        let spanned = self
            .advance()
            .ok_or_else(|| FormulaError::syntax(offset, "unexpected end of formula"))?;

        let expr = match spanned.token {
            Token::Number(n) => Expr::Number(n),
            Token::Str(s) => Expr::Str(s),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Null => Expr::Null,
            Token::LParen => {
                let inner = self.comparison()?;
                self.expect(Token::RParen, "')'")?;
                return Ok(inner);
            }
            Token::Ident(name) => {
                if let Some(Token::LParen) = self.peek_token() {
                    self.pos += 1;
                    let args = self.arguments()?;
                    functions::check_call(&name, args.len())?;
                    Expr::Call(name, args)
                } else {
                    Expr::Field(name)
                }
            }
            other => {
                return Err(FormulaError::syntax(
                    spanned.offset,
                    format!("unexpected {}", describe(&other)),
                ))
            }
        };

        self.node(expr)
    }

    fn arguments(&mut self) -> FormulaResult<Vec<Expr>> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek_token() {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.comparison()?);
            match self.peek_token() {
                Some(Token::Comma) => self.pos += 1,
                _ => break,
            }
        }
        self.expect(Token::RParen, "')' or ','")?;
        Ok(args)
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {}", n),
        Token::Str(_) => "string literal".to_string(),
        Token::Ident(name) => format!("identifier '{}'", name),
        Token::True | Token::False => "boolean literal".to_string(),
        Token::Null => "null".to_string(),
        Token::Plus => "'+'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Star => "'*'".to_string(),
        Token::Slash => "'/'".to_string(),
        Token::Percent => "'%'".to_string(),
        Token::Amp => "'&'".to_string(),
        Token::Bang => "'!'".to_string(),
        Token::Eq => "'=='".to_string(),
        Token::Ne => "'!='".to_string(),
        Token::Lt => "'<'".to_string(),
        Token::Le => "'<='".to_string(),
        Token::Gt => "'>'".to_string(),
        Token::Ge => "'>='".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Comma => "','".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn field(name: &str) -> Box<Expr> {
        Box::new(Expr::Field(name.to_string()))
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = parse("a + b * c").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                field("a"),
                Box::new(Expr::Binary(BinaryOp::Mul, field("b"), field("c")))
            )
        );
    }

    #[test]
    fn test_left_associative_subtraction() {
        let expr = parse("a - b - c").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Sub,
                Box::new(Expr::Binary(BinaryOp::Sub, field("a"), field("b"))),
                field("c")
            )
        );
    }

    #[test]
    fn test_parentheses_override() {
        let expr = parse("(a + b) * 2").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Mul,
                Box::new(Expr::Binary(BinaryOp::Add, field("a"), field("b"))),
                Box::new(Expr::Number(Decimal::from(2)))
            )
        );
    }

    #[test]
    fn test_concat_binds_looser_than_arithmetic() {
        let expr = parse("'n=' & a + 1").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Concat, _, right) => {
                assert!(matches!(*right, Expr::Binary(BinaryOp::Add, _, _)));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_chained_comparison_rejected() {
        assert!(matches!(parse("a < b < c"), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn test_function_call() {
        let expr = parse("round(amount * 1.1, 2)").unwrap();
        assert!(matches!(expr, Expr::Call(ref name, ref args) if name == "round" && args.len() == 2));
    }

    #[test]
    fn test_unknown_function_rejected_at_parse() {
        assert_eq!(
            parse("system('rm')"),
            Err(FormulaError::UnknownFunction("system".into()))
        );
    }

    #[test]
    fn test_wrong_arity_rejected_at_parse() {
        assert!(matches!(parse("abs(1, 2)"), Err(FormulaError::Arity { .. })));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(matches!(parse("a b"), Err(FormulaError::Syntax { offset: 2, .. })));
    }

    #[test]
    fn test_empty_formula_rejected() {
        assert!(matches!(parse("   "), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn test_missing_close_paren() {
        assert!(matches!(parse("(a + b"), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let text = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse(&text), Err(FormulaError::LimitExceeded(_))));
    }

    #[test]
    fn test_unary_depth_limit() {
        let text = format!("{}1", "-".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse(&text), Err(FormulaError::LimitExceeded(_))));
    }

    #[test]
    fn test_length_limit() {
        let text = "1+".repeat(MAX_FORMULA_BYTES / 2 + 1);
        assert!(matches!(parse(&text), Err(FormulaError::LimitExceeded(_))));
    }

    #[test]
    fn test_node_limit() {
        let text = vec!["1"; MAX_NODES].join("+");
        assert!(matches!(parse(&text), Err(FormulaError::LimitExceeded(_))));
    }
}
