// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! CQL Parser - Recursive descent parser for CQL queries.
//!
//! Grammar:
//!   query       = or_expr [ "sortby" sort_key { sort_key } ] ;
//!   or_expr     = and_expr { "OR" and_expr } ;
//!   and_expr    = not_expr { "AND" not_expr } ;
//!   not_expr    = primary { ( "NOT" | "PROX" ) primary } ;
//!   primary     = term | "(" or_expr ")" ;
//!   term        = index relation { "/" modifier } value | value ;
//!   modifier    = name [ comparison value ] ;
//!   sort_key    = index { "/" modifier } ;
//!
//! Keywords are case-insensitive. Words keep their backslash escapes.

use super::ast::{AstNode, BooleanOp, CqlError, CqlQuery, Modifier, Position, Relation, SortIndex};
use crate::config::DEFAULT_MAX_NESTING_DEPTH;

/// Index used for a search term written without an index and relation.
pub const SERVER_CHOICE_INDEX: &str = "cql.serverChoice";

const SORTBY: &str = "sortby";

/// Token types for the lexer.
#[derive(Debug, Clone, PartialEq)]
enum TokenType {
    LParen,
    RParen,
    Slash,
    Eq,
    Exact,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Word(String),
    Quoted(String),
    Eof,
}

impl TokenType {
    fn relation_symbol(&self) -> Option<&'static str> {
        match self {
            TokenType::Eq => Some("="),
            TokenType::Exact => Some("=="),
            TokenType::Neq => Some("<>"),
            TokenType::Gt => Some(">"),
            TokenType::Gte => Some(">="),
            TokenType::Lt => Some("<"),
            TokenType::Lte => Some("<="),
            _ => None,
        }
    }

    fn relation(&self) -> Option<Relation> {
        match self {
            TokenType::Eq => Some(Relation::Eq),
            TokenType::Exact => Some(Relation::Exact),
            TokenType::Neq => Some(Relation::NotEq),
            TokenType::Gt => Some(Relation::Gt),
            TokenType::Gte => Some(Relation::Gte),
            TokenType::Lt => Some(Relation::Lt),
            TokenType::Lte => Some(Relation::Lte),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            TokenType::LParen => "'('".into(),
            TokenType::RParen => "')'".into(),
            TokenType::Slash => "'/'".into(),
            TokenType::Word(w) => format!("'{}'", w),
            TokenType::Quoted(q) => format!("\"{}\"", q),
            TokenType::Eof => "end of query".into(),
            other => format!("'{}'", other.relation_symbol().unwrap_or("?")),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    token_type: TokenType,
    position: Position,
}

fn is_word_char(ch: char) -> bool {
    !ch.is_whitespace() && !matches!(ch, '(' | ')' | '"' | '=' | '<' | '>' | '/')
}

/// Lexer for CQL queries.
struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn current_position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.pos,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let (pos, ch) = self.chars.next()?;
        self.pos = pos + ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Pushes a backslash and the character it escapes.
    fn read_escape(&mut self, value: &mut String) -> Result<(), CqlError> {
        let escape_pos = self.current_position();
        self.advance(); // consume backslash
        match self.advance() {
            Some(ch) => {
                value.push('\\');
                value.push(ch);
                Ok(())
            }
            None => Err(CqlError::syntax(
                "Dangling escape character at end of query",
                Some(escape_pos),
            )),
        }
    }

    fn read_quoted(&mut self) -> Result<Token, CqlError> {
        let start_pos = self.current_position();
        self.advance(); // consume opening quote
        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(CqlError::syntax(
                        format!(
                            "Unterminated string starting at line {}, column {}",
                            start_pos.line, start_pos.column
                        ),
                        Some(start_pos),
                    ));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => self.read_escape(&mut value)?,
                Some(ch) => {
                    value.push(ch);
                    self.advance();
                }
            }
        }

        Ok(Token {
            token_type: TokenType::Quoted(value),
            position: start_pos,
        })
    }

    fn read_word(&mut self) -> Result<Token, CqlError> {
        let start_pos = self.current_position();
        let mut value = String::new();

        while let Some(ch) = self.peek() {
            if ch == '\\' {
                self.read_escape(&mut value)?;
            } else if is_word_char(ch) {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Ok(Token {
            token_type: TokenType::Word(value),
            position: start_pos,
        })
    }

    fn single(&mut self, token_type: TokenType, start_pos: Position) -> Token {
        self.advance();
        Token {
            token_type,
            position: start_pos,
        }
    }

    /// Consumes `first` and, if present, `second`; picks the matching token.
    fn pair(
        &mut self,
        second: char,
        paired: TokenType,
        alone: TokenType,
        start_pos: Position,
    ) -> Token {
        self.advance();
        let token_type = if self.peek() == Some(second) {
            self.advance();
            paired
        } else {
            alone
        };
        Token {
            token_type,
            position: start_pos,
        }
    }

    fn next_token(&mut self) -> Result<Token, CqlError> {
        self.skip_whitespace();

        let start_pos = self.current_position();

        match self.peek() {
            None => Ok(Token {
                token_type: TokenType::Eof,
                position: start_pos,
            }),
            Some('"') => self.read_quoted(),
            Some('(') => Ok(self.single(TokenType::LParen, start_pos)),
            Some(')') => Ok(self.single(TokenType::RParen, start_pos)),
            Some('/') => Ok(self.single(TokenType::Slash, start_pos)),
            Some('=') => Ok(self.pair('=', TokenType::Exact, TokenType::Eq, start_pos)),
            Some('>') => Ok(self.pair('=', TokenType::Gte, TokenType::Gt, start_pos)),
            Some('<') => {
                self.advance();
                let token_type = match self.peek() {
                    Some('=') => {
                        self.advance();
                        TokenType::Lte
                    }
                    Some('>') => {
                        self.advance();
                        TokenType::Neq
                    }
                    _ => TokenType::Lt,
                };
                Ok(Token {
                    token_type,
                    position: start_pos,
                })
            }
            Some(_) => self.read_word(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, CqlError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.token_type, TokenType::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

/// Parser for CQL queries.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::with_max_depth(DEFAULT_MAX_NESTING_DEPTH)
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser that rejects more than `max_depth` nested parentheses.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            tokens: Vec::new(),
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    fn current(&self) -> &Token {
        // tokenize() always ends with Eof and advance() never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_type(&self, ahead: usize) -> &TokenType {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].token_type
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !matches!(token.token_type, TokenType::Eof) {
            self.pos += 1;
        }
        token
    }

    fn check(&self, expected: &TokenType) -> bool {
        std::mem::discriminant(&self.current().token_type) == std::mem::discriminant(expected)
    }

    fn match_token(&mut self, expected: &TokenType) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn current_keyword(&self) -> Option<&str> {
        match &self.current().token_type {
            TokenType::Word(w) if is_reserved(w) => Some(w.as_str()),
            _ => None,
        }
    }

    fn match_boolean(&mut self, ops: &[BooleanOp]) -> Result<Option<BooleanOp>, CqlError> {
        let op = match &self.current().token_type {
            TokenType::Word(w) => BooleanOp::from_keyword(w).filter(|op| ops.contains(op)),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(None);
        };
        self.advance();
        if self.check(&TokenType::Slash) {
            return Err(CqlError::unsupported(format!(
                "Modifiers on boolean operator '{}' are not supported",
                op.as_str()
            ))
            .with_position(self.current().position));
        }
        Ok(Some(op))
    }

    fn syntax_error(&self, message: impl Into<String>) -> CqlError {
        CqlError::syntax(message, Some(self.current().position))
    }

    pub fn parse(&mut self, input: &str) -> Result<CqlQuery, CqlError> {
        let mut lexer = Lexer::new(input);
        self.tokens = lexer.tokenize()?;
        self.pos = 0;
        self.depth = 0;

        if self.check(&TokenType::Eof) {
            return Err(self.syntax_error("Empty query"));
        }

        if self.check(&TokenType::Gt) {
            return Err(CqlError::unsupported("Prefix assignments are not supported")
                .with_position(self.current().position));
        }

        let subtree = self.parse_or_expr()?;

        let ast = if self
            .current_keyword()
            .is_some_and(|w| w.eq_ignore_ascii_case(SORTBY))
        {
            self.advance();
            let specs = self.parse_sort_keys()?;
            AstNode::Sort {
                subtree: Box::new(subtree),
                specs,
            }
        } else {
            subtree
        };

        if !self.check(&TokenType::Eof) {
            let message = if self.check(&TokenType::RParen) {
                "Unbalanced ')'".to_string()
            } else {
                format!(
                    "Unexpected {} after expression",
                    self.current().token_type.describe()
                )
            };
            return Err(self.syntax_error(message));
        }

        Ok(CqlQuery {
            raw: input.to_string(),
            ast,
        })
    }

    fn parse_or_expr(&mut self) -> Result<AstNode, CqlError> {
        let mut left = self.parse_and_expr()?;

        while let Some(op) = self.match_boolean(&[BooleanOp::Or])? {
            let right = self.parse_and_expr()?;
            left = AstNode::boolean(op, left, right);
        }

        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<AstNode, CqlError> {
        let mut left = self.parse_not_expr()?;

        while let Some(op) = self.match_boolean(&[BooleanOp::And])? {
            let right = self.parse_not_expr()?;
            left = AstNode::boolean(op, left, right);
        }

        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<AstNode, CqlError> {
        let mut left = self.parse_primary()?;

        while let Some(op) = self.match_boolean(&[BooleanOp::Not, BooleanOp::Prox])? {
            let right = self.parse_primary()?;
            left = AstNode::boolean(op, left, right);
        }

        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<AstNode, CqlError> {
        if self.check(&TokenType::LParen) {
            if self.depth >= self.max_depth {
                return Err(self.syntax_error("Query nests too deeply"));
            }
            self.advance();
            self.depth += 1;
            let expr = self.parse_or_expr()?;
            self.depth -= 1;
            if !self.match_token(&TokenType::RParen) {
                return Err(self.syntax_error("Expected ')' after expression"));
            }
            return Ok(expr);
        }

        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<AstNode, CqlError> {
        let first = self.current().clone();
        let text = match &first.token_type {
            TokenType::Word(w) if is_reserved(w) => {
                return Err(self.syntax_error(format!(
                    "Expected index or search term, found keyword '{}'",
                    w
                )));
            }
            TokenType::Word(w) | TokenType::Quoted(w) => w.clone(),
            TokenType::Eof | TokenType::RParen => {
                return Err(self.syntax_error("Expected search clause"));
            }
            other if other.relation().is_some() => {
                return Err(self.syntax_error("Empty index before relation"));
            }
            other => {
                return Err(self.syntax_error(format!(
                    "Expected index or search term, found {}",
                    other.describe()
                )));
            }
        };
        self.advance();

        let relation = match self.parse_relation() {
            Some(relation) => relation,
            None => {
                // Bare search term: `john` means `cql.serverChoice = john`
                return Ok(AstNode::term(SERVER_CHOICE_INDEX, Relation::Eq, Vec::new(), text));
            }
        };

        if matches!(first.token_type, TokenType::Quoted(_)) {
            return Err(CqlError::syntax("Index must not be quoted", Some(first.position)));
        }

        let modifiers = self.parse_modifiers()?;
        let value = self.parse_value("search term")?;

        Ok(AstNode::term(text, relation, modifiers, value))
    }

    /// Relation symbol, or a relation word followed by a term or modifier.
    fn parse_relation(&mut self) -> Option<Relation> {
        if let Some(relation) = self.current().token_type.relation() {
            self.advance();
            return Some(relation);
        }

        let TokenType::Word(word) = &self.current().token_type else {
            return None;
        };
        if is_reserved(word) && !word.eq_ignore_ascii_case("prox") {
            return None;
        }
        let next = self.peek_type(1);
        let followed_by_term = match next {
            TokenType::Word(w) => !is_reserved(w),
            TokenType::Quoted(_) | TokenType::Slash => true,
            _ => false,
        };
        if !followed_by_term {
            return None;
        }
        let relation = Relation::from_word(word);
        self.advance();
        Some(relation)
    }

    fn parse_modifiers(&mut self) -> Result<Vec<Modifier>, CqlError> {
        let mut modifiers = Vec::new();

        while self.match_token(&TokenType::Slash) {
            let name = match &self.current().token_type {
                TokenType::Word(w) if !w.is_empty() => w.clone(),
                _ => return Err(self.syntax_error("Expected modifier name after '/'")),
            };
            self.advance();

            match self.current().token_type.relation_symbol() {
                Some(symbol) => {
                    self.advance();
                    let value = self.parse_value("modifier value")?;
                    modifiers.push(Modifier::with_value(name, symbol, value));
                }
                None => modifiers.push(Modifier::flag(name)),
            }
        }

        Ok(modifiers)
    }

    fn parse_value(&mut self, what: &str) -> Result<String, CqlError> {
        let token = self.current().clone();
        match &token.token_type {
            TokenType::Word(w) if is_reserved(w) => Err(self.syntax_error(format!(
                "Expected {}, found keyword '{}'",
                what, w
            ))),
            TokenType::Word(w) | TokenType::Quoted(w) => {
                self.advance();
                Ok(w.clone())
            }
            other => Err(self.syntax_error(format!(
                "Expected {}, found {}",
                what,
                other.describe()
            ))),
        }
    }

    fn parse_sort_keys(&mut self) -> Result<Vec<SortIndex>, CqlError> {
        let mut specs = Vec::new();

        while let TokenType::Word(w) = &self.current().token_type {
            if is_reserved(w) {
                break;
            }
            let index = w.clone();
            self.advance();
            let modifiers = self.parse_modifiers()?;
            specs.push(SortIndex { index, modifiers });
        }

        if specs.is_empty() {
            return Err(self.syntax_error("Expected sort index after 'sortby'"));
        }

        Ok(specs)
    }
}

fn is_reserved(word: &str) -> bool {
    BooleanOp::from_keyword(word).is_some() || word.eq_ignore_ascii_case(SORTBY)
}

/// Parse a CQL query string into an AST.
pub fn parse(input: &str) -> Result<CqlQuery, CqlError> {
    let mut parser = Parser::new();
    parser.parse(input)
}
