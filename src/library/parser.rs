use std::iter::Peekable;

use crate::error::ParseError;

use super::{
    lexer::{Token, TokenIter, TokenKind},
    SExpr,
};

type Span = logos::Span;

/// Tree of spans, resolved against the input once parsing succeeds
#[derive(Debug, PartialEq, Eq, Clone)]
enum Parsed {
    List(Span, Vec<Parsed>),
    Atom(Span),
}

impl Parsed {
    fn resolve(self, input: &str) -> SExpr<'_> {
        match self {
            Parsed::List(head, children) => SExpr::List(
                &input[head],
                children.into_iter().map(|c| c.resolve(input)).collect(),
            ),
            Parsed::Atom(span) => SExpr::Atom(&input[span]),
        }
    }
}

pub(super) struct Parser<'a> {
    input: &'a str,
    iter: Peekable<TokenIter<'a>>,
}

impl<'a> Parser<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self {
            input,
            iter: TokenIter::new(input).peekable(),
        }
    }

    fn eof(&self) -> ParseError {
        let end = self.input.len();
        ParseError::UnexpectedEof { at: end..end }
    }

    fn get(&mut self) -> Result<Token, ParseError> {
        self.iter.next().ok_or_else(|| self.eof())
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let tok = self.get()?;
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: format!("{:?}", kind),
                found: format!("{:?}", tok.kind),
                at: tok.span,
            })
        }
    }

    fn parse_list(&mut self) -> Result<Parsed, ParseError> {
        self.expect(TokenKind::Open)?;
        let head = self.expect(TokenKind::Atom)?;

        let mut children = Vec::new();
        loop {
            let Some(kind) = self.iter.peek().map(|tok| tok.kind) else {
                return Err(self.eof());
            };
            match kind {
                TokenKind::Close => {
                    self.get()?;
                    return Ok(Parsed::List(head.span, children));
                }
                TokenKind::Open => children.push(self.parse_list()?),
                TokenKind::Atom => children.push(Parsed::Atom(self.get()?.span)),
                TokenKind::Error => {
                    let tok = self.get()?;
                    return Err(ParseError::UnknownToken {
                        found: self.input[tok.span.clone()].to_owned(),
                        at: tok.span,
                    });
                }
            }
        }
    }

    /// Parse exactly one top-level form.
    pub(super) fn parse(mut self) -> Result<SExpr<'a>, ParseError> {
        let parsed = self.parse_list()?;
        if let Some(tok) = self.iter.next() {
            return Err(ParseError::UnexpectedToken {
                expected: "end of input".to_owned(),
                found: format!("{:?}", tok.kind),
                at: tok.span,
            });
        }
        Ok(parsed.resolve(self.input))
    }
}

impl<'a> TryFrom<&'a str> for SExpr<'a> {
    type Error = ParseError;

    fn try_from(input: &'a str) -> Result<Self, Self::Error> {
        Parser::new(input).parse()
    }
}
