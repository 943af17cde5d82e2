use logos::{Logos, SpannedIter};

pub(super) struct Token {
    pub(super) kind: TokenKind,
    pub(super) span: logos::Span,
}

pub(super) struct TokenIter<'a> {
    iter: SpannedIter<'a, Lexeme>,
}

impl<'a> TokenIter<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self {
            iter: Lexeme::lexer(input).spanned(),
        }
    }
}

impl<'a> Iterator for TokenIter<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let (lexeme, span) = self.iter.next()?;
        let (kind, span) = match lexeme {
            Ok(Lexeme::Open) => (TokenKind::Open, span),
            Ok(Lexeme::Close) => (TokenKind::Close, span),
            // the atom is the text between the quotes
            Ok(Lexeme::Quoted) => (TokenKind::Atom, (span.start + 1)..(span.end - 1)),
            Ok(Lexeme::Bare) => (TokenKind::Atom, span),
            Err(()) => (TokenKind::Error, span),
        };
        Some(Token { kind, span })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum TokenKind {
    Open,
    Close,
    Atom,
    Error,
}

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
#[logos(skip r"([ \t\r\f\n]+|;[^\n]*)")]
enum Lexeme {
    #[token("(")]
    Open,
    #[token(")")]
    Close,
    #[regex(r#""([^"\\]|\\["\\bnfrt])*""#)]
    Quoted,
    #[regex(r#"[^"() \t\r\f\n;]+"#)]
    Bare,
}
