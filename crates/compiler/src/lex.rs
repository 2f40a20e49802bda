// Copyright (C) 2025 The Fore Project Authors. This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Token-stream view of a source unit, for tooling that wants tokens with
//! positions without building a full tree (highlighters, formatters). The
//! parser itself works straight off the grammar and does not go through here.

use std::str::FromStr;

use serde::Serialize;
use strum::{Display, EnumString};

use crate::errors::{CompileContext, CompileError};
use crate::parse::PestParser;
use crate::parse::fore::{ForeParser, Rule};

/// Reserved words. Matching is ASCII case-insensitive, same as the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Keyword {
    As,
    Begin,
    Break,
    Case,
    Class,
    Const,
    Constructor,
    Continue,
    Delegate,
    Dispose,
    Do,
    Else,
    Elseif,
    End,
    Enum,
    Event,
    Except,
    False,
    Finally,
    For,
    Foreach,
    Friend,
    Function,
    Get,
    If,
    In,
    Inherited,
    Interface,
    Is,
    Mod,
    New,
    Not,
    Null,
    On,
    ParamArray,
    Private,
    Property,
    Protected,
    Public,
    Raise,
    Repeat,
    Return,
    Select,
    Set,
    Shared,
    Step,
    Sub,
    Then,
    To,
    True,
    Try,
    Until,
    Var,
    While,
    With,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier,
    Integer,
    Double,
    Str,
    Boolean,
    Null,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source slice, quotes and all.
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

/// Strips the optional prefix letter(s) and the surrounding quotes from a
/// string literal. Both `"..."` and `'...'` forms are accepted.
pub fn unquote_str(raw: &str) -> Result<String, String> {
    let body = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let mut chars = body.chars();
    let (Some(open), Some(close)) = (chars.next(), chars.next_back()) else {
        return Err("string literal too short".to_string());
    };
    if open != close || (open != '"' && open != '\'') {
        return Err("unterminated string literal".to_string());
    }
    Ok(chars.as_str().to_string())
}

/// Lexes a whole source unit into its token sequence.
///
/// Fail-fast like the parser: the first unrecognized character aborts with a
/// `LexError` carrying its position, and no partial stream is returned.
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let pairs = ForeParser::parse(Rule::token_stream, source).map_err(|e| {
        let (line, column) = match e.line_col {
            pest::error::LineColLocation::Pos(lc) => lc,
            pest::error::LineColLocation::Span(begin, _) => begin,
        };
        CompileError::LexError(
            CompileContext::new((line, column)),
            e.variant.message().to_string(),
        )
    })?;

    let mut tokens = vec![];
    for pair in pairs {
        if pair.as_rule() != Rule::token_stream {
            continue;
        }
        for token in pair.into_inner() {
            if token.as_rule() == Rule::EOI {
                continue;
            }
            let Some(inner) = token.into_inner().next() else {
                continue;
            };
            let (line, column) = inner.line_col();
            let lexeme = inner.as_str().to_string();
            let kind = match inner.as_rule() {
                Rule::string => TokenKind::Str,
                Rule::float => TokenKind::Double,
                Rule::integer => TokenKind::Integer,
                Rule::boolean => TokenKind::Boolean,
                Rule::null_lit => TokenKind::Null,
                Rule::keyword_tok => match Keyword::from_str(&lexeme) {
                    Ok(keyword) => TokenKind::Keyword(keyword),
                    Err(_) => {
                        return Err(CompileError::LexError(
                            CompileContext::new((line, column)),
                            format!("unrecognized keyword `{lexeme}`"),
                        ));
                    }
                },
                Rule::ident => TokenKind::Identifier,
                Rule::punct => TokenKind::Punct,
                _ => {
                    return Err(CompileError::LexError(
                        CompileContext::new((line, column)),
                        format!("unrecognized token `{lexeme}`"),
                    ));
                }
            };
            tokens.push(Token {
                kind,
                lexeme,
                line,
                column,
            });
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Keyword, TokenKind, tokenize, unquote_str};
    use crate::errors::CompileError;

    #[test]
    fn test_tokenize_minimal_class() {
        let tokens = tokenize("Class Foo; End Class Foo;").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Class),
                TokenKind::Identifier,
                TokenKind::Punct,
                TokenKind::Keyword(Keyword::End),
                TokenKind::Keyword(Keyword::Class),
                TokenKind::Identifier,
                TokenKind::Punct,
            ]
        );
    }

    #[test]
    fn test_positions_are_one_based() {
        let tokens = tokenize("x := 1;\ny := 2;").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 3));
        assert_eq!((tokens[4].line, tokens[4].column), (2, 1));
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let tokens = tokenize("CLASS class Class").unwrap();
        for token in &tokens {
            assert_eq!(token.kind, TokenKind::Keyword(Keyword::Class));
        }
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        let tokens = tokenize("Classy").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].lexeme, "Classy");
    }

    #[test]
    fn test_literals() {
        let tokens = tokenize(r#"42 3.25 1e6 "hi" 'there' True Null"#).unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Integer,
                TokenKind::Double,
                TokenKind::Double,
                TokenKind::Str,
                TokenKind::Str,
                TokenKind::Boolean,
                TokenKind::Null,
            ]
        );
    }

    #[test]
    fn test_unrecognized_character() {
        let err = tokenize("x := 1 @ 2;").unwrap_err();
        let CompileError::LexError(context, _) = err else {
            panic!("expected a lex error, got {err:?}");
        };
        assert_eq!(context.line_col, (1, 8));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote_str(r#""hi""#).unwrap(), "hi");
        assert_eq!(unquote_str("'hi'").unwrap(), "hi");
        assert_eq!(unquote_str(r#"f"hi""#).unwrap(), "hi");
        assert_eq!(unquote_str(r#"br'x'"#).unwrap(), "x");
        assert!(unquote_str("\"oops").is_err());
    }
}
