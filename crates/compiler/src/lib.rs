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

//! Front end for the Fore language: lexing, parsing, and AST construction.
//!
//! The top-level entry point is [`parse_unit`], which takes source text and
//! returns a [`Unit`] or the first [`CompileError`] encountered. There is no
//! error recovery and no partial output.

pub mod ast;
pub mod diagnostics;
mod errors;
mod lex;
mod parse;
mod unparse;

pub use crate::ast::Unit;
pub use crate::errors::{CompileContext, CompileError};
pub use crate::lex::{Keyword, Token, TokenKind, tokenize, unquote_str};
pub use crate::parse::{CompileOptions, GRAMMAR_VERSION, TreeTransformer, parse_unit};
pub use crate::unparse::{unparse, unparse_expr, unparse_type};
