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

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Source position attached to every error: 1-based line and column of the
/// construct being processed when the failure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompileContext {
    pub line_col: (usize, usize),
}

impl CompileContext {
    pub fn new(line_col: (usize, usize)) -> Self {
        Self { line_col }
    }
}

impl Display for CompileContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line_col.0, self.line_col.1)
    }
}

/// Everything that can go wrong between source text and finished AST.
///
/// No recovery is attempted anywhere: the first error aborts the parse and is
/// surfaced verbatim. A failed parse never yields a partial tree.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum CompileError {
    /// An unrecognized character or a malformed literal in the token stream.
    #[error("Failure to lex at {0}: {1}")]
    LexError(CompileContext, String),
    /// The grammar rejected the token stream. Carries the first offending
    /// position, the source line it sits on, and the expected-token message.
    #[error("Failure to parse program @ {error_position}: {message}")]
    SyntaxError {
        error_position: CompileContext,
        end_line_col: Option<(usize, usize)>,
        context: String,
        message: String,
    },
    /// A structural invariant the grammar cannot express was violated while
    /// building a node (paramarray placement, accessor count, zero step...).
    #[error("Invalid {node_kind} at {context}: {rule}")]
    SemanticBuildError {
        context: CompileContext,
        node_kind: &'static str,
        rule: String,
    },
    /// Nesting ran past the configured bound; reported instead of letting
    /// adversarial input exhaust the call stack.
    #[error("Nesting deeper than {max_depth} at {context}")]
    NestingTooDeep {
        context: CompileContext,
        max_depth: usize,
    },
}

impl CompileError {
    /// The source position the error points at.
    pub fn context(&self) -> CompileContext {
        match self {
            CompileError::LexError(context, _) => *context,
            CompileError::SyntaxError { error_position, .. } => *error_position,
            CompileError::SemanticBuildError { context, .. } => *context,
            CompileError::NestingTooDeep { context, .. } => *context,
        }
    }
}
