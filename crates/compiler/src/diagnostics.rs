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

//! Helpers to turn compile errors into user-facing diagnostics.

use std::io::{self, Write};
use std::ops::Range;

use ariadne::{CharSet, Config, IndexType, Label, Report, ReportKind, Source};

use crate::errors::{CompileContext, CompileError};

/// Byte offset of a 1-based (line, column) position in `source`. Columns
/// count characters, as the grammar reports them, so the column is walked
/// through `char_indices` rather than used as a byte index directly.
fn offset_of(source: &str, line_col: (usize, usize)) -> usize {
    let (line, column) = line_col;
    let mut offset = 0;
    for (i, text) in source.split_inclusive('\n').enumerate() {
        if i + 1 == line {
            let byte_col = text
                .char_indices()
                .nth(column - 1)
                .map_or(text.len(), |(b, _)| b);
            return offset + byte_col;
        }
        offset += text.len();
    }
    source.len()
}

/// Span the error label covers: the reported position through the end
/// position where the grammar gave one, a single character otherwise.
fn error_span(source: &str, error: &CompileError) -> Range<usize> {
    let start = offset_of(source, error.context().line_col);
    let end = match error {
        CompileError::SyntaxError {
            end_line_col: Some(end),
            ..
        } => offset_of(source, *end).max(start),
        _ => start,
    };
    start..(end.max(start + 1)).min(source.len().max(start + 1))
}

/// Emit a compile error to stderr with source context.
///
/// Syntax errors get Ariadne's rendering with the offending span labelled.
/// Errors detected after the grammar accepted the input (semantic build
/// failures, lex failures, depth overruns) point at a single position and
/// are rendered the same way; without source text everything falls back to
/// a one-line summary.
pub fn emit_compile_error(
    error: &CompileError,
    source: Option<&str>,
    source_name: &str,
    use_color: bool,
) {
    let Some(src) = source else {
        eprintln!("Compile error: {error}");
        return;
    };

    let mut stderr = io::stderr().lock();
    let _ = write_compile_error(&mut stderr, error, src, source_name, use_color);
    let _ = stderr.flush();
}

fn write_compile_error<W: Write>(
    out: &mut W,
    error: &CompileError,
    src: &str,
    source_name: &str,
    use_color: bool,
) -> io::Result<()> {
    let span = error_span(src, error);
    let report = Report::build(ReportKind::Error, (source_name, span.clone()))
        .with_config(
            Config::default()
                .with_color(use_color)
                .with_char_set(CharSet::Unicode)
                .with_index_type(IndexType::Byte),
        )
        .with_message(error.to_string())
        .with_label(Label::new((source_name, span)).with_message(label_for(error)))
        .finish();

    report.write((source_name, Source::from(src)), out)
}

fn label_for(error: &CompileError) -> &'static str {
    match error {
        CompileError::LexError(..) => "unrecognized here",
        CompileError::SyntaxError { .. } => "parser stopped here",
        CompileError::SemanticBuildError { .. } => "declared here",
        CompileError::NestingTooDeep { .. } => "nesting starts here",
    }
}

/// Plain-text rendering for callers that do not want graphical reports:
/// a summary line, then the source line with an inline marker.
pub fn format_compile_error(error: &CompileError, source: Option<&str>) -> Vec<String> {
    let mut lines = vec![error.to_string()];
    let context = error.context();
    let context_line = match (error, source) {
        (CompileError::SyntaxError { context, .. }, _) => Some(context.clone()),
        (_, Some(src)) => src
            .lines()
            .nth(context.line_col.0.saturating_sub(1))
            .map(|l| l.to_string()),
        _ => None,
    };
    if let Some(context_line) = context_line {
        lines.extend(render_plain_context(&context, &context_line));
    }
    lines
}

fn render_plain_context(position: &CompileContext, context_line: &str) -> Vec<String> {
    let trimmed = context_line.trim_end_matches(['\r', '\n']);
    let start_col = position.line_col.1.saturating_sub(1);
    let marker = " ⚠ ";
    // The column counts characters; find its byte offset before slicing.
    let split_at = trimmed.char_indices().nth(start_col).map(|(b, _)| b);
    let marked_line = if let Some(at) = split_at {
        format!("{}{}{}", &trimmed[..at], marker, &trimmed[at..])
    } else {
        format!("{trimmed}{marker}")
    };
    vec![
        format!(
            "   line {} column {}:",
            position.line_col.0, position.line_col.1
        ),
        format!("   {marked_line}"),
    ]
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{format_compile_error, offset_of, write_compile_error};
    use crate::parse::{CompileOptions, parse_unit};

    #[test]
    fn test_offset_of() {
        let source = "abc\ndef\nghi";
        assert_eq!(offset_of(source, (1, 1)), 0);
        assert_eq!(offset_of(source, (2, 1)), 4);
        assert_eq!(offset_of(source, (3, 2)), 9);
    }

    #[test]
    fn test_offset_of_multibyte_line() {
        // `é` is two bytes; the column is a character count.
        let source = "héllo\nx";
        assert_eq!(offset_of(source, (1, 3)), 3);
        assert_eq!(offset_of(source, (2, 1)), 7);
    }

    #[test]
    fn test_report_rendering() {
        let source = "Class Foo Bar;";
        let err = parse_unit(source, CompileOptions::default()).unwrap_err();
        let mut out = Vec::new();
        write_compile_error(&mut out, &err, source, "unit.fore", false).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("Failure to parse program"));
        assert!(rendered.contains("unit.fore"));
    }

    #[test]
    fn test_plain_format_points_at_error() {
        let err = parse_unit("Class Foo Bar;", CompileOptions::default()).unwrap_err();
        let lines = format_compile_error(&err, Some("Class Foo Bar;"));
        assert!(lines[0].starts_with("Failure to parse program"));
        assert!(lines[1].contains("line 1"));
        assert!(lines[2].contains('⚠'));
    }

    #[test]
    fn test_plain_format_multibyte_line() {
        let source = "Sub T; Begin x := 'привет' @ 1; End Sub T;";
        let err = parse_unit(source, CompileOptions::default()).unwrap_err();
        let lines = format_compile_error(&err, Some(source));
        // The marker lands on a character boundary even after a multibyte
        // string literal.
        assert!(lines[2].contains('⚠'));
        assert!(lines[2].contains("привет"));
    }

    #[test]
    fn test_plain_format_without_source() {
        let err = parse_unit("Class Foo; End Class Bar;", CompileOptions::default()).unwrap_err();
        let lines = format_compile_error(&err, None);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Class"));
    }
}
