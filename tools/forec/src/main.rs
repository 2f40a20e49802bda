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

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_derive::Parser;
use tracing::{debug, info};
use tracing_subscriber::fmt::format::FmtSpan;

use fore_compiler::diagnostics::emit_compile_error;
use fore_compiler::{CompileOptions, parse_unit, tokenize, unparse};

#[derive(Parser, Debug)]
#[clap(name = "forec", about = "Fore language compiler front end")]
pub struct Args {
    #[clap(help = "Path of the source unit to compile")]
    source: PathBuf,

    #[clap(
        long,
        help = "Emit the token stream as JSON instead of parsing to an AST"
    )]
    tokens: bool,

    #[clap(
        long,
        help = "Render the parsed unit back to canonical source instead of JSON"
    )]
    unparse: bool,

    #[clap(
        long,
        help = "Bound on statement and expression nesting depth",
        default_value = "128"
    )]
    max_depth: usize,

    #[clap(long, help = "Disable colored diagnostics")]
    no_color: bool,

    #[clap(long, help = "Enable debug logging")]
    debug: bool,
}

fn main() -> Result<ExitCode, eyre::Report> {
    color_eyre::install()?;
    let args: Args = Args::parse();

    let main_subscriber = tracing_subscriber::fmt()
        .compact()
        .with_ansi(!args.no_color)
        .with_span_events(FmtSpan::NONE)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .with_max_level(if args.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .finish();
    tracing::subscriber::set_global_default(main_subscriber).unwrap_or_else(|e| {
        eprintln!("Unable to configure logging: {e}");
        std::process::exit(1);
    });

    let source_name = args.source.display().to_string();
    let source = std::fs::read_to_string(&args.source)?;
    debug!(%source_name, bytes = source.len(), "read source unit");

    if args.tokens {
        return match tokenize(&source) {
            Ok(tokens) => {
                println!("{}", serde_json::to_string_pretty(&tokens)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(error) => {
                emit_compile_error(&error, Some(&source), &source_name, !args.no_color);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let options = CompileOptions {
        max_depth: args.max_depth,
    };
    match parse_unit(&source, options) {
        Ok(unit) => {
            info!(declarations = unit.declarations.len(), "parsed unit");
            if args.unparse {
                print!("{}", unparse(&unit));
            } else {
                println!("{}", serde_json::to_string_pretty(&unit)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            emit_compile_error(&error, Some(&source), &source_name, !args.no_color);
            Ok(ExitCode::FAILURE)
        }
    }
}
