// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Vela CLI - lowers typed AST files to Cranelift IR.

mod loader;

use colored::Colorize;
use std::env;
use std::fs;
use std::process;

fn print_usage() {
    println!("{}", "Vela compiler back-end".bold());
    println!();
    println!("{}", "Usage:".yellow());
    println!("  vela lower <ast.json>             print the lowered module as CLIF text");
    println!("  vela build <ast.json> -o <file>   compile and write a native object file");
    println!();
    println!("{}", "Options:".yellow());
    println!("  -v, --verbose                     enable debug logging");
    println!("  -h, --help                        show this help");
}

fn error_label() -> colored::ColoredString {
    "error".red().bold()
}

/// Load and lower one AST file; any failure is reported and turns into a
/// non-zero exit.
fn lower_file(path: &str) -> Result<vela_irgen::IrGen, ()> {
    let source = fs::read_to_string(path).map_err(|e| {
        eprintln!("{}: cannot read `{}`: {}", error_label(), path, e);
    })?;
    let ast = loader::load_module(&source).map_err(|e| {
        eprintln!("{}: {}", error_label(), e);
    })?;
    let module_name = path.rsplit('/').next().unwrap_or(path);
    vela_irgen::lower(module_name, &ast).map_err(|e| {
        eprintln!("{}: {}", error_label(), e);
    })
}

fn cmd_lower(path: &str) {
    match lower_file(path) {
        Ok(gen) => print!("{}", gen.display()),
        Err(()) => process::exit(1),
    }
}

fn cmd_build(path: &str, output: &str) {
    let Ok(gen) = lower_file(path) else {
        process::exit(1);
    };
    let bytes = match gen.finish() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{}: {}", error_label(), e);
            process::exit(1);
        }
    };
    if let Err(e) = fs::write(output, bytes) {
        eprintln!("{}: cannot write `{}`: {}", error_label(), output, e);
        process::exit(1);
    }
    log::info!("wrote {}", output);
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let verbose = args.iter().any(|a| a == "-v" || a == "--verbose");
    let level = if verbose {
        log::Level::Debug
    } else {
        log::Level::Warn
    };
    simple_logger::init_with_level(level).unwrap();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return;
    }

    let cmd_args: Vec<&str> = args
        .iter()
        .map(|a| a.as_str())
        .filter(|a| !matches!(*a, "-v" | "--verbose"))
        .collect();

    match cmd_args.get(1).copied() {
        Some("lower") => {
            let Some(path) = cmd_args.get(2) else {
                eprintln!("{}: missing file argument", error_label());
                process::exit(1);
            };
            cmd_lower(path);
        }
        Some("build") => {
            let Some(path) = cmd_args.get(2) else {
                eprintln!("{}: missing file argument", error_label());
                process::exit(1);
            };
            let output = match cmd_args.get(3).copied() {
                Some("-o") => match cmd_args.get(4) {
                    Some(out) => out.to_string(),
                    None => {
                        eprintln!("{}: missing output file after -o", error_label());
                        process::exit(1);
                    }
                },
                _ => format!("{}.o", path.trim_end_matches(".json")),
            };
            cmd_build(path, &output);
        }
        _ => {
            print_usage();
            process::exit(1);
        }
    }
}
