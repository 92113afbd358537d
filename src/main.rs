//! loom – command-line XML report → PDF converter.
//!
//! Usage:
//!   loom <input.xml> [output.pdf] [--title "My Report"] [--strict]
//!
//! If `output.pdf` is omitted the PDF is written next to the input file
//! with the same stem (e.g. `report.xml` → `report.pdf`). Page size and
//! margins come from the document's root attributes.

use std::{env, fs, path::PathBuf, process};

use pdf_loom::pipeline::{generate_pdf, PipelineConfig};
use pdf_loom::style::Strictness;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut title: Option<String> = None;
    let mut strict = false;
    let mut tolerate_bounds = false;
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1).peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--title" | "-t" => match iter.next() {
                Some(v) => title = Some(v.clone()),
                None => {
                    eprintln!("--title requires a value");
                    process::exit(1);
                }
            },
            "--strict" => strict = true,
            "--tolerate-bounds" => tolerate_bounds = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if positional == 0 {
                    input_path = Some(PathBuf::from(path));
                } else if positional == 1 {
                    output_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                positional += 1;
            }
        }
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    // Default output: same directory + same stem as input, but with .pdf
    let output = output_path.unwrap_or_else(|| {
        let mut o = input.clone();
        o.set_extension("pdf");
        o
    });

    let xml = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", input.display());
            process::exit(1);
        }
    };

    let config = PipelineConfig {
        title,
        strictness: if strict {
            Strictness::Strict
        } else {
            Strictness::Lenient
        },
        tolerate_bounds_errors: tolerate_bounds,
        ..Default::default()
    };

    match generate_pdf(&xml, &config) {
        Ok((bytes, layout)) => {
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        eprintln!("Error creating output directory: {e}");
                        process::exit(1);
                    }
                }
            }
            if let Err(e) = fs::write(&output, &bytes) {
                eprintln!("Error writing '{}': {e}", output.display());
                process::exit(1);
            }
            let pages = layout.pages.len();
            eprintln!(
                "Wrote '{}' ({} bytes, {} page{})",
                output.display(),
                bytes.len(),
                pages,
                if pages == 1 { "" } else { "s" }
            );
        }
        Err(e) => {
            eprintln!("Error generating PDF: {e}");
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("loom – XML report to PDF converter (pdf-loom)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <input.xml> [output.pdf] [--title \"My Report\"] [--strict]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input.xml>   report document (page size/margins come from root attributes)");
    eprintln!("  [output.pdf]  output path  (default: same stem as input with .pdf)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --title, -t        Document title override (default: root title attribute)");
    eprintln!("  --strict           Reject unknown style keys and invalid colours");
    eprintln!("  --tolerate-bounds  Render over-wide cell content instead of failing");
    eprintln!("  --help             Print this message");
}
