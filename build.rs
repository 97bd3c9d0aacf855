use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");

    enforce_engine_io_boundary();
}

/// The library reports through return values and the `log` facade only; file
/// formats, argument parsing and terminal output belong to the binary.
fn enforce_engine_io_boundary() {
    let forbidden = ["csv::", "clap::", "comfy_table", "println!", "eprintln!"];
    let exempt = [Path::new("src/main.rs")];

    let mut violations = Vec::new();
    let mut stack = vec![PathBuf::from("src")];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if path.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            if exempt.iter().any(|e| path.as_path() == *e) {
                continue;
            }
            let src = match fs::read_to_string(&path) {
                Ok(s) => s,
                Err(_) => continue,
            };
            for (line_no, line) in src.lines().enumerate() {
                for token in &forbidden {
                    if line.contains(token) {
                        violations.push(format!(
                            "{}:{} contains forbidden token '{}'",
                            path.display(),
                            line_no + 1,
                            token
                        ));
                    }
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nerror: I/O leaked into enetpath engine modules:");
        for v in violations {
            eprintln!("  - {v}");
        }
        panic!("I/O boundary violation in enetpath engine modules");
    }
}
