use std::fs;
use std::path::{Path, PathBuf};

use soy_parse::ast::dump;
use soy_parse::globals::load_globals_file;
use soy_parse::{Globals, parse_file};

/// Find all test directories in tests/run/
fn find_run_tests() -> Vec<PathBuf> {
    let run_dir = Path::new("tests/run");
    let mut test_dirs = Vec::new();

    if let Ok(entries) = fs::read_dir(run_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && path.join("main.soy").exists() {
                test_dirs.push(path);
            }
        }
    }

    test_dirs.sort();
    test_dirs
}

/// Run a single test case
///
/// A case directory holds `main.soy`, an optional `globals.txt`, and either
/// `expected_output.txt` (the tree dump) or `expected_error.txt`.
fn run_test_case(test_dir: &Path) -> Result<(), String> {
    let test_name = test_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    let source = fs::read_to_string(test_dir.join("main.soy"))
        .map_err(|e| format!("Test '{}': failed to read main.soy: {}", test_name, e))?;

    let globals_file = test_dir.join("globals.txt");
    let globals = if globals_file.exists() {
        load_globals_file(&globals_file).map_err(|e| format!("Test '{}': {}", test_name, e))?
    } else {
        Globals::new()
    };

    let expected_error_file = test_dir.join("expected_error.txt");
    if expected_error_file.exists() {
        let expected = fs::read_to_string(&expected_error_file).map_err(|e| {
            format!("Test '{}': failed to read expected_error.txt: {}", test_name, e)
        })?;
        return match parse_file("main.soy", &source, &globals) {
            Ok(_) => Err(format!("Test '{}': parse succeeded, expected an error", test_name)),
            Err(err) if err.to_string() == expected.trim() => Ok(()),
            Err(err) => Err(format!(
                "Test '{}': error mismatch\nExpected:\n{}\nActual:\n{}",
                test_name,
                expected.trim(),
                err
            )),
        };
    }

    let expected_output_file = test_dir.join("expected_output.txt");
    if !expected_output_file.exists() {
        return Err(format!("Test '{}': expected_output.txt not found", test_name));
    }
    let expected_output = fs::read_to_string(&expected_output_file).map_err(|e| {
        format!("Test '{}': failed to read expected_output.txt: {}", test_name, e)
    })?;

    let file = parse_file("main.soy", &source, &globals)
        .map_err(|e| format!("Test '{}': parse failed: {}", test_name, e))?;
    let actual_output = dump(&file.body);
    if actual_output.trim() != expected_output.trim() {
        return Err(format!(
            "Test '{}': output mismatch\nExpected:\n{}\nActual:\n{}",
            test_name,
            expected_output.trim(),
            actual_output.trim()
        ));
    }

    // the printed source must parse back to the same tree
    let printed = file.to_string();
    let reparsed = parse_file("main.soy", &printed, &globals)
        .map_err(|e| format!("Test '{}': reparse failed: {}\n{}", test_name, e, printed))?;
    if dump(&reparsed.body) != actual_output {
        return Err(format!(
            "Test '{}': round trip changed the tree\nPrinted:\n{}",
            test_name, printed
        ));
    }

    Ok(())
}

#[test]
fn test_run_integration() {
    let test_dirs = find_run_tests();

    if test_dirs.is_empty() {
        panic!("No integration tests found in tests/run/");
    }

    let mut failures = Vec::new();

    for test_dir in &test_dirs {
        let test_name = test_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        print!("Running test '{}' ... ", test_name);

        match run_test_case(test_dir) {
            Ok(_) => {
                println!("ok");
            }
            Err(e) => {
                println!("FAILED");
                failures.push(e);
            }
        }
    }

    if !failures.is_empty() {
        eprintln!("\nFailures:");
        for failure in &failures {
            eprintln!("  {}", failure);
        }
        panic!("{} test(s) failed", failures.len());
    }
}

// Individual test for each test case - makes it easier to run specific tests
#[test]
fn test_run_hello() {
    let test_dir = Path::new("tests/run/hello");
    if let Err(e) = run_test_case(test_dir) {
        panic!("{}", e);
    }
}
