//! End-to-end scenarios for the engine: filter, execute, persist, repeat.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use wilco::build::{filter_commands, run_commands, Database, EMPTY_SIGNATURE};
use wilco::commands::{CommandEntry, DepFile, DepFileFormat};

fn entry(command: String, description: &str, inputs: &[&Path], outputs: &[&Path]) -> CommandEntry {
    let mut result = CommandEntry::default();
    result.command = command;
    result.description = description.to_string();
    result.inputs = inputs.iter().map(|p| PathBuf::from(*p)).collect();
    result.outputs = outputs.iter().map(|p| PathBuf::from(*p)).collect();
    result
}

fn copy_entry(from: &Path, to: &Path, description: &str) -> CommandEntry {
    entry(
        format!("cp \"{}\" \"{}\"", from.display(), to.display()),
        description,
        &[from],
        &[to],
    )
}

/// Bump a file's mtime past filesystem timestamp granularity.
fn touch(path: &Path, content: &str) {
    sleep(Duration::from_millis(30));
    fs::write(path, content).unwrap();
}

#[test]
fn clean_build_runs_once_then_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.txt");
    let output = dir.path().join("b.txt");
    fs::write(&input, "payload").unwrap();

    let mut database = Database::new();
    database.set_commands(vec![copy_entry(&input, &output, "copy")]).unwrap();

    let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(run_commands(&pending, &mut database, 2, false), 1);
    assert_eq!(fs::read_to_string(&output).unwrap(), "payload");

    // Incremental idempotence: an immediate second pass does nothing.
    let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
    assert!(pending.is_empty());

    // Still nothing to do after a save/load round trip.
    let base = dir.path().join(".build_db");
    database.save(&base).unwrap();
    let mut reloaded = Database::new();
    assert!(reloaded.load(&base));
    let pending = filter_commands(&mut reloaded, dir.path(), &[]).unwrap();
    assert!(pending.is_empty());

    // Touching the input re-dirties the command.
    touch(&input, "payload v2");
    let pending = filter_commands(&mut reloaded, dir.path(), &[]).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(run_commands(&pending, &mut reloaded, 2, false), 1);
    assert_eq!(fs::read_to_string(&output).unwrap(), "payload v2");
}

#[test]
fn removed_output_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("a.txt");
    let output = dir.path().join("b.txt");
    fs::write(&input, "payload").unwrap();

    let mut database = Database::new();
    database.set_commands(vec![copy_entry(&input, &output, "copy")]).unwrap();
    let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
    run_commands(&pending, &mut database, 2, false);

    fs::remove_file(&output).unwrap();
    let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
    assert_eq!(pending.len(), 1);
}

#[test]
fn depfile_discovers_additional_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("s.c");
    let header = dir.path().join("h.h");
    let object = dir.path().join("s.o");
    let dep_path = dir.path().join("o.d");
    fs::write(&source, "int main;").unwrap();
    fs::write(&header, "#pragma once").unwrap();

    // Stand-in for a compiler: writes a make-style depfile naming the
    // header, then produces the output.
    let mut command = entry(
        format!(
            "echo \"s.o: {} {}\" > \"{}\" && cp \"{}\" \"{}\"",
            source.display(),
            header.display(),
            dep_path.display(),
            source.display(),
            object.display()
        ),
        "compile",
        &[&source],
        &[&object],
    );
    command.dep_file = Some(DepFile { path: dep_path, format: DepFileFormat::Gcc });

    let mut database = Database::new();
    database.set_commands(vec![command]).unwrap();

    let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
    assert_eq!(run_commands(&pending, &mut database, 2, false), 1);

    // The discovered header is now tracked and the build is settled.
    assert!(database.file_dependencies().iter().any(|dep| dep.path == header));
    let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
    assert!(pending.is_empty());

    // Touching the header dirties the command even though it was never a
    // declared input.
    touch(&header, "#pragma once // changed");
    let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
    assert_eq!(pending.len(), 1);
}

#[test]
fn depfile_survives_database_reload() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("s.c");
    let header = dir.path().join("h.h");
    let object = dir.path().join("s.o");
    let dep_path = dir.path().join("o.d");
    fs::write(&source, "x").unwrap();
    fs::write(&header, "y").unwrap();

    let mut command = entry(
        format!(
            "echo \"s.o: {} {}\" > \"{}\" && cp \"{}\" \"{}\"",
            source.display(),
            header.display(),
            dep_path.display(),
            source.display(),
            object.display()
        ),
        "compile",
        &[&source],
        &[&object],
    );
    command.dep_file = Some(DepFile { path: dep_path, format: DepFileFormat::Gcc });

    let mut database = Database::new();
    database.set_commands(vec![command]).unwrap();
    let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
    run_commands(&pending, &mut database, 2, false);

    let base = dir.path().join(".build_db");
    database.save(&base).unwrap();

    let mut reloaded = Database::new();
    assert!(reloaded.load(&base));
    let pending = filter_commands(&mut reloaded, dir.path(), &[]).unwrap();
    assert!(pending.is_empty());

    touch(&header, "z");
    let pending = filter_commands(&mut reloaded, dir.path(), &[]).unwrap();
    assert_eq!(pending.len(), 1);
}

#[test]
fn failure_halts_admission_but_not_running_work() {
    let dir = tempfile::tempdir().unwrap();
    let make = |name: &str, command: String| {
        let output = dir.path().join(name);
        entry(command, name, &[], &[&output])
    };

    let slow_ok = |name: &str| {
        let output = dir.path().join(name);
        make(name, format!("sleep 0.3 && touch \"{}\"", output.display()))
    };

    let mut database = Database::new();
    database
        .set_commands(vec![
            make("c1.out", "exit 3".to_string()),
            slow_ok("c2.out"),
            slow_ok("c3.out"),
            slow_ok("c4.out"),
        ])
        .unwrap();

    let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
    assert_eq!(pending.len(), 4);

    // Three slots: c1/c2/c3 start together, c1 fails fast, c4 never gets in.
    let completed = run_commands(&pending, &mut database, 3, false);
    assert_eq!(completed, 2);

    let signature_of = |name: &str| {
        let index =
            database.commands().iter().position(|c| c.description == name).unwrap();
        database.command_signatures()[index]
    };
    assert_eq!(signature_of("c1.out"), EMPTY_SIGNATURE);
    assert_ne!(signature_of("c2.out"), EMPTY_SIGNATURE);
    assert_ne!(signature_of("c3.out"), EMPTY_SIGNATURE);
    assert_eq!(signature_of("c4.out"), EMPTY_SIGNATURE);
    assert!(!dir.path().join("c4.out").exists());

    // The database still saves after a failed run.
    database.save(&dir.path().join(".build_db")).unwrap();
}

#[test]
fn targets_limit_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let in_a = dir.path().join("in_a.txt");
    let in_b = dir.path().join("in_b.txt");
    fs::write(&in_a, "a").unwrap();
    fs::write(&in_b, "b").unwrap();
    let out_a = dir.path().join("out_a.txt");
    let out_b = dir.path().join("out_b.txt");

    let mut database = Database::new();
    database
        .set_commands(vec![
            copy_entry(&in_a, &out_a, "copy a"),
            copy_entry(&in_b, &out_b, "copy b"),
        ])
        .unwrap();

    let pending =
        filter_commands(&mut database, dir.path(), &["copy a".to_string()]).unwrap();
    assert_eq!(run_commands(&pending, &mut database, 2, false), 1);
    assert!(out_a.exists());
    assert!(!out_b.exists());
}
