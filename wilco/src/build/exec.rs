//! The parallel command executor.
//!
//! A single driver thread polls for finished work and admits commands whose
//! dependencies have completed, up to the concurrency bound. Each admitted
//! command runs on its own short-lived thread and reports back over a
//! channel. Only the driver writes command signatures, and the file index is
//! never touched while commands run: depfile discoveries collect in a side
//! map and merge after the loop.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use log::{debug, info};

use crate::build::database::{CommandId, Database, FileDependencies};
use crate::build::depfile::parse_dependency_data;
use crate::build::signature::{
    command_signature, content_signature, SignaturePair, update_path_signature,
};
use crate::commands::CommandEntry;
use crate::interrupt;
use crate::paths;
use crate::process::{self, ProcessResult};

/// Runs one command to completion: output directories, response file, shell,
/// response file cleanup. Failures around the command (spawn, rsp write)
/// are reported as a failed result rather than a process error.
fn run_command(command: &CommandEntry) -> ProcessResult {
    if command.is_phony() {
        return ProcessResult { exit_code: 0, output: String::new() };
    }

    for output in &command.outputs {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(cause) = fs::create_dir_all(parent) {
                return ProcessResult {
                    exit_code: 1,
                    output: format!(
                        "Failed to create output directory \"{}\": {}",
                        parent.display(),
                        cause
                    ),
                };
            }
        }
    }

    if let Some(rsp_file) = &command.rsp_file {
        if let Err(cause) = fs::write(rsp_file, &command.rsp_contents) {
            return ProcessResult {
                exit_code: 1,
                output: format!(
                    "Failed to write response file \"{}\": {}",
                    rsp_file.display(),
                    cause
                ),
            };
        }
    }

    let cwd = if command.working_directory.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        command.working_directory.clone()
    };
    let command_line = format!("cd \"{}\" && {} 2>&1", cwd.display(), command.command);

    let result = process::run(&command_line, false);

    if let Some(rsp_file) = &command.rsp_file {
        let _ = fs::remove_file(rsp_file);
    }

    result
}

fn spawn_worker(
    command_id: CommandId,
    command: CommandEntry,
    done: Sender<(CommandId, ProcessResult)>,
) {
    thread::spawn(move || {
        let result = run_command(&command);
        // The driver may already be gone if it halted; nothing to do then.
        let _ = done.send((command_id, result));
    });
}

/// Executes the filtered commands, bounded by `max_concurrent` workers.
/// Returns how many commands completed successfully; anything less than
/// `pending.len()` means a failure or an interrupt stopped the run.
pub fn run_commands(
    pending: &[CommandId],
    database: &mut Database,
    max_concurrent: usize,
    verbose: bool,
) -> usize {
    let Database {
        ref commands,
        ref command_dependencies,
        ref mut command_signatures,
        ref dep_file_signatures,
        ..
    } = *database;

    let mut completed_flags = vec![true; commands.len()];
    for command_id in pending {
        completed_flags[*command_id as usize] = false;
    }
    let mut started = vec![false; commands.len()];

    let (done_sender, done_receiver) = unbounded::<(CommandId, ProcessResult)>();

    let mut new_input_signatures: HashMap<PathBuf, SignaturePair> = HashMap::new();
    let mut rebuild_dependencies = false;

    let mut announced = 0;
    let mut completed = 0;
    let mut first_pending = 0;
    let mut running = 0;
    let mut halt = false;

    while (!halt && first_pending < pending.len()) || running > 0 {
        thread::sleep(Duration::from_millis(10));

        while let Ok((command_id, result)) = done_receiver.try_recv() {
            running -= 1;
            let index = command_id as usize;
            completed_flags[index] = true;

            let command = &commands[index];
            let mut output = result.output.trim();

            // CL.EXE unconditionally echoes the source filename; drop the
            // echo so clean compiles stay quiet.
            if let Some(first_input) = command.inputs.first() {
                if let Some(filename) = first_input.file_name() {
                    if *output == *filename.to_string_lossy() {
                        output = "";
                    }
                }
            }

            if !output.is_empty() && !interrupt::is_interrupted() {
                print!("\n{}", output);
            }

            if interrupt::is_interrupted() {
                halt = true;
            } else if result.exit_code != 0 {
                print!("\nCommand returned {}", result.exit_code);
                halt = true;
            } else {
                if let Some(dep_file) = &command.dep_file {
                    let mut contents = fs::read(&dep_file.path).unwrap_or_default();
                    let dep_file_signature = content_signature(&contents);
                    if dep_file_signature != dep_file_signatures[index] {
                        debug!("harvesting depfile {}", dep_file.path.display());
                        parse_dependency_data(&mut contents, |path| {
                            if !new_input_signatures.contains_key(Path::new(path)) {
                                let mut pair = SignaturePair::default();
                                update_path_signature(
                                    &mut pair,
                                    &paths::normalize(Path::new(path)),
                                );
                                new_input_signatures.insert(PathBuf::from(path), pair);
                            }
                            false
                        });
                        rebuild_dependencies = true;
                    }
                }
                command_signatures[index] = command_signature(command);
                completed += 1;
            }

            let _ = io::stdout().flush();
        }

        if interrupt::is_interrupted() {
            halt = true;
        }
        if halt {
            continue;
        }

        let mut skipped = false;
        for position in first_pending..pending.len() {
            if running >= max_concurrent {
                break;
            }

            let command_id = pending[position];
            let index = command_id as usize;
            if !completed_flags[index] && !started[index] {
                let ready = command_dependencies[index]
                    .iter()
                    .all(|dependency| completed_flags[*dependency as usize]);
                if !ready {
                    skipped = true;
                    continue;
                }

                let command = &commands[index];
                announced += 1;
                print!("\n[{}/{}] {}", announced, pending.len(), command.description);
                let _ = io::stdout().flush();
                if verbose {
                    print!("\n{}\n", command.command);
                    if command.rsp_file.is_some() {
                        print!("rsp:\n{}\n", command.rsp_contents);
                    }
                }

                started[index] = true;
                running += 1;
                spawn_worker(command_id, command.clone(), done_sender.clone());
            }

            if (completed_flags[index] || started[index]) && !skipped {
                first_pending = position + 1;
            }
        }
    }

    println!();

    if rebuild_dependencies {
        if !new_input_signatures.is_empty() {
            for file_dependency in database.file_dependencies.iter_mut() {
                if let Some(pair) = new_input_signatures.remove(&file_dependency.path) {
                    file_dependency.signature_pair = pair;
                }
            }
            for (path, signature_pair) in new_input_signatures.drain() {
                database.file_dependencies.push(FileDependencies {
                    path,
                    dependent_commands: Vec::new(),
                    signature_pair,
                });
            }
        }

        info!("updating dependency graph");
        println!("Updating dependency graph.");
        database.rebuild_file_dependencies();
    }

    completed
}
