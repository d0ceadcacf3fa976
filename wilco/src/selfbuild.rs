//! The self-rebuild protocol.
//!
//! The running executable *is* the user's configuration program. Before any
//! real work, we check whether its sources changed since it was built; if so
//! the binary is renamed aside, rebuilt onto its own path, and re-invoked.
//! A sub-invocation (marked `--internal-restart`) that rebuilt exits with
//! [`EXIT_RESTART`] so the parent loops; once an invocation reports nothing
//! to do, the parent hands the real work to the fresh binary and exits with
//! its code. The net effect: by the time an action runs, the binary on disk
//! matches the configuration sources.

use std::cmp;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

use anyhow::{bail, Context as _, Result};
use log::{debug, warn};

use crate::build::{filter_commands, run_commands, Database};
use crate::cli::{quote, quote_path, Context, INTERNAL_RESTART_FLAG};
use crate::commands::CommandEntry;
use crate::environment::Environment;
use crate::process;

/// Exit code of a sub-invocation meaning "rebuilt fine, run me again".
pub const EXIT_RESTART: i32 = 10;

const MAX_RESTARTS: usize = 10;

/// Where the self-build state lives under the cache path.
pub fn database_path(cache_path: &Path) -> PathBuf {
    cache_path.join("tmp").join(".build_db")
}

fn rebuild_command(ctx: &Context, inputs: Vec<PathBuf>, build_output: &Path) -> CommandEntry {
    let target_dir = ctx.cache_path.join("tmp").join("target");
    let built_binary = target_dir.join("debug").join(&ctx.package);
    let manifest = ctx.manifest_dir.join("Cargo.toml");

    let mut command = CommandEntry::default();
    command.command = format!(
        "cargo build --manifest-path {} --target-dir {} && cp {} {}",
        quote_path(&manifest),
        quote_path(&target_dir),
        quote_path(&built_binary),
        quote_path(build_output)
    );
    command.description = format!("Rebuilding {}", ctx.package);
    command.inputs = inputs;
    command.outputs = vec![build_output.to_path_buf()];
    command
}

/// Rebuilds the configuration program when its sources changed, re-invoking
/// the result. May not return: sub-invocations and completed restarts exit
/// the process. On the plain no-op path it returns the self-build source
/// set, which the configuration database watches too.
pub fn build_self(ctx: &Context) -> Result<BTreeSet<PathBuf>> {
    let build_output = process::current_module_path().to_path_buf();
    if build_output.as_os_str().is_empty() {
        bail!("cannot determine the path of the running executable");
    }

    let mut env = Environment::new();
    let mut inputs = env.list_files(&ctx.manifest_dir.join("src"), true);
    let manifest = ctx.manifest_dir.join("Cargo.toml");
    if manifest.exists() {
        inputs.push(manifest);
    }
    for input in &inputs {
        env.add_configuration_dependency(input);
    }
    env.add_configuration_dependency(&build_output);

    let output_path = ctx.cache_path.join("tmp");
    let self_database_path = database_path(&ctx.cache_path);
    let mut database = Database::new();
    database.load(&self_database_path);
    database.set_commands(vec![rebuild_command(ctx, inputs, &build_output)])?;

    let pending = filter_commands(&mut database, &ctx.start_path, &[])?;
    if pending.is_empty() {
        debug!("configuration program is up to date");
        if ctx.internal_restart {
            exit(0);
        }
        return Ok(env.configuration_dependencies);
    }

    println!("Rebuilding {}.", ctx.package);

    // Move ourselves out of the way so the build can create the new binary
    // at our path.
    fs::create_dir_all(&output_path)
        .with_context(|| format!("failed to create {}", output_path.display()))?;
    let suffix = if ctx.internal_restart { "running_sub" } else { "running" };
    let staged_binary = output_path.join(format!(
        "{}.{}",
        build_output.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        suffix
    ));
    fs::rename(&build_output, &staged_binary).with_context(|| {
        format!("failed to stage {} aside for rebuilding", build_output.display())
    })?;

    let max_concurrent = cmp::max(1, num_cpus::get());
    let completed = run_commands(&pending, &mut database, max_concurrent, false);
    if let Err(cause) = database.save(&self_database_path) {
        warn!("failed to save the self-build database: {}", cause);
    }

    if completed < pending.len() {
        // No working replacement was produced; put the running binary back.
        let _ = fs::rename(&staged_binary, &build_output);
        exit(1);
    }

    if ctx.internal_restart {
        exit(EXIT_RESTART);
    }

    // Run the rebuilt binary until it stops rebuilding itself, then hand the
    // actual work over to it.
    let mut argument_string = String::new();
    for argument in &ctx.all_arguments {
        argument_string += " ";
        argument_string += &quote(argument);
    }

    let restart_command_line = format!(
        "cd {} && {}{} {}",
        quote_path(&ctx.start_path),
        quote_path(&build_output),
        argument_string,
        INTERNAL_RESTART_FLAG
    );

    let mut iterations = 0;
    loop {
        if iterations >= MAX_RESTARTS {
            bail!(
                "Stuck rebuilding the build configuration more than {} times, which seems wrong.",
                MAX_RESTARTS
            );
        }
        let result = process::run(&restart_command_line, true);
        match result.exit_code {
            0 => break,
            EXIT_RESTART => iterations += 1,
            code => exit(code),
        }
    }

    let build_command_line = format!(
        "cd {} && {}{}",
        quote_path(&ctx.start_path),
        quote_path(&build_output),
        argument_string
    );
    let result = process::run(&build_command_line, true);
    exit(result.exit_code);
}
