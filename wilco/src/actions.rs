//! The user-facing actions: build, configure, clean, query.

use std::cmp;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Result};

use crate::build::{filter_commands, run_commands};
use crate::cli::{ArgumentError, Context};
use crate::configurator::BuildConfigurator;
use crate::Configure;

pub fn dispatch(
    ctx: &Context,
    configure: Configure,
    self_dependencies: BTreeSet<PathBuf>,
) -> Result<()> {
    match ctx.action.as_deref() {
        None => Err(ArgumentError("No action specified.".to_string()).into()),
        Some("build") => build(ctx, configure, &self_dependencies),
        Some("configure") => configure_action(ctx, configure, &self_dependencies),
        Some("clean") => clean(ctx, configure, &self_dependencies),
        Some("query") => query(ctx, configure, &self_dependencies),
        Some(other) => Err(ArgumentError(format!("Unknown action \"{}\"", other)).into()),
    }
}

fn print_build_time(start_time: Instant) {
    let elapsed = start_time.elapsed();
    if elapsed.as_millis() > 1000 {
        println!("--- {:.3}s ---", elapsed.as_secs_f32());
    } else {
        println!("--- {}ms ---", elapsed.as_millis());
    }
}

fn build(ctx: &Context, configure: Configure, self_dependencies: &BTreeSet<PathBuf>) -> Result<()> {
    let start_time = Instant::now();

    let mut configurator = BuildConfigurator::new(ctx, configure, self_dependencies, false)?;
    let result = run_build(ctx, &mut configurator);
    // Saved even after failures and interrupts; completed work keeps its
    // signatures either way.
    configurator.save();

    print_build_time(start_time);
    result
}

fn run_build(ctx: &Context, configurator: &mut BuildConfigurator) -> Result<()> {
    let pending = filter_commands(&mut configurator.database, &ctx.start_path, &ctx.targets)?;

    if pending.is_empty() {
        println!("Nothing to do. (Everything up to date.)");
        return Ok(());
    }

    let max_concurrent = cmp::max(1, num_cpus::get());
    println!("Building using {} concurrent tasks.", max_concurrent);
    let completed = run_commands(&pending, &mut configurator.database, max_concurrent, ctx.verbose);

    println!("{} of {} targets rebuilt.", completed, pending.len());
    if completed < pending.len() {
        bail!("Some targets were not properly rebuilt.");
    }
    Ok(())
}

fn configure_action(
    ctx: &Context,
    configure: Configure,
    self_dependencies: &BTreeSet<PathBuf>,
) -> Result<()> {
    let configurator = BuildConfigurator::new(ctx, configure, self_dependencies, true)?;
    configurator.save();
    Ok(())
}

fn clean(ctx: &Context, configure: Configure, self_dependencies: &BTreeSet<PathBuf>) -> Result<()> {
    let configurator = BuildConfigurator::new(ctx, configure, self_dependencies, false)?;

    if !ctx.targets.is_empty() {
        bail!("Cleaning specific targets is currently not implemented.");
    }

    println!("Cleaning...");
    for command in configurator.database.commands() {
        for output in &command.outputs {
            let _ = fs::remove_file(output);
        }
    }
    configurator.save();
    println!("Done.");
    Ok(())
}

fn query(ctx: &Context, configure: Configure, self_dependencies: &BTreeSet<PathBuf>) -> Result<()> {
    if !ctx.query_projects {
        return Err(ArgumentError("No query type specified.".to_string()).into());
    }

    let configurator = BuildConfigurator::new(ctx, configure, self_dependencies, false)?;
    // Projects surface as their phony aggregators.
    for command in configurator.database.commands() {
        if command.is_phony() && !command.description.is_empty() {
            println!("{}", command.description);
        }
    }
    configurator.save();
    Ok(())
}
