//! The dirtiness analyzer: decides which commands need to run.
//!
//! `filter_commands` refreshes file signatures in parallel, checks output
//! presence, then walks the graph once in topological order to propagate
//! dirtiness. The result is the (topologically ordered) list of command ids
//! the executor should run.

use std::path::Path;

use anyhow::{bail, Result};
use log::debug;
use rayon::prelude::*;

use crate::build::database::{CommandId, Database};
use crate::build::signature::{command_signature, update_path_signature, EMPTY_SIGNATURE};
use crate::paths;

/// Filters the database down to the dirty, included, non-phony commands.
///
/// `targets` narrows the selection: a target matches a command by exact
/// description, or by naming one of its inputs or outputs (resolved against
/// `invocation_path`). Dependencies of included commands are included
/// transitively. An empty target list selects everything.
pub fn filter_commands(
    database: &mut Database,
    invocation_path: &Path,
    targets: &[String],
) -> Result<Vec<CommandId>> {
    let Database {
        ref commands,
        ref command_dependencies,
        ref mut command_signatures,
        ref mut file_dependencies,
        ..
    } = *database;

    let all_included = targets.is_empty();
    let mut included = vec![all_included; commands.len()];

    let mut stack = Vec::with_capacity(commands.len());
    let mut mark_included = |included: &mut Vec<bool>, index: usize| {
        stack.push(index);
        while let Some(command_index) = stack.pop() {
            included[command_index] = true;
            stack.extend(command_dependencies[command_index].iter().map(|id| *id as usize));
        }
    };

    for target in targets {
        let expanded = paths::absolute(Path::new(target), invocation_path);
        let mut found = false;
        for (command_index, command) in commands.iter().enumerate() {
            if *target == command.description
                || command.inputs.iter().any(|input| *input == expanded)
                || command.outputs.iter().any(|output| *output == expanded)
            {
                mark_included(&mut included, command_index);
                found = true;
                break;
            }
        }
        if !found {
            bail!("The specified target could not be found:\n  {} ({})", target, expanded.display());
        }
    }

    // Refresh every tracked path in parallel; each worker reports the
    // commands its changed paths gate and the signatures are cleared after
    // the join, so nothing races.
    let input_dirtied: Vec<CommandId> = file_dependencies
        .par_iter_mut()
        .flat_map_iter(|file_dependency| {
            if update_path_signature(&mut file_dependency.signature_pair, &file_dependency.path) {
                debug!("dirty: {} has been touched", file_dependency.path.display());
                file_dependency.dependent_commands.clone()
            } else {
                Vec::new()
            }
        })
        .collect();
    for command_id in input_dirtied {
        command_signatures[command_id as usize] = EMPTY_SIGNATURE;
    }

    // Output presence only; output contents are the command's business.
    let output_dirtied: Vec<usize> = commands
        .par_iter()
        .enumerate()
        .filter(|(index, command)| {
            command_signatures[*index] != EMPTY_SIGNATURE
                && command.outputs.iter().any(|output| !output.exists())
        })
        .map(|(index, _)| index)
        .collect();
    for index in output_dirtied {
        debug!("dirty: output missing for {}", commands[index].description);
        command_signatures[index] = EMPTY_SIGNATURE;
    }

    // One serial pass in topological order settles everything else: stale
    // command payloads and transitive dirtiness.
    for index in 0..commands.len() {
        if command_signatures[index] == EMPTY_SIGNATURE {
            continue;
        }
        if command_signatures[index] != command_signature(&commands[index]) {
            debug!("dirty: signature mismatch for {}", commands[index].description);
            command_signatures[index] = EMPTY_SIGNATURE;
            continue;
        }
        if command_dependencies[index]
            .iter()
            .any(|dependency| command_signatures[*dependency as usize] == EMPTY_SIGNATURE)
        {
            debug!("dirty: transitive {}", commands[index].description);
            command_signatures[index] = EMPTY_SIGNATURE;
        }
    }

    Ok((0..commands.len())
        .filter(|index| {
            included[*index]
                && command_signatures[*index] == EMPTY_SIGNATURE
                && !commands[*index].is_phony()
        })
        .map(|index| index as CommandId)
        .collect())
}
