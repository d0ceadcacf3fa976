//! Configure-if-dirty orchestration.
//!
//! Wraps the two databases an action works with: the build database (the
//! command graph) and the configuration database, whose single synthetic
//! command encodes the configure argv and watches every configuration
//! dependency. When either says so, the user's configure function is re-run
//! and both are rewritten, together with `compile_commands.json`.

use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, warn};
use serde_derive::Serialize;

use crate::build::{filter_commands, Database};
use crate::build::signature::{command_signature, update_path_signature};
use crate::cli::Context;
use crate::commands::CommandEntry;
use crate::environment::{collect_commands, Environment};
use crate::paths;
use crate::process;
use crate::selfbuild;
use crate::Configure;

pub struct BuildConfigurator {
    pub database: Database,
    pub config_database: Database,
    database_path: PathBuf,
    config_database_path: PathBuf,
}

impl BuildConfigurator {
    /// Loads both databases and re-runs configuration when anything demands
    /// it: no prior state, changed argv, a dirty configuration dependency,
    /// or `force`.
    pub fn new(
        ctx: &Context,
        configure: Configure,
        self_dependencies: &BTreeSet<PathBuf>,
        force: bool,
    ) -> Result<BuildConfigurator> {
        let data_path = ctx.build_path.clone();
        let config_database_path = data_path.join(".config_db");
        let database_path = data_path.join(".build_db");

        let mut config_database = Database::new();
        let has_database = config_database.load(&config_database_path);
        let mut config_dirty = force || !has_database;

        let args = ctx.config_arguments();
        if previous_config_arguments(&config_database).as_ref() != Some(&args) {
            config_dirty = true;
        }

        if !config_dirty {
            let pending = filter_commands(&mut config_database, &ctx.start_path, &[])?;
            config_dirty = !pending.is_empty();
        }

        let mut database = Database::new();
        if !database.load(&database_path) {
            config_dirty = true;
        }

        if config_dirty {
            println!(
                "{} {}...",
                if has_database { "Reconfiguring" } else { "Configuring" },
                data_path.display()
            );

            let mut env = Environment::new();
            for dependency in self_dependencies {
                env.add_configuration_dependency(dependency);
            }
            configure(&mut env);

            let mut commands = Vec::new();
            for project in &env.projects {
                collect_commands(project, &mut commands)?;
            }
            database.set_commands(commands)?;

            let compile_commands = generate_compile_commands(&database, &ctx.cache_path)?;
            env.write_file(&data_path.join("compile_commands.json"), &compile_commands)?;

            update_config_database(&mut config_database, &env.configuration_dependencies, &args)?;

            println!("Done.");
        } else {
            debug!("configuration in {} is up to date", data_path.display());
            println!("Configuration in {} is up to date", data_path.display());
        }

        Ok(BuildConfigurator { database, config_database, database_path, config_database_path })
    }

    /// Persists both databases; failures are reported but not fatal, the
    /// worst outcome being a spurious rebuild next time.
    pub fn save(&self) {
        if let Err(cause) = self.database.save(&self.database_path) {
            warn!("failed to save the build database: {}", cause);
        }
        if let Err(cause) = self.config_database.save(&self.config_database_path) {
            warn!("failed to save the configuration database: {}", cause);
        }
    }
}

/// Extracts the argv stored by the previous configure, if the database holds
/// a well-formed synthetic command.
pub(crate) fn previous_config_arguments(database: &Database) -> Option<Vec<String>> {
    let first = database.commands().first()?;
    let mut parts = first.command.split('\n');
    if parts.next() != Some("wilco") {
        return None;
    }
    Some(parts.map(str::to_string).collect())
}

/// Rewrites the configuration database around one synthetic command. The
/// command line is never executed; it exists so the usual signature
/// comparison notices argv changes, and its inputs make every configuration
/// dependency (and the binary itself) watched.
pub(crate) fn update_config_database(
    database: &mut Database,
    dependencies: &BTreeSet<PathBuf>,
    args: &[String],
) -> Result<()> {
    let mut command = CommandEntry::default();
    command.description = "Configure".to_string();
    // A phony command would be filtered out, so the line carries a token.
    command.command = "wilco".to_string();
    if !args.is_empty() {
        command.command += "\n";
        command.command += &args.join("\n");
    }
    command.inputs = dependencies.iter().cloned().collect();
    command.inputs.push(process::current_module_path().to_path_buf());

    database.set_commands(vec![command])?;
    database.command_signatures[0] = command_signature(&database.commands[0]);

    // Refresh every input signature now; changes made while configuration
    // ran will not trigger another pass.
    for file_dependency in database.file_dependencies.iter_mut() {
        update_path_signature(&mut file_dependency.signature_pair, &file_dependency.path);
    }
    Ok(())
}

#[derive(Serialize)]
struct CompileCommand {
    directory: String,
    file: String,
    command: String,
}

fn export_commands(commands: &[CommandEntry], cwd: &Path, entries: &mut Vec<CompileCommand>) {
    for command in commands {
        if command.is_phony() || command.inputs.is_empty() {
            continue;
        }

        let directory = paths::absolute(&command.working_directory, cwd);
        let command_line = if command.rsp_contents.is_empty() {
            command.command.clone()
        } else {
            // The @rspfile reference stays in place; appending the contents
            // is enough for tooling that only reads flags.
            format!("{} {}", command.command, command.rsp_contents)
        };

        entries.push(CompileCommand {
            directory: directory.display().to_string(),
            // First input is the main one by convention.
            file: command.inputs[0].display().to_string(),
            command: command_line,
        });
    }
}

/// The `compile_commands.json` payload for the current graph, including the
/// self-build commands so the configuration program itself gets tooling.
fn generate_compile_commands(database: &Database, cache_path: &Path) -> Result<String> {
    let cwd = env::current_dir().unwrap_or_default();
    let mut entries = Vec::new();

    export_commands(database.commands(), &cwd, &mut entries);

    let mut self_database = Database::new();
    self_database.load(&selfbuild::database_path(cache_path));
    export_commands(self_database.commands(), &cwd, &mut entries);

    Ok(serde_json::to_string_pretty(&entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn config_database_round_trips_arguments() {
        let mut database = Database::new();
        let args = vec!["--build-path=out".to_string(), "--verbose".to_string()];
        update_config_database(&mut database, &BTreeSet::new(), &args).unwrap();
        assert_eq!(previous_config_arguments(&database), Some(args));

        let mut database = Database::new();
        update_config_database(&mut database, &BTreeSet::new(), &[]).unwrap();
        assert_eq!(previous_config_arguments(&database), Some(Vec::new()));
    }

    #[test]
    fn config_database_detects_dependency_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("settings.toml");
        fs::write(&config_file, "a = 1").unwrap();

        let mut dependencies = BTreeSet::new();
        dependencies.insert(config_file.clone());

        let mut database = Database::new();
        update_config_database(&mut database, &dependencies, &[]).unwrap();

        let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
        assert!(pending.is_empty(), "fresh configuration must be clean");

        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(&config_file, "a = 2").unwrap();
        let pending = filter_commands(&mut database, dir.path(), &[]).unwrap();
        assert_eq!(pending.len(), 1, "touched dependency must re-trigger configuration");
    }

    #[test]
    fn compile_commands_skip_phonies() {
        let dir = tempfile::tempdir().unwrap();
        let mut database = Database::new();

        let mut compile = CommandEntry::default();
        compile.command = "cc -c main.c".to_string();
        compile.description = "cc".to_string();
        compile.inputs = vec![dir.path().join("main.c")];
        compile.outputs = vec![dir.path().join("main.o")];
        compile.rsp_contents = "-O2".to_string();

        let mut phony = CommandEntry::default();
        phony.description = "all".to_string();
        phony.inputs = vec![dir.path().join("main.o")];

        database.set_commands(vec![compile, phony]).unwrap();

        let json = generate_compile_commands(&database, dir.path()).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["command"], "cc -c main.c -O2");
        assert!(parsed[0]["file"].as_str().unwrap().ends_with("main.c"));
    }
}
