//! The surface a configuration program works against.
//!
//! A configure function receives an [`Environment`], declares projects and
//! commands on it, and registers (implicitly, through the file helpers) the
//! paths its decisions depended on. Those configuration dependencies are what
//! the configuration database watches to decide when configure must re-run.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use log::debug;
use walkdir::WalkDir;

use crate::commands::CommandEntry;
use crate::paths;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectKind {
    /// Produces a binary through toolchain-synthesized commands.
    Executable,
    /// A bare bundle of explicit commands.
    Command,
}

pub struct Project {
    pub name: String,
    pub kind: ProjectKind,
    pub commands: Vec<CommandEntry>,
}

/// State accumulated while the configuration program runs.
#[derive(Default)]
pub struct Environment {
    pub projects: Vec<Project>,
    /// Every path whose content or listing influenced configuration. Owned
    /// here rather than process-global so concurrent environments (the self
    /// build, tests) stay independent.
    pub configuration_dependencies: BTreeSet<PathBuf>,
}

impl Environment {
    pub fn new() -> Environment {
        Environment::default()
    }

    pub fn create_project(&mut self, name: &str, kind: ProjectKind) -> &mut Project {
        self.projects.push(Project { name: name.to_string(), kind, commands: Vec::new() });
        self.projects.last_mut().unwrap()
    }

    pub fn add_configuration_dependency(&mut self, path: &Path) {
        self.configuration_dependencies.insert(path.to_path_buf());
    }

    /// Reads a file, registering it as a configuration dependency.
    pub fn read_file(&mut self, path: &Path) -> io::Result<String> {
        self.add_configuration_dependency(path);
        fs::read_to_string(path)
    }

    /// Writes a file, registering it as a configuration dependency. Content
    /// identical to what is already on disk is left untouched so downstream
    /// mtime checks stay quiet. Returns whether anything was written.
    pub fn write_file(&mut self, path: &Path, data: &str) -> io::Result<bool> {
        self.add_configuration_dependency(path);

        if let Ok(existing) = fs::read(path) {
            if existing == data.as_bytes() {
                return Ok(false);
            }
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(true)
    }

    /// Lists regular files under `path`, registering every visited directory
    /// as a configuration dependency so later additions re-trigger
    /// configuration. A missing path registers its closest existing ancestor
    /// for the same reason.
    pub fn list_files(&mut self, path: &Path, recurse: bool) -> Vec<PathBuf> {
        let mut result = Vec::new();

        if !path.exists() {
            let mut parent = path.parent();
            while let Some(candidate) = parent {
                if candidate.exists() {
                    self.add_configuration_dependency(candidate);
                    break;
                }
                parent = candidate.parent();
            }
            return result;
        }

        let max_depth = if recurse { usize::max_value() } else { 1 };
        for entry in WalkDir::new(path).max_depth(max_depth).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_dir() {
                self.add_configuration_dependency(entry.path());
            } else if entry.file_type().is_file() {
                result.push(paths::normalize(entry.path()));
            }
        }

        debug!("listed {} files under {}", result.len(), path.display());
        result
    }
}

/// Flattens a project into the command list handed to the database: its
/// commands, plus a phony aggregator named after the project so `wilco build
/// <name>` works. The aggregator's inputs are the outputs nothing within the
/// project consumes.
pub fn collect_commands(project: &Project, collected: &mut Vec<CommandEntry>) -> Result<()> {
    if project.name.is_empty() {
        bail!("trying to build project with no name");
    }
    if project.kind == ProjectKind::Command && project.commands.is_empty() {
        bail!("command project '{}' has no commands", project.name);
    }

    let start = collected.len();
    for command in &project.commands {
        if command.command.is_empty() && !command.outputs.is_empty() {
            bail!(
                "command '{}' in project {} has outputs but no actual command to produce them",
                command.description,
                project.name
            );
        }
        collected.push(command.clone());
    }

    let mut inputs = BTreeSet::new();
    let mut outputs = BTreeSet::new();
    for command in &collected[start..] {
        inputs.extend(command.inputs.iter().cloned());
        outputs.extend(command.outputs.iter().cloned());
    }

    // Outputs consumed within the project (intermediate objects) are left
    // off the aggregator to keep it small.
    let mut phony = CommandEntry::default();
    phony.inputs = outputs.difference(&inputs).cloned().collect();
    phony.description = project.name.clone();
    collected.push(phony);

    Ok(())
}
