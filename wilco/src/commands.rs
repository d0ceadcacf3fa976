//! Command records and helpers for composing portable shell commands.
//!
//! A [`CommandEntry`] is the unit of work the engine schedules: one shell
//! command line with declared inputs and outputs. Configuration programs
//! build them directly or through the helper constructors at the bottom of
//! this module.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};

/// Depfile flavors the engine knows how to parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepFileFormat {
    /// Make-rule style, as written by `gcc -MD`/`clang -MD`.
    Gcc,
    /// The JSON produced by `cl.exe /sourceDependencies`.
    Msvc,
}

/// A dependency file the command writes while running. Parsing it after a
/// run discovers inputs (headers, typically) beyond the declared ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepFile {
    pub path: PathBuf,
    pub format: DepFileFormat,
}

/// A single executable action in the command graph.
///
/// An entry with an empty `command` is a *phony* aggregator: it is never
/// executed and exists so a group of outputs can be addressed through its
/// `description`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandEntry {
    /// Shell command line, run via `/bin/sh -c` (`cmd /c` on Windows).
    pub command: String,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    /// Prepended as `cd <dir> &&` before the command line.
    pub working_directory: PathBuf,
    pub dep_file: Option<DepFile>,
    /// Response file written before the command runs and removed after.
    /// The command line references it, conventionally as `@<path>`.
    pub rsp_file: Option<PathBuf>,
    pub rsp_contents: String,
    /// Human-readable label, also matched against build targets.
    pub description: String,
}

impl CommandEntry {
    pub fn is_phony(&self) -> bool {
        self.command.is_empty()
    }
}

fn quoted(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

/// Concatenates several commands into one `&&`-joined entry, merging inputs
/// and outputs and dropping inputs satisfied by an earlier step.
pub fn chain(commands: &[CommandEntry], new_description: Option<&str>) -> Result<CommandEntry> {
    let mut result = match commands.first() {
        Some(first) => first.clone(),
        None => bail!("no commands to chain"),
    };

    for command in &commands[1..] {
        if result.working_directory != command.working_directory {
            bail!("can't chain commands with different working directories");
        }

        result.command += " && ";
        result.command += &command.command;
        result.inputs.extend(command.inputs.iter().cloned());
        result.outputs.extend(command.outputs.iter().cloned());

        if new_description.is_none() {
            result.description = format!("{}, {}", result.description, command.description);
        }
    }

    let outputs = result.outputs.clone();
    result.inputs.retain(|input| !outputs.contains(input));

    if let Some(description) = new_description {
        result.description = description.to_string();
    }

    Ok(result)
}

/// A command creating `dir` (and parents) if it does not already exist.
pub fn mkdir(dir: &Path) -> CommandEntry {
    let mut entry = CommandEntry::default();
    let dir_str = quoted(dir);
    if cfg!(windows) {
        entry.command = format!("(if not exist {} mkdir {})", dir_str, dir_str);
    } else {
        entry.command = format!("mkdir -p {}", dir_str);
    }
    entry.description = format!("Creating directory '{}'", dir.display());
    entry
}

/// A command copying `from` to `to`, creating the target directory first.
pub fn copy(from: &Path, to: &Path) -> CommandEntry {
    let mut entry = CommandEntry::default();
    entry.inputs = vec![from.to_path_buf()];
    entry.outputs = vec![to.to_path_buf()];
    if cfg!(windows) {
        entry.command = format!("copy {} {}", quoted(from), quoted(to));
    } else {
        entry.command = format!("cp {} {}", quoted(from), quoted(to));
    }

    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        entry = chain(&[mkdir(parent), entry], None).unwrap();
    }

    entry.description = format!("Copying '{}' -> '{}'", from.display(), to.display());
    entry
}

/// Copies `from` into `target_base`, preserving its path relative to
/// `relative_base`. Fails when `from` is not inside `relative_base`.
pub fn copy_relative(from: &Path, relative_base: &Path, target_base: &Path) -> Result<CommandEntry> {
    let relative = from.strip_prefix(relative_base).map_err(|_| {
        anyhow!(
            "failed to find a relative subpath from '{}' to '{}'",
            relative_base.display(),
            from.display()
        )
    })?;
    Ok(copy(from, &target_base.join(relative)))
}

/// A command moving `from` to `to`; `touch_target` additionally freshens the
/// target's mtime so downstream commands see it as new.
pub fn move_file(from: &Path, to: &Path, touch_target: bool) -> CommandEntry {
    let mut entry = CommandEntry::default();
    entry.inputs = vec![from.to_path_buf()];
    entry.outputs = vec![to.to_path_buf()];
    let (from_str, to_str) = (quoted(from), quoted(to));
    if cfg!(windows) {
        entry.command = format!("move {} {}", from_str, to_str);
        if touch_target {
            entry.command += &format!(" && copy /b {} +,,", to_str);
        }
    } else {
        entry.command = format!("mv {} {}", from_str, to_str);
        if touch_target {
            entry.command += &format!(" && touch {}", to_str);
        }
    }

    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        entry = chain(&[mkdir(parent), entry], None).unwrap();
    }

    entry.description = format!("Moving '{}' -> '{}'", from.display(), to.display());
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_merges_and_drops_intermediates() {
        let mut first = CommandEntry::default();
        first.command = "gen a".to_string();
        first.outputs = vec![PathBuf::from("/tmp/a")];
        first.description = "gen".to_string();

        let mut second = CommandEntry::default();
        second.command = "use a".to_string();
        second.inputs = vec![PathBuf::from("/tmp/a")];
        second.outputs = vec![PathBuf::from("/tmp/b")];
        second.description = "use".to_string();

        let chained = chain(&[first, second], Some("both")).unwrap();
        assert_eq!(chained.command, "gen a && use a");
        assert_eq!(chained.description, "both");
        // The intermediate /tmp/a is produced within the chain.
        assert!(chained.inputs.is_empty());
        assert_eq!(chained.outputs.len(), 2);
    }

    #[test]
    fn chain_rejects_mixed_working_directories() {
        let mut first = CommandEntry::default();
        first.command = "true".to_string();
        let mut second = CommandEntry::default();
        second.command = "true".to_string();
        second.working_directory = PathBuf::from("/elsewhere");

        assert!(chain(&[first, second], None).is_err());
    }

    #[test]
    fn copy_creates_target_directory() {
        let entry = copy(Path::new("/src/in.txt"), Path::new("/dst/deep/out.txt"));
        assert!(entry.command.contains("mkdir"));
        assert!(entry.command.contains("&&"));
        assert_eq!(entry.inputs, vec![PathBuf::from("/src/in.txt")]);
        assert_eq!(entry.outputs, vec![PathBuf::from("/dst/deep/out.txt")]);
    }
}
