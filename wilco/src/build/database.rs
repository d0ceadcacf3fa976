//! The persistent build database.
//!
//! Two side-car files live next to the database base path: `<base>.commands`
//! holds the command graph (topologically ordered) with per-command
//! signatures, `<base>.deps` holds the inverted file-dependency index. Both
//! use a fixed little-endian byte layout behind a versioned header; anything
//! that fails to parse is discarded with a notice and rebuilt from scratch,
//! which at worst costs one full rebuild.

use std::collections::{HashMap, HashSet};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::build::depfile::parse_dependency_data;
use crate::build::signature::{
    command_signature, content_signature, Signature, SignaturePair, EMPTY_SIGNATURE,
};
use crate::commands::{CommandEntry, DepFile, DepFileFormat};
use crate::paths;

/// Index into [`Database::commands`], valid for one load only.
pub type CommandId = u32;

/// One tracked path and the commands it gates. This is the inverted index the
/// dirty scan walks: a changed path clears the signature of every dependent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileDependencies {
    pub path: PathBuf,
    pub dependent_commands: Vec<CommandId>,
    pub signature_pair: SignaturePair,
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("mismatching header")]
    MismatchingHeader,
    #[error("reading past the end of input")]
    UnexpectedEnd,
    #[error("failed to find end of string in input")]
    UnterminatedString,
    #[error("string is not valid UTF-8")]
    InvalidString,
    #[error("unknown depfile format type for {0}")]
    UnknownDepFileFormat(String),
    #[error("dependency count out of bounds")]
    DependencyCountOutOfBounds,
    #[error("dependency index out of bounds")]
    DependencyIndexOutOfBounds,
    #[error("{0} is a lot of commands")]
    TooManyCommands(usize),
    #[error("output '{path}' is produced by both \"{first}\" and \"{second}\"")]
    DuplicateOutput { path: PathBuf, first: String, second: String },
    #[error(
        "invalid command dependency:\n  \"{dependent}\"\n  depends on\n  \"{dependency}\"\n\
         Either there is a cyclic dependency, or an internal error in the dependency resolution."
    )]
    InvalidDependency { dependent: String, dependency: String },
}

const HEADER_MAGIC: u32 = 0x626c_6468; // 'bldh'
const HEADER_VERSION: u32 = 4;
const HEADER_TAG: &[u8; 8] = b"builddb\0";

fn header_bytes() -> [u8; 16] {
    let mut header = [0; 16];
    header[0..4].copy_from_slice(&HEADER_MAGIC.to_le_bytes());
    header[4..8].copy_from_slice(&HEADER_VERSION.to_le_bytes());
    header[8..16].copy_from_slice(HEADER_TAG);
    header
}

fn sidecar(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Byte-layout helpers. Strings are NUL-terminated UTF-8, integers are
// little-endian u32, signatures are 16 raw bytes, lists carry a length
// prefix.

fn write_str(out: &mut impl Write, value: &str) -> io::Result<()> {
    out.write_all(value.as_bytes())?;
    out.write_all(&[0])
}

fn write_path(out: &mut impl Write, value: &Path) -> io::Result<()> {
    write_str(out, &value.to_string_lossy())
}

fn write_u32(out: &mut impl Write, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn write_signature(out: &mut impl Write, value: &Signature) -> io::Result<()> {
    out.write_all(value)
}

fn write_path_list(out: &mut impl Write, list: &[PathBuf]) -> io::Result<()> {
    write_u32(out, list.len() as u32)?;
    for item in list {
        write_path(out, item)?;
    }
    Ok(())
}

fn write_id_list(out: &mut impl Write, list: &[CommandId]) -> io::Result<()> {
    write_u32(out, list.len() as u32)?;
    for id in list {
        write_u32(out, *id)?;
    }
    Ok(())
}

fn write_dep_file(out: &mut impl Write, dep_file: &Option<DepFile>) -> io::Result<()> {
    match dep_file {
        None => write_str(out, ""),
        Some(dep_file) => {
            write_path(out, &dep_file.path)?;
            let tag = match dep_file.format {
                DepFileFormat::Gcc => 0,
                DepFileFormat::Msvc => 1,
            };
            write_u32(out, tag)
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Reader<'a> {
        Reader { data, pos: 0 }
    }

    fn read_bytes(&mut self, amount: usize) -> Result<&'a [u8], DatabaseError> {
        let end = self.pos.checked_add(amount).ok_or(DatabaseError::UnexpectedEnd)?;
        let bytes = self.data.get(self.pos..end).ok_or(DatabaseError::UnexpectedEnd)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_str(&mut self) -> Result<&'a str, DatabaseError> {
        let terminator = self.data[self.pos..]
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(DatabaseError::UnterminatedString)?;
        let bytes = &self.data[self.pos..self.pos + terminator];
        self.pos += terminator + 1;
        std::str::from_utf8(bytes).map_err(|_| DatabaseError::InvalidString)
    }

    fn read_path(&mut self) -> Result<PathBuf, DatabaseError> {
        Ok(PathBuf::from(self.read_str()?))
    }

    fn read_u32(&mut self) -> Result<u32, DatabaseError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_signature(&mut self) -> Result<Signature, DatabaseError> {
        let bytes = self.read_bytes(16)?;
        let mut signature = EMPTY_SIGNATURE;
        signature.copy_from_slice(bytes);
        Ok(signature)
    }

    fn read_path_list(&mut self) -> Result<Vec<PathBuf>, DatabaseError> {
        let count = self.read_u32()?;
        let mut list = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            list.push(self.read_path()?);
        }
        Ok(list)
    }

    fn read_id_list(&mut self) -> Result<Vec<CommandId>, DatabaseError> {
        let count = self.read_u32()?;
        let mut list = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            list.push(self.read_u32()?);
        }
        Ok(list)
    }

    fn read_dep_file(&mut self) -> Result<Option<DepFile>, DatabaseError> {
        let path = self.read_path()?;
        if path.as_os_str().is_empty() {
            return Ok(None);
        }
        let format = match self.read_u32()? {
            0 => DepFileFormat::Gcc,
            1 => DepFileFormat::Msvc,
            _ => {
                return Err(DatabaseError::UnknownDepFileFormat(path.display().to_string()));
            }
        };
        Ok(Some(DepFile { path, format }))
    }

    fn read_header(&mut self) -> Result<(), DatabaseError> {
        let bytes = self.read_bytes(16)?;
        if bytes != header_bytes() {
            return Err(DatabaseError::MismatchingHeader);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------

/// The in-memory root of the build state.
///
/// `commands` is topologically ordered: every dependency id in
/// `command_dependencies[i]` is strictly less than `i`. The three signature
/// vectors run parallel to `commands`; an `EMPTY_SIGNATURE` entry means the
/// command needs to run.
#[derive(Debug, Default, PartialEq)]
pub struct Database {
    pub(crate) commands: Vec<CommandEntry>,
    pub(crate) command_dependencies: Vec<Vec<CommandId>>,
    pub(crate) file_dependencies: Vec<FileDependencies>,
    pub(crate) command_signatures: Vec<Signature>,
    pub(crate) dep_file_signatures: Vec<Signature>,
}

impl Database {
    pub fn new() -> Database {
        Database::default()
    }

    pub fn commands(&self) -> &[CommandEntry] {
        &self.commands
    }

    pub fn command_dependencies(&self) -> &[Vec<CommandId>] {
        &self.command_dependencies
    }

    pub fn command_signatures(&self) -> &[Signature] {
        &self.command_signatures
    }

    pub fn dep_file_signatures(&self) -> &[Signature] {
        &self.dep_file_signatures
    }

    pub fn file_dependencies(&self) -> &[FileDependencies] {
        &self.file_dependencies
    }

    /// Loads state from `<base>.commands` and `<base>.deps`. Returns false
    /// when no usable prior state exists; a missing or corrupt `.deps` file
    /// alone is recovered by rebuilding the file index.
    pub fn load(&mut self, base: &Path) -> bool {
        self.commands.clear();
        self.command_dependencies.clear();
        self.command_signatures.clear();
        self.dep_file_signatures.clear();
        self.file_dependencies.clear();

        let command_data = fs::read(sidecar(base, ".commands")).unwrap_or_default();
        if command_data.is_empty() {
            return false;
        }

        if let Err(cause) = self.load_commands(&command_data) {
            eprintln!("Existing build database incompatible or corrupted. ({})", cause);
            self.commands.clear();
            self.command_dependencies.clear();
            self.command_signatures.clear();
            self.dep_file_signatures.clear();
            return false;
        }

        let dependency_data = fs::read(sidecar(base, ".deps")).unwrap_or_default();
        if dependency_data.is_empty() {
            self.rebuild_file_dependencies();
            return true;
        }

        if let Err(cause) = self.load_file_dependencies(&dependency_data) {
            eprintln!("Existing dependency database incompatible or corrupted. ({})", cause);
            self.file_dependencies.clear();
            self.rebuild_file_dependencies();
        }

        true
    }

    fn load_commands(&mut self, data: &[u8]) -> Result<(), DatabaseError> {
        let mut reader = Reader::new(data);
        reader.read_header()?;

        let num_commands = reader.read_u32()?;
        for index in 0..num_commands {
            let mut command = CommandEntry::default();
            command.command = reader.read_str()?.to_string();
            command.description = reader.read_str()?.to_string();
            command.working_directory = reader.read_path()?;
            command.dep_file = reader.read_dep_file()?;
            let rsp_file = reader.read_path()?;
            command.rsp_file = if rsp_file.as_os_str().is_empty() { None } else { Some(rsp_file) };
            command.rsp_contents = reader.read_str()?.to_string();
            command.inputs = reader.read_path_list()?;
            command.outputs = reader.read_path_list()?;
            self.command_signatures.push(reader.read_signature()?);
            self.dep_file_signatures.push(reader.read_signature()?);

            let dependencies = reader.read_id_list()?;
            if dependencies.len() > num_commands as usize {
                return Err(DatabaseError::DependencyCountOutOfBounds);
            }
            if dependencies.iter().any(|dep| *dep >= index) {
                return Err(DatabaseError::DependencyIndexOutOfBounds);
            }
            self.command_dependencies.push(dependencies);

            self.commands.push(command);
        }
        Ok(())
    }

    fn load_file_dependencies(&mut self, data: &[u8]) -> Result<(), DatabaseError> {
        let mut reader = Reader::new(data);
        reader.read_header()?;

        let num_dependencies = reader.read_u32()?;
        for _ in 0..num_dependencies {
            let path = reader.read_path()?;
            let dependent_commands = reader.read_id_list()?;
            if dependent_commands.iter().any(|dep| *dep as usize >= self.commands.len()) {
                return Err(DatabaseError::DependencyIndexOutOfBounds);
            }
            let signature_pair = SignaturePair {
                file: reader.read_signature()?,
                dir: reader.read_signature()?,
            };
            self.file_dependencies.push(FileDependencies {
                path,
                dependent_commands,
                signature_pair,
            });
        }
        Ok(())
    }

    /// Writes both side-car files next to `base`.
    pub fn save(&self, base: &Path) -> io::Result<()> {
        if let Some(parent) = base.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut out = BufWriter::new(fs::File::create(sidecar(base, ".commands"))?);
        out.write_all(&header_bytes())?;
        write_u32(&mut out, self.commands.len() as u32)?;
        for (index, command) in self.commands.iter().enumerate() {
            write_str(&mut out, &command.command)?;
            write_str(&mut out, &command.description)?;
            write_path(&mut out, &command.working_directory)?;
            write_dep_file(&mut out, &command.dep_file)?;
            write_path(&mut out, command.rsp_file.as_deref().unwrap_or_else(|| Path::new("")))?;
            write_str(&mut out, &command.rsp_contents)?;
            write_path_list(&mut out, &command.inputs)?;
            write_path_list(&mut out, &command.outputs)?;
            write_signature(&mut out, &self.command_signatures[index])?;
            write_signature(&mut out, &self.dep_file_signatures[index])?;
            write_id_list(&mut out, &self.command_dependencies[index])?;
        }
        out.flush()?;

        let mut out = BufWriter::new(fs::File::create(sidecar(base, ".deps"))?);
        out.write_all(&header_bytes())?;
        write_u32(&mut out, self.file_dependencies.len() as u32)?;
        for file_dependency in &self.file_dependencies {
            write_path(&mut out, &file_dependency.path)?;
            write_id_list(&mut out, &file_dependency.dependent_commands)?;
            write_signature(&mut out, &file_dependency.signature_pair.file)?;
            write_signature(&mut out, &file_dependency.signature_pair.dir)?;
        }
        out.flush()
    }

    /// Replaces the command list with a freshly configured one: normalizes
    /// paths, resolves inter-command dependencies from output ownership,
    /// orders the graph topologically and carries over still-valid command
    /// signatures. Fails on cyclic graphs and duplicate output owners.
    pub fn set_commands(&mut self, mut commands: Vec<CommandEntry>) -> Result<(), DatabaseError> {
        if commands.len() >= u32::max_value() as usize {
            return Err(DatabaseError::TooManyCommands(commands.len()));
        }

        struct SortProxy {
            id: CommandId,
            depth: i32,
            dependencies: Vec<CommandId>,
        }

        let base = env::current_dir().unwrap_or_default();

        for command in &mut commands {
            for output in &mut command.outputs {
                *output = paths::absolute(output, &base);
            }
            for input in &mut command.inputs {
                *input = paths::absolute(input, &base);
            }
        }

        let mut command_map: HashMap<PathBuf, CommandId> = HashMap::new();
        for (index, command) in commands.iter().enumerate() {
            for output in &command.outputs {
                if let Some(previous) = command_map.insert(output.clone(), index as CommandId) {
                    if previous as usize != index {
                        return Err(DatabaseError::DuplicateOutput {
                            path: output.clone(),
                            first: commands[previous as usize].description.clone(),
                            second: command.description.clone(),
                        });
                    }
                }
            }
        }

        let mut sort_proxies: Vec<SortProxy> = commands
            .iter()
            .enumerate()
            .map(|(index, command)| SortProxy {
                id: index as CommandId,
                depth: 0,
                dependencies: command
                    .inputs
                    .iter()
                    .filter_map(|input| command_map.get(input).cloned())
                    .collect(),
            })
            .collect();

        // Depth propagation by iterative DFS seeded from every node. A node's
        // dependencies end up deeper than the node itself; depth can never
        // legitimately exceed the command count, and the cap keeps cyclic
        // graphs from spinning here so the ordering check below reports them.
        let depth_limit = commands.len() as i32;
        let mut next = 0;
        let mut stack: Vec<(CommandId, i32)> = Vec::with_capacity(sort_proxies.len());
        while next < sort_proxies.len() || !stack.is_empty() {
            let (id, depth) = match stack.pop() {
                Some(entry) => entry,
                None => {
                    let id = sort_proxies[next].id;
                    next += 1;
                    (id, sort_proxies[id as usize].depth)
                }
            };

            sort_proxies[id as usize].depth = depth;

            for position in 0..sort_proxies[id as usize].dependencies.len() {
                let dependency = sort_proxies[id as usize].dependencies[position];
                if sort_proxies[dependency as usize].depth < depth + 1 && depth < depth_limit {
                    stack.push((dependency, depth + 1));
                }
            }
        }

        sort_proxies.sort_by(|a, b| b.depth.cmp(&a.depth));

        let mut id_remap = vec![0 as CommandId; commands.len()];
        for (new_id, proxy) in sort_proxies.iter().enumerate() {
            id_remap[proxy.id as usize] = new_id as CommandId;
        }

        let mut new_commands = Vec::with_capacity(commands.len());
        let mut new_dependencies = Vec::with_capacity(commands.len());
        for proxy in &mut sort_proxies {
            new_commands.push(std::mem::take(&mut commands[proxy.id as usize]));
            let mut dependencies = std::mem::take(&mut proxy.dependencies);
            for dependency in &mut dependencies {
                *dependency = id_remap[*dependency as usize];
            }
            new_dependencies.push(dependencies);
        }

        for (index, dependencies) in new_dependencies.iter().enumerate() {
            for dependency in dependencies {
                if *dependency as usize >= index {
                    return Err(DatabaseError::InvalidDependency {
                        dependent: new_commands[index].description.clone(),
                        dependency: new_commands[*dependency as usize].description.clone(),
                    });
                }
            }
        }

        // Carry over previously recorded signatures; anything without a match
        // starts blank and therefore rebuilds.
        let existing_signatures: HashSet<Signature> =
            self.command_signatures.iter().cloned().collect();
        self.command_signatures = new_commands
            .iter()
            .map(|command| {
                let signature = command_signature(command);
                if existing_signatures.contains(&signature) {
                    signature
                } else {
                    EMPTY_SIGNATURE
                }
            })
            .collect();

        self.commands = new_commands;
        self.command_dependencies = new_dependencies;
        debug!("set_commands: {} commands ingested", self.commands.len());

        self.rebuild_file_dependencies();
        Ok(())
    }

    /// Rebuilds the inverted file index from command inputs and current
    /// depfile contents, preserving known signature pairs for paths that
    /// survive.
    pub fn rebuild_file_dependencies(&mut self) {
        let outputs: HashSet<&Path> = self
            .commands
            .iter()
            .flat_map(|command| command.outputs.iter().map(PathBuf::as_path))
            .collect();

        let mut dep_file_signatures = Vec::with_capacity(self.commands.len());
        let mut dep_commands: HashMap<PathBuf, Vec<CommandId>> = HashMap::new();

        for (index, command) in self.commands.iter().enumerate() {
            let mut dep_file_signature = EMPTY_SIGNATURE;
            if let Some(dep_file) = &command.dep_file {
                let mut contents = fs::read(&dep_file.path).unwrap_or_default();
                dep_file_signature = content_signature(&contents);
                // Parsing rewrites the buffer, so hash first.
                parse_dependency_data(&mut contents, |path| {
                    if !outputs.contains(Path::new(path)) {
                        dep_commands
                            .entry(PathBuf::from(path))
                            .or_insert_with(Vec::new)
                            .push(index as CommandId);
                    }
                    false
                });
            }
            dep_file_signatures.push(dep_file_signature);

            for input in &command.inputs {
                if !outputs.contains(input.as_path()) {
                    dep_commands
                        .entry(input.clone())
                        .or_insert_with(Vec::new)
                        .push(index as CommandId);
                }
            }
        }

        let existing_signatures: HashMap<PathBuf, SignaturePair> = self
            .file_dependencies
            .drain(..)
            .map(|dep| (dep.path, dep.signature_pair))
            .collect();

        self.dep_file_signatures = dep_file_signatures;
        self.file_dependencies = dep_commands
            .into_iter()
            .map(|(path, dependent_commands)| {
                let signature_pair =
                    existing_signatures.get(&path).cloned().unwrap_or_default();
                FileDependencies { path, dependent_commands, signature_pair }
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(command: &str, inputs: &[&str], outputs: &[&str]) -> CommandEntry {
        let mut result = CommandEntry::default();
        result.command = command.to_string();
        result.description = command.to_string();
        result.inputs = inputs.iter().map(|p| PathBuf::from(*p)).collect();
        result.outputs = outputs.iter().map(|p| PathBuf::from(*p)).collect();
        result
    }

    fn sorted_deps(database: &Database) -> Vec<FileDependencies> {
        let mut deps = database.file_dependencies.clone();
        deps.sort_by(|a, b| a.path.cmp(&b.path));
        deps
    }

    #[test]
    fn set_commands_orders_dependencies_first() {
        let mut database = Database::new();
        database
            .set_commands(vec![
                entry("link", &["/b/one.o", "/b/two.o"], &["/b/prog"]),
                entry("cc one", &["/s/one.c"], &["/b/one.o"]),
                entry("cc two", &["/s/two.c"], &["/b/two.o"]),
            ])
            .unwrap();

        // Dependencies strictly precede dependents.
        for (index, dependencies) in database.command_dependencies.iter().enumerate() {
            for dependency in dependencies {
                assert!((*dependency as usize) < index);
            }
        }
        assert_eq!(database.commands[2].command, "link");
        assert_eq!(database.command_dependencies[2].len(), 2);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut database = Database::new();
        let result = database.set_commands(vec![
            entry("a", &["/t/y"], &["/t/x"]),
            entry("b", &["/t/x"], &["/t/y"]),
        ]);
        match result {
            Err(DatabaseError::InvalidDependency { .. }) => {}
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_output_is_rejected() {
        let mut database = Database::new();
        let result = database.set_commands(vec![
            entry("a", &[], &["/t/out"]),
            entry("b", &[], &["/t/out"]),
        ]);
        match result {
            Err(DatabaseError::DuplicateOutput { .. }) => {}
            other => panic!("expected duplicate output error, got {:?}", other),
        }
    }

    #[test]
    fn signatures_survive_reconfigure_with_equal_commands() {
        let mut database = Database::new();
        database.set_commands(vec![entry("cc", &["/s/a.c"], &["/b/a.o"])]).unwrap();
        let signature = command_signature(&database.commands[0]);
        database.command_signatures[0] = signature;

        // Same command again, plus an unrelated newcomer.
        database
            .set_commands(vec![
                entry("cc", &["/s/a.c"], &["/b/a.o"]),
                entry("new", &["/s/b.c"], &["/b/b.o"]),
            ])
            .unwrap();

        let position = database.commands.iter().position(|c| c.command == "cc").unwrap();
        assert_eq!(database.command_signatures[position], signature);
        let position = database.commands.iter().position(|c| c.command == "new").unwrap();
        assert_eq!(database.command_signatures[position], EMPTY_SIGNATURE);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join(".build_db");

        let mut database = Database::new();
        let mut command = entry("cc main", &["/s/main.c"], &["/b/main.o"]);
        command.working_directory = PathBuf::from("/s");
        command.rsp_file = Some(PathBuf::from("/b/main.rsp"));
        command.rsp_contents = "-O2 -Wall".to_string();
        command.dep_file =
            Some(DepFile { path: PathBuf::from("/b/main.d"), format: DepFileFormat::Gcc });
        database
            .set_commands(vec![command, entry("link", &["/b/main.o"], &["/b/main"])])
            .unwrap();
        database.command_signatures[0] = command_signature(&database.commands[0]);

        database.save(&base).unwrap();

        let mut loaded = Database::new();
        assert!(loaded.load(&base));
        assert_eq!(loaded.commands, database.commands);
        assert_eq!(loaded.command_dependencies, database.command_dependencies);
        assert_eq!(loaded.command_signatures, database.command_signatures);
        assert_eq!(loaded.dep_file_signatures, database.dep_file_signatures);
        assert_eq!(sorted_deps(&loaded), sorted_deps(&database));
    }

    #[test]
    fn corrupt_database_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join(".build_db");
        fs::write(sidecar(&base, ".commands"), b"not a database at all").unwrap();

        let mut database = Database::new();
        assert!(!database.load(&base));
        assert!(database.commands.is_empty());
    }

    #[test]
    fn missing_deps_file_rebuilds_index() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join(".build_db");

        let mut database = Database::new();
        database.set_commands(vec![entry("cc", &["/s/a.c"], &["/b/a.o"])]).unwrap();
        database.save(&base).unwrap();
        fs::remove_file(sidecar(&base, ".deps")).unwrap();

        let mut loaded = Database::new();
        assert!(loaded.load(&base));
        assert_eq!(loaded.file_dependencies.len(), 1);
        assert_eq!(loaded.file_dependencies[0].path, PathBuf::from("/s/a.c"));
    }

    #[test]
    fn phony_inputs_track_their_producers() {
        let mut database = Database::new();
        let mut phony = CommandEntry::default();
        phony.description = "group".to_string();
        phony.inputs = vec![PathBuf::from("/b/a.o")];
        database
            .set_commands(vec![entry("cc", &["/s/a.c"], &["/b/a.o"]), phony])
            .unwrap();

        // The produced path is not in the file index; the source is.
        assert!(database.file_dependencies.iter().all(|d| d.path != PathBuf::from("/b/a.o")));
        assert!(database.file_dependencies.iter().any(|d| d.path == PathBuf::from("/s/a.c")));
    }
}
