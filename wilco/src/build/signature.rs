//! 128-bit signatures over files, directories and command payloads.
//!
//! A signature is an MD5 digest; the all-zero value is the `EMPTY_SIGNATURE`
//! sentinel meaning "unknown, must (re)build". File signatures hash the mtime
//! rather than contents, which keeps the dirty scan at stat speed.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::commands::CommandEntry;

pub type Signature = [u8; 16];

pub const EMPTY_SIGNATURE: Signature = [0; 16];

/// Signatures for a path observed as a file and as a directory.
///
/// For plain files only `file` is meaningful. For directories `file` hashes
/// the directory entry's own mtime and `dir` hashes the child listing, so an
/// unchanged mtime short-circuits the listing scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignaturePair {
    pub file: Signature,
    pub dir: Signature,
}

/// MD5 of a raw byte buffer (depfile contents, mostly).
pub fn content_signature(data: &[u8]) -> Signature {
    md5::compute(data).0
}

/// Hashes the mtime of `path`, or EMPTY when it cannot be stat'ed.
pub fn file_signature(path: &Path) -> Signature {
    let mtime = match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(mtime) => mtime,
        Err(_) => return EMPTY_SIGNATURE,
    };
    let since_epoch = mtime.duration_since(UNIX_EPOCH).unwrap_or_default();

    let mut context = md5::Context::new();
    context.consume(&since_epoch.as_secs().to_le_bytes());
    context.consume(&since_epoch.subsec_nanos().to_le_bytes());
    context.compute().0
}

/// Hashes the immediate child listing of `path` in the order the OS returns
/// it, or EMPTY when `path` is not a listable directory.
pub fn directory_signature(path: &Path) -> Signature {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => return EMPTY_SIGNATURE,
    };

    let mut context = md5::Context::new();
    for entry in entries {
        match entry {
            Ok(entry) => context.consume(entry.path().to_string_lossy().as_bytes()),
            Err(_) => return EMPTY_SIGNATURE,
        }
    }
    context.compute().0
}

/// Updates the signature pair for a path, returning true if it changed.
/// The path may be a file or a directory.
pub fn update_path_signature(pair: &mut SignaturePair, path: &Path) -> bool {
    let signature = file_signature(path);
    if signature == EMPTY_SIGNATURE {
        pair.file = EMPTY_SIGNATURE;
        pair.dir = EMPTY_SIGNATURE;
        return true;
    }

    // An unchanged entry signature covers directories too; the listing only
    // needs a rescan when the directory itself was touched.
    if signature == pair.file {
        return false;
    }
    pair.file = signature;

    let signature = directory_signature(path);
    if signature != EMPTY_SIGNATURE && pair.dir == signature {
        return false;
    }

    // Updated even when this wasn't a directory, in case the path changed
    // from a directory to a file.
    pair.dir = signature;
    true
}

/// Signature of what a command *does*: the command line, response file
/// contents, and input/output paths. Working directory, depfile path and
/// description do not affect what the command produces and are excluded.
pub fn command_signature(command: &CommandEntry) -> Signature {
    let mut context = md5::Context::new();
    context.consume(command.command.as_bytes());
    context.consume(command.rsp_contents.as_bytes());
    for input in &command.inputs {
        context.consume(input.to_string_lossy().as_bytes());
    }
    for output in &command.outputs {
        context.consume(output.to_string_lossy().as_bytes());
    }
    context.compute().0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::PathBuf;

    fn entry(command: &str, rsp: &str, inputs: &[&str], outputs: &[&str]) -> CommandEntry {
        let mut result = CommandEntry::default();
        result.command = command.to_string();
        result.rsp_contents = rsp.to_string();
        result.inputs = inputs.iter().map(|p| PathBuf::from(*p)).collect();
        result.outputs = outputs.iter().map(|p| PathBuf::from(*p)).collect();
        result
    }

    #[test]
    fn command_signature_covers_payload_fields_only() {
        let base = entry("cc -c a.c", "", &["/a.c"], &["/a.o"]);

        let mut same = base.clone();
        same.description = "different label".to_string();
        same.working_directory = PathBuf::from("/elsewhere");
        assert_eq!(command_signature(&base), command_signature(&same));

        let mut changed = base.clone();
        changed.command = "cc -c -O2 a.c".to_string();
        assert_ne!(command_signature(&base), command_signature(&changed));

        let mut changed = base.clone();
        changed.rsp_contents = "-O2".to_string();
        assert_ne!(command_signature(&base), command_signature(&changed));

        let mut changed = base.clone();
        changed.inputs = vec![PathBuf::from("/b.c")];
        assert_ne!(command_signature(&base), command_signature(&changed));

        let mut changed = base.clone();
        changed.outputs = vec![PathBuf::from("/b.o")];
        assert_ne!(command_signature(&base), command_signature(&changed));
    }

    #[test]
    fn missing_path_resets_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        File::create(&path).unwrap();

        let mut pair = SignaturePair::default();
        assert!(update_path_signature(&mut pair, &path));
        assert_ne!(pair.file, EMPTY_SIGNATURE);
        assert!(!update_path_signature(&mut pair, &path));

        fs::remove_file(&path).unwrap();
        assert!(update_path_signature(&mut pair, &path));
        assert_eq!(pair.file, EMPTY_SIGNATURE);
        assert_eq!(pair.dir, EMPTY_SIGNATURE);
    }

    #[test]
    fn directory_listing_change_is_detected() {
        let dir = tempfile::tempdir().unwrap();

        let mut pair = SignaturePair::default();
        assert!(update_path_signature(&mut pair, dir.path()));
        assert_ne!(pair.dir, EMPTY_SIGNATURE);

        // Let the directory mtime tick past filesystem timestamp granularity.
        std::thread::sleep(std::time::Duration::from_millis(20));
        File::create(dir.path().join("new-child")).unwrap();
        assert!(update_path_signature(&mut pair, dir.path()));
    }
}
