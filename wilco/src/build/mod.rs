//! The incremental build engine.
//!
//! Everything that turns a command graph into a correct, minimal, parallel
//! rebuild lives here: the persistent [`Database`], the signature
//! primitives, the depfile parsers, the dirtiness analyzer and the executor.

pub mod database;
pub mod depfile;
pub mod dirty;
pub mod exec;
pub mod signature;

pub use self::database::{CommandId, Database, DatabaseError, FileDependencies};
pub use self::dirty::filter_commands;
pub use self::exec::run_commands;
pub use self::signature::{Signature, SignaturePair, EMPTY_SIGNATURE};
