//! Reference configuration program.
//!
//! Real users write this file in their own crate; this one exists so the
//! repository builds a working binary to poke at. It declares a single
//! command project that snapshots the manifest into the build directory.

use std::path::Path;

use wilco::commands;
use wilco::{Environment, ProjectKind};

fn configure(env: &mut Environment) {
    let project = env.create_project("snapshot", ProjectKind::Command);
    project.commands.push(commands::copy(
        Path::new("Cargo.toml"),
        Path::new("buildfiles/snapshot/Cargo.toml"),
    ));
}

wilco::wilco_main!(configure);
