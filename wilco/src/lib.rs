//! Self-hosting build orchestrator.
//!
//! Users describe their build in a small Rust binary crate - the
//! configuration program - that links this library and hands a `configure`
//! function to [`wilco_main!`]. Invoking that binary first brings the binary
//! itself up to date against its sources (the self-rebuild protocol), then
//! runs the configuration to produce a command graph, and finally executes
//! the graph incrementally and in parallel, tracking state in an on-disk
//! build database.

#![warn(rust_2018_idioms)]

use std::collections::BTreeSet;
use std::env;

use anyhow::{Context as _, Result};

pub mod actions;
pub mod build;
pub mod cli;
pub mod commands;
pub mod configurator;
pub mod environment;
pub mod interrupt;
pub mod paths;
pub mod process;
pub mod selfbuild;

pub use crate::environment::{collect_commands, Environment, Project, ProjectKind};

/// The user-supplied configuration entry point.
pub type Configure = fn(&mut Environment);

/// Compile-time facts about the configuration crate, baked in by
/// [`wilco_main!`]. The self-rebuild driver needs them to know what to
/// rebuild and how.
#[derive(Clone, Copy, Debug)]
pub struct ConfigurationCrate {
    pub manifest_dir: &'static str,
    pub package: &'static str,
}

/// Library `main`: argument parsing, self-rebuild, action dispatch.
/// Returns the process exit code.
pub fn run_main(info: ConfigurationCrate, configure: Configure) -> i32 {
    env_logger::init();
    interrupt::install_handlers();

    let ctx = match cli::Context::from_env(&info) {
        Ok(ctx) => ctx,
        Err(cause) => {
            let invocation = env::args().next().unwrap_or_else(|| "wilco".to_string());
            print!("{}", cli::usage(&invocation));
            eprintln!("ERROR: {}", cause);
            return 1;
        }
    };

    match run_inner(&ctx, configure) {
        Ok(()) => 0,
        Err(cause) => {
            if cause.is::<cli::ArgumentError>() {
                print!("{}", cli::usage(&ctx.invocation));
            }
            eprintln!("ERROR: {}", cause);
            1
        }
    }
}

fn run_inner(ctx: &cli::Context, configure: Configure) -> Result<()> {
    let self_dependencies = if ctx.no_self_update {
        BTreeSet::new()
    } else {
        // May re-exec the freshly built binary and never return.
        selfbuild::build_self(ctx)?
    };

    // Configuration programs resolve relative paths against their own crate.
    env::set_current_dir(&ctx.manifest_dir)
        .with_context(|| format!("failed to enter {}", ctx.manifest_dir.display()))?;

    actions::dispatch(ctx, configure, self_dependencies)
}

/// Expands to `fn main()` for a configuration program:
///
/// ```ignore
/// fn configure(env: &mut wilco::Environment) { /* ... */ }
/// wilco::wilco_main!(configure);
/// ```
#[macro_export]
macro_rules! wilco_main {
    ($configure:path) => {
        fn main() {
            let info = $crate::ConfigurationCrate {
                manifest_dir: env!("CARGO_MANIFEST_DIR"),
                package: env!("CARGO_PKG_NAME"),
            };
            ::std::process::exit($crate::run_main(info, $configure));
        }
    };
}
