//! Command-line surface.
//!
//! Deliberately small: one positional action, free-standing target names,
//! and a handful of `--key=value` options. The full argument list is kept
//! around verbatim because the self-rebuild driver re-invokes the freshly
//! built binary with it.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::paths;
use crate::ConfigurationCrate;

pub const INTERNAL_RESTART_FLAG: &str = "--internal-restart";

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ArgumentError(pub String);

/// Everything parsed from one invocation.
pub struct Context {
    /// Directory the user invoked us from; targets resolve against it.
    pub start_path: PathBuf,
    pub invocation: String,
    /// Original arguments minus the internal restart marker.
    pub all_arguments: Vec<String>,
    pub action: Option<String>,
    pub targets: Vec<String>,
    /// Where build artifacts and the build database live.
    pub build_path: PathBuf,
    /// Where the self-rebuild state lives.
    pub cache_path: PathBuf,
    pub no_self_update: bool,
    pub verbose: bool,
    pub internal_restart: bool,
    pub query_projects: bool,
    /// Root of the configuration crate, baked in by `wilco_main!`.
    pub manifest_dir: PathBuf,
    /// Configuration crate package name; also its binary name.
    pub package: String,
}

impl Context {
    pub fn from_env(info: &ConfigurationCrate) -> Result<Context, ArgumentError> {
        let start_path = env::current_dir().unwrap_or_default();
        let mut args = env::args();
        let invocation = args.next().unwrap_or_default();
        Context::new(info, start_path, invocation, args.collect())
    }

    pub fn new(
        info: &ConfigurationCrate,
        start_path: PathBuf,
        invocation: String,
        arguments: Vec<String>,
    ) -> Result<Context, ArgumentError> {
        let manifest_dir = PathBuf::from(info.manifest_dir);

        let mut context = Context {
            start_path,
            invocation,
            all_arguments: Vec::new(),
            action: None,
            targets: Vec::new(),
            build_path: PathBuf::new(),
            cache_path: PathBuf::new(),
            no_self_update: false,
            verbose: false,
            internal_restart: false,
            query_projects: false,
            manifest_dir: manifest_dir.clone(),
            package: info.package.to_string(),
        };

        let mut build_path = PathBuf::from("buildfiles");
        let mut cache_path = PathBuf::from(".wilcofiles");

        for argument in arguments {
            if argument == INTERNAL_RESTART_FLAG {
                context.internal_restart = true;
                continue;
            }
            context.all_arguments.push(argument.clone());

            if let Some(value) = option_value(&argument, "--build-path")? {
                build_path = PathBuf::from(value);
            } else if let Some(value) = option_value(&argument, "--wilco-cache-path")? {
                cache_path = PathBuf::from(value);
            } else if argument == "--no-self-update" {
                context.no_self_update = true;
            } else if argument == "--verbose" {
                context.verbose = true;
            } else if argument == "--projects" {
                context.query_projects = true;
            } else if argument.starts_with("--") {
                return Err(ArgumentError(format!("Unknown option \"{}\"", argument)));
            } else if context.action.is_none() {
                context.action = Some(argument);
            } else {
                context.targets.push(argument);
            }
        }

        context.build_path = paths::absolute(&build_path, &manifest_dir);
        context.cache_path = paths::absolute(&cache_path, &manifest_dir);

        Ok(context)
    }

    /// The arguments relevant to configuration output: options only, since
    /// the action and targets select work without changing it.
    pub fn config_arguments(&self) -> Vec<String> {
        self.all_arguments.iter().filter(|arg| arg.starts_with("--")).cloned().collect()
    }
}

fn option_value<'a>(argument: &'a str, trigger: &str) -> Result<Option<&'a str>, ArgumentError> {
    if !argument.starts_with(trigger) {
        return Ok(None);
    }
    let rest = &argument[trigger.len()..];
    if rest.is_empty() {
        return Err(ArgumentError(format!("Expected value for option '{}'.", trigger)));
    }
    if !rest.starts_with('=') {
        return Ok(None);
    }
    Ok(Some(&rest[1..]))
}

pub fn usage(invocation: &str) -> String {
    let mut usage = format!("Usage: {} [action] [options]\n\nAvailable actions:\n\n", invocation);
    for (action, description) in &[
        ("build [targets]", "Build output binaries. [default: all targets]"),
        ("configure", "Run the configuration program and rewrite the build database."),
        ("clean", "Clean build outputs."),
        ("query --projects", "List the configured projects."),
    ] {
        usage += &format!("{:<32}  {}\n", action, description);
    }
    usage += "\nOptions:\n";
    for (option, description) in &[
        ("--build-path=<dir>", "Build output path. [default: \"buildfiles\"]"),
        ("--wilco-cache-path=<dir>", "Self-build cache path. [default: \".wilcofiles\"]"),
        ("--no-self-update", "Skip rebuilding the configuration program."),
        ("--verbose", "Echo executed command lines."),
    ] {
        usage += &format!("  {:<30}  {}\n", option, description);
    }
    usage
}

/// Quotes an argument for round-tripping through the shell.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value)
}

pub fn quote_path(value: &Path) -> String {
    format!("\"{}\"", value.display())
}
