//! Process-wide interrupt flag.
//!
//! The first ctrl-c asks the executor to drain: no new commands are admitted
//! and in-flight children run to completion. A second ctrl-c exits
//! immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use log::warn;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

pub fn install_handlers() {
    INSTALL.call_once(|| {
        let result = ctrlc::set_handler(|| {
            if INTERRUPTED.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
            eprintln!("\nInterrupted, waiting for running commands. (ctrl-c again to abort)");
        });
        if let Err(cause) = result {
            warn!("failed to install interrupt handler: {}", cause);
        }
    });
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}
