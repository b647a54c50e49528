//! The `Console` capability: a stand-in for the user-interface abstraction
//! this crate's scope statement places outside the core (§1, §4.9). The
//! core never blocks on it; it exists so protocol application code sharing
//! a [`crate::node::ProtocolNode`] has somewhere to ask a human a question.

use std::fmt::Debug;

/// A minimal user-interaction capability.
pub trait Console: Debug + Send + Sync {
    fn print(&self, message: &str);
    fn ask_yes_no(&self, prompt: &str) -> bool;
    fn ask_string(&self, prompt: &str) -> String;
    fn ask_choice(&self, prompt: &str, choices: &[String]) -> usize;
}

/// A [`Console`] that logs everything through `tracing` and never actually
/// prompts: every `ask_*` call returns a fixed default. Suitable for
/// headless runs and as the Supervisor's default when no interactive
/// console is wired in.
#[derive(Debug, Default)]
pub struct SilentConsole;

impl Console for SilentConsole {
    fn print(&self, message: &str) {
        tracing::info!(%message, "console message");
    }

    fn ask_yes_no(&self, prompt: &str) -> bool {
        tracing::debug!(%prompt, "ask_yes_no answered with default (false) by SilentConsole");
        false
    }

    fn ask_string(&self, prompt: &str) -> String {
        tracing::debug!(%prompt, "ask_string answered with empty string by SilentConsole");
        String::new()
    }

    fn ask_choice(&self, prompt: &str, choices: &[String]) -> usize {
        tracing::debug!(%prompt, ?choices, "ask_choice answered with index 0 by SilentConsole");
        0
    }
}
