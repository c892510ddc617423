//! Whitelist-based command validation and shell-metacharacter rejection.
//!
//! TeamDesk shells out for a handful of diagnostics (process listing,
//! termination of stuck helpers). Only executables on a fixed per-OS
//! whitelist may run, and no argument may carry shell metacharacters. Even
//! though `std::process::Command` never invokes a shell, the scan is kept as
//! a defense-in-depth measure against accidental `sh -c` usage.

use std::io;
use std::process::{Command, Output};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command vector failed validation: {0}")]
    Rejected(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Executables TeamDesk may launch on Unix-like hosts.
pub const UNIX_ALLOWED: &[&str] = &["ls", "ps", "kill", "cat", "echo", "pwd"];

/// Executables TeamDesk may launch on Windows hosts.
pub const WINDOWS_ALLOWED: &[&str] = &["tasklist", "taskkill", "where", "echo", "hostname"];

/// Characters that are stripped by [`sanitize_arg`] and fail [`validate`]
/// outright. Separators, redirection, and substitution are handled separately
/// because those are never stripped, only rejected.
const STRIPPABLE_SPECIALS: &[char] =
    &['$', '(', ')', '{', '}', '[', ']', '\\', '"', '\'', '`'];

/// Host flavor used to select the executable whitelist. Split out from
/// `cfg!` so both lists stay testable on any development machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Unix,
    Windows,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    pub fn allowed_executables(self) -> &'static [&'static str] {
        match self {
            Self::Unix => UNIX_ALLOWED,
            Self::Windows => WINDOWS_ALLOWED,
        }
    }
}

/// True if the argument contains a command separator, redirection, or
/// command-substitution pattern. These are grounds for outright rejection:
/// stripping them would turn an injection attempt into a different command
/// instead of refusing it.
fn has_injection_pattern(arg: &str) -> bool {
    arg.contains(';')
        || arg.contains('|')
        || arg.contains('&')
        || arg.contains('<')
        || arg.contains('>')
        || arg.contains('`')
        || arg.contains("$(")
}

/// True if the argument contains any remaining shell-special or control
/// character.
fn has_special_chars(arg: &str) -> bool {
    arg.chars()
        .any(|c| c.is_control() || STRIPPABLE_SPECIALS.contains(&c))
}

/// Validate a full command vector against the whitelist for `os`.
///
/// The executable must be a bare whitelisted name (a path is not a name and
/// fails), and every argument must be free of separators, redirection,
/// substitution, and shell-special characters. One hit fails the whole
/// vector; there is no sanitize-and-retry path for the executable itself.
pub fn validate_on<S: AsRef<str>>(os: HostOs, argv: &[S]) -> bool {
    let Some((executable, args)) = argv.split_first() else {
        return false;
    };

    let executable = executable.as_ref();
    let whitelisted = os
        .allowed_executables()
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(executable));
    if !whitelisted {
        warn!(executable, "Rejected non-whitelisted executable");
        return false;
    }

    for arg in args {
        let arg = arg.as_ref();
        if has_injection_pattern(arg) || has_special_chars(arg) {
            warn!(executable, "Rejected argument with shell metacharacters");
            return false;
        }
    }
    true
}

/// Validate a command vector against the current host's whitelist.
pub fn validate<S: AsRef<str>>(argv: &[S]) -> bool {
    validate_on(HostOs::current(), argv)
}

/// Strip shell-special characters from a single argument.
///
/// Separator, redirection, and substitution patterns are not stripped: their
/// presence means the argument was built to inject, and a partially cleaned
/// injection must never run, so the function refuses with `None`.
pub fn sanitize_arg(arg: &str) -> Option<String> {
    if has_injection_pattern(arg) {
        warn!("Refusing to sanitize argument with injection pattern");
        return None;
    }
    Some(
        arg.chars()
            .filter(|c| !c.is_control() && !STRIPPABLE_SPECIALS.contains(c))
            .collect(),
    )
}

/// A validated command, constructed immediately before launch and consumed
/// once. The launcher always passes an explicit argument array; no shell is
/// ever given a concatenated command string to interpret.
#[derive(Debug)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    /// Build a spec from an executable name and arguments, validating the
    /// whole vector against the current host's whitelist.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, CommandError> {
        let program = program.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(program.clone());
        argv.extend(args.iter().cloned());
        if !validate(&argv) {
            return Err(CommandError::Rejected(program));
        }

        Ok(Self { program, args })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Launch the validated command and wait for it to finish.
    pub fn launch(self) -> Result<Output, CommandError> {
        debug!(program = %self.program, "Launching whitelisted command");
        let output = Command::new(&self.program).args(&self.args).output()?;
        Ok(output)
    }
}
