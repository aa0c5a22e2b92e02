//! Locating the external build toolchain
//!
//! Commands come from the config as argv lists. The first element is either a
//! path (absolute or containing a separator) or a program name looked up on
//! `PATH` through `which`.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

#[derive(Debug, Clone)]
pub enum ToolchainError {
    /// The configured command list was empty where a program is required
    EmptyCommand,
    /// The program could not be found on PATH or at the given location
    ProgramNotFound(String),
}

impl std::fmt::Display for ToolchainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolchainError::EmptyCommand => write!(f, "Toolchain command is empty"),
            ToolchainError::ProgramNotFound(program) => {
                write!(f, "Toolchain program '{}' not found on PATH", program)
            }
        }
    }
}

impl std::error::Error for ToolchainError {}

/// A toolchain invocation with its program already located
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ToolchainCommand {
    /// Locate the program of an argv list.
    pub fn from_argv(argv: &[String]) -> Result<Self, ToolchainError> {
        let (program, args) = argv.split_first().ok_or(ToolchainError::EmptyCommand)?;
        Ok(ToolchainCommand {
            program: resolve_program(program)?,
            args: args.to_vec(),
        })
    }

    /// Like [`ToolchainCommand::from_argv`] but an empty list means "no step".
    pub fn optional(argv: &[String]) -> Result<Option<Self>, ToolchainError> {
        if argv.is_empty() {
            return Ok(None);
        }
        Self::from_argv(argv).map(Some)
    }

    /// Human readable form for log lines
    pub fn display(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Resolve a program name or path to an executable location
pub fn resolve_program(program: &str) -> Result<PathBuf, ToolchainError> {
    if program.is_empty() {
        return Err(ToolchainError::EmptyCommand);
    }

    if looks_like_path(program) {
        let path = Path::new(program);
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(ToolchainError::ProgramNotFound(program.to_string()))
        };
    }

    which::which(program).map_err(|e| {
        tracing::debug!(program, error = %e, "Toolchain lookup failed");
        ToolchainError::ProgramNotFound(program.to_string())
    })
}

fn looks_like_path(program: &str) -> bool {
    program.contains(MAIN_SEPARATOR) || program.contains('/') || Path::new(program).is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    #[cfg(not(windows))]
    fn test_resolve_sh_on_path() {
        let result = resolve_program("sh");
        assert!(result.is_ok_and(|p| p.ends_with("sh")));
    }

    #[test]
    fn test_missing_program() {
        let result = resolve_program("quantlab-no-such-toolchain-12345");
        assert!(matches!(result, Err(ToolchainError::ProgramNotFound(_))));
    }

    #[test]
    fn test_explicit_path() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let script = temp.path().join("build.sh");
        fs::write(&script, "#!/bin/sh\n")?;

        let cmd = ToolchainCommand::from_argv(&[script.to_string_lossy().to_string()])?;
        assert_eq!(cmd.program, script);
        assert!(cmd.args.is_empty());

        let missing = temp.path().join("absent.sh");
        assert!(resolve_program(&missing.to_string_lossy()).is_err());
        Ok(())
    }

    #[test]
    fn test_optional_empty_command() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(ToolchainCommand::optional(&[])?, None);
        assert!(matches!(
            ToolchainCommand::from_argv(&[]),
            Err(ToolchainError::EmptyCommand)
        ));
        Ok(())
    }

    #[test]
    #[cfg(not(windows))]
    fn test_display_joins_args() -> Result<(), Box<dyn std::error::Error>> {
        let cmd = ToolchainCommand::from_argv(&argv(&["sh", "-c", "true"]))?;
        assert!(cmd.display().ends_with("sh -c true"));
        Ok(())
    }
}
