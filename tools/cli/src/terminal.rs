//! Terminal collaborators: prompting, `$EDITOR` capture and shell output.

use std::io::{self, BufRead, Write};
use std::process::Command;

use tracing::debug;
use zeroize::Zeroizing;

use credvault_common::{Error, RecordKey, Result};
use credvault_credentials::Prompter;
use credvault_vault::Editor;

/// Reads field values from stdin and secrets without echo.
///
/// Prompts go to stderr so stdout stays clean for `env` output.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn field(&mut self, label: &str) -> Result<String> {
        eprint!("{}: ", label);
        io::stderr().flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(Error::Prompt(format!("no input for '{}'", label)));
        }
        Ok(line.trim().to_string())
    }

    fn secret(&mut self, label: &str) -> Result<Zeroizing<String>> {
        rpassword::prompt_password(format!("{}: ", label))
            .map(Zeroizing::new)
            .map_err(|e| Error::Prompt(format!("could not read '{}': {}", label, e)))
    }

    fn passphrase(&mut self, key_path: &str) -> Result<Zeroizing<Vec<u8>>> {
        rpassword::prompt_password(format!("Enter Password for '{}': ", key_path))
            .map(|p| Zeroizing::new(p.into_bytes()))
            .map_err(|e| Error::Prompt(format!("could not read passphrase: {}", e)))
    }
}

/// Opens plaintext in the user's editor through a private temp file.
pub struct ExternalEditor {
    command: String,
}

impl ExternalEditor {
    /// Use `$EDITOR`, falling back to `vi`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string()))
    }

    /// Use `command`; extra words are passed as leading arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Editor for ExternalEditor {
    fn edit(&mut self, key: &RecordKey, contents: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let mut words = self.command.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| Error::InvalidInput("EDITOR is empty".to_string()))?;

        // Created with mode 0600 and removed on drop.
        let mut file = tempfile::Builder::new()
            .prefix(".credvault-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(contents)?;
        file.flush()?;

        debug!(record = %key, editor = %program, "Opening editor");
        let status = Command::new(program)
            .args(words)
            .arg(file.path())
            .status()
            .map_err(|e| Error::Prompt(format!("Failed to open editor '{}': {}", program, e)))?;
        if !status.success() {
            return Err(Error::Prompt(format!(
                "Editor '{}' exited with {}",
                program, status
            )));
        }

        let edited = Zeroizing::new(std::fs::read(file.path())?);
        std::fs::write(file.path(), vec![0u8; edited.len()])?;
        Ok(edited)
    }
}

/// Single-quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
