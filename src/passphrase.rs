//! Backup password sources

use crate::error::{BackupError, ErrorCategory, ErrorKind, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

const DEFAULT_PROMPT: &str = "Backup password (arrvault): ";
const CONFIRM_PROMPT: &str = "Confirm backup password (arrvault): ";

/// Trait for reading backup passwords from various sources
pub trait PassphraseReader {
    /// Read a passphrase as raw bytes
    ///
    /// Returns the passphrase wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Read a passphrase from `reader` and check that it is valid UTF-8.
///
/// Backup passwords are text: the length policy counts characters.
pub fn read_password(reader: &mut dyn PassphraseReader) -> Result<Zeroizing<String>> {
    let bytes = reader.read_passphrase()?;
    std::str::from_utf8(&bytes)
        .map(|text| Zeroizing::new(text.to_owned()))
        .map_err(|_| {
            BackupError::new(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "password is not valid UTF-8",
            )
        })
}

/// Returns a fixed passphrase (for testing)
pub struct ConstantPassphraseReader {
    passphrase: Zeroizing<Vec<u8>>,
}

impl ConstantPassphraseReader {
    pub fn new(passphrase: Vec<u8>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new((*self.passphrase).clone()))
    }
}

/// Reads passphrase from any io::Read source
///
/// A single trailing line ending is stripped, so `echo "$PASSWORD" |` works.
pub struct ReaderPassphraseReader {
    reader: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            BackupError::io(
                ErrorCategory::Internal,
                format!("error reading passphrase: {}", e),
                e,
            )
        })?;
        if data.ends_with(b"\n") {
            data.pop();
            if data.ends_with(b"\r") {
                data.pop();
            }
        }
        Ok(data)
    }
}

/// Reads passphrase from terminal with no echo
pub struct TerminalPassphraseReader {
    prompt: &'static str,
}

impl TerminalPassphraseReader {
    pub fn new() -> Self {
        Self::with_prompt(DEFAULT_PROMPT)
    }

    pub fn with_prompt(prompt: &'static str) -> Self {
        Self { prompt }
    }
}

impl Default for TerminalPassphraseReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(BackupError::new(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read password from terminal - stdin is not a terminal; use --passphrase-stdin",
            ));
        }

        let mut stderr = io::stderr();
        stderr
            .write_all(self.prompt.as_bytes())
            .and_then(|()| stderr.flush())
            .map_err(|e| {
                BackupError::io(
                    ErrorCategory::Internal,
                    format!("failed to write prompt: {}", e),
                    e,
                )
            })?;

        // rpassword hands back a plain String; move it straight into a zeroizing buffer.
        let passphrase = rpassword::read_password().map_err(|e| {
            BackupError::with_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading password: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(passphrase.into_bytes()))
    }
}

/// Reads a passphrase twice and insists both entries match
///
/// Used for exports, where a typo would otherwise produce a backup nobody can open.
pub struct ConfirmingPassphraseReader {
    first: Box<dyn PassphraseReader>,
    confirm: Box<dyn PassphraseReader>,
}

impl ConfirmingPassphraseReader {
    pub fn new(first: Box<dyn PassphraseReader>, confirm: Box<dyn PassphraseReader>) -> Self {
        Self { first, confirm }
    }

    /// Prompt on the terminal, then prompt again for confirmation.
    pub fn terminal() -> Self {
        Self::new(
            Box::new(TerminalPassphraseReader::new()),
            Box::new(TerminalPassphraseReader::with_prompt(CONFIRM_PROMPT)),
        )
    }
}

impl PassphraseReader for ConfirmingPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let passphrase = self.first.read_passphrase()?;
        let confirmation = self.confirm.read_passphrase()?;
        if *passphrase != *confirmation {
            return Err(BackupError::new(
                ErrorCategory::User,
                ErrorKind::PassphraseMismatch,
                "passwords do not match",
            ));
        }
        Ok(passphrase)
    }
}
