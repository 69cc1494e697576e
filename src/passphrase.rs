//! Passphrase reading and strength policy

use crate::error::{ErrorCategory, ErrorKind, FencError, Result};
use std::env;
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Environment variable consulted when no other passphrase source is given.
pub const DEFAULT_PASSPHRASE_ENV: &str = "FENC_KEY_PHRASE";

/// Trait for reading passphrases from various sources
pub trait PassphraseReader {
    /// Read a passphrase as arbitrary bytes (not necessarily UTF-8)
    ///
    /// Returns the passphrase wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Returns a fixed passphrase (for testing, or a value given on the command line)
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
/// Everything up to end of input is the passphrase, minus one trailing
/// line ending (`\n` or `\r\n`) so that `echo secret | fenc ...` works.
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
            FencError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading passphrase: {}", e),
                e,
            )
        })?;
        if data.last() == Some(&b'\n') {
            data.pop();
            if data.last() == Some(&b'\r') {
                data.pop();
            }
        }
        Ok(data)
    }
}

/// Reads the passphrase from an environment variable
pub struct EnvPassphraseReader {
    var: String,
}

impl EnvPassphraseReader {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl PassphraseReader for EnvPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        match env::var_os(&self.var) {
            Some(value) if !value.is_empty() => {
                Ok(Zeroizing::new(value.into_encoded_bytes()))
            }
            _ => Err(FencError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                format!(
                    "environment variable {} for key phrase is not defined or has no value",
                    self.var
                ),
            )),
        }
    }
}

/// Reads passphrase from terminal with no echo
pub struct TerminalPassphraseReader {
    prompt: &'static str,
}

impl TerminalPassphraseReader {
    pub fn new() -> Self {
        Self::with_prompt("Enter key phrase: ")
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
    /// Read passphrase from terminal.
    ///
    /// Note: Terminal input is limited to UTF-8 due to rpassword library constraints.
    /// For non-UTF-8 passphrases, use --passphrase-stdin instead.
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(FencError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read passphrase from terminal - stdin is not a terminal",
            ));
        }

        io::stderr()
            .write_all(self.prompt.as_bytes())
            .map_err(|e| {
                FencError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    format!("failed to write prompt: {}", e),
                    e,
                )
            })?;
        io::stderr().flush().map_err(|e| {
            FencError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to flush prompt: {}", e),
                e,
            )
        })?;

        // Read password *without echo*
        // Note: rpassword returns String (UTF-8 only), not zeroized
        let passphrase = rpassword::read_password().map_err(|e| {
            FencError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading passphrase: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(passphrase.into_bytes()))
    }
}

/// Asks twice and insists on the same answer
///
/// Used when encrypting from an interactive prompt, where a typo would
/// otherwise lock the data away under an unknown passphrase.
pub struct ConfirmingPassphraseReader {
    first: Box<dyn PassphraseReader>,
    second: Box<dyn PassphraseReader>,
}

impl ConfirmingPassphraseReader {
    pub fn new(first: Box<dyn PassphraseReader>, second: Box<dyn PassphraseReader>) -> Self {
        Self { first, second }
    }

    /// Prompt on the terminal, then prompt again to confirm.
    pub fn terminal() -> Self {
        Self::new(
            Box::new(TerminalPassphraseReader::new()),
            Box::new(TerminalPassphraseReader::with_prompt(
                "Enter key phrase again: ",
            )),
        )
    }
}

impl PassphraseReader for ConfirmingPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let passphrase = self.first.read_passphrase()?;
        let again = self.second.read_passphrase()?;
        if *passphrase != *again {
            return Err(FencError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "key phrases do not match",
            ));
        }
        Ok(passphrase)
    }
}

/// Minimum number of characters in an acceptable passphrase.
pub const MIN_PASSPHRASE_CHARS: usize = 6;

/// Reject passphrases that are too weak to encrypt with.
///
/// A UTF-8 passphrase needs at least [`MIN_PASSPHRASE_CHARS`] characters,
/// among them a letter, a digit, and something that is neither. Bytes
/// that are not valid UTF-8 are accepted as they are.
pub fn check_strength(passphrase: &[u8]) -> Result<()> {
    if passphrase.is_empty() {
        return Err(FencError::with_kind(
            ErrorCategory::User,
            ErrorKind::WeakPassphrase,
            "empty key phrase not allowed",
        ));
    }

    let Ok(text) = std::str::from_utf8(passphrase) else {
        return Ok(());
    };

    let mut chars = 0;
    let mut has_alpha = false;
    let mut has_digit = false;
    let mut has_special = false;
    for c in text.chars() {
        chars += 1;
        has_alpha |= c.is_alphabetic();
        has_digit |= c.is_numeric();
        has_special |= !c.is_alphabetic() && !c.is_numeric();
    }

    if chars >= MIN_PASSPHRASE_CHARS && has_alpha && has_digit && has_special {
        Ok(())
    } else {
        Err(FencError::with_kind(
            ErrorCategory::User,
            ErrorKind::WeakPassphrase,
            "too weak - must be at least 6 long, must have a letter, a digit and a special character",
        ))
    }
}
