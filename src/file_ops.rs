//! File encryption/decryption operations
//!
//! This module wraps the streaming [`encode`](crate::encoder::encode) and
//! [`decode`](crate::decoder::decode) pipelines with the file handling the
//! command line needs: pre-flight checks, and output that only appears under
//! its final name once it is complete.

use crate::cipher::BlockCipher;
use crate::decoder;
use crate::encoder;
use crate::error::{ErrorCategory, ErrorKind, FencError, Result};
use crate::header::ContainerHeader;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// File name extension of encrypted containers.
pub const EXTENSION: &str = ".fenc";

/// Ensure `path` names a regular file we can read from.
pub fn must_be_readable(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|e| {
        FencError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::FileCheck,
            format!("{} does not exist or cannot be accessed", path.display()),
            e,
        )
    })?;
    if metadata.is_dir() {
        return Err(FencError::with_kind(
            ErrorCategory::User,
            ErrorKind::FileCheck,
            format!("{} is a directory", path.display()),
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o444 == 0 {
            return Err(FencError::with_kind(
                ErrorCategory::User,
                ErrorKind::FileCheck,
                format!("{} is not readable", path.display()),
            ));
        }
    }

    Ok(())
}

/// Ensure nothing exists at `path`, not even a dangling symlink.
pub fn must_not_exist(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => Err(FencError::with_kind(
            ErrorCategory::User,
            ErrorKind::FileCheck,
            format!("{} already exists", path.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FencError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::FileCheck,
            format!("cannot check {}", path.display()),
            e,
        )),
    }
}

/// Encrypt `input_path` into a new container at `output_path`
///
/// The output file is created with mode 0o600 (read/write for owner only) on
/// Unix systems. It never replaces an existing file, and on failure nothing
/// is left at `output_path`.
pub fn encrypt_file(
    algorithm_id: u16,
    cipher: &BlockCipher,
    input_path: &Path,
    output_path: &Path,
) -> Result<ContainerHeader> {
    let input = File::open(input_path).map_err(|e| read_error(input_path, e))?;
    let mut input = BufReader::new(input);

    let mut temp_file = create_temp_for(output_path)?;
    let header = {
        let mut sink = BufWriter::new(temp_file.as_file_mut());
        let header = encoder::encode(algorithm_id, cipher, &mut input, &mut sink)
            .map_err(|e| e.with_context(format!("failed to encrypt {}", input_path.display())))?;
        sink.flush().map_err(|e| {
            FencError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to flush tempfile",
                e,
            )
        })?;
        header
    };

    persist(temp_file, output_path)?;
    debug!(
        input = %input_path.display(),
        output = %output_path.display(),
        "file encrypted"
    );
    Ok(header)
}

/// Decrypt the container at `input_path` into a new file at `output_path`
///
/// Plaintext goes to a temporary file first; `output_path` only appears once
/// the digest has been verified. The output file is created with mode 0o600
/// on Unix systems and never replaces an existing file.
pub fn decrypt_file(cipher: &BlockCipher, input_path: &Path, output_path: &Path) -> Result<()> {
    let input = File::open(input_path).map_err(|e| read_error(input_path, e))?;
    let mut input = BufReader::new(input);

    let mut temp_file = create_temp_for(output_path)?;
    {
        let mut sink = BufWriter::new(temp_file.as_file_mut());
        decoder::decode(cipher, &mut input, &mut sink).map_err(|e| {
            e.with_context(format!("failed to decrypt {}", input_path.display()))
        })?;
        sink.flush().map_err(|e| {
            FencError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to flush tempfile",
                e,
            )
        })?;
    }

    persist(temp_file, output_path)?;
    debug!(
        input = %input_path.display(),
        output = %output_path.display(),
        "file decrypted"
    );
    Ok(())
}

/// Decrypt the container at `input_path` into `writer`
///
/// Plaintext is written as it is produced, so a failure after the first
/// chunk leaves partial output in `writer`.
pub fn decrypt_to_writer(
    cipher: &BlockCipher,
    input_path: &Path,
    writer: &mut dyn Write,
) -> Result<()> {
    let input = File::open(input_path).map_err(|e| read_error(input_path, e))?;
    let mut input = BufReader::new(input);
    decoder::decode(cipher, &mut input, writer)
        .map_err(|e| e.with_context(format!("failed to decrypt {}", input_path.display())))
}

/// Remove a source file once its task has succeeded.
pub fn remove_input(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| {
        FencError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to remove {}", path.display()),
            e,
        )
    })
}

fn create_temp_for(output_path: &Path) -> Result<NamedTempFile> {
    let dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(dir).map_err(|e| {
        FencError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to create tempfile in {}", dir.display()),
            e,
        )
    })
}

/// Sync, restrict and move the finished tempfile to its final name.
fn persist(temp_file: NamedTempFile, output_path: &Path) -> Result<()> {
    // fsync() such that the rename later, if it succeeds, will always point
    // to a valid file.
    temp_file.as_file().sync_all().map_err(|e| {
        FencError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| {
                FencError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to set tempfile permissions",
                    e,
                )
            })?;
    }

    temp_file.persist_noclobber(output_path).map_err(|e| {
        let category = if e.error.kind() == io::ErrorKind::AlreadyExists {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        FencError::with_kind_and_source(
            category,
            ErrorKind::Io,
            format!("failed to rename to target file {}", output_path.display()),
            e.error,
        )
    })?;
    Ok(())
}

fn read_error(path: &Path, err: io::Error) -> FencError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    FencError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
