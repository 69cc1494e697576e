//! fenc CLI - passphrase-based file encryption
//!
//! Files ending in `.fenc` are decrypted, everything else is encrypted.

use clap::builder::PossibleValuesParser;
use clap::{ArgGroup, Parser};
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use fenc::cipher::BlockCipher;
use fenc::error::Result;
use fenc::file_ops;
use fenc::hashes::{self, DEFAULT_HASH};
use fenc::passphrase::{
    self, ConfirmingPassphraseReader, ConstantPassphraseReader, DEFAULT_PASSPHRASE_ENV,
    EnvPassphraseReader, PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader,
};
use fenc::progress::{self, Progress};
use fenc::task::{self, Action, Output, PlanOptions, Task};

#[derive(Parser)]
#[command(name = "fenc")]
#[command(version)]
#[command(about = "Passphrase-based file encryption.", long_about = None)]
#[command(group(
    ArgGroup::new("passphrase_source")
        .args(["passphrase", "passphrase_env", "passphrase_stdin", "blank"])
))]
struct Cli {
    /// Files to process: *.fenc files are decrypted, others encrypted
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Digest algorithm recorded when encrypting
    #[arg(
        short = 's',
        long = "hash",
        value_name = "NAME",
        default_value = DEFAULT_HASH,
        value_parser = hash_names()
    )]
    hash: String,

    /// Decrypt to stdout instead of writing files
    #[arg(short = 'o', long = "stdout")]
    to_stdout: bool,

    /// Do not print progress
    #[arg(short, long)]
    quiet: bool,

    /// Keep (don't delete) input files
    #[arg(short, long)]
    keep: bool,

    /// Use an empty passphrase without asking for one
    #[arg(short, long)]
    blank: bool,

    /// Passphrase to use
    #[arg(short = 'p', long, value_name = "VALUE")]
    passphrase: Option<String>,

    /// Read passphrase from the named environment variable
    #[arg(short = 'P', long, value_name = "VAR")]
    passphrase_env: Option<String>,

    /// Read passphrase from stdin instead of from terminal
    #[arg(long)]
    passphrase_stdin: bool,

    /// Accept passphrases that fail the strength check
    #[arg(short = 'u', long)]
    allow_weak: bool,

    /// Don't warn about an empty passphrase
    #[arg(short = 'w', long)]
    no_warn: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            process::exit(1);
        }
        Err(e) => e.exit(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", progress::describe(&e));
            process::exit(1);
        }
    }
}

/// Everything that can fail before a task starts is returned as an error;
/// task failures are reported and folded into the exit code.
fn run(cli: &Cli) -> Result<i32> {
    let hash = hashes::by_name(&cli.hash)?;
    let plan = task::plan(
        &cli.files,
        PlanOptions {
            to_stdout: cli.to_stdout,
            keep_input: cli.keep,
        },
    )?;

    let mut reader = passphrase_reader(cli, plan.encrypts());
    let passphrase = reader.read_passphrase()?;
    if plan.encrypts() && passphrase.is_empty() && !cli.no_warn {
        warn!("empty key phrase: data is only obfuscated, not protected");
    }
    if plan.encrypts() && !cli.allow_weak && !cli.blank {
        passphrase::check_strength(&passphrase)?;
    }
    let cipher = BlockCipher::from_passphrase(&passphrase)?;
    drop(passphrase);

    debug!(tasks = plan.tasks.len(), hash = hash.name, "starting");

    let mut progress = Progress::stderr(&plan.tasks, !cli.quiet && !plan.writes_stdout());
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    for task in &plan.tasks {
        progress.start(task);
        match execute(task, hash.id, &cipher, &mut stdout) {
            Ok(()) => {
                progress.finish(Ok(()));
                succeeded += 1;
            }
            Err(e) => {
                progress.finish(Err(&e));
                if !progress.is_enabled() {
                    eprintln!("Error: {}", progress::describe(&e));
                }
                failed += 1;
            }
        }
    }
    let _ = stdout.flush();

    let mut code = 0;
    if failed > 0 {
        code += 1;
    }
    if succeeded == 0 {
        code += 1;
    }
    Ok(code)
}

fn execute(task: &Task, hash_id: u16, cipher: &BlockCipher, stdout: &mut dyn Write) -> Result<()> {
    match (&task.action, &task.output) {
        (Action::Encrypt, Output::File(output)) => {
            file_ops::encrypt_file(hash_id, cipher, &task.input, output).map(|_| ())?
        }
        (Action::Decrypt, Output::File(output)) => {
            file_ops::decrypt_file(cipher, &task.input, output)?
        }
        (Action::Decrypt, Output::Stdout) => {
            file_ops::decrypt_to_writer(cipher, &task.input, stdout)?
        }
        (Action::Encrypt, Output::Stdout) => {
            return Err(fenc::FencError::with_kind(
                fenc::ErrorCategory::Internal,
                fenc::ErrorKind::InternalInvariant,
                "encrypt task cannot write to stdout",
            ));
        }
    }
    if task.remove_input {
        file_ops::remove_input(&task.input)?;
    }
    Ok(())
}

fn hash_names() -> PossibleValuesParser {
    PossibleValuesParser::new(hashes::all().iter().map(|d| d.name))
}

fn passphrase_reader(cli: &Cli, encrypts: bool) -> Box<dyn PassphraseReader> {
    if let Some(value) = &cli.passphrase {
        Box::new(ConstantPassphraseReader::new(value.clone().into_bytes()))
    } else if let Some(var) = &cli.passphrase_env {
        Box::new(EnvPassphraseReader::new(var.clone()))
    } else if cli.passphrase_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(io::stdin())))
    } else if cli.blank {
        Box::new(ConstantPassphraseReader::new(Vec::new()))
    } else if env::var_os(DEFAULT_PASSPHRASE_ENV).is_some_and(|v| !v.is_empty()) {
        Box::new(EnvPassphraseReader::new(DEFAULT_PASSPHRASE_ENV))
    } else if encrypts {
        Box::new(ConfirmingPassphraseReader::terminal())
    } else {
        Box::new(TerminalPassphraseReader::new())
    }
}
