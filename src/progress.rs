//! Per-task progress lines on stderr

use crate::error::FencError;
use crate::task::Task;
use std::io::{self, Write};

/// Prints `<input> -> <output> ... done` lines, padded into columns.
///
/// Write errors are ignored: progress output must never fail a task.
pub struct Progress {
    out: Option<Box<dyn Write>>,
    input_width: usize,
    output_width: usize,
}

impl Progress {
    /// Progress on stderr, or nothing at all when `enabled` is false.
    pub fn stderr(tasks: &[Task], enabled: bool) -> Self {
        let out: Option<Box<dyn Write>> = if enabled {
            Some(Box::new(io::stderr()))
        } else {
            None
        };
        Self::new(tasks, out)
    }

    pub fn new(tasks: &[Task], out: Option<Box<dyn Write>>) -> Self {
        let input_width = tasks
            .iter()
            .map(|t| t.input.display().to_string().chars().count())
            .max()
            .unwrap_or(0);
        let output_width = tasks
            .iter()
            .map(|t| t.output.display_name().chars().count())
            .max()
            .unwrap_or(0);
        Self {
            out,
            input_width,
            output_width,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.out.is_some()
    }

    pub fn start(&mut self, task: &Task) {
        if let Some(out) = self.out.as_mut() {
            let _ = write!(
                out,
                "{:<iw$} -> {:<ow$} ... ",
                task.input.display().to_string(),
                task.output.display_name(),
                iw = self.input_width,
                ow = self.output_width,
            );
            let _ = out.flush();
        }
    }

    pub fn finish(&mut self, result: Result<(), &FencError>) {
        if let Some(out) = self.out.as_mut() {
            let _ = match result {
                Ok(()) => writeln!(out, "done"),
                Err(err) => writeln!(out, "FAILED\n    {}", describe(err)),
            };
        }
    }
}

/// The error message followed by its chain of causes.
pub fn describe(err: &FencError) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, ErrorKind};
    use crate::task::{Action, Output};
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Shared(Rc<RefCell<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn task(input: &str, output: &str) -> Task {
        Task {
            action: Action::Encrypt,
            input: PathBuf::from(input),
            output: Output::File(PathBuf::from(output)),
            remove_input: true,
        }
    }

    #[test]
    fn test_columns_and_status() {
        let tasks = vec![task("a", "a.fenc"), task("longer", "longer.fenc")];
        let buf = Shared::default();
        let mut progress = Progress::new(&tasks, Some(Box::new(buf.clone())));

        progress.start(&tasks[0]);
        progress.finish(Ok(()));
        progress.start(&tasks[1]);
        let err = FencError::with_kind(ErrorCategory::User, ErrorKind::Io, "broken")
            .with_context("failed to encrypt longer");
        progress.finish(Err(&err));

        let text = String::from_utf8(buf.0.borrow().clone()).unwrap();
        assert_eq!(
            text,
            "a      -> a.fenc      ... done\n\
             longer -> longer.fenc ... FAILED\n    failed to encrypt longer: broken\n"
        );
    }

    #[test]
    fn test_disabled_prints_nothing() {
        let tasks = vec![task("a", "a.fenc")];
        let mut progress = Progress::new(&tasks, None);
        progress.start(&tasks[0]);
        progress.finish(Ok(()));
    }
}
