//! Turning command line file arguments into work items

use crate::error::Result;
use crate::file_ops::{self, EXTENSION};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Encrypt,
    Decrypt,
}

/// Where a task's result goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    File(PathBuf),
    Stdout,
}

impl Output {
    /// Name shown in progress lines.
    pub fn display_name(&self) -> String {
        match self {
            Output::File(path) => path.display().to_string(),
            Output::Stdout => "<stdout>".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub action: Action,
    pub input: PathBuf,
    pub output: Output,
    /// Delete `input` once the task succeeded.
    pub remove_input: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Decrypt to stdout instead of files.
    pub to_stdout: bool,
    /// Never delete inputs.
    pub keep_input: bool,
}

#[derive(Debug, Default)]
pub struct Plan {
    pub tasks: Vec<Task>,
}

impl Plan {
    /// Whether any task encrypts.
    pub fn encrypts(&self) -> bool {
        self.tasks.iter().any(|t| t.action == Action::Encrypt)
    }

    /// Whether any task writes to stdout.
    pub fn writes_stdout(&self) -> bool {
        self.tasks.iter().any(|t| t.output == Output::Stdout)
    }
}

/// Build the task list, checking every input and output up front.
///
/// Fails on the first file that does not pass its checks, before any work is
/// done.
pub fn plan<P: AsRef<Path>>(files: &[P], options: PlanOptions) -> Result<Plan> {
    let mut tasks = Vec::with_capacity(files.len());
    for file in files {
        let input = file.as_ref().to_path_buf();
        file_ops::must_be_readable(&input)?;

        let task = match strip_extension(&input) {
            Some(plain) => Task {
                action: Action::Decrypt,
                input,
                output: if options.to_stdout {
                    Output::Stdout
                } else {
                    Output::File(plain)
                },
                remove_input: !options.keep_input && !options.to_stdout,
            },
            None => {
                let mut name = OsString::from(input.as_os_str());
                name.push(EXTENSION);
                Task {
                    action: Action::Encrypt,
                    input,
                    output: Output::File(PathBuf::from(name)),
                    remove_input: !options.keep_input,
                }
            }
        };

        if let Output::File(path) = &task.output {
            file_ops::must_not_exist(path)?;
        }
        tasks.push(task);
    }

    tasks.sort_by(|a, b| a.input.cmp(&b.input));
    Ok(Plan { tasks })
}

/// `dir/name.fenc` becomes `dir/name`. A bare `.fenc` has no name left and
/// is treated as a plaintext file.
fn strip_extension(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(EXTENSION)?;
    if stem.is_empty() {
        return None;
    }
    Some(path.with_file_name(stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_plan_actions_and_outputs() {
        let dir = TempDir::new().unwrap();
        let b = touch(&dir, "b.txt");
        let a = touch(&dir, "a.txt.fenc");

        let plan = plan(&[&b, &a], PlanOptions::default()).unwrap();
        assert_eq!(
            plan.tasks,
            vec![
                Task {
                    action: Action::Decrypt,
                    input: a.clone(),
                    output: Output::File(dir.path().join("a.txt")),
                    remove_input: true,
                },
                Task {
                    action: Action::Encrypt,
                    input: b.clone(),
                    output: Output::File(dir.path().join("b.txt.fenc")),
                    remove_input: true,
                },
            ]
        );
        assert!(plan.encrypts());
        assert!(!plan.writes_stdout());
    }

    #[test]
    fn test_plan_stdout_only_affects_decrypt() {
        let dir = TempDir::new().unwrap();
        let enc = touch(&dir, "secret.fenc");
        let plain = touch(&dir, "notes");

        let options = PlanOptions {
            to_stdout: true,
            keep_input: false,
        };
        let plan = plan(&[&enc, &plain], options).unwrap();
        assert_eq!(plan.tasks[0].output, Output::File(dir.path().join("notes.fenc")));
        assert!(plan.tasks[0].remove_input);
        assert_eq!(plan.tasks[1].output, Output::Stdout);
        assert!(!plan.tasks[1].remove_input);
        assert!(plan.writes_stdout());
    }

    #[test]
    fn test_plan_keep() {
        let dir = TempDir::new().unwrap();
        let plain = touch(&dir, "notes");
        let options = PlanOptions {
            to_stdout: false,
            keep_input: true,
        };
        let plan = plan(&[&plain], options).unwrap();
        assert!(!plan.tasks[0].remove_input);
    }

    #[test]
    fn test_plan_only_decrypts() {
        let dir = TempDir::new().unwrap();
        let enc = touch(&dir, "x.fenc");
        let plan = plan(&[&enc], PlanOptions::default()).unwrap();
        assert!(!plan.encrypts());
    }

    #[test]
    fn test_plan_rejects_existing_output() {
        let dir = TempDir::new().unwrap();
        let plain = touch(&dir, "notes");
        touch(&dir, "notes.fenc");

        let err = plan(&[&plain], PlanOptions::default()).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::FileCheck));
    }

    #[test]
    fn test_plan_existing_output_ok_for_stdout() {
        let dir = TempDir::new().unwrap();
        let enc = touch(&dir, "notes.fenc");
        touch(&dir, "notes");

        let options = PlanOptions {
            to_stdout: true,
            keep_input: false,
        };
        plan(&[&enc], options).unwrap();
    }

    #[test]
    fn test_plan_rejects_missing_input() {
        let dir = TempDir::new().unwrap();
        let err = plan(&[dir.path().join("missing")], PlanOptions::default()).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::FileCheck));
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(
            strip_extension(Path::new("dir/a.b.fenc")),
            Some(PathBuf::from("dir/a.b"))
        );
        assert_eq!(strip_extension(Path::new("dir/.fenc")), None);
        assert_eq!(strip_extension(Path::new("a.fenc.txt")), None);
        assert_eq!(strip_extension(Path::new("afenc")), None);
    }
}
