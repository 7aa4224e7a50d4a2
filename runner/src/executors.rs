pub mod local;
pub mod pbs;

use crate::{
    chunk::ChunkError,
    config::Job,
    output::prepare_output_dir,
    script::quote_args,
};
use std::{
    io::{self, Read, Write},
    path::PathBuf,
    process::{Command, Stdio},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to create output folder {path:?}: {source}")]
    OutputDir { path: String, source: io::Error },
    #[error("Failed to spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("Failed to communicate with a child process")]
    Io(#[from] io::Error),
    #[error("Submission of chunk {chunk} ({range}) failed with status {status:?}: {stderr}")]
    SubmissionFailed {
        chunk: usize,
        range: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("Failed to split subjobs into array chunks")]
    Chunk(#[from] ChunkError),
}

/// A single external process call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// fed to the child's stdin, which is closed afterwards
    pub stdin: Option<String>,
    /// capture stdout/ stderr instead of passing them through
    pub capture: bool,
    pub timeout: Option<Duration>,
}

/// Result of an external process call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outcome {
    pub status: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl Outcome {
    pub fn exited(status: i32) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }
}

/// Everything that leaves this process goes through a spawner
pub trait Spawner {
    fn run(&mut self, invocation: &Invocation) -> Result<Outcome, ExecutorError>;

    fn describe(&self) -> &'static str;
}

/// Spawns real child processes
#[derive(Debug, Default)]
pub struct SystemSpawner;

impl Spawner for SystemSpawner {
    #[instrument(skip(self, invocation), fields(program = %invocation.program), level = "debug")]
    fn run(&mut self, invocation: &Invocation) -> Result<Outcome, ExecutorError> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);

        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        if invocation.stdin.is_some() {
            command.stdin(Stdio::piped());
        }

        if invocation.capture {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = command.spawn().map_err(|source| ExecutorError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        if let (Some(input), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
            let written = stdin.write_all(input.as_bytes());
            // Dropping stdin here will close the underlying file descriptor
            drop(stdin);

            match written {
                Ok(()) => {}
                // the child stopped reading, its exit status and stderr tell why
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    warn!("{} closed stdin before reading all input", invocation.program);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();

                    return Err(e.into());
                }
            }
        }

        debug!("Waiting on {}", child.id());

        let Some(timeout) = invocation.timeout else {
            let output = child.wait_with_output()?;

            return Ok(Outcome {
                status: output.status.code(),
                timed_out: false,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        };

        match child.wait_timeout(timeout)? {
            Some(status) => {
                let mut stdout = String::new();
                let mut stderr = String::new();

                if let Some(mut pipe) = child.stdout.take() {
                    pipe.read_to_string(&mut stdout)?;
                }
                if let Some(mut pipe) = child.stderr.take() {
                    pipe.read_to_string(&mut stderr)?;
                }

                Ok(Outcome {
                    status: status.code(),
                    timed_out: false,
                    stdout,
                    stderr,
                })
            }
            None => {
                // child hasn't exited yet
                child.kill()?;
                child.wait()?;

                Ok(Outcome {
                    timed_out: true,
                    ..Outcome::default()
                })
            }
        }
    }

    fn describe(&self) -> &'static str {
        "system"
    }
}

/// Prints every invocation instead of running it
#[derive(Debug)]
pub struct DryRunSpawner<W: Write> {
    out: W,
}

impl<W: Write> DryRunSpawner<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Spawner for DryRunSpawner<W> {
    fn run(&mut self, invocation: &Invocation) -> Result<Outcome, ExecutorError> {
        let mut line = shell_words::quote(&invocation.program).into_owned();
        if !invocation.args.is_empty() {
            line.push(' ');
            line.push_str(&quote_args(&invocation.args));
        }

        if let Some(cwd) = &invocation.cwd {
            writeln!(self.out, "(cd {} && {line})", cwd.to_string_lossy())?;
        } else {
            writeln!(self.out, "{line}")?;
        }

        if let Some(input) = &invocation.stdin {
            writeln!(self.out, "<<'END'")?;
            write!(self.out, "{input}")?;
            writeln!(self.out, "END")?;
        }

        Ok(Outcome::exited(0))
    }

    fn describe(&self) -> &'static str {
        "dry-run"
    }
}

/// Counters reported once all subjobs were run or submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionSummary {
    pub subjobs: usize,
    pub submissions: usize,
    pub failed: usize,
}

pub trait Executor {
    fn load(job: Job) -> Self
    where
        Self: Sized;

    fn execute(&mut self, spawner: &mut dyn Spawner) -> Result<ExecutionSummary, ExecutorError>;
}

#[derive(Debug)]
pub enum Executors {
    Local(local::LocalExecutor),
    Pbs(pbs::PbsExecutor),
}

impl Executors {
    pub fn load(job: Job) -> Self {
        if job.local {
            Self::Local(local::LocalExecutor::load(job))
        } else {
            Self::Pbs(pbs::PbsExecutor::load(job))
        }
    }

    fn job(&self) -> &Job {
        match self {
            Self::Local(executor) => executor.job(),
            Self::Pbs(executor) => executor.job(),
        }
    }

    /// create the output folder, then run or submit all subjobs
    pub fn execute(&mut self, spawner: &mut dyn Spawner) -> Result<ExecutionSummary, ExecutorError> {
        let path = self.job().path.clone();
        prepare_output_dir(&path).map_err(|source| ExecutorError::OutputDir { path, source })?;

        info!("Using the {} spawner", spawner.describe());

        match self {
            Self::Local(executor) => executor.execute(spawner),
            Self::Pbs(executor) => executor.execute(spawner),
        }
    }
}
