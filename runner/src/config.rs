use crate::{
    arguments::{ArgumentSource, ArgumentTuple},
    output::resolve_output_path,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Error,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, warn};

/// working directory of a remote subjob unless `cd` is set
pub const PBS_WORKDIR: &str = "$PBS_O_WORKDIR";
/// working directory of a local subjob unless `cd` is set
pub const LOCAL_WORKDIR: &str = ".";

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read job file {path:?}: {source}")]
    ReadJobFile { path: PathBuf, source: Error },
    #[error("Job file is invalid: {0}")]
    InvalidJobFile(#[from] serde_yaml::Error),
    #[error("Failed to split --tuple {tuple:?}: {source}")]
    InvalidTuple {
        tuple: String,
        source: shell_words::ParseError,
    },
    #[error("Preflight checks failed, see the errors above")]
    FailedPreflight,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    // command template, may carry constant arguments separated by spaces
    #[serde(default)]
    pub command: String,
    // output folder handed to every subjob as its last argument
    pub path: Option<String>,
    // run all subjobs in this process instead of submitting them
    #[serde(default)]
    pub local: bool,
    // subjob working directory
    pub cd: Option<String>,
    // seed for the subjob shuffle, random if unset
    pub seed: Option<u64>,

    #[serde(default, alias = "args")]
    pub arguments: ArgumentSource,

    #[serde(default, alias = "pbs")]
    pub scheduler: SchedulerConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    // `#PBS -N`, derived from the command if unset
    pub name: Option<String>,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default = "default_one")]
    pub select: u32,
    #[serde(default = "default_one")]
    pub ncpus: u32,
    #[serde(default = "default_mem")]
    pub mem: String,
    #[serde(default = "default_walltime")]
    pub walltime: String,
    // PBS caps array jobs at 1000 subjobs by default
    #[serde(default = "default_max_array_size")]
    pub max_array_size: usize,
    // scheduler client reading the job script from stdin
    #[serde(default = "default_qsub")]
    pub qsub: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: None,
            project: default_project(),
            queue: default_queue(),
            select: default_one(),
            ncpus: default_one(),
            mem: default_mem(),
            walltime: default_walltime(),
            max_array_size: default_max_array_size(),
            qsub: default_qsub(),
        }
    }
}

/// A job that passed all preflight checks
#[derive(Clone, Debug)]
pub struct Job {
    pub command: String,
    pub tuples: Vec<ArgumentTuple>,
    /// output folder, always ending with a separator
    pub path: String,
    pub local: bool,
    pub cd: String,
    pub seed: Option<u64>,
    pub name: String,
    pub scheduler: SchedulerConfig,
    pub walltime: Duration,
}

impl JobConfig {
    /// read a job from a yaml file
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = fs::read_to_string(path).map_err(|source| ConfigErrors::ReadJobFile {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_str(&content)?)
    }

    /// Returns true if any check failed, every failure is logged
    pub fn preflight_checks(&mut self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        self.command = self.command.trim().to_string();

        match shell_words::split(&self.command) {
            Ok(words) if words.is_empty() => {
                error!("No command was defined, use `command` in the job file or --command");
                contains_error = true;
            }
            Ok(_) => {}
            Err(e) => {
                error!("command '{}' can't be split into words: {e}", self.command);
                contains_error = true;
            }
        }

        let product = if self.arguments.product.is_empty() {
            Some(0)
        } else {
            self.arguments
                .product
                .iter()
                .map(Vec::len)
                .try_fold(1usize, usize::checked_mul)
        };

        match product.and_then(|product| product.checked_add(self.arguments.tuples.len())) {
            None => {
                error!("arguments.product expands to too many tuples");
                contains_error = true;
            }
            Some(0) => {
                error!("No argument tuples were defined, a job can't be a NOP");
                contains_error = true;
            }
            Some(1) if !self.local => {
                error!("Only a single argument tuple was defined, PBS array jobs need at least two subjobs. Use --local to run it directly");
                contains_error = true;
            }
            Some(_) => {}
        }

        let scheduler = &self.scheduler;

        if scheduler.select == 0 {
            error!("scheduler.select cannot be 0");
            contains_error = true;
        }

        if scheduler.ncpus == 0 {
            error!("scheduler.ncpus cannot be 0");
            contains_error = true;
        }

        if scheduler.mem.trim().is_empty() {
            error!("scheduler.mem cannot be empty");
            contains_error = true;
        }

        if parse_walltime(&scheduler.walltime).is_none() {
            error!(
                "scheduler.walltime '{}' must be a non-zero duration in [[HH:]MM:]SS form",
                scheduler.walltime
            );
            contains_error = true;
        }

        // the last chunk may borrow one subjob from its predecessor, which has to keep two
        if scheduler.max_array_size < 3 {
            error!(
                "scheduler.max_array_size must be at least 3, got {}",
                scheduler.max_array_size
            );
            contains_error = true;
        }

        if scheduler.qsub.trim().is_empty() {
            error!("scheduler.qsub cannot be empty");
            contains_error = true;
        }

        if !self.local {
            if let Some(path) = self.path.as_ref().filter(|path| !path.is_empty()) {
                if Path::new(path).is_relative() {
                    warn!("path '{path}' is relative, PBS expects absolute paths for job output");
                }
            }

            // `#PBS -o` and `#PBS -e` end at the first whitespace
            let resolved = resolve_output_path(self.path.as_deref(), &self.command);
            if resolved.chars().any(char::is_whitespace) {
                error!("path '{resolved}' contains whitespace, which PBS can't use for job output");
                contains_error = true;
            }
        }

        contains_error
    }

    /// run the preflight checks and resolve all defaults
    pub fn into_job(mut self) -> Result<Job, ConfigErrors> {
        if self.preflight_checks() {
            return Err(ConfigErrors::FailedPreflight);
        }

        // skip leading `VAR=value` assignments, the shell runs the word after them
        let program = shell_words::split(&self.command)
            .ok()
            .and_then(|words| {
                let first = words.first().cloned();
                words
                    .into_iter()
                    .find(|word| !is_assignment(word))
                    .or(first)
            })
            .ok_or(ConfigErrors::FailedPreflight)?;
        let walltime =
            parse_walltime(&self.scheduler.walltime).ok_or(ConfigErrors::FailedPreflight)?;
        let path = resolve_output_path(self.path.as_deref(), &self.command);
        let name = self
            .scheduler
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_job_name(&program));
        let cd = self.cd.clone().unwrap_or_else(|| {
            let workdir = if self.local { LOCAL_WORKDIR } else { PBS_WORKDIR };
            workdir.to_string()
        });
        let tuples = self.arguments.collect();

        debug!(
            "Resolved job '{name}' with {} subjobs writing to {path}",
            tuples.len()
        );

        Ok(Job {
            command: self.command,
            tuples,
            path,
            local: self.local,
            cd,
            seed: self.seed,
            name,
            scheduler: self.scheduler,
            walltime,
        })
    }
}

/// parse a PBS walltime (`SS`, `MM:SS` or `HH:MM:SS`) into a non-zero duration
pub fn parse_walltime(walltime: &str) -> Option<Duration> {
    let parts = walltime.trim().split(':').collect::<Vec<_>>();

    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let seconds = parts.iter().try_fold(0u64, |acc, part| {
        part.parse::<u64>()
            .ok()
            .and_then(|value| acc.checked_mul(60)?.checked_add(value))
    })?;

    (seconds > 0).then(|| Duration::from_secs(seconds))
}

/// `NAME=value` as understood by the shell
fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// file name of the subjob program, e.g. `simulate.py` for `python/simulate.py`
fn default_job_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("job")
        .to_string()
}

fn default_project() -> String {
    String::from("''")
}

fn default_queue() -> String {
    String::from("defaultQ")
}

fn default_one() -> u32 {
    1
}

fn default_mem() -> String {
    String::from("1GB")
}

fn default_walltime() -> String {
    String::from("23:59:00")
}

fn default_max_array_size() -> usize {
    1000
}

fn default_qsub() -> String {
    String::from("qsub")
}
