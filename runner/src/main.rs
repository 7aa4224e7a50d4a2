mod arguments;
mod chunk;
mod config;
mod executors;
mod output;
mod script;

use crate::{
    arguments::ArgumentTuple,
    config::{ConfigErrors, JobConfig},
    executors::{DryRunSpawner, Executors, Spawner, SystemSpawner},
};
use clap::{ArgAction, Parser};
use std::{io, path::PathBuf, process::ExitCode};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Submit PBS array jobs from a list of argument tuples.
///
/// Every subjob runs `<command> <tuple values> <path>`.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
struct Cli {
    /// yaml job file, every option below overrides its values
    job: Option<PathBuf>,

    /// command of every subjob, may contain constant arguments
    #[arg(long, short = 'c')]
    command: Option<String>,

    /// argument tuple, split like a shell would (repeatable)
    #[arg(long = "tuple", short = 't', value_name = "ARGS")]
    tuples: Vec<String>,

    /// output folder passed as last argument to every subjob
    #[arg(long)]
    path: Option<String>,

    /// run all subjobs here, one after the other, instead of submitting them
    #[arg(long)]
    local: bool,

    /// working directory of the subjobs
    #[arg(long)]
    cd: Option<String>,

    /// seed of the subjob shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// print what would be run or submitted instead of doing it
    #[arg(long)]
    dry_run: bool,

    #[arg(long, short = 'N')]
    name: Option<String>,

    #[arg(long, short = 'P')]
    project: Option<String>,

    #[arg(long, short = 'q')]
    queue: Option<String>,

    #[arg(long)]
    select: Option<u32>,

    #[arg(long)]
    ncpus: Option<u32>,

    #[arg(long)]
    mem: Option<String>,

    #[arg(long)]
    walltime: Option<String>,

    /// upper limit of subjobs per array job
    #[arg(long)]
    max_array_size: Option<usize>,

    /// scheduler client reading the job script from stdin
    #[arg(long)]
    qsub: Option<String>,

    /// raise log verbosity, -v for debug, -vv for trace
    #[arg(long, short = 'v', action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// job file (if any) with all command line options applied on top
    fn job_config(&self) -> Result<JobConfig, ConfigErrors> {
        let mut config = match &self.job {
            Some(path) => JobConfig::load(path)?,
            None => JobConfig::default(),
        };

        if let Some(command) = &self.command {
            config.command = command.clone();
        }

        for tuple in self.tuples.iter() {
            let words = shell_words::split(tuple).map_err(|source| ConfigErrors::InvalidTuple {
                tuple: tuple.clone(),
                source,
            })?;

            config
                .arguments
                .tuples
                .push(words.into_iter().collect::<ArgumentTuple>());
        }

        if self.path.is_some() {
            config.path = self.path.clone();
        }
        if self.cd.is_some() {
            config.cd = self.cd.clone();
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.local |= self.local;

        let scheduler = &mut config.scheduler;
        if self.name.is_some() {
            scheduler.name = self.name.clone();
        }
        if let Some(project) = &self.project {
            scheduler.project = project.clone();
        }
        if let Some(queue) = &self.queue {
            scheduler.queue = queue.clone();
        }
        if let Some(select) = self.select {
            scheduler.select = select;
        }
        if let Some(ncpus) = self.ncpus {
            scheduler.ncpus = ncpus;
        }
        if let Some(mem) = &self.mem {
            scheduler.mem = mem.clone();
        }
        if let Some(walltime) = &self.walltime {
            scheduler.walltime = walltime.clone();
        }
        if let Some(max_array_size) = self.max_array_size {
            scheduler.max_array_size = max_array_size;
        }
        if let Some(qsub) = &self.qsub {
            scheduler.qsub = qsub.clone();
        }

        Ok(config)
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let job = match cli.job_config().and_then(JobConfig::into_job) {
        Ok(job) => job,
        Err(e) => {
            error!("{e}");

            return ExitCode::FAILURE;
        }
    };

    let mut executor = Executors::load(job);
    let mut system = SystemSpawner;
    let mut dry_run = DryRunSpawner::new(io::stdout().lock());
    let spawner: &mut dyn Spawner = if cli.dry_run {
        &mut dry_run
    } else {
        &mut system
    };

    match executor.execute(spawner) {
        Ok(summary) if summary.failed > 0 => {
            warn!(
                "{} of {} subjobs failed",
                summary.failed, summary.subjobs
            );

            ExitCode::FAILURE
        }
        Ok(summary) => {
            info!(
                "Done with {} subjobs in {} submissions",
                summary.subjobs, summary.submissions
            );

            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");

            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::ArgValue;

    #[test]
    fn cli_builds_a_job_without_file() {
        let cli = Cli::try_parse_from([
            "pbs-array",
            "--command",
            "echo",
            "-t",
            "a 'b c'",
            "-t",
            "d 1",
            "--queue",
            "express",
            "--max-array-size",
            "500",
        ])
        .unwrap();
        let config = cli.job_config().unwrap();

        assert_eq!(config.command, "echo");
        assert_eq!(config.scheduler.queue, "express");
        assert_eq!(config.scheduler.max_array_size, 500);
        assert_eq!(
            config.arguments.tuples[0],
            ArgumentTuple::new(vec![ArgValue::from("a"), ArgValue::from("b c")])
        );
        assert_eq!(config.arguments.tuples[1].to_args(), vec!["d", "1"]);
    }

    #[test]
    fn cli_overrides_job_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("job.yaml");
        std::fs::write(
            &file,
            "command: ./simulate\nscheduler: {queue: defaultQ, ncpus: 2}\narguments: {product: [[1, 2]]}",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "pbs-array",
            file.to_str().unwrap(),
            "--ncpus",
            "8",
            "--local",
            "--seed",
            "3",
        ])
        .unwrap();
        let config = cli.job_config().unwrap();

        assert_eq!(config.command, "./simulate");
        assert_eq!(config.scheduler.ncpus, 8);
        assert_eq!(config.scheduler.queue, "defaultQ");
        assert!(config.local);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.arguments.collect().len(), 2);
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let cli = Cli::try_parse_from(["pbs-array", "-c", "echo", "-t", "'open"]).unwrap();

        assert!(matches!(
            cli.job_config(),
            Err(ConfigErrors::InvalidTuple { .. })
        ));
    }

    #[test]
    fn missing_job_file_is_reported() {
        let cli = Cli::try_parse_from(["pbs-array", "/nonexistent/job.yaml"]).unwrap();

        assert!(matches!(
            cli.job_config(),
            Err(ConfigErrors::ReadJobFile { .. })
        ));
    }
}
