use super::{ExecutionSummary, Executor, ExecutorError, Invocation, Spawner};
use crate::{config::Job, script::local_shell_script};
use tracing::{info, instrument, warn};

/// shell running local subjobs, the same one PBS nodes run the job script with
pub const LOCAL_SHELL: &str = "bash";
/// `$0` of the local subjob shell
const SHELL_NAME: &str = "pbs-array";

/// Executor running every subjob in this process, one after the other.
/// Meant for debugging: no shuffling and no chunking.
#[derive(Debug)]
pub struct LocalExecutor {
    job: Job,
}

impl LocalExecutor {
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// `bash -c 'cd <cd> && <command> "$@"' pbs-array <tuple values> <path>`, so `cd` and
    /// `command` get the same shell treatment as in the job script
    fn invocation(&self, tuple_args: Vec<String>) -> Invocation {
        let mut args = vec![
            String::from("-c"),
            local_shell_script(&self.job),
            String::from(SHELL_NAME),
        ];
        args.extend(tuple_args);
        args.push(self.job.path.clone());

        Invocation {
            program: String::from(LOCAL_SHELL),
            args,
            cwd: None,
            stdin: None,
            capture: false,
            timeout: Some(self.job.walltime),
        }
    }
}

impl Executor for LocalExecutor {
    fn load(job: Job) -> Self {
        Self { job }
    }

    /// run all subjobs sequentially in their original order
    #[instrument(skip_all, level = "info")]
    fn execute(&mut self, spawner: &mut dyn Spawner) -> Result<ExecutionSummary, ExecutorError> {
        let total = self.job.tuples.len();
        let mut summary = ExecutionSummary {
            subjobs: total,
            ..ExecutionSummary::default()
        };

        for (index, tuple) in self.job.tuples.iter().enumerate() {
            info!("pbs_array_args = {tuple}");

            let outcome = spawner.run(&self.invocation(tuple.to_args()))?;

            if outcome.timed_out {
                warn!(
                    subjob = index,
                    "Subjob exceeded the walltime of {}, killed it", self.job.scheduler.walltime
                );
                summary.failed += 1;
            } else if !outcome.success() {
                warn!(subjob = index, status = ?outcome.status, "Subjob failed");
                summary.failed += 1;
            }

            info!("Done with {}/{total}", index + 1);
        }

        Ok(summary)
    }
}
