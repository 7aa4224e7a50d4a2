use super::{ExecutionSummary, Executor, ExecutorError, Invocation, Spawner};
use crate::{chunk::shuffle_and_chunk, config::Job, script::render_pbs_script};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info, instrument};

/// Executor submitting the subjobs as PBS array jobs through `qsub`
#[derive(Debug)]
pub struct PbsExecutor {
    job: Job,
    rng: StdRng,
}

impl PbsExecutor {
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// `qsub` reading the script from stdin, its output holds the job id
    fn submission(&self, script: String) -> Invocation {
        Invocation {
            program: self.job.scheduler.qsub.clone(),
            args: Vec::new(),
            cwd: None,
            stdin: Some(script),
            capture: true,
            timeout: None,
        }
    }
}

impl Executor for PbsExecutor {
    fn load(job: Job) -> Self {
        let rng = match job.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self { job, rng }
    }

    /// Shuffle, chunk and submit one array job per chunk.
    /// A rejected submission stops the run, chunks submitted before stay queued.
    #[instrument(skip_all, level = "info")]
    fn execute(&mut self, spawner: &mut dyn Spawner) -> Result<ExecutionSummary, ExecutorError> {
        info!("Submitting {} subjobs", self.job.tuples.len());

        let chunks = shuffle_and_chunk(
            self.job.tuples.clone(),
            self.job.scheduler.max_array_size,
            &mut self.rng,
        )?;
        let mut summary = ExecutionSummary {
            subjobs: self.job.tuples.len(),
            ..ExecutionSummary::default()
        };

        for chunk in chunks.iter() {
            let script = render_pbs_script(&self.job, chunk);
            debug!(chunk = chunk.index, "Job script:\n{script}");

            let outcome = spawner.run(&self.submission(script))?;

            if !outcome.success() {
                return Err(ExecutorError::SubmissionFailed {
                    chunk: chunk.index,
                    range: chunk.array_range(),
                    status: outcome.status,
                    stderr: outcome.stderr.trim().to_string(),
                });
            }

            summary.submissions += 1;
            info!(
                chunk = chunk.index,
                range = %chunk.array_range(),
                job_id = outcome.stdout.trim(),
                "Submitted {} subjobs",
                chunk.len()
            );
        }

        Ok(summary)
    }
}
