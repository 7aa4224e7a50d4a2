use crate::{chunk::Chunk, config::Job, output::job_log_dir};
use itertools::Itertools;
use shell_words::quote;

/// Render the PBS job script for a single chunk.
///
/// The chunk's tuples are embedded as a `case` table keyed by the array index relative to
/// the chunk offset, every value shell quoted, so the subjob sees exactly the values of
/// its tuple without any side file.
pub fn render_pbs_script(job: &Job, chunk: &Chunk) -> String {
    let scheduler = &job.scheduler;
    let log_dir = job_log_dir(&job.path);
    let table = chunk
        .tuples
        .iter()
        .enumerate()
        .map(|(relative, tuple)| {
            format!("  {relative}) args=({}) ;;\n", quote_args(&tuple.to_args()))
        })
        .join("");

    format!(
        r#"#!/bin/bash
#PBS -N {name}
#PBS -P {project}
#PBS -q {queue}
#PBS -V
#PBS -m n
#PBS -o {log_dir} -e {log_dir}
#PBS -l select={select}:ncpus={ncpus}:mem={mem}
#PBS -l walltime={walltime}
#PBS -J {range}
case $((PBS_ARRAY_INDEX - {offset})) in
{table}  *) echo "no arguments for array index $PBS_ARRAY_INDEX" >&2; exit 1 ;;
esac
cd {cd}
echo "pbs_array_args = ${{args[*]}}"
{command} "${{args[@]}}" {path}
"#,
        name = job.name,
        project = scheduler.project,
        queue = scheduler.queue,
        select = scheduler.select,
        ncpus = scheduler.ncpus,
        mem = scheduler.mem,
        walltime = scheduler.walltime,
        range = chunk.array_range(),
        offset = chunk.offset,
        cd = job.cd,
        command = job.command,
        path = quote(&job.path),
    )
}

/// Script for `bash -c` running one local subjob, the tuple values and the output path
/// follow as positional parameters
pub fn local_shell_script(job: &Job) -> String {
    format!("cd {} && {} \"$@\"", job.cd, job.command)
}

/// space joined, shell quoted words
pub fn quote_args(args: &[String]) -> String {
    args.iter().map(|arg| quote(arg)).join(" ")
}
