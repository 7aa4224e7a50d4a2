use std::{
    fs, io,
    path::{PathBuf, MAIN_SEPARATOR},
};
use tracing::debug;

/// folder below the output path that collects the scheduler's stdout/ stderr files
pub const JOB_LOG_DIR: &str = "job";

/// Output path handed to every subjob, always ending with exactly one separator.
/// Without an explicit path the command itself, with spaces replaced, is used.
pub fn resolve_output_path(path: Option<&str>, command: &str) -> String {
    let mut path = match path.filter(|path| !path.is_empty()) {
        Some(path) => path.to_string(),
        None => command.replace(' ', "_"),
    };

    if !path.ends_with(MAIN_SEPARATOR) {
        path.push(MAIN_SEPARATOR);
    }

    path
}

/// `<path>job`, the directory handed to `#PBS -o` and `#PBS -e`
pub fn job_log_dir(path: &str) -> String {
    format!("{path}{JOB_LOG_DIR}")
}

/// create the output folder including the job log folder, existing folders are left untouched
pub fn prepare_output_dir(path: &str) -> io::Result<PathBuf> {
    let dir = PathBuf::from(job_log_dir(path));

    fs::create_dir_all(&dir)?;
    debug!(dir = ?dir, "Output folder ready");

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_missing_separator() {
        assert_eq!(
            resolve_output_path(Some("/scratch/run"), "echo"),
            format!("/scratch/run{MAIN_SEPARATOR}")
        );
    }

    #[test]
    fn keeps_existing_separator() {
        let path = format!("/scratch/run{MAIN_SEPARATOR}");

        assert_eq!(resolve_output_path(Some(&path), "echo"), path);
    }

    #[test]
    fn defaults_to_sanitized_command() {
        assert_eq!(
            resolve_output_path(None, "python sim.py 3"),
            format!("python_sim.py_3{MAIN_SEPARATOR}")
        );
        assert_eq!(
            resolve_output_path(Some(""), "sim"),
            format!("sim{MAIN_SEPARATOR}")
        );
    }

    #[test]
    fn repeated_creation_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let path = resolve_output_path(tmp.path().join("out").to_str(), "echo");

        let first = prepare_output_dir(&path).unwrap();
        let second = prepare_output_dir(&path).unwrap();

        assert_eq!(first, second);
        assert!(first.is_dir());
        assert!(first.ends_with(JOB_LOG_DIR));
    }

    #[test]
    fn creation_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "not a folder").unwrap();

        let path = resolve_output_path(blocker.to_str(), "echo");

        assert!(prepare_output_dir(&path).is_err());
    }
}
