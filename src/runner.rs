//! Benchmark runner backed by an external executable.
//!
//! The runner is invoked as `<runner> collective algorithm n ppn msg_size
//! [nodefile]` and prints a latency table whose rows start with the message
//! size, e.g. `65536    821.05`.

use crate::config::TunerConfig;
use crate::core::error::{JobContext, Result, TunerError};
use crate::core::traits::BenchmarkRunner;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Extract the latency reported for `job.msg_size` from runner output.
///
/// Every line whose first token equals the message size contributes its
/// second token; several matching lines are averaged. No matching line is
/// an error carrying the job parameters.
pub fn parse_runner_output(stdout: &str, job: &JobContext) -> Result<f64> {
    let size = job.msg_size.to_string();
    let latencies: Vec<f64> = stdout
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next()) {
                (Some(first), Some(value)) if first == size => value.parse::<f64>().ok(),
                _ => None,
            }
        })
        .collect();

    if latencies.is_empty() {
        return Err(TunerError::runner_output(
            job,
            format!("no latency line for message size {}", size),
        ));
    }
    Ok(latencies.iter().sum::<f64>() / latencies.len() as f64)
}

/// Runs benchmarks through the configured executables.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: PathBuf,
    composition_program: Option<PathBuf>,
}

impl CommandRunner {
    /// Runner for a single executable.
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        CommandRunner {
            program: program.into(),
            composition_program: None,
        }
    }

    /// Runner using the executables named in the configuration.
    pub fn from_config(config: &TunerConfig) -> Self {
        CommandRunner {
            program: config.runner.clone(),
            composition_program: config.alt_runner.clone(),
        }
    }

    fn program_for(&self, collective: &str) -> &Path {
        match &self.composition_program {
            Some(alt) if collective.ends_with(crate::core::constants::COMPOSITION_SUFFIX) => alt,
            _ => &self.program,
        }
    }

    fn command(&self, job: &JobContext, nodefile: Option<&Path>) -> Command {
        let mut command = Command::new(self.program_for(&job.collective));
        command
            .arg(&job.collective)
            .arg(&job.algorithm)
            .arg(job.n.to_string())
            .arg(job.ppn.to_string())
            .arg(job.msg_size.to_string());
        if let Some(path) = nodefile {
            command.arg(path);
        }
        command
    }
}

impl BenchmarkRunner for CommandRunner {
    fn run(&self, job: &JobContext, nodefile: Option<&Path>) -> Result<f64> {
        log::debug!(
            "running {}/{} n={} ppn={} msg_size={} nodefile={:?}",
            job.collective,
            job.algorithm,
            job.n,
            job.ppn,
            job.msg_size,
            nodefile
        );

        let output = self
            .command(job, nodefile)
            .output()
            .map_err(|e| TunerError::launch(job, format!("failed to start runner: {}", e)))?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            return Err(TunerError::launch(
                job,
                format!(
                    "runner exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        parse_runner_output(&stdout, job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn job(msg_size: u64) -> JobContext {
        JobContext {
            collective: "bcast".to_string(),
            algorithm: "binomial".to_string(),
            n: 1,
            ppn: 2,
            msg_size,
        }
    }

    #[test]
    fn test_parse_single_line() {
        let output = "# OSU MPI Broadcast Latency Test v7.5\n\
                      # Datatype: MPI_CHAR.\n\
                      # Size       Avg Latency(us)\n\
                      1                       2.20\n";
        assert_relative_eq!(parse_runner_output(output, &job(1)).unwrap(), 2.20);
    }

    #[test]
    fn test_parse_averages_repeats() {
        let output = "65536 800.0\n2 1.0\n65536 900.0\n";
        assert_relative_eq!(parse_runner_output(output, &job(65536)).unwrap(), 850.0);
    }

    #[test]
    fn test_parse_missing_size() {
        let err = parse_runner_output("1 2.0\n# Size 4\n", &job(4)).unwrap_err();
        assert_eq!(err.category(), "runner_output");
        assert!(err.to_string().contains("msg_size=4"));
    }

    #[test]
    fn test_composition_collectives_use_alt_program() {
        let config = crate::config::ConfigBuilder::new()
            .runner("collect.sh")
            .alt_runner("collect_ch4.sh")
            .build()
            .unwrap();
        let runner = CommandRunner::from_config(&config);
        assert_eq!(runner.program_for("allreduce_ch4"), Path::new("collect_ch4.sh"));
        assert_eq!(runner.program_for("allreduce"), Path::new("collect.sh"));
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join(name);
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[test]
    fn test_command_runner_with_script() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = write_script(dir.path(), "runner.sh", "#!/bin/sh\necho \"# Size Avg\"\necho \"$5 3.5\"\n");

        let runner = CommandRunner::new(&script);
        assert_relative_eq!(runner.run(&job(8), None).unwrap(), 3.5);

        let missing = CommandRunner::new(dir.path().join("absent.sh"));
        assert_eq!(missing.run(&job(8), None).unwrap_err().category(), "launch");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_exit_is_a_launch_error_despite_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = write_script(
            dir.path(),
            "crashing.sh",
            "#!/bin/sh\necho \"$5 3.5\"\necho \"finalize failed\" >&2\nexit 1\n",
        );

        let err = CommandRunner::new(&script).run(&job(8), None).unwrap_err();
        assert!(matches!(err, TunerError::Launch { msg_size: 8, .. }));
        assert!(err.to_string().contains("finalize failed"));
    }
}
