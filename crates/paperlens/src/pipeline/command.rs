//! Child-process invocation of an external stage capability.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command as TokioCommand;

use crate::config::CommandConfig;
use crate::sanitize;
use crate::secrets::{resolve_secret, SecretError};

use super::error::StageError;

/// How much captured output is kept for diagnostics.
const DIAGNOSTIC_CHARS: usize = 2000;

/// A configured external program plus its argument templates.
pub struct CapabilityCommand {
    program: String,
    args: Vec<String>,
    working_directory: Option<PathBuf>,
    env: Vec<(String, SecretString)>,
}

impl CapabilityCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_directory: None,
            env: Vec::new(),
        }
    }

    /// Builds the command, resolving every configured environment secret up
    /// front so a missing credential fails at startup rather than mid-run.
    pub fn from_config(config: &CommandConfig) -> Result<Self, SecretError> {
        let env = config
            .env
            .iter()
            .map(|var| {
                let value = resolve_secret(
                    var.value.as_deref(),
                    var.value_file.as_deref(),
                    var.value_env_var.as_deref(),
                )?;
                Ok((var.name.clone(), value))
            })
            .collect::<Result<Vec<_>, SecretError>>()?;

        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_directory: config
                .working_directory
                .as_deref()
                .filter(|d| !d.is_empty())
                .map(|d| PathBuf::from(crate::secrets::expand_home(d))),
            env,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with each `{name}` placeholder replaced by its path.
    pub fn render_args(&self, placeholders: &[(&str, &Path)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                placeholders
                    .iter()
                    .fold(arg.clone(), |acc, (name, path)| {
                        acc.replace(&format!("{{{}}}", name), &path.to_string_lossy())
                    })
            })
            .collect()
    }

    /// Runs the program to completion with stdin closed.
    ///
    /// The child is killed if the returned future is dropped, which is how
    /// stage deadlines stop a hung capability.
    pub async fn run(&self, placeholders: &[(&str, &Path)]) -> Result<CommandOutput, StageError> {
        let args = self.render_args(placeholders);
        log::debug!("Running {} with {} args", self.program, args.len());

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        for (name, value) in &self.env {
            cmd.env(name, value.expose_secret());
        }

        let output = cmd.output().await.map_err(|e| StageError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        Ok(CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Runs the program and turns a non-zero exit into a stage error.
    pub async fn run_checked(
        &self,
        placeholders: &[(&str, &Path)],
    ) -> Result<CommandOutput, StageError> {
        let output = self.run(placeholders).await?;
        if !output.success() {
            return Err(StageError::ExitFailure {
                program: self.program.clone(),
                status: output.status.to_string(),
                diagnostics: output.diagnostics(),
            });
        }
        if !output.stderr.trim().is_empty() {
            log::debug!(
                "{} wrote to stderr: {}",
                self.program,
                sanitize::diagnostic_tail(&output.stderr, 500)
            );
        }
        Ok(output)
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Tail of stderr then stdout, for operator logs.
    pub fn diagnostics(&self) -> String {
        let combined = match (self.stderr.trim(), self.stdout.trim()) {
            ("", "") => String::new(),
            (err, "") => err.to_string(),
            ("", out) => out.to_string(),
            (err, out) => format!("{}\n--- stdout ---\n{}", err, out),
        };
        sanitize::diagnostic_tail(&combined, DIAGNOSTIC_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvVarConfig;

    fn config(env: Vec<EnvVarConfig>) -> CommandConfig {
        CommandConfig {
            program: "extract".to_string(),
            args: vec![
                "--in={source}".to_string(),
                "{output}".to_string(),
                "-v".to_string(),
            ],
            working_directory: None,
            timeout_secs: None,
            env,
        }
    }

    #[test]
    fn test_render_args_substitutes_placeholders() {
        let cmd = CapabilityCommand::from_config(&config(vec![])).unwrap();
        let args = cmd.render_args(&[
            ("source", Path::new("/d/paper.pdf")),
            ("output", Path::new("/t/1.txt")),
        ]);
        assert_eq!(args, vec!["--in=/d/paper.pdf", "/t/1.txt", "-v"]);
    }

    #[test]
    fn test_from_config_requires_resolvable_secrets() {
        let missing = EnvVarConfig {
            name: "OPENAI_API_KEY".to_string(),
            value: None,
            value_file: None,
            value_env_var: Some("PAPERLENS_TEST_UNSET_KEY_8731".to_string()),
        };
        assert!(matches!(
            CapabilityCommand::from_config(&config(vec![missing])),
            Err(SecretError::EnvVarNotSet { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output_and_env() {
        let direct = EnvVarConfig {
            name: "PAPERLENS_GREETING".to_string(),
            value: Some("hello".to_string()),
            value_file: None,
            value_env_var: None,
        };
        let mut cfg = config(vec![direct]);
        cfg.program = "/bin/sh".to_string();
        cfg.args = vec![
            "-c".to_string(),
            "echo $PAPERLENS_GREETING; echo oops >&2; exit 3".to_string(),
        ];
        let cmd = CapabilityCommand::from_config(&cfg).unwrap();

        let output = cmd.run(&[]).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert!(output.diagnostics().starts_with("oops"));

        let err = cmd.run_checked(&[]).await.unwrap_err();
        assert!(matches!(err, StageError::ExitFailure { .. }));
        assert!(err.diagnostics().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let cmd = CapabilityCommand::new("/nonexistent/paperlens-extractor", vec![]);
        assert!(matches!(
            cmd.run(&[]).await,
            Err(StageError::Spawn { .. })
        ));
    }
}
