//! Out-of-process inference for loan approval
//!
//! Every prediction launches one short-lived worker process (an R
//! interpreter running the bundled routine by default), hands it the feature
//! record, and reads a JSON result from its stdout.

use crate::config::{InputMode, WorkerConfig};
use crate::error::InvocationError;
use crate::types::features::FeatureRecord;
use crate::types::prediction::PredictionResult;
use async_trait::async_trait;
use serde::Deserialize;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, error, info, warn};

/// R routine run by the default worker command
pub const PREDICTION_ROUTINE: &str = include_str!("predict_loan.R");

/// Environment variable carrying the artifact path to the worker
pub const MODEL_PATH_ENV: &str = "LOAN_MODEL_PATH";

/// Something that can score a single loan application.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Score one record, giving up after `deadline`.
    async fn predict(
        &self,
        record: &FeatureRecord,
        deadline: Duration,
    ) -> Result<PredictionResult, InvocationError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// What the worker prints on success
#[derive(Debug, Deserialize)]
struct WorkerOutput {
    probability: f64,
    #[serde(default)]
    prediction: Option<String>,
}

/// Runs predictions in a fresh worker process per call
pub struct ScriptWorker {
    program: String,
    args: Vec<String>,
    input_mode: InputMode,
    model_path: PathBuf,
}

impl ScriptWorker {
    /// Create a worker from configuration
    pub fn new(config: &WorkerConfig, model_path: impl Into<PathBuf>) -> Self {
        let args = if config.args.is_empty() {
            vec!["-e".to_string(), PREDICTION_ROUTINE.to_string()]
        } else {
            config.args.clone()
        };

        Self::with_command(&config.program, args, config.input_mode, model_path)
    }

    /// Create a worker running an explicit command
    pub fn with_command(
        program: &str,
        args: Vec<String>,
        input_mode: InputMode,
        model_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.to_string(),
            args,
            input_mode,
            model_path: model_path.into(),
        }
    }

    /// Run one prediction in a new worker process.
    ///
    /// The process is killed if it outlives `deadline`. Any input file is
    /// removed before this returns.
    pub async fn invoke(
        &self,
        record: &FeatureRecord,
        deadline: Duration,
    ) -> Result<PredictionResult, InvocationError> {
        let input = record
            .to_worker_input()
            .map_err(|e| InvocationError::launch(e.into()))?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(MODEL_PATH_ENV, &self.model_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own process group so a timeout also reaches anything the worker forked
        #[cfg(unix)]
        command.process_group(0);

        // Held until the call returns; dropping it deletes the file.
        let _input_file = match self.input_mode {
            InputMode::Stdin => {
                command.stdin(Stdio::piped());
                None
            }
            InputMode::Argument => {
                command.arg(&input).stdin(Stdio::null());
                None
            }
            InputMode::File => {
                let file = write_input_file(&input).map_err(InvocationError::launch)?;
                command.arg(file.path()).stdin(Stdio::null());
                Some(file)
            }
        };

        let started = Instant::now();
        let mut child = command.spawn().map_err(InvocationError::launch)?;
        debug!(pid = ?child.id(), program = %self.program, "Prediction worker started");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let (_, status, stdout, stderr) = tokio::try_join!(
                feed_stdin(stdin, input.as_bytes()),
                child.wait(),
                read_pipe(stdout),
                read_pipe(stderr),
            )?;
            Ok::<_, io::Error>((status, stdout, stderr))
        };
        let outcome = tokio::time::timeout(deadline, run).await;

        let (status, stdout, stderr) = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                terminate(&mut child).await;
                error!(error = %e, "Lost contact with prediction worker");
                return Err(InvocationError::launch(e));
            }
            Err(_) => {
                terminate(&mut child).await;
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "Prediction worker timed out and was killed"
                );
                return Err(InvocationError::Timeout(deadline));
            }
        };

        let elapsed = started.elapsed();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            error!(
                status = ?status.code(),
                stderr = %stderr,
                elapsed_ms = elapsed.as_millis() as u64,
                "Prediction worker failed"
            );
            return Err(InvocationError::Worker {
                status: status.code(),
                stderr,
            });
        }

        let raw = String::from_utf8_lossy(&stdout).trim().to_string();
        let result = parse_output(&raw).inspect_err(|e| {
            error!(error = %e, "Prediction worker returned unusable output");
        })?;

        info!(
            probability = result.probability,
            label = %result.label,
            elapsed_ms = elapsed.as_millis() as u64,
            "Prediction worker finished"
        );

        Ok(result)
    }
}

#[async_trait]
impl Predictor for ScriptWorker {
    async fn predict(
        &self,
        record: &FeatureRecord,
        deadline: Duration,
    ) -> Result<PredictionResult, InvocationError> {
        self.invoke(record, deadline).await
    }

    fn describe(&self) -> String {
        format!("{} ({:?} input)", self.program, self.input_mode)
    }
}

/// Parse worker stdout into a prediction.
///
/// Label and confidence are recomputed from the probability.
pub fn parse_output(raw: &str) -> Result<PredictionResult, InvocationError> {
    let malformed = |reason: String| InvocationError::MalformedOutput {
        raw: raw.to_string(),
        reason,
    };

    let output: WorkerOutput = serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;

    if !(0.0..=1.0).contains(&output.probability) {
        return Err(malformed(format!(
            "probability {} outside [0, 1]",
            output.probability
        )));
    }

    let result = PredictionResult::from_probability(output.probability);

    if let Some(reported) = output.prediction.as_deref() {
        if reported != result.label.as_str() {
            warn!(
                reported = %reported,
                derived = %result.label,
                probability = result.probability,
                "Worker label disagrees with its probability, using derived label"
            );
        }
    }

    Ok(result)
}

fn write_input_file(input: &str) -> io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("loan-input-")
        .suffix(".json")
        .tempfile()?;
    file.write_all(input.as_bytes())?;
    file.flush()?;
    Ok(file)
}

async fn feed_stdin(stdin: Option<ChildStdin>, input: &[u8]) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };

    match stdin.write_all(input).await {
        // worker exited without reading its input; its status tells the story
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        // dropping stdin closes the pipe so the worker sees EOF
        other => other,
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        kill_process_group(pid).await;
    }
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill prediction worker");
    }
}

/// SIGKILL every process in the worker's group. The group id equals the
/// worker pid because the worker is spawned with `process_group(0)`.
#[cfg(unix)]
async fn kill_process_group(pgid: u32) {
    let status = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{}", pgid)])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => debug!(pgid = pgid, "Killed worker process group"),
        Ok(status) => warn!(pgid = pgid, status = ?status.code(), "Failed to kill worker process group"),
        Err(e) => warn!(pgid = pgid, error = %e, "Failed to kill worker process group"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::types::prediction::Label;

    fn shell_worker(script: &str, input_mode: InputMode) -> ScriptWorker {
        ScriptWorker::with_command(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            input_mode,
            "/tmp/loan-test-model.rds",
        )
    }

    fn record() -> FeatureRecord {
        FeatureRecord::new(35, 75000, 16, 10, 750)
    }

    #[test]
    fn test_default_command_runs_bundled_routine() {
        let worker = ScriptWorker::new(&WorkerConfig::default(), "/app/model/model.rds");

        assert_eq!(worker.program, "Rscript");
        assert_eq!(worker.args[0], "-e");
        assert!(worker.args[1].contains("readRDS(model_path)"));
        assert!(worker.args[1].contains(MODEL_PATH_ENV));
        assert_eq!(worker.input_mode, InputMode::Stdin);
    }

    #[test]
    fn test_parse_output() {
        let result =
            parse_output(r#"{"probability":0.82,"prediction":"approved","confidence":0.64}"#)
                .unwrap();
        assert_eq!(result.probability, 0.82);
        assert_eq!(result.label, Label::Approved);

        // derived label wins over a disagreeing worker
        let result = parse_output(r#"{"probability":0.2,"prediction":"approved"}"#).unwrap();
        assert_eq!(result.label, Label::Denied);

        assert!(matches!(
            parse_output("Error: object 'model' not found"),
            Err(InvocationError::MalformedOutput { .. })
        ));
        assert!(matches!(
            parse_output(r#"{"probability":1.5}"#),
            Err(InvocationError::MalformedOutput { .. })
        ));
        assert!(matches!(
            parse_output(r#"{"prediction":"approved"}"#),
            Err(InvocationError::MalformedOutput { .. })
        ));
    }

    #[tokio::test]
    async fn test_stdin_input() {
        let script = r#"
            input=$(cat)
            [ "$input" = '{"age":35,"income":75000,"education":16,"experience":10,"credit_score":750}' ] || exit 9
            echo '{"probability":0.82,"prediction":"approved","confidence":0.64}'
        "#;
        let worker = shell_worker(script, InputMode::Stdin);

        let result = worker.invoke(&record(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(result.probability, 0.82);
        assert_eq!(result.label, Label::Approved);
        assert!((result.confidence - 0.64).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_argument_input() {
        let script = r#"
            case "$0" in
                *'"credit_score":750'*) echo '{"probability":0.3}' ;;
                *) exit 4 ;;
            esac
        "#;
        let worker = shell_worker(script, InputMode::Argument);

        let result = worker.invoke(&record(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(result.label, Label::Denied);
    }

    #[tokio::test]
    async fn test_file_input_is_removed() {
        // report the input path on stderr, then fail so the path comes back to us
        let script = r#"
            grep -q '"income":75000' "$0" || exit 5
            echo "$0" >&2
            exit 1
        "#;
        let worker = shell_worker(script, InputMode::File);

        let err = worker.invoke(&record(), Duration::from_secs(10)).await.unwrap_err();
        let path = match err {
            InvocationError::Worker { status, stderr } => {
                assert_eq!(status, Some(1));
                stderr
            }
            other => panic!("unexpected error: {other}"),
        };
        assert!(path.ends_with(".json"));
        assert!(!std::path::Path::new(&path).exists());
    }

    #[tokio::test]
    async fn test_model_path_is_exported() {
        let script = r#"
            [ "$LOAN_MODEL_PATH" = /tmp/loan-test-model.rds ] || exit 6
            echo '{"probability":0.5}'
        "#;
        let worker = shell_worker(script, InputMode::Stdin);

        let result = worker.invoke(&record(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(result.label, Label::Denied);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let script = r#"
            echo 'Error in readRDS(model_path) : cannot open the connection' >&2
            exit 1
        "#;
        let worker = shell_worker(script, InputMode::Stdin);

        match worker.invoke(&record(), Duration::from_secs(10)).await {
            Err(InvocationError::Worker { status, stderr }) => {
                assert_eq!(status, Some(1));
                assert_eq!(stderr, "Error in readRDS(model_path) : cannot open the connection");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_output() {
        let worker = shell_worker("echo 'probability: high'", InputMode::Stdin);

        match worker.invoke(&record(), Duration::from_secs(10)).await {
            Err(InvocationError::MalformedOutput { raw, .. }) => {
                assert_eq!(raw, "probability: high");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let worker = ScriptWorker::with_command(
            "/nonexistent/bin/Rscript",
            Vec::new(),
            InputMode::Stdin,
            "/tmp/model.rds",
        );

        let err = worker.invoke(&record(), Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, InvocationError::Worker { status: None, .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_worker() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("worker.pid");
        let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
        let worker = shell_worker(&script, InputMode::Argument);

        let started = Instant::now();
        let err = worker
            .invoke(&record(), Duration::from_millis(300))
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::Timeout(d) if d == Duration::from_millis(300)));
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = std::process::Command::new("kill")
            .args(["-0", pid.trim()])
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success();
        assert!(!alive, "worker {} still running after timeout", pid.trim());
    }

    /// Gone or a zombie waiting to be reaped
    #[cfg(target_os = "linux")]
    fn is_dead(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_forked_children() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
        let worker = shell_worker(&script, InputMode::Argument);

        let err = worker
            .invoke(&record(), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::Timeout(_)));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let mut dead = is_dead(pid);
        for _ in 0..50 {
            if dead {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            dead = is_dead(pid);
        }
        assert!(dead, "forked process {} still running after timeout", pid);
    }

    #[tokio::test]
    async fn test_predictor_trait_object() {
        let predictor: Box<dyn Predictor> =
            Box::new(shell_worker("echo '{\"probability\":0.9}'", InputMode::Stdin));

        assert!(predictor.describe().starts_with("sh"));
        let result = predictor.predict(&record(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(result.label, Label::Approved);
    }
}
