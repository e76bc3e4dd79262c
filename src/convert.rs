use crate::error::StageError;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Turns one downloaded table into comma-delimited text at `output`.
pub trait FormatConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), StageError>;
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs an external program once per table. `{input}` and `{output}` in the argument list are
/// replaced by the two paths. Non-zero exit, timeout, and a missing output file all count as
/// a failed conversion.
#[derive(Clone, Debug)]
pub struct CommandConverter {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandConverter {
    pub fn new<I, S>(program: impl Into<String>, args: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { program: program.into(), args: args.into_iter().map(Into::into).collect(), timeout }
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

fn drain<R: Read + Send + 'static>(src: Option<R>) -> Option<JoinHandle<String>> {
    src.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(h: Option<JoinHandle<String>>) -> String {
    h.and_then(|h| h.join().ok()).unwrap_or_default()
}

impl FormatConverter for CommandConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), StageError> {
        let mut child = Command::new(&self.program)
            .args(self.render_args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes on their own threads so a chatty converter cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(StageError::Timeout { input: input.to_path_buf(), timeout: self.timeout });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if !status.success() {
            if !stdout.trim().is_empty() {
                tracing::info!("converter stdout: {}", stdout.trim());
            }
            return Err(StageError::Convert { input: input.to_path_buf(), status: status.to_string(), stderr: stderr.trim().to_string() });
        }
        if !stdout.trim().is_empty() {
            tracing::info!("converter stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            tracing::info!("converter stderr: {}", stderr.trim());
        }
        if !output.is_file() {
            return Err(StageError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}
