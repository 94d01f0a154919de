//! Runs one target command with streaming output

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use indexmap::IndexMap;

use crate::config::CommandSpec;
use crate::error::HostError;
use crate::types::{BuildEvent, BuildEventType, StepResult, now_ms};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs build commands, honouring a shared cancel flag
pub struct CommandRunner {
    cancel_flag: Arc<AtomicBool>,
    event_sender: Option<Sender<BuildEvent>>,
}

impl CommandRunner {
    pub fn new(cancel_flag: Arc<AtomicBool>, event_sender: Option<Sender<BuildEvent>>) -> Self {
        Self {
            cancel_flag,
            event_sender,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    /// Run `spec` for `target` and wait for it (blocking, streams events)
    pub fn run(
        &self,
        target: &str,
        spec: &CommandSpec,
        cwd: Option<&Path>,
        env: &IndexMap<String, String>,
    ) -> Result<StepResult, HostError> {
        let start_time = Instant::now();
        let command_line = spec.display();

        if self.is_cancelled() {
            return Ok(StepResult {
                success: false,
                exit_code: -1,
                cancelled: true,
                duration_ms: 0,
            });
        }

        tracing::info!("[{}] {}", target, command_line);

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        // Own process group, so cancelling also reaches the tools the
        // command spawns (sh -> sleep, cargo -> rustc) that hold our pipes.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| HostError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let stdout_handle = child
            .stdout
            .take()
            .map(|stdout| self.stream_lines(target, stdout));
        let stderr_handle = child
            .stderr
            .take()
            .map(|stderr| self.stream_lines(target, stderr));

        let mut cancelled = false;
        let status = loop {
            if self.is_cancelled() {
                tracing::info!("[{}] cancelling `{}`", target, command_line);
                kill_process_tree(&mut child);
                cancelled = true;
            }
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) if cancelled => break child.wait(),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => break Err(e),
            }
        };

        for handle in [stdout_handle, stderr_handle].into_iter().flatten() {
            let _ = handle.join();
        }

        let status = status.map_err(|source| HostError::Wait {
            command: command_line,
            source,
        })?;

        Ok(StepResult {
            success: status.success() && !cancelled,
            exit_code: status.code().unwrap_or(-1),
            cancelled,
            duration_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Forward each line of a child pipe as log output and build events
    fn stream_lines<R: Read + Send + 'static>(
        &self,
        target: &str,
        pipe: R,
    ) -> JoinHandle<()> {
        let target = target.to_string();
        let event_sender = self.event_sender.clone();
        thread::spawn(move || {
            let reader = BufReader::new(pipe);
            for line in reader.lines().map_while(Result::ok) {
                let progress = parse_build_progress(&line);
                let event_type = classify_line(&line, progress);
                match event_type {
                    BuildEventType::Error => tracing::warn!("[{}] {}", target, line),
                    _ => tracing::debug!("[{}] {}", target, line),
                }
                if let Some(sender) = &event_sender {
                    let _ = sender.send(BuildEvent {
                        event_type,
                        target: Some(target.clone()),
                        message: line,
                        progress,
                        timestamp: now_ms(),
                    });
                }
            }
        })
    }
}

/// Kill `child` together with everything in its process group
fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own group, see `process_group(0)` above.
        let pgid = child.id() as libc::pid_t;
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
            return;
        }
        tracing::debug!(
            "killpg({}) failed: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
    let _ = child.kill();
}

fn classify_line(line: &str, progress: Option<f32>) -> BuildEventType {
    if line.contains("error") || line.contains("Error") {
        BuildEventType::Error
    } else if line.contains("warning") || line.contains("Warning") {
        BuildEventType::Warning
    } else if progress.is_some() {
        BuildEventType::Progress
    } else {
        BuildEventType::Output
    }
}

/// Parse `[current/total]` progress prefixes, as printed by ninja and
/// similar build tools.
fn parse_build_progress(line: &str) -> Option<f32> {
    let rest = line.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    let (current, total) = rest[..end].split_once('/')?;
    let current = current.trim().parse::<f32>().ok()?;
    let total = total.trim().parse::<f32>().ok()?;
    (total > 0.0).then_some((current / total) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_progress() {
        assert_eq!(parse_build_progress("[1/10] Compiling"), Some(10.0));
        assert_eq!(parse_build_progress("[5/10] Linking"), Some(50.0));
        assert_eq!(parse_build_progress("  [10/10] Done"), Some(100.0));
        assert_eq!(parse_build_progress("[3/0] Broken"), None);
        assert_eq!(parse_build_progress("Some other output"), None);
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("error[E0308]: mismatched types", None), BuildEventType::Error);
        assert_eq!(classify_line("warning: unused variable", None), BuildEventType::Warning);
        assert_eq!(classify_line("[2/4] cc foo.c", Some(50.0)), BuildEventType::Progress);
        assert_eq!(classify_line("Finished", None), BuildEventType::Output);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn sh(script: &str) -> CommandSpec {
            CommandSpec {
                command: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
            }
        }

        #[test]
        fn test_run_streams_output() {
            let (tx, rx) = crossbeam_channel::unbounded();
            let runner = CommandRunner::new(Arc::new(AtomicBool::new(false)), Some(tx));

            let result = runner
                .run("lib", &sh("echo '[1/2] one'; echo oops error >&2"), None, &IndexMap::new())
                .unwrap();
            assert!(result.success);
            assert_eq!(result.exit_code, 0);
            drop(runner);

            let events: Vec<BuildEvent> = rx.iter().collect();
            assert!(events.iter().any(|e| e.event_type == BuildEventType::Progress && e.progress == Some(50.0)));
            assert!(events.iter().any(|e| e.event_type == BuildEventType::Error));
            assert!(events.iter().all(|e| e.target.as_deref() == Some("lib")));
        }

        #[test]
        fn test_run_failure_and_env() {
            let runner = CommandRunner::new(Arc::new(AtomicBool::new(false)), None);
            let mut env = IndexMap::new();
            env.insert("NEOBUILD_TEST_CODE".to_string(), "3".to_string());

            let result = runner
                .run("lib", &sh("exit $NEOBUILD_TEST_CODE"), None, &env)
                .unwrap();
            assert!(!result.success);
            assert_eq!(result.exit_code, 3);
            assert!(!result.cancelled);
        }

        #[test]
        fn test_cancel_kills_child() {
            let flag = Arc::new(AtomicBool::new(false));
            let runner = CommandRunner::new(flag.clone(), None);

            let canceller = thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                flag.store(true, Ordering::Relaxed);
            });
            let result = runner.run("lib", &sh("exec sleep 30"), None, &IndexMap::new()).unwrap();
            canceller.join().unwrap();

            assert!(result.cancelled);
            assert!(!result.success);
            assert!(result.duration_ms < 30_000);
        }

        #[test]
        fn test_cancel_kills_shell_grandchildren() {
            let flag = Arc::new(AtomicBool::new(false));
            let runner = CommandRunner::new(flag.clone(), None);

            let canceller = thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                flag.store(true, Ordering::Relaxed);
            });
            let started = Instant::now();
            let result = runner
                .run("lib", &sh("sleep 4; true"), None, &IndexMap::new())
                .unwrap();
            canceller.join().unwrap();

            assert!(result.cancelled);
            assert!(!result.success);
            assert!(
                started.elapsed() < Duration::from_secs(2),
                "cancel took {:?}",
                started.elapsed()
            );
        }

        #[test]
        fn test_spawn_error() {
            let runner = CommandRunner::new(Arc::new(AtomicBool::new(false)), None);
            let spec = CommandSpec {
                command: "/nonexistent/neobuild-tool".to_string(),
                args: vec![],
            };
            let result = runner.run("lib", &spec, None, &IndexMap::new());
            assert!(matches!(result, Err(HostError::Spawn { .. })));
        }
    }
}
