//! Receiver session - spawns readsb and feeds its output to the processor

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::pipeline::{MessageProcessor, TrackView};

use super::diagnostics::UpstreamFailure;
use super::segmenter::{LineSource, RawLine};

/// A running receiver process plus the thread that interprets its output
pub struct MonitorSession {
    view: TrackView,
    running: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    intake: Option<JoinHandle<()>>,
    processor: Option<thread::JoinHandle<()>>,
    failure_rx: Receiver<UpstreamFailure>,
    pid: Option<u32>,
}

impl MonitorSession {
    /// Spawn the configured receiver and start monitoring.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &Config) -> Result<Self> {
        let args = config.receiver_args();
        info!("Starting receiver: {} {}", config.readsb_path, args.join(" "));

        let mut command = Command::new(&config.readsb_path);
        command.args(&args);
        Self::start_with(command, config)
    }

    /// Start monitoring the output of an arbitrary receiver command
    pub fn start_with(mut command: Command, config: &Config) -> Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().context("Failed to spawn receiver")?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .context("Failed to capture receiver stdout")?;
        let stderr = child
            .stderr
            .take()
            .context("Failed to capture receiver stderr")?;

        let view = TrackView::new(config.max_display_rows);
        let running = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (line_tx, line_rx) = crossbeam_channel::unbounded::<RawLine>();
        let (failure_tx, failure_rx) = crossbeam_channel::unbounded::<UpstreamFailure>();

        let processor = MessageProcessor::new(
            config.local_decoding,
            config.reference(),
            view.clone(),
            failure_tx.clone(),
        );
        let processor_running = running.clone();
        let processor = thread::Builder::new()
            .name("adsb-processor".into())
            .spawn(move || processor.run(line_rx, processor_running))
            .context("Failed to spawn processor thread")?;

        let lines = LinesStream::new(BufReader::new(stdout).lines())
            .map(|line| (LineSource::Stdout, line))
            .merge(
                LinesStream::new(BufReader::new(stderr).lines())
                    .map(|line| (LineSource::Stderr, line)),
            );

        let intake = Intake {
            child,
            failure_tx,
            view: view.clone(),
            running: running.clone(),
        };
        let intake = tokio::spawn(intake.run(lines, line_tx, stop_rx));

        info!("Receiver started (pid {:?})", pid);

        Ok(Self {
            view,
            running,
            stop_tx,
            intake: Some(intake),
            processor: Some(processor),
            failure_rx,
            pid,
        })
    }

    /// Read handle onto the live tracks
    pub fn view(&self) -> TrackView {
        self.view.clone()
    }

    /// Receiver problems, in the order they were detected
    pub fn failures(&self) -> Receiver<UpstreamFailure> {
        self.failure_rx.clone()
    }

    /// True while monitoring is active and the receiver is still producing
    /// output
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.intake.as_ref().is_some_and(|intake| !intake.is_finished())
    }

    /// Stop the receiver and wait for all output to be processed
    pub async fn stop(mut self) -> Result<()> {
        info!("Stopping monitor session");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(true);

        if let Some(intake) = self.intake.take() {
            intake.await.context("Receiver intake task failed")?;
        }
        if let Some(processor) = self.processor.take() {
            tokio::task::spawn_blocking(move || processor.join())
                .await
                .context("Failed to join processor thread")?
                .map_err(|_| anyhow!("Message processor panicked"))?;
        }

        info!("Monitor session stopped. {}", self.view.stats());
        Ok(())
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        if self.intake.is_none() {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(true);
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                signal_group(pid);
            }
        }
    }
}

/// Reader side of the session, owned by one Tokio task
struct Intake {
    child: Child,
    failure_tx: Sender<UpstreamFailure>,
    view: TrackView,
    running: Arc<AtomicBool>,
}

impl Intake {
    async fn run<S>(
        mut self,
        mut lines: S,
        line_tx: Sender<RawLine>,
        mut stop_rx: watch::Receiver<bool>,
    ) where
        S: tokio_stream::Stream<Item = (LineSource, std::io::Result<String>)> + Unpin,
    {
        let mut seq = 0u64;
        let mut stop_requested = false;

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    stop_requested = true;
                    break;
                }
                next = lines.next() => match next {
                    Some((source, Ok(text))) => {
                        seq += 1;
                        let line = RawLine::new(seq, source, text, Utc::now());
                        if line_tx.send(line).is_err() {
                            warn!("Line channel closed, stopping intake");
                            break;
                        }
                    }
                    Some((source, Err(e))) => {
                        error!("Error reading receiver {:?}: {}", source, e);
                        break;
                    }
                    None => {
                        info!("Receiver output closed");
                        break;
                    }
                }
            }
        }

        // Closing the channel lets the processor finish once it has drained it
        drop(line_tx);

        let status = if stop_requested {
            self.terminate();
            self.child.wait().await
        } else {
            let exited = tokio::select! {
                status = self.child.wait() => Some(status),
                _ = stop_rx.changed() => None,
            };
            match exited {
                Some(status) => status,
                None => {
                    self.terminate();
                    self.child.wait().await
                }
            }
        };

        let status = match status {
            Ok(status) => status.to_string(),
            Err(e) => format!("unknown status ({e})"),
        };

        if self.running.load(Ordering::SeqCst) {
            let failure = UpstreamFailure::Exited(status);
            error!("READSB ERROR: {}", failure);
            self.view.stats().record_upstream_failure();
            let _ = self.failure_tx.send(failure);
        } else {
            info!("Receiver exited: {}", status);
        }
    }

    /// Ask the receiver and everything it spawned to exit
    fn terminate(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                if signal_group(pid) {
                    return;
                }
            }
        }
        if let Err(e) = self.child.start_kill() {
            debug!("Receiver already gone: {}", e);
        }
    }
}

/// SIGTERM the process group led by `pid`
#[cfg(unix)]
fn signal_group(pid: u32) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: killpg has no memory-safety preconditions
    let rc = unsafe { libc::killpg(pgid, libc::SIGTERM) };
    if rc != 0 {
        debug!("killpg({}) failed: {}", pgid, std::io::Error::last_os_error());
    }
    rc == 0
}
