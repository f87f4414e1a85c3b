use std::fmt::{Display, Formatter};
use std::process::{Child, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::backend::BackendCommand;
use crate::logging;

#[derive(Debug)]
pub enum ReindexError {
    Spawn(std::io::Error),
}

impl Display for ReindexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(error) => write!(f, "failed to start reindex job: {error}"),
        }
    }
}

impl std::error::Error for ReindexError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexOutcome {
    Started { pid: u32 },
    SkippedInFlight,
}

pub struct ReindexScheduler {
    command: BackendCommand,
    interval: Duration,
    overlap_guard: bool,
    running: Vec<Child>,
}

impl ReindexScheduler {
    pub fn new(command: BackendCommand, interval: Duration, overlap_guard: bool) -> Self {
        Self {
            command,
            interval,
            overlap_guard,
            running: Vec::new(),
        }
    }

    pub fn in_flight(&mut self) -> usize {
        self.reap();
        self.running.len()
    }

    pub fn fire(&mut self) -> Result<ReindexOutcome, ReindexError> {
        self.reap();
        if self.overlap_guard && !self.running.is_empty() {
            logging::info("reindex skipped: previous run still in flight");
            return Ok(ReindexOutcome::SkippedInFlight);
        }

        let child = self
            .command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(ReindexError::Spawn)?;
        let pid = child.id();
        logging::info(&format!("reindex started pid={pid} command={}", self.command));
        self.running.push(child);
        Ok(ReindexOutcome::Started { pid })
    }

    pub fn spawn(mut self) -> ReindexHandle {
        let (stop, stopped) = mpsc::channel::<()>();
        let thread = thread::spawn(move || loop {
            match stopped.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(error) = self.fire() {
                        logging::error(&error.to_string());
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        });

        ReindexHandle {
            stop: Some(stop),
            thread: Some(thread),
        }
    }

    fn reap(&mut self) {
        self.running.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                logging::info(&format!("reindex pid={} finished status={status}", child.id()));
                false
            }
            Ok(None) => true,
            Err(_) => false,
        });
    }
}

pub struct ReindexHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReindexHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ReindexHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
