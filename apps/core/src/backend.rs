use std::fmt::{Display, Formatter};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::logging;
use crate::protocol;

const REAP_POLL: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub enum BackendError {
    EmptyCommand,
    Spawn(std::io::Error),
    MissingPipe(&'static str),
    NotRunning,
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCommand => write!(f, "backend command is empty"),
            Self::Spawn(error) => write!(f, "failed to spawn backend: {error}"),
            Self::MissingPipe(name) => write!(f, "backend {name} pipe unavailable"),
            Self::NotRunning => write!(f, "backend process is not running"),
        }
    }
}

impl std::error::Error for BackendError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSignal {
    Line(String),
    Exited(Option<i32>),
}

pub type SignalCallback = Arc<dyn Fn(BackendSignal) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BackendCommand {
    pub fn from_argv(argv: &[String]) -> Result<Self, BackendError> {
        let (program, args) = argv.split_first().ok_or(BackendError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(BackendError::EmptyCommand);
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl Display for BackendCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

pub trait QueryChannel {
    fn write_line(&mut self, text: &str) -> Result<(), BackendError>;
    fn restart(&mut self) -> Result<(), BackendError>;
}

#[derive(Debug, Default)]
pub struct RecordingChannel {
    lines: Vec<String>,
    restarts: usize,
    dead: bool,
}

impl RecordingChannel {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    pub fn kill(&mut self) {
        self.dead = true;
    }
}

impl QueryChannel for RecordingChannel {
    fn write_line(&mut self, text: &str) -> Result<(), BackendError> {
        if self.dead {
            return Err(BackendError::NotRunning);
        }
        self.lines.push(text.to_string());
        Ok(())
    }

    fn restart(&mut self) -> Result<(), BackendError> {
        self.dead = false;
        self.restarts += 1;
        Ok(())
    }
}

pub struct BackendHandle {
    child: Arc<Mutex<Child>>,
    writer: Option<Sender<String>>,
    alive: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    reader_thread: Option<JoinHandle<()>>,
    writer_thread: Option<JoinHandle<()>>,
}

impl BackendHandle {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.lock().ok().map(|child| child.id())
    }

    pub fn write_line(&self, text: &str) -> Result<(), BackendError> {
        if !self.is_alive() {
            return Err(BackendError::NotRunning);
        }
        let writer = self.writer.as_ref().ok_or(BackendError::NotRunning)?;
        writer
            .send(protocol::encode_query(text))
            .map_err(|_| BackendError::NotRunning)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.writer.take();

        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.alive.store(false, Ordering::SeqCst);

        if let Some(thread) = self.writer_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.reader_thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        if self.reader_thread.is_some() || self.writer_thread.is_some() {
            self.shutdown();
        }
    }
}

pub fn spawn(
    command: &BackendCommand,
    on_signal: SignalCallback,
) -> Result<BackendHandle, BackendError> {
    let mut child = command
        .to_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(BackendError::Spawn)?;

    let stdin = child.stdin.take().ok_or(BackendError::MissingPipe("stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or(BackendError::MissingPipe("stdout"))?;
    logging::info(&format!("backend started pid={} command={command}", child.id()));

    let child = Arc::new(Mutex::new(child));
    let alive = Arc::new(AtomicBool::new(true));
    let stopping = Arc::new(AtomicBool::new(false));

    let (writer, queue) = mpsc::channel::<String>();
    let writer_thread = {
        let alive = Arc::clone(&alive);
        thread::spawn(move || write_loop(stdin, queue, alive))
    };
    let reader_thread = {
        let child = Arc::clone(&child);
        let alive = Arc::clone(&alive);
        let stopping = Arc::clone(&stopping);
        thread::spawn(move || read_loop(stdout, child, alive, stopping, on_signal))
    };

    Ok(BackendHandle {
        child,
        writer: Some(writer),
        alive,
        stopping,
        reader_thread: Some(reader_thread),
        writer_thread: Some(writer_thread),
    })
}

fn write_loop(mut stdin: ChildStdin, queue: Receiver<String>, alive: Arc<AtomicBool>) {
    for text in queue {
        let result = stdin
            .write_all(text.as_bytes())
            .and_then(|_| stdin.flush());
        if let Err(error) = result {
            logging::warn(&format!("backend write failed: {error}"));
            alive.store(false, Ordering::SeqCst);
            return;
        }
    }
}

fn read_loop(
    stdout: ChildStdout,
    child: Arc<Mutex<Child>>,
    alive: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    on_signal: SignalCallback,
) {
    let mut reader = BufReader::new(stdout);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) if buffer.last() == Some(&b'\n') => {
                buffer.pop();
                if buffer.last() == Some(&b'\r') {
                    buffer.pop();
                }
                on_signal(BackendSignal::Line(
                    String::from_utf8_lossy(&buffer).into_owned(),
                ));
            }
            Ok(len) => {
                logging::warn(&format!(
                    "backend output ended with {len} unterminated bytes; dropped"
                ));
                break;
            }
            Err(error) => {
                logging::warn(&format!("backend read failed: {error}"));
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    if stopping.load(Ordering::SeqCst) {
        return;
    }

    let code = reap(&child, &stopping);
    if stopping.load(Ordering::SeqCst) {
        return;
    }
    logging::error(&format!("backend exited unexpectedly code={code:?}"));
    on_signal(BackendSignal::Exited(code));
}

fn reap(child: &Mutex<Child>, stopping: &AtomicBool) -> Option<i32> {
    loop {
        if stopping.load(Ordering::SeqCst) {
            return None;
        }
        match child.lock() {
            Ok(mut child) => match child.try_wait() {
                Ok(Some(status)) => return status.code(),
                Ok(None) => {}
                Err(_) => return None,
            },
            Err(_) => return None,
        }
        thread::sleep(REAP_POLL);
    }
}

pub struct BackendSupervisor {
    command: BackendCommand,
    on_signal: SignalCallback,
    handle: Option<BackendHandle>,
}

impl BackendSupervisor {
    pub fn new(command: BackendCommand, on_signal: SignalCallback) -> Self {
        Self {
            command,
            on_signal,
            handle: None,
        }
    }

    pub fn start(&mut self) -> Result<(), BackendError> {
        self.stop();
        let handle = spawn(&self.command, Arc::clone(&self.on_signal))?;
        self.handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            logging::info("backend stopping");
            handle.stop();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(BackendHandle::is_alive)
            .unwrap_or(false)
    }

    pub fn handle(&self) -> Option<&BackendHandle> {
        self.handle.as_ref()
    }
}

impl QueryChannel for BackendSupervisor {
    fn write_line(&mut self, text: &str) -> Result<(), BackendError> {
        self.handle
            .as_ref()
            .ok_or(BackendError::NotRunning)?
            .write_line(text)
    }

    fn restart(&mut self) -> Result<(), BackendError> {
        self.start()
    }
}

impl Drop for BackendSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::BackendCommand;

    #[test]
    fn command_from_argv_splits_program_and_args() {
        let argv = vec!["python".to_string(), "main.py".to_string()];
        let command = BackendCommand::from_argv(&argv).unwrap();
        assert_eq!(command.program, "python");
        assert_eq!(command.args, vec!["main.py"]);
        assert_eq!(command.to_string(), "python main.py");
    }

    #[test]
    fn command_from_empty_argv_is_rejected() {
        assert!(BackendCommand::from_argv(&[]).is_err());
        assert!(BackendCommand::from_argv(&["  ".to_string()]).is_err());
    }
}
