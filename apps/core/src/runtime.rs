use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::activation::{ActivationPolicy, ActivationTrigger};
use crate::arbiter::{Acquisition, ArbiterError, InstanceArbiter};
use crate::backend::{BackendCommand, BackendError, BackendSupervisor, QueryChannel, SignalCallback};
use crate::config::{self, ConfigError};
use crate::logging;
use crate::reindex::ReindexScheduler;
use crate::session::{Flow, SessionCoordinator, SessionEvent};
use crate::surface::{ConsoleSurface, Surface};

#[derive(Debug)]
pub enum RuntimeError {
    Config(ConfigError),
    Backend(BackendError),
    Arbiter(ArbiterError),
    Logging(std::io::Error),
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(error) => write!(f, "config error: {error}"),
            Self::Backend(error) => write!(f, "backend error: {error}"),
            Self::Arbiter(error) => write!(f, "single-instance error: {error}"),
            Self::Logging(error) => write!(f, "logging error: {error}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<ConfigError> for RuntimeError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<BackendError> for RuntimeError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

impl From<ArbiterError> for RuntimeError {
    fn from(value: ArbiterError) -> Self {
        Self::Arbiter(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub config_path: Option<PathBuf>,
    pub console: bool,
}

pub fn parse_cli_args(args: &[String]) -> Result<RuntimeOptions, String> {
    let mut options = RuntimeOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--config requires a path".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--console" => options.console = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(options)
}

pub fn run_with_options(options: RuntimeOptions) -> Result<(), RuntimeError> {
    let config = config::load(options.config_path.as_deref())?;
    if !config.config_path.exists() {
        config::save(&config)?;
        println!(
            "[fuzzyfind-core] wrote default config to {}",
            config.config_path.display()
        );
    }
    logging::init().map_err(RuntimeError::Logging)?;

    let arbiter = InstanceArbiter::from_config(&config);
    let token = match arbiter.try_acquire()? {
        Acquisition::Acquired(token) => token,
        Acquisition::AlreadyRunning => {
            println!(
                "[fuzzyfind-core] instance already active at {}; asked it to show its window",
                arbiter.endpoint()
            );
            return Ok(());
        }
    };
    println!(
        "[fuzzyfind-core] startup rendezvous={} backend={:?} config_path={} log_path={}",
        token.endpoint(),
        config.backend_command,
        config.config_path.display(),
        logging::log_path().display(),
    );

    let (events, inbox) = mpsc::channel::<SessionEvent>();

    let _arbiter_guard = {
        let events = Mutex::new(events.clone());
        token.listen(move || {
            if let Ok(events) = events.lock() {
                let _ = events.send(SessionEvent::Activation(ActivationTrigger::SecondInstance));
            }
        })
    };

    let mut supervisor = BackendSupervisor::new(
        BackendCommand::from_argv(&config.backend_command)?,
        backend_callback(events.clone()),
    );
    supervisor.start()?;

    let reindex = ReindexScheduler::new(
        BackendCommand::from_argv(&config.reindex_command)?,
        config.reindex_interval(),
        config.reindex_overlap_guard,
    )
    .spawn();

    if options.console {
        spawn_console_input(events.clone());
    }
    drop(events);

    let surface = ConsoleSurface::new(std::io::stdout());
    let policy = ActivationPolicy {
        hide_on_focus_loss: config.hide_on_focus_loss,
    };
    let mut coordinator = SessionCoordinator::new(supervisor, surface, policy, &config.hotkey);
    coordinator.handle(SessionEvent::BackendStarted);

    run_event_loop(&mut coordinator, inbox);

    reindex.stop();
    coordinator.channel_mut().stop();
    logging::info("runtime stopped");
    Ok(())
}

pub fn run_event_loop<C: QueryChannel, S: Surface>(
    coordinator: &mut SessionCoordinator<C, S>,
    inbox: Receiver<SessionEvent>,
) {
    for event in inbox {
        if coordinator.handle(event) == Flow::Quit {
            return;
        }
    }
}

fn backend_callback(events: Sender<SessionEvent>) -> SignalCallback {
    let events = Mutex::new(events);
    Arc::new(move |signal| {
        if let Ok(events) = events.lock() {
            let _ = events.send(SessionEvent::Backend(signal));
        }
    })
}

fn spawn_console_input(events: Sender<SessionEvent>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let event = parse_console_line(&line);
            let quit = event == SessionEvent::Quit;
            if events.send(event).is_err() || quit {
                return;
            }
        }
        let _ = events.send(SessionEvent::Quit);
    });
}

pub fn parse_console_line(line: &str) -> SessionEvent {
    let Some(command) = line.strip_prefix('!') else {
        return SessionEvent::InputChanged(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("show"), None) => SessionEvent::Activation(ActivationTrigger::TrayShow),
        (Some("hide"), None) => SessionEvent::Activation(ActivationTrigger::Close),
        (Some("toggle"), None) => SessionEvent::Activation(ActivationTrigger::Hotkey),
        (Some("blur"), None) => SessionEvent::Activation(ActivationTrigger::FocusLost),
        (Some("enter"), None) => SessionEvent::Submit,
        (Some("restart"), None) => SessionEvent::RestartBackend,
        (Some("quit"), None) => SessionEvent::Quit,
        (Some("open"), Some(index)) => match index.parse::<usize>() {
            Ok(index) => SessionEvent::Launch(index),
            Err(_) => SessionEvent::InputChanged(line.to_string()),
        },
        _ => SessionEvent::InputChanged(line.to_string()),
    }
}
