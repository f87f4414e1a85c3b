#![cfg(unix)]

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fuzzyfind_core::backend::{
    spawn, BackendCommand, BackendError, BackendSignal, BackendSupervisor, QueryChannel,
    SignalCallback,
};

const WAIT: Duration = Duration::from_secs(5);

fn sh(script: &str) -> BackendCommand {
    BackendCommand {
        program: "sh".into(),
        args: vec!["-c".into(), script.into()],
    }
}

fn channel_callback() -> (SignalCallback, Receiver<BackendSignal>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let callback: SignalCallback = Arc::new(move |signal| {
        let _ = tx.lock().unwrap().send(signal);
    });
    (callback, rx)
}

fn next(rx: &Receiver<BackendSignal>) -> BackendSignal {
    rx.recv_timeout(WAIT).expect("backend signal should arrive")
}

#[test]
fn written_lines_come_back_in_order() {
    let (callback, rx) = channel_callback();
    let handle = spawn(&sh("cat"), callback).unwrap();

    for query in ["alpha", "beta", "gamma"] {
        handle.write_line(query).unwrap();
    }

    assert_eq!(next(&rx), BackendSignal::Line("alpha".into()));
    assert_eq!(next(&rx), BackendSignal::Line("beta".into()));
    assert_eq!(next(&rx), BackendSignal::Line("gamma".into()));
    handle.stop();
}

#[test]
fn partial_lines_are_buffered_until_terminated() {
    let (callback, rx) = channel_callback();
    let script = "printf 'al'; sleep 0.2; printf 'pha|/a\\r\\nbe'; sleep 0.2; printf 'ta|/b\\n'; sleep 5";
    let handle = spawn(&sh(script), callback).unwrap();

    assert_eq!(next(&rx), BackendSignal::Line("alpha|/a".into()));
    assert_eq!(next(&rx), BackendSignal::Line("beta|/b".into()));
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    handle.stop();
}

#[test]
fn unexpected_exit_is_reported_after_output() {
    let (callback, rx) = channel_callback();
    let handle = spawn(&sh("echo ':indexed'; printf 'dangling'; exit 3"), callback).unwrap();

    assert_eq!(next(&rx), BackendSignal::Line(":indexed".into()));
    assert_eq!(next(&rx), BackendSignal::Exited(Some(3)));
    assert!(!handle.is_alive());
    assert!(matches!(handle.write_line("foo"), Err(BackendError::NotRunning)));
}

#[test]
fn stop_does_not_report_exit() {
    let (callback, rx) = channel_callback();
    let handle = spawn(&sh("cat"), callback).unwrap();
    handle.stop();

    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
}

#[test]
fn concurrent_writers_never_interleave_lines() {
    let (callback, rx) = channel_callback();
    let handle = Arc::new(spawn(&sh("cat"), callback).unwrap());

    let writers: Vec<_> = (0..4)
        .map(|writer| {
            let handle = Arc::clone(&handle);
            std::thread::spawn(move || {
                for i in 0..50 {
                    handle.write_line(&format!("w{writer}-{i:03}-{}", "x".repeat(200))).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    for _ in 0..200 {
        match next(&rx) {
            BackendSignal::Line(line) => {
                assert_eq!(line.len(), "w0-000-".len() + 200, "torn line: {line}");
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }
}

#[test]
fn supervisor_restart_replaces_the_process() {
    let (callback, rx) = channel_callback();
    let mut supervisor = BackendSupervisor::new(sh("cat"), callback);
    supervisor.start().unwrap();
    let first_pid = supervisor.handle().and_then(|handle| handle.pid()).unwrap();

    supervisor.restart().unwrap();
    let second_pid = supervisor.handle().and_then(|handle| handle.pid()).unwrap();
    assert_ne!(first_pid, second_pid);

    supervisor.write_line("after-restart").unwrap();
    assert_eq!(next(&rx), BackendSignal::Line("after-restart".into()));
    assert!(supervisor.is_alive());

    supervisor.stop();
    assert!(!supervisor.is_alive());
    assert!(matches!(
        supervisor.write_line("x"),
        Err(BackendError::NotRunning)
    ));
}

#[test]
fn missing_program_fails_to_spawn() {
    let (callback, _rx) = channel_callback();
    let command = BackendCommand {
        program: "/nonexistent/fuzzyfind-backend".into(),
        args: Vec::new(),
    };
    assert!(matches!(spawn(&command, callback), Err(BackendError::Spawn(_))));
}
