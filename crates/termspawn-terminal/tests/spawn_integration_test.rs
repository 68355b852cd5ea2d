//! End-to-end tests for asynchronous spawning.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use termspawn_core::{Config, Dimensions, Error, Result, SpawnToken, TerminalStatus};
use termspawn_pty::{PtyHandle, SpawnCommand};
use termspawn_terminal::{
    ChildSink, Correlator, PtyBackend, SpawnBackend, SpawnRequest, Terminal, TerminalEvent,
    TerminalManager, Trampoline,
};

/// Backend that records what it was asked to do and spawns nothing.
#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<(Vec<String>, SpawnToken, Trampoline)>>,
}

impl SpawnBackend for RecordingBackend {
    fn spawn_sync(&self, _: &SpawnCommand, _: Dimensions) -> Result<Arc<PtyHandle>> {
        Err(Error::SpawnFailed("recording backend".to_string()))
    }

    fn spawn_async(
        &self,
        command: SpawnCommand,
        _: Dimensions,
        _: Arc<dyn ChildSink>,
        token: SpawnToken,
        trampoline: Trampoline,
    ) {
        self.calls
            .lock()
            .unwrap()
            .push((command.argv, token, trampoline));
    }
}

fn recorded(backend: &RecordingBackend) -> (Vec<String>, SpawnToken, Trampoline) {
    backend.calls.lock().unwrap().remove(0)
}

#[test]
fn backend_completion_reaches_the_right_callback() {
    let backend = Arc::new(RecordingBackend::default());
    let correlator = Arc::new(Correlator::new());
    let terminal = Terminal::with_backend(
        Arc::clone(&correlator),
        backend.clone(),
        &Config::default(),
    )
    .unwrap();

    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let token = terminal
        .spawn_async(SpawnRequest::with_callback(
            SpawnCommand::new(["sh", "-c", "echo hi"]),
            move |pid, err| {
                *sink.lock().unwrap() = Some((pid, err.is_none()));
            },
        ))
        .unwrap();

    let (argv, passed, trampoline) = recorded(&backend);
    assert_eq!(argv, ["sh", "-c", "echo hi"]);
    assert_eq!(passed, token);
    assert!(correlator.is_pending(token));

    trampoline.fire(passed, Some(1234), None);
    assert_eq!(*seen.lock().unwrap(), Some((Some(1234), true)));
    assert!(!correlator.is_pending(token));

    // A second completion for the same token is absorbed.
    trampoline.fire(passed, Some(1), None);
    assert_eq!(*seen.lock().unwrap(), Some((Some(1234), true)));
}

#[test]
fn interleaved_completions_are_not_crossed() {
    let backend = Arc::new(RecordingBackend::default());
    let correlator = Arc::new(Correlator::new());
    let terminal = Terminal::with_backend(
        Arc::clone(&correlator),
        backend.clone(),
        &Config::default(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    for name in ["a", "b", "c"] {
        let tx = tx.clone();
        terminal
            .spawn_async(SpawnRequest::with_callback(
                SpawnCommand::new(["echo", name]),
                move |pid, _| tx.send((name, pid)).unwrap(),
            ))
            .unwrap();
    }

    let calls: Vec<_> = backend.calls.lock().unwrap().drain(..).collect();
    for (argv, token, trampoline) in calls.into_iter().rev() {
        let pid = match argv[1].as_str() {
            "a" => 100,
            "b" => 200,
            _ => 300,
        };
        trampoline.fire(token, Some(pid), None);
    }

    let mut results: Vec<_> = rx.try_iter().collect();
    results.sort();
    assert_eq!(
        results,
        vec![("a", Some(100)), ("b", Some(200)), ("c", Some(300))]
    );
    assert_eq!(correlator.pending_count(), 0);
}

#[test]
fn detached_request_gets_zero_token() {
    let backend = Arc::new(RecordingBackend::default());
    let terminal = Terminal::with_backend(
        Arc::new(Correlator::new()),
        backend.clone(),
        &Config::default(),
    )
    .unwrap();

    let token = terminal
        .spawn_async(SpawnRequest::detached(SpawnCommand::new(["true"])))
        .unwrap();
    assert!(token.is_none());

    let (_, passed, trampoline) = recorded(&backend);
    assert!(passed.is_none());
    trampoline.fire(passed, Some(1), None);
    assert_eq!(terminal.correlator().pending_count(), 0);
}

#[test]
fn concurrent_register_and_resolve() {
    let correlator = Arc::new(Correlator::new());
    let (tx, rx) = mpsc::channel();

    let handles: Vec<_> = (0..50u32)
        .map(|i| {
            let correlator = Arc::clone(&correlator);
            let tx = tx.clone();
            thread::spawn(move || {
                let token = correlator
                    .register(format!("spawn {i}"), move |pid, _| {
                        tx.send((i, pid)).unwrap();
                    })
                    .unwrap();
                let trampoline = correlator.trampoline();
                thread::spawn(move || trampoline.fire(token, Some(i + 1000), None))
                    .join()
                    .unwrap();
            })
        })
        .collect();
    drop(tx);

    for handle in handles {
        handle.join().unwrap();
    }

    let mut results: Vec<(u32, Option<u32>)> = rx.iter().collect();
    results.sort();
    assert_eq!(results.len(), 50);
    for (i, pid) in results {
        assert_eq!(pid, Some(i + 1000));
    }
    assert_eq!(correlator.pending_count(), 0);
}

#[test]
fn real_spawn_output_and_exit() {
    let manager = TerminalManager::new(Config::default()).unwrap();
    let terminal = manager.create_terminal().unwrap();
    let mut events = terminal.subscribe();

    let (tx, rx) = mpsc::channel();
    terminal
        .spawn_async(SpawnRequest::with_callback(
            terminal.command(["sh", "-c", "echo hi"]),
            move |pid, err| tx.send((pid, err.map(|e| e.to_string()))).unwrap(),
        ))
        .unwrap();

    let (pid, err) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(err, None);
    let pid = pid.expect("pid");

    let deadline = Instant::now() + Duration::from_secs(5);
    let exited = loop {
        match events.try_recv() {
            Ok(TerminalEvent::ChildExited { pid: p, exit_code }) => break Some((p, exit_code)),
            _ if Instant::now() > deadline => break None,
            _ => thread::sleep(Duration::from_millis(20)),
        }
    };
    assert_eq!(exited, Some((Some(pid), 0)));
    assert!(terminal.contents().contains("hi"));
    assert_eq!(manager.correlator().pending_count(), 0);
}

/// Spawns only after a delay longer than the test's timeout.
fn delayed_spawn(command: &SpawnCommand, dimensions: Dimensions) -> Result<PtyHandle> {
    thread::sleep(Duration::from_millis(300));
    PtyHandle::spawn(command, dimensions)
}

#[test]
fn spawn_timeout_reports_failure() {
    let terminal = Terminal::with_backend(
        Arc::new(Correlator::new()),
        Arc::new(PtyBackend::with_spawner(delayed_spawn)),
        &Config::default(),
    )
    .unwrap();
    let (tx, rx) = mpsc::channel();

    let token = terminal
        .spawn_async(SpawnRequest::with_callback(
            terminal
                .command(["sleep", "30"])
                .timeout(Duration::from_millis(50)),
            move |pid, err| tx.send((pid, err)).unwrap(),
        ))
        .unwrap();

    let (pid, err) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(pid.is_none());
    assert!(matches!(err, Some(Error::SpawnTimeout(50))));
    assert!(!terminal.correlator().is_pending(token));

    // Give the late child time to appear; it is killed, never attached.
    thread::sleep(Duration::from_millis(600));
    assert!(rx.try_recv().is_err());
    assert!(terminal.children().is_empty());
    assert_eq!(terminal.status(), TerminalStatus::Idle);
}
