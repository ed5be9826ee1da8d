//! Supervisor behaviour against real processes.

use std::time::{Duration, Instant};

use chainreader_core::{line_channel, ConfigError, LineReceiver, Shutdown, ShutdownHandle};
use chainreader_source::{NodeRunner, RunnerError};
use tokio::task::JoinHandle;

fn collector(mut rx: LineReceiver) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut out = vec![];
        while let Some(line) = rx.recv().await {
            out.push(line);
        }
        out
    })
}

#[tokio::test]
async fn clean_exit() {
    let (tx, rx) = line_channel(8);
    let lines = collector(rx);
    let status = NodeRunner::new("true", Vec::<String>::new())
        .run(tx, Shutdown::never())
        .await
        .unwrap();
    assert!(status.success());
    assert!(lines.await.unwrap().is_empty());
}

#[tokio::test]
async fn stdout_lines_reach_the_queue() {
    let (tx, rx) = line_channel(8);
    let lines = collector(rx);
    NodeRunner::new("sh", ["-c", r#"echo "Line 1"; echo "Line 2   "; printf "Line 3""#])
        .run(tx, Shutdown::never())
        .await
        .unwrap();
    assert_eq!(lines.await.unwrap(), ["Line 1", "Line 2", "Line 3"]);
}

#[tokio::test]
async fn output_written_before_exit_is_not_lost() {
    let (tx, rx) = line_channel(4);
    let lines = collector(rx);
    NodeRunner::new("sh", ["-c", "i=1; while [ $i -le 500 ]; do echo \"DMLOG line $i\"; i=$((i+1)); done"])
        .run(tx, Shutdown::never())
        .await
        .unwrap();
    let lines = lines.await.unwrap();
    assert_eq!(lines.len(), 500);
    assert_eq!(lines.last().map(String::as_str), Some("DMLOG line 500"));
}

#[tokio::test]
async fn env_and_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = line_channel(8);
    let lines = collector(rx);
    NodeRunner::new("sh", ["-c", "echo \"$CHAIN_ID\"; pwd"])
        .env("CHAIN_ID", "cosmoshub-4")
        .dir(dir.path())
        .run(tx, Shutdown::never())
        .await
        .unwrap();
    let lines = lines.await.unwrap();
    assert_eq!(lines[0], "cosmoshub-4");
    assert_eq!(
        std::fs::canonicalize(&lines[1]).unwrap(),
        std::fs::canonicalize(dir.path()).unwrap()
    );
}

#[tokio::test]
async fn non_zero_exit_is_an_error() {
    let (tx, _rx) = line_channel(8);
    let err = NodeRunner::new("sh", ["-c", "exit 3"])
        .run(tx, Shutdown::never())
        .await
        .unwrap_err();
    match err {
        RunnerError::Exited { status } => assert_eq!(status.code(), Some(3)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn missing_binary_fails_before_spawn() {
    let (tx, _rx) = line_channel(1);
    let err = NodeRunner::new("foo-node-that-does-not-exist", Vec::<String>::new())
        .run(tx, Shutdown::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Config(ConfigError::BinaryNotFound { .. })));
}

#[tokio::test]
async fn directory_as_binary_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, _rx) = line_channel(1);
    let err = NodeRunner::new(dir.path().to_string_lossy(), Vec::<String>::new())
        .run(tx, Shutdown::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Config(ConfigError::BinaryIsDirectory { .. })));
}

#[tokio::test]
async fn invalid_logs_filter_is_rejected() {
    let (tx, _rx) = line_channel(1);
    let err = NodeRunner::new("true", Vec::<String>::new())
        .forward_stderr(true)
        .logs_filter("(")
        .run(tx, Shutdown::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Config(ConfigError::InvalidPattern { .. })));
}

#[tokio::test]
async fn cancel_interrupts_gracefully() {
    let (handle, shutdown) = ShutdownHandle::new();
    let (tx, _rx) = line_channel(1);
    let started = Instant::now();

    let run = tokio::spawn(async move {
        NodeRunner::new("sleep", ["10"])
            .forced_kill_timeout(Duration::from_secs(5))
            .run(tx, shutdown)
            .await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.trigger();

    let err = run.await.unwrap().unwrap_err();
    assert!(err.is_graceful(), "expected graceful interrupt, got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancel_escalates_to_kill_after_timeout() {
    let timeout = Duration::from_millis(400);
    let (handle, shutdown) = ShutdownHandle::new();
    let (tx, _rx) = line_channel(1);

    let run = tokio::spawn(async move {
        NodeRunner::new("sh", ["-c", "trap '' INT; sleep 30"])
            .forced_kill_timeout(timeout)
            .run(tx, shutdown)
            .await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    let cancelled_at = Instant::now();
    handle.trigger();

    let err = run.await.unwrap().unwrap_err();
    assert!(cancelled_at.elapsed() >= timeout);
    assert!(cancelled_at.elapsed() < Duration::from_secs(30));
    match err {
        RunnerError::ForceKilled { timeout: t, .. } => assert_eq!(t, timeout),
        other => panic!("expected forced kill, got {other:?}"),
    }
}
