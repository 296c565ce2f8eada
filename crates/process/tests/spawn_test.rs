//! Integration tests for spawning and supervising processes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::sys::signal::kill;
use nix::unistd::{Pid, getpgid, getpgrp};
use pgnode_process::{Error, ManagedApplication, run, spawn, start};
use tracing_test::traced_test;

/// Runs a shell script and records everything it prints.
struct Script {
    env: Vec<(String, String)>,
    ready: Arc<AtomicBool>,
    ready_check_max: Option<u32>,
    script: String,
    shutdown_timeout: Duration,
    stdout: Arc<Mutex<Vec<String>>>,
    working_dir: Option<PathBuf>,
}

impl Script {
    fn new(script: &str) -> Self {
        Self {
            env: Vec::new(),
            ready: Arc::new(AtomicBool::new(true)),
            ready_check_max: None,
            script: script.to_string(),
            shutdown_timeout: Duration::from_secs(5),
            stdout: Arc::new(Mutex::new(Vec::new())),
            working_dir: None,
        }
    }
}

#[async_trait]
impl ManagedApplication for Script {
    fn args(&self) -> Vec<String> {
        vec!["-c".to_string(), self.script.clone()]
    }

    fn env(&self) -> Vec<(String, String)> {
        self.env.clone()
    }

    fn executable(&self) -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    fn name(&self) -> &str {
        "script"
    }

    fn handle_stdout(&self, line: &str) {
        self.stdout.lock().unwrap().push(line.to_string());
    }

    async fn is_ready_check(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn is_ready_check_interval_ms(&self) -> u64 {
        10
    }

    fn is_ready_check_max(&self) -> Option<u32> {
        self.ready_check_max
    }

    fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    fn working_dir(&self) -> Option<PathBuf> {
        self.working_dir.clone()
    }
}

#[tokio::test]
#[traced_test]
async fn test_run_collects_stdout() {
    let script = Script::new("echo first; echo second");
    let stdout = Arc::clone(&script.stdout);

    let status = run(script).await.expect("script should succeed");

    assert!(status.success());
    assert_eq!(*stdout.lock().unwrap(), vec!["first", "second"]);
}

/// Polls until `pid` no longer exists, giving up after `timeout`.
async fn wait_until_gone(pid: i32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if kill(Pid::from_raw(pid), None).is_err() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_run_passes_env_and_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = Script::new("echo \"$GREETING\"; pwd -P");
    script.env = vec![("GREETING".to_string(), "hello".to_string())];
    script.working_dir = Some(dir.path().to_path_buf());
    let stdout = Arc::clone(&script.stdout);

    run(script).await.expect("script should succeed");

    let lines = stdout.lock().unwrap().clone();
    assert_eq!(lines[0], "hello");
    assert_eq!(
        PathBuf::from(&lines[1]),
        dir.path().canonicalize().unwrap()
    );
}

#[tokio::test]
async fn test_run_reports_non_zero_exit() {
    let result = run(Script::new("exit 3")).await;

    match result {
        Err(Error::ProcessExit(status)) => assert_eq!(status.code(), Some(3)),
        other => panic!("expected ProcessExit, got {other:?}"),
    }
}

#[tokio::test]
async fn test_run_missing_executable() {
    struct Missing;

    #[async_trait]
    impl ManagedApplication for Missing {
        fn args(&self) -> Vec<String> {
            Vec::new()
        }

        fn executable(&self) -> PathBuf {
            PathBuf::from("/definitely/not/a/binary")
        }

        fn name(&self) -> &str {
            "missing"
        }
    }

    assert!(matches!(run(Missing).await, Err(Error::Io(_, _))));
}

#[tokio::test]
#[traced_test]
async fn test_spawn_and_shutdown() {
    let process = spawn(Script::new("exec sleep 30"))
        .await
        .expect("spawn should succeed");

    assert!(process.pid() > 0);
    assert!(process.is_running());

    let status = process.shutdown().await;

    assert!(status.is_some());
    assert!(!process.is_running());

    // A second shutdown is a no-op
    assert_eq!(process.shutdown().await, status);
}

#[tokio::test]
async fn test_wait_returns_when_process_exits() {
    let process = spawn(Script::new("sleep 0.2; exit 4"))
        .await
        .expect("spawn should succeed");

    let status = process.wait().await.expect("exit status should be known");

    assert_eq!(status.code(), Some(4));
    assert_eq!(process.exit_status(), Some(status));
}

#[tokio::test]
async fn test_spawn_fails_when_process_exits_before_ready() {
    let script = Script::new("exit 1");
    script.ready.store(false, Ordering::SeqCst);

    let result = spawn(script).await;

    assert!(matches!(result, Err(Error::ExitedBeforeReady(name, _)) if name == "script"));
}

#[tokio::test]
async fn test_spawn_gives_up_after_max_ready_checks() {
    let mut script = Script::new("exec sleep 30");
    script.ready.store(false, Ordering::SeqCst);
    script.ready_check_max = Some(3);

    let result = spawn(script).await;

    assert!(matches!(result, Err(Error::NeverReady(_, 3))));
}

#[tokio::test]
async fn test_spawn_waits_for_readiness() {
    let script = Script::new("exec sleep 30");
    let ready = Arc::clone(&script.ready);
    ready.store(false, Ordering::SeqCst);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        ready.store(true, Ordering::SeqCst);
    });

    let started = Instant::now();
    let process = spawn(script).await.expect("spawn should succeed");

    assert!(started.elapsed() >= Duration::from_millis(100));
    process.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_kills_process_ignoring_signal() {
    let mut script = Script::new("trap '' TERM; exec sleep 30");
    script.shutdown_timeout = Duration::from_millis(200);

    let process = spawn(script).await.expect("spawn should succeed");

    // Give the shell time to install the trap before exec
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let status = process.shutdown().await.expect("exit status should be known");

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!status.success());
}

#[tokio::test]
async fn test_output_keeps_draining_after_invalid_utf8() {
    // Far more than a pipe buffer holds, after an undecodable line
    let script = Script::new("printf '\\377\\n'; yes aaaaaaaaaa | head -n 30000; echo done");
    let stdout = Arc::clone(&script.stdout);

    let status = tokio::time::timeout(Duration::from_secs(10), run(script))
        .await
        .expect("script should not block on its output")
        .expect("script should succeed");

    assert!(status.success());

    let lines = stdout.lock().unwrap();
    assert_eq!(lines.len(), 30_002);
    assert_eq!(lines[0], "\u{fffd}");
    assert_eq!(lines[1], "aaaaaaaaaa");
    assert_eq!(lines[30_001], "done");
}

#[tokio::test]
#[traced_test]
async fn test_dropped_spawn_stops_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let script = Script::new(&format!("echo $$ > '{}'; exec sleep 30", pid_file.display()));
    script.ready.store(false, Ordering::SeqCst);

    let result = tokio::time::timeout(Duration::from_millis(300), spawn(script)).await;
    assert!(result.is_err(), "spawn should still be waiting for readiness");

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    assert!(wait_until_gone(pid, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_process_gets_its_own_group() {
    let process = start(Script::new("exec sleep 30")).expect("start should succeed");
    let pid = Pid::from_raw(i32::try_from(process.pid()).unwrap());

    assert_eq!(getpgid(Some(pid)).unwrap(), pid);
    assert_ne!(getpgid(Some(pid)).unwrap(), getpgrp());

    process.shutdown().await;
}

#[tokio::test]
async fn test_start_then_wait_until_ready() {
    let script = Script::new("exec sleep 30");
    let ready = Arc::clone(&script.ready);
    ready.store(false, Ordering::SeqCst);

    let process = start(script).expect("start should succeed");
    assert!(process.is_running());

    ready.store(true, Ordering::SeqCst);
    process.wait_until_ready().await.expect("process should become ready");

    process.shutdown().await;
    assert!(!process.is_running());
}
