mod common;

use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use watchguard::watch::backend::{Backend, BackendKind, BackendOptions};
use watchguard::{
    Callback, GuardOp, GuardOptions, GuardRegistry, HookEvent, HookPhase, Supervisor,
    SupervisorHandle, SupervisorOptions, SupervisorState, WatchPattern, WatchguardError,
};

use common::{FailingGuard, Journal, RecordingGuard, TouchingGuard, entries, journal, wait_for};

type TestResult = Result<(), Box<dyn Error>>;

const WAIT: Duration = Duration::from_secs(5);

fn fast_backend(root: &Path) -> Backend {
    let options = BackendOptions {
        latency: 0.05,
        ..BackendOptions::default()
    };
    Backend::with_kind(root, BackendKind::Polling, options)
}

/// Drive a supervisor on its own task; the joined value hands the
/// supervisor back so tests can inspect the registry after the run.
fn spawn_supervisor(
    registry: GuardRegistry,
    root: &Path,
    options: SupervisorOptions,
) -> (
    SupervisorHandle,
    JoinHandle<(watchguard::Result<()>, Supervisor)>,
) {
    let mut supervisor = Supervisor::new(registry, fast_backend(root), options);
    let handle = supervisor.handle();
    let join = tokio::spawn(async move {
        let result = supervisor.run().await;
        (result, supervisor)
    });
    (handle, join)
}

/// Wait until the journal records `entry` at least `count` times.
async fn wait_for_entry(journal: &Journal, entry: &str, count: usize) -> bool {
    wait_for(
        || entries(journal).iter().filter(|e| e.as_str() == entry).count() >= count,
        WAIT,
    )
    .await
}

fn match_everything() -> Vec<WatchPattern> {
    vec![WatchPattern::regex(".*").expect("valid pattern")]
}

#[tokio::test]
async fn empty_registry_refuses_to_run() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;

    let mut supervisor = Supervisor::new(
        GuardRegistry::new(),
        fast_backend(dir.path()),
        SupervisorOptions::default(),
    );
    let err = supervisor.run().await.unwrap_err();
    assert!(matches!(err, WatchguardError::NoActiveGuards));
    Ok(())
}

#[tokio::test]
async fn all_guards_failing_start_refuses_to_run() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "doomed",
        Box::new(FailingGuard::new("doomed", GuardOp::Start, log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;

    let mut supervisor = Supervisor::new(
        registry,
        fast_backend(dir.path()),
        SupervisorOptions::default(),
    );
    let err = supervisor.run().await.unwrap_err();
    assert!(matches!(err, WatchguardError::NoActiveGuards));
    assert_eq!(entries(&log), vec!["doomed:start"]);
    Ok(())
}

#[tokio::test]
async fn guard_failing_start_is_excluded_from_dispatch() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "bad",
        Box::new(FailingGuard::new("bad", GuardOp::Start, log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;
    registry.register(
        "good",
        Box::new(RecordingGuard::new("good", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;

    let (handle, join) = spawn_supervisor(registry, dir.path(), SupervisorOptions::default());
    assert!(wait_for_entry(&log, "good:start", 1).await);

    fs::write(dir.path().join("change.txt"), "x")?;
    assert!(wait_for_entry(&log, "good:run_on_change:change.txt", 1).await);

    // The quarantined guard saw its start attempt and nothing else.
    let bad_calls: Vec<String> = entries(&log)
        .into_iter()
        .filter(|e| e.starts_with("bad:"))
        .collect();
    assert_eq!(bad_calls, vec!["bad:start"]);

    handle.stop().await;
    let (result, _) = timeout(WAIT, join).await??;
    result?;
    Ok(())
}

#[tokio::test]
async fn run_on_change_fault_is_isolated_and_guard_never_reinvoked() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "flaky",
        Box::new(FailingGuard::new("flaky", GuardOp::RunOnChange, log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;
    registry.register(
        "steady",
        Box::new(RecordingGuard::new("steady", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;

    let (handle, join) = spawn_supervisor(registry, dir.path(), SupervisorOptions::default());
    assert!(wait_for_entry(&log, "steady:start", 1).await);

    // First change: the flaky guard faults, the steady one still runs.
    fs::write(dir.path().join("first.txt"), "1")?;
    assert!(wait_for_entry(&log, "steady:run_on_change:first.txt", 1).await);
    assert!(wait_for_entry(&log, "flaky:run_on_change:first.txt", 1).await);

    // Second change: the quarantined guard is never invoked again.
    fs::write(dir.path().join("second.txt"), "2")?;
    assert!(wait_for_entry(&log, "steady:run_on_change:second.txt", 1).await);
    let flaky_runs = entries(&log)
        .iter()
        .filter(|e| e.starts_with("flaky:run_on_change"))
        .count();
    assert_eq!(flaky_runs, 1);

    handle.stop().await;
    let (result, supervisor) = timeout(WAIT, join).await??;
    result?;

    // The quarantined entry stays registered, deactivated, fault retained.
    let entry = supervisor
        .registry()
        .entry("flaky")
        .expect("quarantined entry stays in the registry");
    assert!(!entry.is_active());
    let fault = entry.fault().expect("fault retained on the entry");
    assert_eq!(fault.guard, "flaky");
    assert_eq!(fault.op, GuardOp::RunOnChange);
    Ok(())
}

#[tokio::test]
async fn rescan_catches_files_created_during_dispatch() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "generator",
        Box::new(TouchingGuard::new(
            "generator",
            dir.path().join("induced.txt"),
            log.clone(),
        )),
        vec![WatchPattern::literal("trigger.txt")],
        vec![],
        GuardOptions::default(),
    )?;
    registry.register(
        "consumer",
        Box::new(RecordingGuard::new("consumer", log.clone())),
        vec![WatchPattern::literal("induced.txt")],
        vec![],
        GuardOptions::default(),
    )?;

    let (handle, join) = spawn_supervisor(registry, dir.path(), SupervisorOptions::default());
    assert!(wait_for_entry(&log, "consumer:start", 1).await);

    fs::write(dir.path().join("trigger.txt"), "go")?;
    assert!(wait_for_entry(&log, "generator:run_on_change:trigger.txt", 1).await);
    // The file the generator wrote mid-dispatch reaches the consumer.
    assert!(wait_for_entry(&log, "consumer:run_on_change:induced.txt", 1).await);

    handle.stop().await;
    let (result, _) = timeout(WAIT, join).await??;
    result?;
    Ok(())
}

#[tokio::test]
async fn stop_shuts_guards_down_in_order() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "one",
        Box::new(RecordingGuard::new("one", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;
    registry.register(
        "two",
        Box::new(RecordingGuard::new("two", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;

    let (handle, join) = spawn_supervisor(registry, dir.path(), SupervisorOptions::default());
    assert!(wait_for_entry(&log, "two:start", 1).await);

    handle.stop().await;
    let (result, _) = timeout(WAIT, join).await??;
    result?;

    let calls = entries(&log);
    let one_stop = calls.iter().position(|e| e == "one:stop");
    let two_stop = calls.iter().position(|e| e == "two:stop");
    assert!(one_stop.is_some() && two_stop.is_some());
    assert!(one_stop < two_stop, "stops out of registration order: {calls:?}");
    Ok(())
}

#[tokio::test]
async fn run_all_runs_every_guard_then_watching_resumes() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "alpha",
        Box::new(RecordingGuard::new("alpha", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;
    registry.register(
        "beta",
        Box::new(RecordingGuard::new("beta", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;

    let (handle, join) = spawn_supervisor(registry, dir.path(), SupervisorOptions::default());
    assert!(wait_for_entry(&log, "beta:start", 1).await);

    handle.run_all().await;
    assert!(wait_for_entry(&log, "alpha:run_all", 1).await);
    assert!(wait_for_entry(&log, "beta:run_all", 1).await);

    // The backend came back after the paused pass.
    fs::write(dir.path().join("after.txt"), "x")?;
    assert!(wait_for_entry(&log, "alpha:run_on_change:after.txt", 1).await);

    handle.stop().await;
    let (result, _) = timeout(WAIT, join).await??;
    result?;
    Ok(())
}

#[tokio::test]
async fn reload_reaches_every_active_guard() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "reloader",
        Box::new(RecordingGuard::new("reloader", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;

    let (handle, join) = spawn_supervisor(registry, dir.path(), SupervisorOptions::default());
    assert!(wait_for_entry(&log, "reloader:start", 1).await);

    handle.reload().await;
    assert!(wait_for_entry(&log, "reloader:reload", 1).await);

    handle.stop().await;
    let (result, _) = timeout(WAIT, join).await??;
    result?;
    Ok(())
}

#[tokio::test]
async fn hooks_bracket_successful_calls() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();
    let hook_log = journal();

    let hook_sink = hook_log.clone();
    let callback = Callback::new(
        vec![
            HookEvent::new(GuardOp::RunAll, HookPhase::Begin),
            HookEvent::new(GuardOp::RunAll, HookPhase::End),
        ],
        move |event| {
            let phase = match event.phase {
                HookPhase::Begin => "begin",
                HookPhase::End => "end",
            };
            hook_sink.lock().unwrap().push(format!("run_all:{phase}"));
        },
    );

    let mut registry = GuardRegistry::new();
    registry.register(
        "hooked",
        Box::new(RecordingGuard::new("hooked", log.clone())),
        match_everything(),
        vec![callback],
        GuardOptions::default(),
    )?;

    let (handle, join) = spawn_supervisor(registry, dir.path(), SupervisorOptions::default());
    assert!(wait_for_entry(&log, "hooked:start", 1).await);

    handle.run_all().await;
    assert!(wait_for_entry(&log, "hooked:run_all", 1).await);
    assert!(
        wait_for(
            || entries(&hook_log) == vec!["run_all:begin", "run_all:end"],
            WAIT
        )
        .await,
        "hook events: {:?}",
        entries(&hook_log)
    );

    handle.stop().await;
    let (result, _) = timeout(WAIT, join).await??;
    result?;
    Ok(())
}

#[tokio::test]
async fn end_hook_does_not_fire_after_a_fault() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();
    let hook_log = journal();

    let hook_sink = hook_log.clone();
    let callback = Callback::new(
        vec![
            HookEvent::new(GuardOp::RunOnChange, HookPhase::Begin),
            HookEvent::new(GuardOp::RunOnChange, HookPhase::End),
        ],
        move |event| {
            let phase = match event.phase {
                HookPhase::Begin => "begin",
                HookPhase::End => "end",
            };
            hook_sink
                .lock()
                .unwrap()
                .push(format!("run_on_change:{phase}"));
        },
    );

    let mut registry = GuardRegistry::new();
    registry.register(
        "crasher",
        Box::new(FailingGuard::new("crasher", GuardOp::RunOnChange, log.clone())),
        match_everything(),
        vec![callback],
        GuardOptions::default(),
    )?;
    registry.register(
        "witness",
        Box::new(RecordingGuard::new("witness", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;

    let (handle, join) = spawn_supervisor(registry, dir.path(), SupervisorOptions::default());
    assert!(wait_for_entry(&log, "witness:start", 1).await);

    fs::write(dir.path().join("boom.txt"), "x")?;
    assert!(wait_for_entry(&log, "crasher:run_on_change:boom.txt", 1).await);
    assert!(wait_for_entry(&log, "witness:run_on_change:boom.txt", 1).await);

    // Begin fired; the fault suppressed the end bracket.
    assert_eq!(entries(&hook_log), vec!["run_on_change:begin"]);

    handle.stop().await;
    let (result, _) = timeout(WAIT, join).await??;
    result?;
    Ok(())
}

#[tokio::test]
async fn handle_run_executes_an_action_with_watching_paused() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "worker",
        Box::new(RecordingGuard::new("worker", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;

    let (handle, join) = spawn_supervisor(registry, dir.path(), SupervisorOptions::default());
    assert!(wait_for_entry(&log, "worker:start", 1).await);

    let action_sink = log.clone();
    handle
        .run(move |registry| {
            let names = registry.active_names().join(",");
            action_sink.lock().unwrap().push(format!("action:{names}"));
        })
        .await;
    assert!(wait_for_entry(&log, "action:worker", 1).await);

    // Watching resumed on the same subscription after the paused action.
    fs::write(dir.path().join("resumed.txt"), "x")?;
    assert!(wait_for_entry(&log, "worker:run_on_change:resumed.txt", 1).await);

    handle.stop().await;
    let (result, _) = timeout(WAIT, join).await??;
    result?;
    Ok(())
}

#[tokio::test]
async fn run_paused_before_watching_restores_the_idle_state() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "dormant",
        Box::new(RecordingGuard::new("dormant", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;

    let mut supervisor = Supervisor::new(
        registry,
        fast_backend(dir.path()),
        SupervisorOptions::default(),
    );
    assert_eq!(supervisor.state(), SupervisorState::Idle);

    let action_sink = log.clone();
    supervisor
        .run_paused(move |registry| {
            let names = registry.active_names().join(",");
            action_sink.lock().unwrap().push(format!("action:{names}"));
        })
        .await?;

    // The backend was never running, and the state still comes back.
    assert_eq!(supervisor.state(), SupervisorState::Idle);
    assert_eq!(entries(&log), vec!["action:dormant"]);
    Ok(())
}

#[tokio::test]
async fn group_scoping_excludes_other_groups_entirely() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "front",
        Box::new(RecordingGuard::new("front", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::in_group("frontend"),
    )?;
    registry.register(
        "back",
        Box::new(RecordingGuard::new("back", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::in_group("backend"),
    )?;

    let options = SupervisorOptions {
        groups: vec!["frontend".to_string()],
        ..SupervisorOptions::default()
    };
    let (handle, join) = spawn_supervisor(registry, dir.path(), options);
    assert!(wait_for_entry(&log, "front:start", 1).await);

    fs::write(dir.path().join("shared.txt"), "x")?;
    assert!(wait_for_entry(&log, "front:run_on_change:shared.txt", 1).await);

    // The out-of-scope guard never saw a single lifecycle call.
    assert!(
        entries(&log).iter().all(|e| !e.starts_with("back:")),
        "out-of-scope guard was called: {:?}",
        entries(&log)
    );

    handle.stop().await;
    let (result, _) = timeout(WAIT, join).await??;
    result?;
    Ok(())
}

#[tokio::test]
async fn ignore_paths_control_takes_effect_on_later_scans() -> TestResult {
    common::init_tracing();
    let dir = tempfile::tempdir()?;
    let log = journal();

    let mut registry = GuardRegistry::new();
    registry.register(
        "sieve",
        Box::new(RecordingGuard::new("sieve", log.clone())),
        match_everything(),
        vec![],
        GuardOptions::default(),
    )?;

    let (handle, join) = spawn_supervisor(registry, dir.path(), SupervisorOptions::default());
    assert!(wait_for_entry(&log, "sieve:start", 1).await);

    handle.ignore_paths(vec!["*.skip".to_string()]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    fs::write(dir.path().join("unwanted.skip"), "x")?;
    fs::write(dir.path().join("wanted.txt"), "y")?;
    assert!(wait_for_entry(&log, "sieve:run_on_change:wanted.txt", 1).await);

    assert!(
        entries(&log).iter().all(|e| !e.contains("unwanted.skip")),
        "ignored path dispatched: {:?}",
        entries(&log)
    );

    handle.stop().await;
    let (result, _) = timeout(WAIT, join).await??;
    result?;
    Ok(())
}
