use std::path::PathBuf;
use std::process::Command;

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("trialforge-e2e-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn run_study(tag: &str, study: &str, parallel: usize) -> (std::process::Output, PathBuf) {
    let dir = scratch_dir(tag);
    let study_path = dir.join("study.json");
    std::fs::write(&study_path, study).unwrap();
    let workdir = dir.join("work");

    let output = Command::new(env!("CARGO_BIN_EXE_trialforge"))
        .arg("--study")
        .arg(&study_path)
        .arg("--parallel")
        .arg(parallel.to_string())
        .arg("--workdir")
        .arg(&workdir)
        .arg("--no-tui")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap();
    (output, dir)
}

fn describe(output: &std::process::Output) -> String {
    format!(
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

const STUDY: &str = r#"{
    "name": "e2e",
    "models": [
        {
            "graph": {
                "name": "small",
                "nodes": [{ "name": "fc", "op": "linear", "attrs": { "out_features": 4 } }]
            },
            "training": {
                "module": "builtin.synthetic",
                "kwargs": { "epochs": 2, "epoch_ms": 50 }
            }
        },
        {
            "graph": {
                "name": "large",
                "nodes": [{ "name": "fc", "op": "linear", "attrs": { "out_features": 512 } }]
            },
            "training": {
                "module": "builtin.synthetic",
                "kwargs": { "epochs": 2, "epoch_ms": 50 }
            },
            "repeat": 2
        },
        {
            "graph": { "name": "broken", "nodes": [{ "name": "fc", "op": "linear" }] },
            "training": { "module": "builtin.failing" }
        }
    ]
}"#;

const CRASH_STUDY: &str = r#"{
    "name": "e2e-crash",
    "models": [
        {
            "graph": { "name": "crash", "nodes": [{ "name": "fc", "op": "linear" }] },
            "training": { "module": "builtin.crashing" }
        },
        {
            "graph": {
                "name": "after",
                "nodes": [{ "name": "fc", "op": "linear", "attrs": { "out_features": 8 } }]
            },
            "training": { "module": "builtin.synthetic", "kwargs": { "epochs": 1 } }
        }
    ]
}"#;

#[test]
fn runs_every_trial_on_parallel_workers() {
    let (output, dir) = run_study("parallel", STUDY, 2);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", describe(&output));
    assert!(stdout.contains("trials=4 parallel=2"), "{stdout}");

    let done: Vec<&str> = stdout.lines().filter(|l| l.starts_with("Trial: ")).collect();
    assert_eq!(done.len(), 4, "{stdout}");
    assert_eq!(done.iter().filter(|l| l.contains("Status: Trained")).count(), 3);
    assert!(
        done.iter()
            .any(|l| l.contains("(broken), Status: Failed") && l.contains("always fails"))
    );

    assert!(stdout.contains("Study e2e: 3 trained, 1 failed"));
    assert!(stdout.contains("Best: large with metric"));

    let leftovers = std::fs::read_dir(dir.join("work")).unwrap().count();
    assert_eq!(leftovers, 0);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn crashed_worker_fails_its_trial_and_is_replaced() {
    let (output, dir) = run_study("crash", CRASH_STUDY, 1);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", describe(&output));

    let done: Vec<&str> = stdout.lines().filter(|l| l.starts_with("Trial: ")).collect();
    assert_eq!(done.len(), 2, "{stdout}");
    assert!(done[0].contains("(crash), Status: Failed"), "{stdout}");
    assert!(done[0].contains("worker process exited"), "{stdout}");
    assert!(done[1].contains("(after), Status: Trained"), "{stdout}");
    assert!(stdout.contains("Study e2e-crash: 1 trained, 1 failed"));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn invalid_study_fails_fast() {
    let (output, dir) = run_study("invalid", r#"{ "name": "empty", "models": [] }"#, 1);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no models"));
    std::fs::remove_dir_all(&dir).unwrap();
}
