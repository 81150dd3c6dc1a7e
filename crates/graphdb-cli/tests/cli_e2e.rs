use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn graphdb_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_graphdb"))
}

fn run(db: &Path, args: &[&str]) -> Output {
    let out = Command::new(graphdb_bin())
        .args(args)
        .arg("--db")
        .arg(db)
        .env("NO_COLOR", "1")
        .output()
        .expect("run graphdb");
    assert!(
        out.status.success(),
        "graphdb {args:?} failed:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    out
}

fn stdout_lines(out: &Output) -> Vec<String> {
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn store_find_and_query_persist_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.log");

    for i in 1..5 {
        run(&db, &["store", &(i - 1).to_string(), "precedes", &i.to_string()]);
    }
    run(&db, &["store", "3", "even", "false"]);
    run(&db, &["store", "2", "even", "true"]);

    let found = run(&db, &["find", "0", "precedes"]);
    assert_eq!(stdout_lines(&found), vec!["1"]);

    let far = run(&db, &["query", "0", "precedes.precedes.precedes"]);
    assert_eq!(stdout_lines(&far), vec!["3"]);

    let filtered = run(&db, &["query", "1", "precedes", "--where", "even=true"]);
    assert_eq!(stdout_lines(&filtered), vec!["2"]);

    run(&db, &["delete", "0", "precedes", "1"]);
    let gone = run(&db, &["find", "0", "precedes"]);
    assert!(stdout_lines(&gone).is_empty());

    run(&db, &["delete", "2"]);
    let rels = run(&db, &["relations", "--json"]);
    let rows: Vec<[String; 3]> = serde_json::from_slice(&rels.stdout).unwrap();
    assert_eq!(
        rows,
        vec![
            ["3".to_string(), "precedes".to_string(), "4".to_string()],
            ["3".to_string(), "even".to_string(), "false".to_string()],
        ]
    );
}

#[test]
fn malformed_query_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.log");
    run(&db, &["store", "a", "knows", "b"]);

    let out = Command::new(graphdb_bin())
        .args(["query", "a", "knows..knows", "--db"])
        .arg(&db)
        .output()
        .unwrap();
    assert!(!out.status.success());
}

#[test]
fn demo_runs() {
    let out = Command::new(graphdb_bin())
        .arg("demo")
        .env("NO_COLOR", "1")
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\"waffles\""));
    let after_delete = stdout
        .lines()
        .find(|l| l.contains("5.greater_than after deleting 2 and 3"))
        .unwrap();
    assert!(after_delete.contains("[1, 4]"));
}

#[test]
fn verbose_logs_store_open() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.log");
    run(&db, &["store", "a", "knows", "b"]);

    let out = Command::new(graphdb_bin())
        .args(["--verbose", "items", "--db"])
        .arg(&db)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("opening store"));
    assert!(stderr.contains("store opened"));
}
