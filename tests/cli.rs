use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn parse_jsonl(stdout: &[u8]) -> Vec<Value> {
    let s = String::from_utf8_lossy(stdout);
    s.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str::<Value>(l).expect("valid jsonl line"))
        .collect()
}

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn querypad() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("querypad"));
    cmd.env_remove("RUST_LOG")
        .env_remove("QUERYPAD_MIN_LENGTH")
        .env_remove("QUERYPAD_ENCODING")
        .env_remove("QUERYPAD_CHUNK_SIZE");
    cmd
}

#[test]
fn run_counts_lines_of_file() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("notes.txt");
    write_file(&file, b"one\ntwo\nthree\n");

    let assert = querypad()
        .arg("run")
        .arg("lines.length")
        .arg("--file")
        .arg(&file)
        .assert()
        .success();

    let messages = parse_jsonl(&assert.get_output().stdout);
    assert_eq!(messages, vec![serde_json::json!({"kind": "string", "data": "3"})]);
}

#[test]
fn run_reads_document_from_stdin() {
    let assert = querypad()
        .args(["run", "lines.distinct()", "--stdin"])
        .write_stdin("b\na\nb\n")
        .assert()
        .success();

    let messages = parse_jsonl(&assert.get_output().stdout);
    assert_eq!(
        messages,
        vec![serde_json::json!({"kind": "flat-array", "data": ["b", "a"]})]
    );
}

#[test]
fn stdin_document_is_named_stdin() {
    querypad()
        .args(["--format", "raw", "run", "doc.fileName", "--stdin"])
        .write_stdin("x")
        .assert()
        .success()
        .stdout("stdin\n");
}

#[test]
fn existing_file_wins_over_stdin() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("a.txt");
    write_file(&file, b"from file\n");

    querypad()
        .args(["--format", "raw", "run", "fullText"])
        .arg("--file")
        .arg(&file)
        .arg("--stdin")
        .write_stdin("from stdin")
        .assert()
        .success()
        .stdout(predicate::str::contains("from file"));
}

#[test]
fn missing_target_reports_error() {
    let assert = querypad()
        .args(["run", "lines"])
        .arg("--file")
        .arg("/definitely/not/here.txt")
        .assert()
        .failure();

    let messages = parse_jsonl(&assert.get_output().stdout);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["kind"], "error");
    assert_eq!(messages[0]["message"], "Could not read file or document");
    assert_eq!(messages[0]["code"], "NO_READABLE_TARGET");
}

#[test]
fn compile_error_exits_non_zero() {
    querypad()
        .args(["run", "lines.filter(", "--stdin"])
        .write_stdin("a")
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"code\":\"COMPILE_ERROR\""))
        .stderr(predicate::str::contains("query failed"));
}

#[test]
fn stream_emits_chunks_then_end() {
    let assert = querypad()
        .args([
            "run",
            "for await (const l of linesAsync) yield l.toUpperCase()",
            "--stdin",
        ])
        .write_stdin("a\nb\n")
        .assert()
        .success();

    let messages = parse_jsonl(&assert.get_output().stdout);
    assert_eq!(
        messages,
        vec![
            serde_json::json!({"kind": "async-stream-chunk", "data": "A"}),
            serde_json::json!({"kind": "async-stream-chunk", "data": "B"}),
            serde_json::json!({"kind": "async-stream-end"}),
        ]
    );
}

#[test]
fn take_cancels_a_long_stream() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("big.log");
    let text: String = (0..10_000).map(|i| format!("entry {}\n", i)).collect();
    write_file(&file, text.as_bytes());

    let assert = querypad()
        .args(["run", "for await (const l of linesAsync) yield l", "--take", "3"])
        .arg("--file")
        .arg(&file)
        .assert()
        .success();

    let messages = parse_jsonl(&assert.get_output().stdout);
    let data: Vec<_> = messages.iter().map(|m| m["data"].as_str().unwrap()).collect();
    assert_eq!(data, vec!["entry 0", "entry 1", "entry 2"]);
    assert!(messages.iter().all(|m| m["kind"] == "async-stream-chunk"));
}

#[test]
fn json_format_collects_stream_into_one_array() {
    let assert = querypad()
        .args(["--format", "json", "run", "for (const l of lines) yield l", "--stdin"])
        .write_stdin("x\ny")
        .assert()
        .success();

    let parsed: Vec<Value> = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed[2]["kind"], "async-stream-end");
}

#[test]
fn binary_file_is_read_as_strings() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("tool.exe");
    write_file(&file, b"\x00\x01MZhello world\x00\xffab\x02\x03config.ini\x00");

    let assert = querypad()
        .args(["run", "lines"])
        .arg("--file")
        .arg(&file)
        .assert()
        .success();

    let messages = parse_jsonl(&assert.get_output().stdout);
    assert_eq!(
        messages[0]["data"],
        serde_json::json!(["MZhello world", "config.ini"])
    );
}

#[test]
fn min_length_flag_and_env() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("blob.bin");
    write_file(&file, b"abc\x00abcdef\x00ab");

    querypad()
        .args(["--format", "raw", "--min-length", "3", "run", "lines"])
        .arg("--file")
        .arg(&file)
        .assert()
        .success()
        .stdout("abc\nabcdef\n");

    querypad()
        .env("QUERYPAD_MIN_LENGTH", "5")
        .args(["--format", "raw", "run", "lines"])
        .arg("--file")
        .arg(&file)
        .assert()
        .success()
        .stdout("abcdef\n");
}

#[test]
fn strings_stream_matches_batch() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("data.txt");
    let mut bytes = Vec::new();
    for i in 0..500 {
        bytes.extend_from_slice(format!("record-{}", i).as_bytes());
        bytes.push(0);
    }
    write_file(&file, &bytes);

    let batch = querypad()
        .args(["--format", "raw", "strings"])
        .arg(&file)
        .assert()
        .success();
    let streamed = querypad()
        .args(["--format", "raw", "--chunk-size", "7", "strings", "--stream"])
        .arg(&file)
        .assert()
        .success();

    assert_eq!(batch.get_output().stdout, streamed.get_output().stdout);
    let text = String::from_utf8_lossy(&batch.get_output().stdout).into_owned();
    assert_eq!(text.lines().count(), 500);
}

#[test]
fn plan_reports_stream_queries() {
    let assert = querypad()
        .args(["plan", "for await (const l of linesAsync) yield l"])
        .assert()
        .success();
    let plan: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(plan["isAsync"], true);
    assert_eq!(plan["implicitReturn"], false);
}

#[test]
fn operators_lists_catalog() {
    let assert = querypad().arg("operators").assert().success();
    let entries = parse_jsonl(&assert.get_output().stdout);
    let names: Vec<_> = entries.iter().map(|e| e["name"].as_str().unwrap()).collect();
    for expected in ["distinct", "zip", "groupBy", "sortByDescending", "json"] {
        assert!(names.contains(&expected), "missing {}", expected);
    }
}

#[test]
fn serve_answers_each_request_line() {
    let input = concat!(
        r#"{"expression":"lines.length","target":{"documentText":"a\nb"}}"#,
        "\n",
        "\n",
        r#"{"expression":"fullText.toUpperCase()","target":{"documentText":"hi"}}"#,
        "\n",
    );
    let assert = querypad().arg("serve").write_stdin(input).assert().success();

    let messages = parse_jsonl(&assert.get_output().stdout);
    assert_eq!(
        messages,
        vec![
            serde_json::json!({"kind": "string", "data": "2"}),
            serde_json::json!({"kind": "string", "data": "HI"}),
        ]
    );
}
