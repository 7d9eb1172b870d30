use assert_cmd::cargo::cargo_bin_cmd;

fn fixture(path: &str) -> String {
    format!("{}/tests/fixtures/{path}", env!("CARGO_MANIFEST_DIR"))
}

fn summary(stdout: &[u8]) -> serde_json::Value {
    serde_json::from_slice(stdout).expect("summary json")
}

#[test]
fn help_lists_flags() {
    let mut cmd = cargo_bin_cmd!("replayer");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");

    assert!(stdout.contains("--input"));
    assert!(stdout.contains("--column"));
    assert!(stdout.contains("--config"));
}

#[test]
fn weather_log_reports_max_and_occurrences() {
    let mut cmd = cargo_bin_cmd!("replayer");
    cmd.arg("--config")
        .arg(fixture("weather.toml"))
        .arg("--input")
        .arg(fixture("lisbon-april.csv"));
    let out = cmd.assert().success();
    let summary = summary(&out.get_output().stdout);

    assert_eq!(summary["rows"], 7);
    assert_eq!(summary["max"], 21);
    assert_eq!(summary["max_count"], 2);
    assert_eq!(summary["parallel_max"], 21);
    assert_eq!(summary["splits"], 3);
    assert_eq!(summary["stats"]["pulls"], 7);
    assert_eq!(summary["stats"]["released"], true);
}

#[test]
fn stdin_is_read_when_no_input_is_given() {
    let mut cmd = cargo_bin_cmd!("replayer");
    cmd.write_stdin("1\n5\n5\n");
    let out = cmd.assert().success();
    let summary = summary(&out.get_output().stdout);

    assert_eq!(summary["max"], 5);
    assert_eq!(summary["max_count"], 2);
}

#[test]
fn events_are_appended_to_the_log_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let log = temp.path().join("replay.jsonl");
    let mut cmd = cargo_bin_cmd!("replayer");
    cmd.arg("--log").arg(&log).write_stdin("4\n2\n");
    cmd.assert().success();

    let text = std::fs::read_to_string(&log).expect("log file");
    let first: serde_json::Value =
        serde_json::from_str(text.lines().next().expect("first line")).expect("json line");
    assert_eq!(first["event_type"], "source_opened");
    assert!(text.lines().any(|line| line.contains("\"run_complete\"")));
}

#[test]
fn missing_config_exits_nonzero() {
    let mut cmd = cargo_bin_cmd!("replayer");
    cmd.arg("--config").arg(fixture("missing.toml"));
    cmd.write_stdin("1\n");
    cmd.assert().failure();
}

#[test]
fn unparseable_value_exits_nonzero() {
    let mut cmd = cargo_bin_cmd!("replayer");
    cmd.write_stdin("1\nwarm\n");
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("parse error"), "{stderr}");
    assert!(stderr.contains("line 2"), "{stderr}");
}
