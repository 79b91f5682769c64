use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

fn exec_path() -> String {
    env!("CARGO_BIN_EXE_livepipe").to_string()
}

fn run_with_input(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(exec_path())
        .args(args)
        .env_remove("LIVEPIPE_STAGE_TIMEOUT")
        .env_remove("LIVEPIPE_LINE_NUMBERS")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run");
    {
        let mut stdin = child.stdin.take().expect("stdin");
        stdin.write_all(input.as_bytes()).expect("write stdin");
    }
    child.wait_with_output().expect("wait")
}

#[test]
fn test_grep_over_stdin() {
    let output = run_with_input(&["--", "grep b"], "a\nb\nc\n");
    assert!(output.status.success(), "exit: {:?}", output.status);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "b\n");
}

#[test]
fn test_quoted_pipe_not_split() {
    let output = run_with_input(&["--", "grep 'a|b' | wc -l"], "a|b\nx\na|b c\n");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "2", "stdout: {:?}", stdout);
}

#[test]
fn test_command_without_dashdash() {
    let output = run_with_input(&["sort", "-r"], "1\n3\n2\n");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "3\n2\n1\n");
}

#[test]
fn test_empty_command_echoes_input() {
    let output = run_with_input(&["--", "   "], "keep\nme\n");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "keep\nme\n");
}

#[test]
fn test_missing_program_is_not_process_failure() {
    let output = run_with_input(&["--", "nosuchprogram123"], "x\n");
    // Stage failures are reported, never turned into exit codes
    assert!(output.status.success(), "exit: {:?}", output.status);
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Error: Command 'nosuchprogram123' failed."),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_failure_keeps_no_output_from_later_stages() {
    let output = run_with_input(&["--", "false | wc -l"], "x\n");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: Command 'false' failed. exit status 1"), "stderr: {}", stderr);
    assert!(!String::from_utf8_lossy(&output.stdout).contains('1'));
}

#[test]
fn test_parse_error_reported() {
    let output = run_with_input(&["--", "grep \"foo`"], "foo\n");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("mismatched quotes \" & `"), "stderr: {}", stderr);
}

#[test]
fn test_emit_command() {
    let output = run_with_input(&["--emit-command", "--", "sort | uniq -c"], "b\na\n");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "sort | uniq -c\n");
}

#[test]
fn test_follow_ends_with_final_count() {
    let output = run_with_input(&["--follow", "--", "wc -l"], "x\ny\nz\n");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let last = stdout.lines().filter(|l| !l.trim().is_empty()).last();
    assert_eq!(last.map(str::trim), Some("3"), "stdout: {:?}", stdout);
}

#[test]
fn test_line_numbers() {
    let output = run_with_input(&["--line-numbers", "--", "cat"], "a\nb\n");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "1 a\n2 b\n");
}

#[test]
fn test_meta_report_written() {
    let dir = tempfile::tempdir().unwrap();
    let meta = dir.path().join("run.json");
    let meta_arg = meta.to_str().unwrap();

    let output = run_with_input(&["--meta", meta_arg, "--", "cat | false"], "abc\n");
    assert!(output.status.success());

    let content = fs::read_to_string(&meta).expect("meta file missing");
    let v: serde_json::Value = serde_json::from_str(&content).expect("invalid json");
    assert_eq!(v["status"], "failure");
    assert_eq!(v["failed_stage"], 1);
    assert_eq!(v["pipestatus"], serde_json::json!([0, 1]));
    assert_eq!(v["source_bytes"], 4);
    assert_eq!(v["timed_out"], false);
    assert_eq!(v["command_line"], "cat | false");
}

#[test]
fn test_output_bytes_preserved() {
    let output = run_with_input(&["--", "cat"], "a\n\n");
    assert_eq!(output.stdout, b"a\n\n");

    let output = run_with_input(&["--", "tr -d '\\n'"], "a\nb\n");
    assert_eq!(output.stdout, b"ab");
}
