use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;

use tempfile::NamedTempFile;

/// Feed `script` to the shell on stdin, the way a pipe or a heredoc would.
fn run_ysh(script: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_ysh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to execute ysh");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(script.as_bytes())
        .expect("write script");
    child.wait_with_output().expect("wait for ysh")
}

/// Feed `lines` one at a time, pausing after each so background jobs can
/// finish between two lines.
fn run_ysh_paced(lines: &[(&str, Duration)]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_ysh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to execute ysh");
    let mut stdin = child.stdin.take().expect("stdin");
    for (line, pause) in lines {
        stdin.write_all(line.as_bytes()).expect("write line");
        stdin.flush().expect("flush line");
        thread::sleep(*pause);
    }
    drop(stdin);
    child.wait_with_output().expect("wait for ysh")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A shell script that stops itself with `signal` and prints `resumed`
/// once continued.
fn stopping_script(signal: &str) -> NamedTempFile {
    let mut script = NamedTempFile::new().expect("create script");
    writeln!(script, "kill -{signal} $$").unwrap();
    writeln!(script, "echo resumed").unwrap();
    script
}

fn cmd(script: &Path) -> String {
    format!("sh {}", script.display())
}

#[test]
fn foreground_pipeline_prints_no_job_lines() {
    let output = run_ysh("echo hello | tr a-z A-Z\njobs\n");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "HELLO\n");
}

#[test]
fn background_job_reported_done_once() {
    let output = run_ysh("sleep 0.2 &\nsleep 0.6\njobs\necho end\n");
    assert!(output.status.success(), "{output:?}");
    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();

    let pgid = lines[0].strip_prefix("[1]   ").expect("placement line");
    assert!(pgid.parse::<i32>().is_ok(), "not a pgid: {pgid}");
    assert_eq!(out.matches("[1]+   Done  sleep 0.2 &").count(), 1, "{out}");
    assert_eq!(lines.last(), Some(&"end"));
}

#[test]
fn background_jobs_are_numbered_in_order() {
    let output = run_ysh("sleep 5 &\nsleep 5 &\njobs\nexit\n");
    assert!(output.status.success(), "{output:?}");
    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4, "{out}");
    assert!(lines[0].starts_with("[1]   "));
    assert!(lines[1].starts_with("[2]   "));
    assert_eq!(lines[2], "[1]-   Running  sleep 5 &");
    assert_eq!(lines[3], "[2]+   Running  sleep 5 &");
}

#[test]
fn blank_and_invalid_lines_report_finished_jobs() {
    let pause = Duration::from_millis(600);
    let output = run_ysh_paced(&[
        ("sleep 0.1 &\n", pause),
        ("\n", Duration::ZERO),
        ("sleep 0.1 &\n", pause),
        ("ls |\n", Duration::ZERO),
        ("echo next\n", Duration::ZERO),
    ]);
    assert!(output.status.success(), "{output:?}");
    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 5, "{out}");
    assert!(lines[0].starts_with("[1]   "), "{out}");
    assert_eq!(lines[1], "[1]+   Done  sleep 0.1 &");
    assert!(lines[2].starts_with("[1]   "), "{out}");
    assert_eq!(lines[3], "[1]+   Done  sleep 0.1 &");
    assert_eq!(lines[4], "next");
}

#[test]
fn fg_and_bg_without_jobs() {
    let output = run_ysh("fg\nbg\nfg %3\n");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        stdout(&output),
        "-ysh: fg: current: no such job\n-ysh: bg: current: no such job\n-ysh: fg: %3: no such job\n"
    );
}

#[test]
fn interactive_stop_then_bg() {
    let script = stopping_script("TSTP");
    let cmd = cmd(script.path());
    let output = run_ysh(&format!("{cmd}\njobs\nbg\nsleep 0.6\njobs\n"));
    assert!(output.status.success(), "{output:?}");

    let out = stdout(&output);
    let stopped = format!("[1]+   Stopped  {cmd}");
    let done = format!("[1]+   Done  {cmd}");
    // the stop itself is silent, only `jobs` shows it
    assert_eq!(out.matches("Stopped").count(), 1, "{out}");
    assert!(out.contains(&stopped), "{out}");
    assert!(out.lines().any(|line| line == cmd), "{out}");
    assert!(out.contains("resumed\n"), "{out}");
    assert_eq!(out.matches(&done).count(), 1, "{out}");
    assert!(out.find(&stopped) < out.find(&done));
}

#[test]
fn stop_is_announced_once_then_fg_resumes() {
    let script = stopping_script("STOP");
    let cmd = cmd(script.path());
    let output = run_ysh(&format!("{cmd}\njobs\nfg\njobs\n"));
    assert!(output.status.success(), "{output:?}");
    assert_eq!(
        stdout(&output),
        format!("[1]+   Stopped  {cmd}\n[1]+   Stopped  {cmd}\n{cmd}\nresumed\n")
    );
}

#[test]
fn fg_by_job_number() {
    let script = stopping_script("STOP");
    let cmd = cmd(script.path());
    let output = run_ysh(&format!("sleep 5 &\n{cmd}\nfg %2\njobs\nexit\n"));
    assert!(output.status.success(), "{output:?}");
    let out = stdout(&output);
    assert!(out.contains(&format!("[2]+   Stopped  {cmd}\n{cmd}\nresumed\n")), "{out}");
    assert!(out.ends_with("[1]+   Running  sleep 5 &\n"), "{out}");
}

#[test]
fn command_not_found_keeps_shell_alive() {
    let output = run_ysh("no_such_command_ysh\necho still here\n");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "still here\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("ysh: no_such_command_ysh: command not found"),
        "{stderr}"
    );
}

#[test]
fn syntax_errors_discard_the_line() {
    let output = run_ysh("echo a |\necho b & echo c\necho ok\n");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "ok\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no argument after pipe"), "{stderr}");
    assert!(stderr.contains("& must be at the end of the line"), "{stderr}");
}

#[test]
fn exit_code_and_command_mode() {
    let output = Command::new(env!("CARGO_BIN_EXE_ysh"))
        .args(["-c", "exit 3"])
        .output()
        .expect("failed to execute ysh");
    assert_eq!(output.status.code(), Some(3));

    let output = Command::new(env!("CARGO_BIN_EXE_ysh"))
        .args(["-c", "false"])
        .output()
        .expect("failed to execute ysh");
    assert_eq!(output.status.code(), Some(1));

    let output = run_ysh("exit 4\necho unreachable\n");
    assert_eq!(output.status.code(), Some(4));
    assert_eq!(stdout(&output), "");
}
