//! Integration Tests

#[macro_use]
extern crate lazy_static;

use std::collections::HashMap;
use std::path::PathBuf;


use crate::workdir::WorkDir;

struct ScriptData<'a> {
    pub stdout: &'a str,
    pub exit_status: i32,
}

lazy_static! {
    static ref PSH_SCRIPTS_MAP: HashMap<&'static str, ScriptData<'static>> = {
        let mut map = HashMap::new();
        map.insert("simple_echo.psh", ScriptData { stdout: "test\n", exit_status: 0 });
        map.insert("simple_redirects.psh", ScriptData {
            stdout: "test output, please ignore\n",
            exit_status: 0
        });
        map.insert("simple_pipeline.psh", ScriptData { stdout: "needle\n", exit_status: 0 });
        map.insert("simple_exit_error.psh", ScriptData { stdout: "", exit_status: 85 });
        map.insert("simple_exit_large.psh", ScriptData { stdout: "", exit_status: 244 });
        map.insert("simple_exit_negative.psh", ScriptData { stdout: "", exit_status: 12 });
        map.insert("and_or.psh", ScriptData {
            stdout: "yes\nfallback\nrecovered\n",
            exit_status: 0
        });
        map.insert("sequence.psh", ScriptData { stdout: "a\nb\nc\nd\n", exit_status: 0 });
        map.insert("comments.psh", ScriptData { stdout: "visible\n", exit_status: 0 });
        map.insert("heredoc.psh", ScriptData {
            stdout: "line one\n  line two\nindented\ndone\n",
            exit_status: 0
        });
        map.insert("continuation.psh", ScriptData {
            stdout: "one\ntwo\nmulti\nline\nbackslash\n",
            exit_status: 0
        });
        map.insert("syntax_error.psh", ScriptData { stdout: "before\n", exit_status: 2 });
        map.insert("command_not_found.psh", ScriptData { stdout: "", exit_status: 127 });
        map.insert("duplicate_fd.psh", ScriptData { stdout: "err\n", exit_status: 0 });
        map.insert("background.psh", ScriptData {
            stdout: "[1] Running\tsleep 1\n",
            exit_status: 0
        });
        map.insert("job_ids_reused.psh", ScriptData {
            stdout: "[1] Running\tsleep 1\n",
            exit_status: 0
        });
        map.insert("jobs_in_pipeline.psh", ScriptData {
            stdout: "[1] Running\tsleep 1\n[1] Running\tsleep 1\n",
            exit_status: 0
        });
        map.insert("subshell_exit.psh", ScriptData { stdout: "still here\n", exit_status: 1 });
        map
    };
}

fn get_path_to_test_scripts() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("scripts")
}

#[test]
fn test_all_psh_scripts() {
    let mut failures = Vec::new();
    for (name, expected) in PSH_SCRIPTS_MAP.iter() {
        let workdir = WorkDir::new("script");
        let script = get_path_to_test_scripts().join(name);
        let output = workdir
            .command(&[&script])
            .output()
            .expect("unable to run psh");

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout != expected.stdout || output.status.code() != Some(expected.exit_status) {
            failures.push(format!(
                "{}: expected {:?} (exit {}), got {:?} (exit {:?})\nstderr: {}",
                name,
                expected.stdout,
                expected.exit_status,
                stdout,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            ));
        }
    }
    assert!(failures.is_empty(), "\n{}", failures.join("\n"));
}

#[test]
fn test_every_fixture_has_expectations() {
    for entry in get_path_to_test_scripts().read_dir().expect("read_dir failed") {
        let entry = entry.expect("unable to open test script");
        let filename = entry.file_name();
        let filename = filename.to_str().expect("filename should be valid Unicode");
        assert!(
            PSH_SCRIPTS_MAP.contains_key(filename),
            "{} has no entry in PSH_SCRIPTS_MAP",
            filename
        );
    }
}

#[test]
fn test_command_string() {
    let workdir = WorkDir::new("command-string");
    let stdout = workdir.stdout(&mut workdir.command(&["-c", "echo hello world"]));
    assert_eq!(stdout, "hello world\n");
}

#[test]
fn test_version() {
    let workdir = WorkDir::new("version");
    let stdout = workdir.stdout(&mut workdir.command(&["--version"]));
    assert_eq!(stdout, format!("psh version {}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_stdin_script() {
    use std::io::Write;
    use std::process::Stdio;

    let workdir = WorkDir::new("stdin");
    let mut child = workdir
        .command(&[] as &[&str])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"echo from stdin | tr a-z A-Z\nexit 7\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert_eq!(String::from_utf8_lossy(&output.stdout), "FROM STDIN\n");
    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn test_stdin_script_shares_input_with_commands() {
    use std::io::Write;
    use std::process::Stdio;

    let workdir = WorkDir::new("stdin-shared");
    let mut child = workdir
        .command(&[] as &[&str])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"sh -c 'read line; echo \"got $line\"'\nfrom the script\necho after\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "got from the script\nafter\n"
    );
    assert!(output.status.success());
}

#[test]
fn test_missing_script() {
    let workdir = WorkDir::new("missing");
    let output = workdir.command(&["no-such-script.psh"]).output().unwrap();
    assert_eq!(output.status.code(), Some(127));
    assert_eq!(
        String::from_utf8_lossy(&output.stderr),
        "psh: no-such-script.psh: No such file or directory\n"
    );
}

#[test]
fn test_command_not_found_message() {
    let workdir = WorkDir::new("not-found");
    let output = workdir.run_string("psh-no-such-command");
    assert_eq!(output.status.code(), Some(127));
    assert_eq!(
        String::from_utf8_lossy(&output.stderr),
        "psh: psh-no-such-command: command not found\n"
    );
}

#[test]
fn test_not_executable() {
    let workdir = WorkDir::new("not-executable");
    workdir.create("data.txt", "not a program\n");
    let output = workdir.run_string("./data.txt");
    assert_eq!(output.status.code(), Some(126));
    assert_eq!(
        String::from_utf8_lossy(&output.stderr),
        "psh: ./data.txt: Permission denied\n"
    );
}

#[test]
fn test_syntax_error_runs_nothing() {
    let workdir = WorkDir::new("syntax");
    let output = workdir.run_string("touch created && | echo bad");
    assert_eq!(output.status.code(), Some(2));
    assert!(!workdir.path().join("created").exists());
    assert_eq!(
        String::from_utf8_lossy(&output.stderr),
        "psh: syntax error near unexpected token `|'\n"
    );
}

#[test]
fn test_unterminated_quote() {
    let workdir = WorkDir::new("quote");
    let output = workdir.run_string("echo 'open");
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(
        String::from_utf8_lossy(&output.stderr),
        "psh: unexpected end of file while looking for matching `''\n"
    );
}

#[test]
fn test_redirections_on_builtins_are_restored() {
    let workdir = WorkDir::new("builtin-redirect");
    let stdout = workdir.stdout(&mut workdir.command(&[
        "-c",
        "jobs > jobs.txt; echo after",
    ]));
    assert_eq!(stdout, "after\n");
    assert_eq!(workdir.read("jobs.txt"), "");
}

#[test]
fn test_append_and_read_write() {
    let workdir = WorkDir::new("append");
    workdir.output(&mut workdir.command(&[
        "-c",
        "echo first > log.txt; echo second >> log.txt; echo third 3<> other.txt 1>&3",
    ]));
    assert_eq!(workdir.read("log.txt"), "first\nsecond\n");
    assert_eq!(workdir.read("other.txt"), "third\n");
}

#[test]
fn test_redirection_failure() {
    let workdir = WorkDir::new("redirect-failure");
    let output = workdir.run_string("echo lost > missing-dir/out.txt || echo recovered");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "recovered\n");
    assert_eq!(
        String::from_utf8_lossy(&output.stderr),
        "psh: missing-dir/out.txt: No such file or directory\n"
    );
}

#[test]
fn test_tilde_expansion() {
    let workdir = WorkDir::new("tilde");
    let stdout = workdir.stdout(&mut workdir.command(&["-c", "echo ~ ~/notes '~'"]));
    let home = workdir.path().display().to_string();
    assert_eq!(stdout, format!("{0} {0}/notes ~\n", home));
}

#[test]
fn test_kill_background_job() {
    let workdir = WorkDir::new("kill");
    let stdout = workdir.stdout(&mut workdir.command(&[
        "-c",
        "sleep 30 & kill %1 && echo sent",
    ]));
    assert_eq!(stdout, "sent\n");
}

#[test]
fn test_kill_unknown_job() {
    let workdir = WorkDir::new("kill-unknown");
    let output = workdir.run_string("kill %4");
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        String::from_utf8_lossy(&output.stderr),
        "psh: kill: %4: no such job\n"
    );
}

#[test]
fn test_fg_without_job_control() {
    let workdir = WorkDir::new("fg");
    let output = workdir.run_string("fg");
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&output.stderr), "psh: fg: no job control\n");
}

#[test]
fn test_exit_status_of_signaled_pipeline() {
    let workdir = WorkDir::new("signaled");
    let output = workdir.run_string("sh -c 'kill -9 $$'");
    assert_eq!(output.status.code(), Some(128 + 9));
}
