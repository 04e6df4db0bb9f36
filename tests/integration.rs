use std::io::{BufRead as _, BufReader};
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

fn linkmend(root: &Path, args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_linkmend"))
        .args(args)
        .arg("--root")
        .arg(root)
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    return output;
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn read(root: &Path, relative: &str) -> String {
    return std::fs::read_to_string(root.join(relative)).unwrap();
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed: {}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn mv_renames_and_updates_references() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", "See [guide](docs/guide.md).\n");
    write(dir.path(), "docs/guide.md", "# Guide\n");

    let output = linkmend(dir.path(), &["mv", "docs/guide.md", "docs/handbook.md"]);
    assert_success(&output);
    assert!(dir.path().join("docs/handbook.md").exists());
    assert!(!dir.path().join("docs/guide.md").exists());
    assert_eq!(read(dir.path(), "README.md"), "See [guide](docs/handbook.md).\n");
    assert!(!dir.path().join(".linkmend.lock").exists(), "lock not released");
}

#[test]
fn mv_across_directories_rewrites_relative_links() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a/index.md", "[x](../b/file.txt)\n");
    write(dir.path(), "b/file.txt", "hello");

    assert_success(&linkmend(dir.path(), &["mv", "b/file.txt", "c/file.txt"]));
    assert_eq!(read(dir.path(), "a/index.md"), "[x](../c/file.txt)\n");
    assert_eq!(read(dir.path(), "c/file.txt"), "hello");
}

#[test]
fn mv_directory_rewrites_every_link_into_it() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "doc/a.md", "# A\n");
    write(dir.path(), "doc/b.md", "# B\n");
    write(dir.path(), "top.md", "[a](doc/a.md) [b](doc/b.md)\n");

    assert_success(&linkmend(dir.path(), &["mv", "doc", "docs"]));
    assert_eq!(read(dir.path(), "top.md"), "[a](docs/a.md) [b](docs/b.md)\n");
    assert!(dir.path().join("docs/a.md").exists());
}

#[test]
fn mv_keeps_anchors_json_keys_and_leading_slashes() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "notes.md", "[s](chapter.md#intro)\n");
    write(dir.path(), "chapter.md", "# Intro\n");
    write(dir.path(), "config.json", r#"{"template":"tpl.html","unrelated":"tpl.html"}"#);
    write(dir.path(), "tpl.html", "hello\n");
    write(dir.path(), "page.md", "[home](/root.md)\n");
    write(dir.path(), "root.md", "# Root\n");

    assert_success(&linkmend(dir.path(), &["mv", "chapter.md", "ch1.md"]));
    assert_success(&linkmend(dir.path(), &["mv", "tpl.html", "t.html"]));
    assert_success(&linkmend(dir.path(), &["mv", "root.md", "home.md"]));

    assert_eq!(read(dir.path(), "notes.md"), "[s](ch1.md#intro)\n");
    assert_eq!(read(dir.path(), "config.json"), r#"{"template":"t.html","unrelated":"tpl.html"}"#);
    assert_eq!(read(dir.path(), "page.md"), "[home](/home.md)\n");
}

#[test]
fn mv_dry_run_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", "See [guide](docs/guide.md).\n");
    write(dir.path(), "docs/guide.md", "# Guide\n");

    let output = linkmend(dir.path(), &["mv", "docs/guide.md", "docs/handbook.md", "--dry-run"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("README.md:1  docs/guide.md -> docs/handbook.md"), "stdout: {stdout}");
    assert!(dir.path().join("docs/guide.md").exists());
    assert_eq!(read(dir.path(), "README.md"), "See [guide](docs/guide.md).\n");
}

#[test]
fn mv_with_backups_keeps_the_original() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", "See [guide](docs/guide.md).\n");
    write(dir.path(), "docs/guide.md", "# Guide\n");

    assert_success(&linkmend(dir.path(), &["mv", "docs/guide.md", "guide.md", "--backups"]));
    assert_eq!(read(dir.path(), "README.md"), "See [guide](guide.md).\n");
    assert_eq!(read(dir.path(), "README.md.linkbak"), "See [guide](docs/guide.md).\n");
}

#[test]
fn mv_missing_source_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = linkmend(dir.path(), &["mv", "nope.md", "other.md"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("File Not Found"));
}

#[test]
fn scan_json_lists_every_reference() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", "See [guide](docs/guide.md).\n");
    write(dir.path(), "app.yaml", "template: views/home.html\n");
    write(dir.path(), "node_modules/x/readme.md", "[x](y.md)\n");

    let output = linkmend(dir.path(), &["scan", "--json"]);
    assert_success(&output);
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = parsed.as_array().unwrap();
    assert_eq!(records.len(), 2, "records: {parsed}");

    let readme = records.iter().find(|r| r["source"] == "README.md").unwrap();
    assert_eq!(readme["target"], "docs/guide.md");
    assert_eq!(readme["kind"], "markdown-inline");
    assert_eq!(readme["line"], 1);
    assert_eq!(readme["column_start"], 12);

    let yaml = records.iter().find(|r| r["source"] == "app.yaml").unwrap();
    assert_eq!(yaml["target"], "views/home.html");
    assert_eq!(yaml["kind"], "yaml-scalar");
}

#[test]
fn check_reports_broken_references() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", "See [guide](docs/guide.md) and [gone](missing.md).\n");
    write(dir.path(), "docs/guide.md", "[home](../README.md)\n");

    let output = linkmend(dir.path(), &["check"]);
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("BROKEN  README.md:1  missing.md"), "stdout: {stdout}");
    assert!(!stdout.contains("docs/guide.md  "), "stdout: {stdout}");

    std::fs::write(dir.path().join("missing.md"), "# Back\n").unwrap();
    let output = linkmend(dir.path(), &["check"]);
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("All 3 references resolve"));
}

#[test]
fn invalid_config_exits_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), ".linkmend.toml", "monitored_extensions = [\"md\"]\n");

    let output = linkmend(dir.path(), &["scan"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid Config Option"), "stderr: {stderr}");
    assert!(stderr.contains("monitored_extensions"), "stderr: {stderr}");
}

#[test]
fn unknown_config_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), ".linkmend.toml", "monitor_everything = true\n");

    let output = linkmend(dir.path(), &["check"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid Config"));
}

#[cfg(target_os = "linux")]
#[test]
fn mv_refuses_while_another_instance_holds_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.md", "# A\n");
    write(dir.path(), ".linkmend.lock", "1\n");

    let output = linkmend(dir.path(), &["mv", "a.md", "b.md"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Already Watching"));
    assert!(dir.path().join("a.md").exists());
}

/// A running `linkmend watch` with its log lines streamed back.
#[cfg(unix)]
struct Watcher {
    child: Child,
    lines: Receiver<String>,
    log: Vec<String>,
    reader: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl Watcher {
    fn start(root: &Path) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_linkmend"))
            .arg("watch")
            .arg("--root")
            .arg(root)
            .env_remove("RUST_LOG")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let stderr = child.stderr.take().unwrap();
        let (tx, lines) = mpsc::channel();
        let reader = std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                let _ = tx.send(line);
            }
        });
        return Self {
            child,
            lines,
            log: Vec::new(),
            reader: Some(reader),
        };
    }

    fn wait_for_log(&mut self, needle: &str) {
        let deadline = Instant::now() + Duration::from_secs(20);
        while Instant::now() < deadline {
            if let Ok(line) = self.lines.recv_timeout(Duration::from_millis(100)) {
                let found = line.contains(needle);
                self.log.push(line);
                if found {
                    return;
                }
            }
        }
        panic!("never logged `{needle}`:\n{}", self.log.join("\n"));
    }

    fn interrupt(&self) {
        let status = Command::new("kill")
            .arg("-INT")
            .arg(self.child.id().to_string())
            .status()
            .unwrap();
        assert!(status.success());
    }

    fn finish(mut self) -> (Option<i32>, String) {
        let deadline = Instant::now() + Duration::from_secs(20);
        let status = loop {
            if let Some(status) = self.child.try_wait().unwrap() {
                break status;
            }
            if Instant::now() > deadline {
                self.child.kill().unwrap();
                panic!("watcher did not exit:\n{}", self.log.join("\n"));
            }
            std::thread::sleep(Duration::from_millis(50));
        };
        if let Some(reader) = self.reader.take() {
            reader.join().unwrap();
        }
        self.log.extend(self.lines.try_iter());
        return (status.code(), self.log.join("\n"));
    }
}

#[cfg(unix)]
impl Drop for Watcher {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(unix)]
fn wait_for_content(root: &Path, relative: &str, expected: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(20);
    while Instant::now() < deadline {
        if std::fs::read_to_string(root.join(relative)).is_ok_and(|content| return content == expected) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    return false;
}

#[cfg(unix)]
#[test]
fn watch_repairs_moves_and_stops_on_double_interrupt() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", "See [guide](docs/guide.md).\n");
    write(dir.path(), "docs/guide.md", "# Guide\n");

    let mut watcher = Watcher::start(dir.path());
    watcher.wait_for_log("watching for changes");
    assert!(dir.path().join(".linkmend.lock").exists());

    std::fs::rename(dir.path().join("docs/guide.md"), dir.path().join("docs/handbook.md")).unwrap();
    let repaired = wait_for_content(dir.path(), "README.md", "See [guide](docs/handbook.md).\n");
    watcher.wait_for_log("file_moved");

    watcher.interrupt();
    std::thread::sleep(Duration::from_millis(300));
    watcher.interrupt();
    let (code, log) = watcher.finish();

    assert!(repaired, "README.md not rewritten:\n{log}");
    assert_eq!(code, Some(0), "log:\n{log}");
    assert!(log.contains("shutdown_requested"), "log:\n{log}");
    assert!(!dir.path().join(".linkmend.lock").exists(), "lock not released");
    // The rewrite of README.md is the tool's own write and must not read as a move or deletion.
    assert!(!log.contains("file_deleted"), "log:\n{log}");
    assert!(!log.contains("broken_references_found"), "log:\n{log}");
    assert_eq!(log.matches("file_moved").count(), 1, "log:\n{log}");
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| return entry.file_name().to_string_lossy().starts_with(".linkmend-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn watch_refuses_while_another_instance_holds_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.md", "# A\n");
    write(dir.path(), ".linkmend.lock", "1\n");

    let output = Command::new(env!("CARGO_BIN_EXE_linkmend"))
        .arg("watch")
        .arg("--root")
        .arg(dir.path())
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Already Watching"));
    assert_eq!(read(dir.path(), ".linkmend.lock"), "1\n");
}
