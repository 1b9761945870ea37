use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

struct CliFixture {
    tmp: TempDir,
    home_dir: PathBuf,
    cache_dir: PathBuf,
    store_dir: PathBuf,
    source_dir: PathBuf,
    config_path: PathBuf,
}

impl CliFixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let home_dir = tmp.path().join("home");
        let cache_dir = tmp.path().join("cache");
        let store_dir = tmp.path().join("store");
        let source_dir = tmp.path().join("source");
        let config_path = tmp.path().join("skep.yaml");

        std::fs::create_dir_all(&home_dir).unwrap();
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::create_dir_all(&store_dir).unwrap();
        std::fs::create_dir_all(&source_dir).unwrap();

        Self {
            tmp,
            home_dir,
            cache_dir,
            store_dir,
            source_dir,
            config_path,
        }
    }

    fn write_plain_config(&self) {
        let config = format!(
            "store:\n  kind: local\n  path: {}\nencryption:\n  mode: none\n",
            yaml_quote_path(&self.store_dir),
        );
        std::fs::write(&self.config_path, config).unwrap();
    }

    fn write_encrypted_config(&self) {
        let config = format!(
            "store:\n  kind: local\n  path: {}\nencryption:\n  mode: aes256gcm\n  passphrase: cli-test-pass\n  salt: \"00112233445566778899aabbccddeeff\"\n",
            yaml_quote_path(&self.store_dir),
        );
        std::fs::write(&self.config_path, config).unwrap();
    }

    fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(skep_binary_path());
        cmd.args(args);
        // An empty dir as cwd keeps the project-level skep.yaml lookup inert.
        cmd.current_dir(self.tmp.path());
        cmd.env("HOME", &self.home_dir);
        cmd.env("XDG_CACHE_HOME", &self.cache_dir);
        cmd.env("NO_COLOR", "1");
        cmd.env_remove("SKEP_CONFIG");
        cmd.env_remove("XDG_CONFIG_HOME");
        cmd.output().unwrap()
    }

    fn run_cfg(&self, args: &[&str]) -> Output {
        let cfg = self.config_path.to_string_lossy().to_string();
        let mut full = vec!["--config", cfg.as_str()];
        full.extend_from_slice(args);
        self.run(&full)
    }

    fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run_cfg(args);
        if !output.status.success() {
            panic!(
                "command failed: {:?}\nstdout:\n{}\nstderr:\n{}",
                args,
                stdout(&output),
                stderr(&output)
            );
        }
        stdout(&output)
    }

    fn run_err(&self, args: &[&str]) -> (String, String) {
        let output = self.run_cfg(args);
        assert!(
            !output.status.success(),
            "command unexpectedly succeeded: {:?}\nstdout:\n{}",
            args,
            stdout(&output)
        );
        (stdout(&output), stderr(&output))
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn skep_binary_path() -> PathBuf {
    if let Some(path) = std::env::var_os("CARGO_BIN_EXE_skep") {
        return PathBuf::from(path);
    }

    let current_exe = std::env::current_exe().expect("failed to resolve current test binary path");
    let debug_dir = current_exe
        .parent()
        .and_then(|p| p.parent())
        .expect("unexpected test binary path layout");

    #[cfg(windows)]
    let candidate = debug_dir.join("skep.exe");
    #[cfg(not(windows))]
    let candidate = debug_dir.join("skep");

    assert!(
        candidate.exists(),
        "unable to locate skep binary at {:?}",
        candidate
    );
    candidate
}

fn yaml_quote_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

#[test]
fn cli_upload_list_download_check_roundtrip() {
    let fx = CliFixture::new();
    fx.write_plain_config();
    std::fs::write(fx.source_dir.join("alpha.txt"), b"alpha file\n").unwrap();

    let source = fx.source_dir.join("alpha.txt").to_string_lossy().to_string();
    let restore = fx.tmp.path().join("restore");
    let restore_str = restore.to_string_lossy().to_string();

    let upload_out = fx.run_ok(&["upload-file", &source]);
    assert!(upload_out.contains("Uploaded 1 files"));

    let list_out = fx.run_ok(&["list-files"]);
    assert!(list_out.contains("alpha.txt"));
    assert!(list_out.contains("1 files"));

    let download_out = fx.run_ok(&["download-file", "alpha.txt", "--dest", &restore_str]);
    assert!(download_out.contains("Downloaded 1 of 1 files"));
    assert_eq!(
        std::fs::read_to_string(restore.join("alpha.txt")).unwrap(),
        "alpha file\n"
    );

    let check_out = fx.run_ok(&["check-manifest"]);
    assert!(check_out.contains("0 missing shards"));

    let rename_out = fx.run_ok(&["rename-file", "alpha.txt", "renamed/alpha.txt"]);
    assert!(rename_out.contains("Renamed 'alpha.txt' to 'renamed/alpha.txt'"));

    let list_after = fx.run_ok(&["list-files"]);
    assert!(list_after.contains("renamed/alpha.txt"));
}

#[test]
fn cli_upload_folder_skips_unchanged_until_overridden() {
    let fx = CliFixture::new();
    fx.write_plain_config();
    std::fs::write(fx.source_dir.join("a.txt"), b"contents a").unwrap();
    std::fs::create_dir_all(fx.source_dir.join("sub")).unwrap();
    std::fs::write(fx.source_dir.join("sub/b.txt"), b"contents b").unwrap();

    let dir = fx.source_dir.to_string_lossy().to_string();

    let first = fx.run_ok(&["upload-folder", &dir]);
    assert!(first.contains("Uploaded 2 files"));

    let second = fx.run_ok(&["upload-folder", &dir]);
    assert!(second.contains("Uploaded 0 files"));
    assert!(second.contains("Unchanged: 2"));

    let third = fx.run_ok(&["upload-folder", &dir, "--override"]);
    assert!(third.contains("Uploaded 2 files"));

    let dry = fx.run_ok(&["upload-folder", &dir, "--dry-run"]);
    assert!(dry.contains("Dry run"));

    let list_out = fx.run_ok(&["list-files"]);
    assert!(list_out.contains("a.txt"));
    assert!(list_out.contains("sub/b.txt"));
}

#[test]
fn cli_delete_needs_yes_when_not_interactive() {
    let fx = CliFixture::new();
    fx.write_plain_config();
    std::fs::write(fx.source_dir.join("doomed.txt"), b"bye").unwrap();
    let source = fx.source_dir.join("doomed.txt").to_string_lossy().to_string();

    fx.run_ok(&["upload-file", &source]);

    // stdin is closed when spawned this way, so the prompt must refuse.
    let output = fx.run_cfg(&["delete-file", "doomed.txt"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("--yes"));

    let delete_out = fx.run_ok(&["delete-file", "doomed.txt", "--yes"]);
    assert!(delete_out.contains("Deleted 1 files"));

    let list_out = fx.run_ok(&["list-files"]);
    assert!(list_out.contains("No files stored."));
}

#[test]
fn cli_compact_then_prune_reclaims_duplicates() {
    let fx = CliFixture::new();
    fx.write_plain_config();
    std::fs::write(fx.source_dir.join("orig.txt"), b"the very same bytes").unwrap();
    let source = fx.source_dir.join("orig.txt").to_string_lossy().to_string();

    fx.run_ok(&["upload-file", &source, "copy-a.txt"]);
    fx.run_ok(&["upload-file", &source, "copy-b.txt"]);

    let compact_out = fx.run_ok(&["compact-shards"]);
    assert!(compact_out.contains("1 of 2 files now share shards"));

    let prune_out = fx.run_ok(&["prune-shards"]);
    assert!(prune_out.contains("Pruned 1 of 1 orphaned objects"));

    let restore = fx.tmp.path().join("restore");
    let restore_str = restore.to_string_lossy().to_string();
    fx.run_ok(&["download-file", "copy-a.txt", "copy-b.txt", "--dest", &restore_str]);
    assert_eq!(
        std::fs::read(restore.join("copy-a.txt")).unwrap(),
        std::fs::read(restore.join("copy-b.txt")).unwrap()
    );
}

#[test]
fn cli_prune_dry_run_deletes_nothing() {
    let fx = CliFixture::new();
    fx.write_plain_config();
    std::fs::write(fx.source_dir.join("keep.txt"), b"same").unwrap();
    let source = fx.source_dir.join("keep.txt").to_string_lossy().to_string();

    fx.run_ok(&["upload-file", &source, "one.txt"]);
    fx.run_ok(&["upload-file", &source, "two.txt"]);
    fx.run_ok(&["compact-shards"]);

    let dry = fx.run_ok(&["prune-shards", "--dry-run"]);
    assert!(dry.contains("would delete"));
    assert!(dry.contains("1 of"));

    // The orphan is still there for a real prune.
    let real = fx.run_ok(&["prune-shards"]);
    assert!(real.contains("Pruned 1 of 1"));
}

#[test]
fn cli_download_of_unknown_file_fails_per_item() {
    let fx = CliFixture::new();
    fx.write_plain_config();
    std::fs::write(fx.source_dir.join("real.txt"), b"real").unwrap();
    let source = fx.source_dir.join("real.txt").to_string_lossy().to_string();
    fx.run_ok(&["upload-file", &source]);

    let restore = fx.tmp.path().join("restore");
    let restore_str = restore.to_string_lossy().to_string();
    let output = fx.run_cfg(&["download-file", "real.txt", "ghost.txt", "--dest", &restore_str]);
    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("Downloaded 1 of 2 files"));
    assert!(out.contains("ghost.txt"));
    assert!(restore.join("real.txt").exists());
}

#[test]
fn cli_missing_config_is_a_usage_error() {
    let fx = CliFixture::new();

    let output = fx.run(&["list-files"]);
    assert_eq!(output.status.code(), Some(2));
    let err = stderr(&output);
    assert!(err.contains("no configuration file found"));
    assert!(err.contains("skep config --init"));
}

#[test]
fn cli_config_init_writes_starter_file_once() {
    let fx = CliFixture::new();
    let dest = fx.tmp.path().join("generated.yaml");
    let dest_str = dest.to_string_lossy().to_string();

    let output = fx.run(&["config", "--init", &dest_str]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let contents = std::fs::read_to_string(&dest).unwrap();
    assert!(contents.contains("store:"));
    assert!(contents.contains("salt:"));

    let again = fx.run(&["config", "--init", &dest_str]);
    assert_eq!(again.status.code(), Some(2));
    assert!(stderr(&again).contains("already exists"));
}

#[test]
fn cli_encrypted_store_round_trips() {
    let fx = CliFixture::new();
    fx.write_encrypted_config();
    std::fs::write(fx.source_dir.join("secret.txt"), b"hidden contents\n").unwrap();
    let source = fx.source_dir.join("secret.txt").to_string_lossy().to_string();

    fx.run_ok(&["upload-file", &source]);

    let restore = fx.tmp.path().join("restore");
    let restore_str = restore.to_string_lossy().to_string();
    fx.run_ok(&["download-file", "secret.txt", "--dest", &restore_str]);
    assert_eq!(
        std::fs::read_to_string(restore.join("secret.txt")).unwrap(),
        "hidden contents\n"
    );
}

#[test]
fn cli_rename_of_missing_file_reports_an_error() {
    let fx = CliFixture::new();
    fx.write_plain_config();

    let output = fx.run_cfg(&["rename-file", "ghost.txt", "still-ghost.txt"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error:"));
}
