use persist::signing::{SignError, SignOptions, VerifyOptions};
use persist::{
    install_persistence, ArchiveLayout, CodeSigner, HostVersions, PersistSequence, Platform,
    SigningConfig, Updater, UpdaterState, VersionTuple, HOST_UPDATED_EVENT,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

fn persist_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_persist"))
}

fn create_dir_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (rel_path, content) in files {
        let full = root.join(rel_path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();
    }
}

/// Running install `app-1.0.0` with injected `a.js`/`b.js`, and a freshly
/// staged `app-1.0.1` the host has just unpacked.
fn host_install_tree(name: &str) -> (PathBuf, PathBuf) {
    let root = std::env::temp_dir().join(name);
    let _ = fs::remove_dir_all(&root);

    create_dir_tree(
        &root,
        &[
            ("app-1.0.0/resources/app.asar", b"patched loader archive"),
            ("app-1.0.0/resources/_app.asar", b"host archive 1.0.0"),
            ("app-1.0.0/resources/app/a.js", b"require('./b.js')"),
            ("app-1.0.0/resources/app/b.js", b"module.exports = 42;"),
            ("app-1.0.1/resources/app.asar", b"host archive 1.0.1"),
            ("app-1.0.1/resources/other.pak", b"untouched"),
        ],
    );

    let archive = root.join("app-1.0.0/resources/app.asar");
    (root, archive)
}

fn run(args: &[&str]) -> std::process::Output {
    Command::new(persist_exe())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run persist")
}

#[test]
fn test_stage_end_to_end() {
    let (root, archive) = host_install_tree("persist_e2e_stage");

    let output = run(&["stage", "--archive", archive.to_str().unwrap(), "--version", "1.0.1"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "persist stage failed:\nstdout: {}\nstderr: {}",
        stdout,
        stderr
    );
    assert!(stdout.contains("Files copied: 2"), "stdout: {}", stdout);

    let new_resources = root.join("app-1.0.1/resources");
    assert!(!new_resources.join("app.asar").exists());
    assert_eq!(
        fs::read(new_resources.join("_app.asar")).unwrap(),
        b"host archive 1.0.1"
    );
    assert_eq!(
        fs::read(new_resources.join("app/a.js")).unwrap(),
        b"require('./b.js')"
    );
    assert_eq!(
        fs::read(new_resources.join("app/b.js")).unwrap(),
        b"module.exports = 42;"
    );
    assert_eq!(fs::read(new_resources.join("other.pak")).unwrap(), b"untouched");

    // The running install is left alone.
    assert!(root.join("app-1.0.0/resources/app.asar").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn test_stage_twice_is_safe() {
    let (root, archive) = host_install_tree("persist_e2e_stage_twice");
    let args = ["stage", "--archive", archive.to_str().unwrap(), "--version", "1.0.1"];

    let first = run(&args);
    assert!(first.status.success(), "first run: {}", String::from_utf8_lossy(&first.stderr));
    let second = run(&args);
    assert!(second.status.success(), "second run: {}", String::from_utf8_lossy(&second.stderr));

    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(stdout.contains("Archive renamed: false"), "stdout: {}", stdout);
    assert!(stdout.contains("App dir created: false"), "stdout: {}", stdout);
    assert!(stdout.contains("Files copied: 2"), "stdout: {}", stdout);
    assert_eq!(
        fs::read(root.join("app-1.0.1/resources/_app.asar")).unwrap(),
        b"host archive 1.0.1"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn test_stage_reads_versions_file() {
    let (root, archive) = host_install_tree("persist_e2e_versions_file");
    let versions = root.join("versions.json");
    fs::write(&versions, br#"{"current_host": [1, 0, 1], "current_modules": {}}"#).unwrap();

    let output = run(&[
        "stage",
        "--archive",
        archive.to_str().unwrap(),
        "--versions-file",
        versions.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stage failed: {}", String::from_utf8_lossy(&output.stderr));
    assert!(root.join("app-1.0.1/resources/app/a.js").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn test_stage_without_staged_archive_fails() {
    let (root, archive) = host_install_tree("persist_e2e_missing_staged");
    fs::remove_file(root.join("app-1.0.1/resources/app.asar")).unwrap();

    let output = run(&["stage", "--archive", archive.to_str().unwrap(), "--version", "1.0.1"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to rename"), "stderr: {}", stderr);
    assert!(!root.join("app-1.0.1/resources/app").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn test_resolve_prints_install_dir() {
    let output = run(&[
        "resolve",
        "--archive",
        "/R/app-1.0.0/resources/app.asar",
        "--version",
        "1.2.3",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        PathBuf::from(stdout.trim()),
        Path::new("/R").join("app-1.2.3")
    );
}

#[test]
fn test_resolve_rejects_bad_version() {
    let output = run(&[
        "resolve",
        "--archive",
        "/R/app-1.0.0/resources/app.asar",
        "--version",
        "1.two.3",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_verify_before_and_after_stage() {
    let (root, archive) = host_install_tree("persist_e2e_verify");
    let args = ["verify", "--archive", archive.to_str().unwrap(), "--version", "1.0.1"];

    let before = run(&args);
    assert!(!before.status.success());

    let staged = run(&["stage", "--archive", archive.to_str().unwrap(), "--version", "1.0.1"]);
    assert!(staged.status.success(), "stage failed: {}", String::from_utf8_lossy(&staged.stderr));

    let after = run(&args);
    let stdout = String::from_utf8_lossy(&after.stdout);
    assert!(after.status.success(), "verify failed:\n{}\n{}", stdout, String::from_utf8_lossy(&after.stderr));
    assert!(stdout.contains("Matching: 2"), "stdout: {}", stdout);

    let _ = fs::remove_dir_all(&root);
}

struct HostState {
    root: PathBuf,
}

impl UpdaterState for HostState {
    fn root_path(&self) -> &Path {
        &self.root
    }

    fn query_current_versions(&self) -> anyhow::Result<HostVersions> {
        Ok(HostVersions::from_json(r#"{"current_host":[1,0,1]}"#)?)
    }
}

/// Reports an invalid signature until the bundle has been signed once.
#[derive(Default)]
struct RecordingSigner {
    signed: Mutex<Vec<(PathBuf, SignOptions)>>,
    verifications: Mutex<usize>,
}

impl CodeSigner for RecordingSigner {
    fn verify(&self, _bundle: &Path, _options: &VerifyOptions) -> Result<bool, SignError> {
        *self.verifications.lock().unwrap() += 1;
        Ok(!self.signed.lock().unwrap().is_empty())
    }

    fn sign(&self, bundle: &Path, options: &SignOptions) -> Result<(), SignError> {
        self.signed
            .lock()
            .unwrap()
            .push((bundle.to_path_buf(), options.clone()));
        Ok(())
    }
}

#[test]
fn test_hooked_updater_persists_on_host_updated() {
    let (root, archive) = host_install_tree("persist_e2e_hooked_updater");
    let dispatched = Arc::new(Mutex::new(Vec::new()));
    let seen = dispatched.clone();

    let mut updater = Updater::new(
        HostState { root: root.clone() },
        move |_: &HostState, event: &str, args: Vec<String>| {
            seen.lock().unwrap().push((event.to_string(), args));
            Ok(true)
        },
    );

    let signer = Arc::new(RecordingSigner::default());
    let sequence = PersistSequence::new(
        Arc::new(persist::fs_ops::RealFs),
        signer.clone(),
        Platform::MacOs,
        SigningConfig::default(),
    );
    assert!(install_persistence(&mut updater, ArchiveLayout::new(&archive), sequence));

    assert!(updater.emit("update-check-finished", vec![]).unwrap());
    assert!(!root.join("app-1.0.1/resources/_app.asar").exists());

    assert!(updater
        .emit(HOST_UPDATED_EVENT, vec!["1.0.1".to_string()])
        .unwrap());

    let new_resources = root.join("app-1.0.1/resources");
    assert!(new_resources.join("_app.asar").exists());
    assert_eq!(
        fs::read(new_resources.join("app/a.js")).unwrap(),
        fs::read(root.join("app-1.0.0/resources/app/a.js")).unwrap()
    );
    assert_eq!(
        fs::read(new_resources.join("app/b.js")).unwrap(),
        fs::read(root.join("app-1.0.0/resources/app/b.js")).unwrap()
    );

    let signed = signer.signed.lock().unwrap().clone();
    assert_eq!(signed.len(), 1);
    assert_eq!(signed[0].0, root);
    assert_eq!(
        signed[0].1,
        SignOptions {
            deep: true,
            force: true,
            identity: "moonlight".to_string(),
            verbosity_level: 3,
        }
    );
    assert_eq!(*signer.verifications.lock().unwrap(), 2);

    let events: Vec<_> = dispatched
        .lock()
        .unwrap()
        .iter()
        .map(|(e, _)| e.clone())
        .collect();
    assert_eq!(events, vec!["update-check-finished", "host-updated"]);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn test_version_tuple_round_trips_through_display() {
    let v: VersionTuple = "1.0.9013".parse().unwrap();
    assert_eq!(persist::version::install_dir_name(&v), "app-1.0.9013");
}
