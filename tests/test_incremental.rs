use std::fs;
use std::fs::OpenOptions;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use magpie::bundler::Bundler;
use magpie::config::Config;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn touch(path: &Path, time: SystemTime) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_times(fs::FileTimes::new().set_modified(time)).unwrap();
}

fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

fn config(root: &Path) -> Config {
    Config {
        project_root: root.to_path_buf(),
        entry_points: vec!["src/main.js".to_string()],
        dev: true,
        ..Config::default()
    }
}

/// The freshness cycle: build, rebuild without changes (no writes), touch an
/// input (rewrite).
#[test]
fn rebuilds_only_when_inputs_change() {
    let _ = env_logger::try_init();

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(root, "src/main.js", r#"require("./app");"#);
    write(root, "src/app.js", "var app = 1;");

    Bundler::new(config(root)).bundle().unwrap();
    let output = root.join("web/bundles/main.js");
    let first_build = mtime(&output);

    // Nothing changed: the second run must not rewrite anything.
    Bundler::new(config(root)).bundle().unwrap();
    assert_eq!(mtime(&output), first_build);

    // Touch an input past the output: the third run rewrites.
    touch(
        &root.join("src/app.js"),
        SystemTime::now() + Duration::from_secs(1),
    );
    Bundler::new(config(root)).bundle().unwrap();
    assert_ne!(mtime(&output), first_build);
}

#[test]
fn changed_content_shows_up_after_rebuild() {
    let _ = env_logger::try_init();

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(root, "src/main.js", r#"require("./app");"#);
    write(root, "src/app.js", "var app = 1;");

    Bundler::new(config(root)).bundle().unwrap();

    // Grow the import graph; the new module must appear in the output.
    write(root, "src/main.js", "require(\"./app\");\nrequire(\"./extra\");\n");
    write(root, "src/extra.js", "var extra = 2;");
    touch(
        &root.join("src/main.js"),
        SystemTime::now() + Duration::from_secs(1),
    );

    Bundler::new(config(root)).bundle().unwrap();
    let bundle = fs::read_to_string(root.join("web/bundles/main.js")).unwrap();
    assert!(bundle.contains("require.register(\"extra\""));
    assert!(bundle.contains("var extra = 2;"));
}

#[test]
fn vendor_and_shim_respect_freshness_independently() {
    let _ = env_logger::try_init();

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(root, "src/main.js", r#"require("lib");"#);
    write(root, "node_modules/lib/index.js", "var lib = 1;");

    Bundler::new(config(root)).bundle().unwrap();
    let vendor = root.join("web/bundles/main.vendor.js");
    let shim = root.join("web/bundles/require.js");
    let vendor_build = mtime(&vendor);
    let shim_build = mtime(&shim);

    Bundler::new(config(root)).bundle().unwrap();
    assert_eq!(mtime(&vendor), vendor_build);
    assert_eq!(mtime(&shim), shim_build);

    // Touching the vendor input rewrites the vendor bundle but not the shim.
    touch(
        &root.join("node_modules/lib/index.js"),
        SystemTime::now() + Duration::from_secs(1),
    );
    Bundler::new(config(root)).bundle().unwrap();
    assert_ne!(mtime(&vendor), vendor_build);
    assert_eq!(mtime(&shim), shim_build);
}

/// Dev mode trusts the sidecars; non-dev rewrites unconditionally.
#[test]
fn non_dev_mode_always_rewrites() {
    let _ = env_logger::try_init();

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(root, "src/main.js", "var x = 1;");

    // Dev build, then clobber the output while keeping it newer than its
    // inputs: a dev rebuild leaves the clobbered bytes alone.
    Bundler::new(config(root)).bundle().unwrap();
    let output = root.join("web/bundles/main.js");
    fs::write(&output, "clobbered").unwrap();
    Bundler::new(config(root)).bundle().unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), "clobbered");

    // A non-dev build restores it.
    let mut cfg = config(root);
    cfg.dev = false;
    Bundler::new(cfg).bundle().unwrap();
    let restored = fs::read_to_string(&output).unwrap();
    assert!(restored.contains("require.register(\"main\""));
}

#[test]
fn removing_an_input_triggers_a_rebuild() {
    let _ = env_logger::try_init();

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(root, "src/main.js", "require(\"./app\");\nrequire(\"./extra\");\n");
    write(root, "src/app.js", "var app = 1;");
    write(root, "src/extra.js", "var extra = 2;");

    Bundler::new(config(root)).bundle().unwrap();
    let output = root.join("web/bundles/main.js");
    assert!(fs::read_to_string(&output).unwrap().contains("extra"));

    // Drop one import; the input set shrinks and the output follows.
    write(root, "src/main.js", "require(\"./app\");\n");
    touch(
        &root.join("src/main.js"),
        SystemTime::now() + Duration::from_secs(1),
    );

    Bundler::new(config(root)).bundle().unwrap();
    let bundle = fs::read_to_string(&output).unwrap();
    assert!(!bundle.contains("require.register(\"extra\""));
}
