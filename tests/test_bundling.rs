use std::fs;
use std::path::Path;

use tempfile::TempDir;

use magpie::bundler::Bundler;
use magpie::config::Config;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config(root: &Path) -> Config {
    Config {
        project_root: root.to_path_buf(),
        entry_points: vec!["src/main.js".to_string()],
        dev: true,
        ..Config::default()
    }
}

/// Full project: an entry pulling in project code, a JSON leaf, a package
/// resolved through its manifest, and a stylesheet with a referenced image.
#[test]
fn bundles_a_complete_project() {
    let _ = env_logger::try_init();

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let root = temp_dir.path();

    write(
        root,
        "src/main.js",
        r#"
require("./pages/home");
require("./config.json");
require("datefmt");
require("./styles/site.css");
"#,
    );
    write(
        root,
        "src/pages/home.js",
        r#"var shared = require("../shared");"#,
    );
    write(root, "src/shared.js", "var shared = 1;");
    write(root, "src/config.json", r#"{"debug": true}"#);
    write(
        root,
        "node_modules/datefmt/package.json",
        r#"{"main": "lib/datefmt.js"}"#,
    );
    write(root, "node_modules/datefmt/lib/datefmt.js", "var fmt = 2;");
    write(
        root,
        "src/styles/site.css",
        ".hero { background: url(hero.svg); }\n",
    );
    write(root, "src/styles/hero.svg", "<svg></svg>\n");

    Bundler::new(config(root)).bundle().expect("bundle failed");

    let bundle = fs::read_to_string(root.join("web/bundles/main.js")).unwrap();
    // Module names are source-root-relative, extension stripped.
    assert!(bundle.contains("require.register(\"pages/home\""));
    assert!(bundle.contains("require.register(\"shared\""));
    assert!(bundle.contains("require.register(\"config\""));
    assert!(bundle.contains("require.register(\"main\""));
    assert!(bundle.contains(r#"module.exports = {"debug": true};"#));
    // Imported files precede their importers in the concatenation.
    let shared_at = bundle.find("require.register(\"shared\"").unwrap();
    let home_at = bundle.find("require.register(\"pages/home\"").unwrap();
    let main_at = bundle.find("require.register(\"main\"").unwrap();
    assert!(shared_at < home_at);
    assert!(home_at < main_at);
    // Vendor content stays out of the entry bundle.
    assert!(!bundle.contains("var fmt"));

    let vendor = fs::read_to_string(root.join("web/bundles/main.vendor.js")).unwrap();
    assert!(vendor.contains("require.register(\"datefmt\""));
    assert!(vendor.contains("var fmt = 2;"));
    assert!(!vendor.contains("var shared"));

    // The stylesheet and its referenced image come out as standalone
    // artifacts with the source root stripped.
    let css = fs::read_to_string(root.join("web/bundles/styles/site.css")).unwrap();
    assert_eq!(css, ".hero { background: url(hero.svg); }\n");
    let svg = fs::read_to_string(root.join("web/bundles/styles/hero.svg")).unwrap();
    assert_eq!(svg, "<svg></svg>\n");

    // The runtime shim is in place next to the bundles.
    let shim = fs::read_to_string(root.join("web/bundles/require.js")).unwrap();
    assert!(shim.contains("require.register = "));
}

#[test]
fn multiple_entries_share_modules_without_interference() {
    let _ = env_logger::try_init();

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(root, "src/first.js", r#"require("./shared");"#);
    write(root, "src/second.js", r#"require("./shared");"#);
    write(root, "src/shared.js", "var shared = 1;");

    let mut cfg = config(root);
    cfg.entry_points = vec!["src/first.js".to_string(), "src/second.js".to_string()];
    Bundler::new(cfg).bundle().unwrap();

    let first = fs::read_to_string(root.join("web/bundles/first.js")).unwrap();
    let second = fs::read_to_string(root.join("web/bundles/second.js")).unwrap();
    assert!(first.contains("require.register(\"shared\""));
    assert!(second.contains("require.register(\"shared\""));
    assert!(first.contains("require.register(\"first\""));
    assert!(!first.contains("require.register(\"second\""));
}

#[test]
fn unresolved_imports_do_not_abort_the_build() {
    let _ = env_logger::try_init();

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(
        root,
        "src/main.js",
        r#"
require("./real");
require("./optional-feature");
"#,
    );
    write(root, "src/real.js", "var real = 1;");

    Bundler::new(config(root)).bundle().unwrap();

    let bundle = fs::read_to_string(root.join("web/bundles/main.js")).unwrap();
    assert!(bundle.contains("require.register(\"real\""));
    assert!(!bundle.contains("optional-feature"));
}

#[test]
fn entry_with_no_vendor_dependencies_emits_no_vendor_file() {
    let _ = env_logger::try_init();

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(root, "src/main.js", "var x = 1;");

    Bundler::new(config(root)).bundle().unwrap();

    assert!(root.join("web/bundles/main.js").exists());
    assert!(!root.join("web/bundles/main.vendor.js").exists());
}

#[test]
fn scoped_package_subpaths_land_in_the_vendor_bundle() {
    let _ = env_logger::try_init();

    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(root, "src/main.js", r#"require("@acme/ui/button");"#);
    write(root, "node_modules/@acme/ui/button.js", "var button = 1;");

    Bundler::new(config(root)).bundle().unwrap();

    let vendor = fs::read_to_string(root.join("web/bundles/main.vendor.js")).unwrap();
    assert!(vendor.contains("require.register(\"@acme/ui/button\""));
}
