//! Manifest loading from disk, as a session does at startup.

use std::collections::HashMap;
use std::fs;

use devloop_core::{Manifest, ManifestError};
use tempfile::TempDir;

#[test]
fn load_file_reads_and_validates() {
    let root = TempDir::new().expect("root");
    let path = root.path().join("convox.yml");
    fs::write(
        &path,
        "services:\n  web:\n    build:\n      path: ${WEB_DIR}\n  cache:\n    image: redis\n",
    )
    .expect("write manifest");

    let env = HashMap::from([("WEB_DIR".to_string(), "web".to_string())]);
    let manifest = Manifest::load_file(&path, &env).expect("load");
    manifest.validate().expect("valid");

    let web = manifest.service("web").expect("web");
    assert_eq!(web.build.path, "web");
    assert!(web.is_source_built());
    assert!(!manifest.service("cache").expect("cache").is_source_built());
}

#[test]
fn missing_file_reports_path() {
    let root = TempDir::new().expect("root");
    let path = root.path().join("nope.yml");
    let err = Manifest::load_file(&path, &HashMap::new()).unwrap_err();
    assert!(matches!(err, ManifestError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("nope.yml"));
}
