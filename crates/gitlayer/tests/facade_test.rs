use gitlayer::build::{CacheDir, Record};
use gitlayer::{ArtifactConfig, ArtifactIdentity, ConfigFingerprint};
use tempfile::TempDir;

#[test]
fn core_types_are_flattened() {
    let identity = ArtifactIdentity::new("repo", Some("a"), "master").unwrap();
    assert_eq!(identity.key(), "repo_a.master");

    let config = ArtifactConfig::new("/app");
    assert!(config.validate().is_ok());
    assert_eq!(ConfigFingerprint::of(&config), ConfigFingerprint::of(&config.clone()));
}

#[test]
fn build_module_reaches_the_store() {
    let tmp = TempDir::new().unwrap();
    let identity = ArtifactIdentity::new("repo", None, "master").unwrap();
    let store = CacheDir::new(tmp.path()).store(&identity);

    let state = store.read().unwrap();
    assert!(state.snapshot.is_none());
    assert_eq!(
        store.paths(Record::Layer(1)).payload,
        tmp.path().join("repo.master_layer_0001.patch.gz")
    );
}

#[test]
fn docker_module_is_exported() {
    let report = gitlayer::docker::DoctorReport::default();
    assert!(!report.all_passed());
}
