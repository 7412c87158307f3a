use gitlayer_core::GitlayerConfig;
use gitlayer_docker::{CheckResult, DockerClient};
use std::path::Path;

use super::CONFIG_FILE;

pub async fn doctor() -> anyhow::Result<()> {
    let client = DockerClient::new();
    let mut report = client.doctor().await;

    report.git = match gitlayer_build::git::git_version() {
        Ok(version) => CheckResult::ok(version.trim_start_matches("git version ")),
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    // Config file check
    report.config_file = if !Path::new(CONFIG_FILE).exists() {
        CheckResult::fail("Not found — run `gitlayer init`")
    } else {
        match GitlayerConfig::load(Path::new(".")).and_then(|c| c.validate().map(|()| c)) {
            Ok(config) => CheckResult::ok(&format!("{} artifact(s)", config.artifacts.len())),
            Err(e) => CheckResult::fail(&e.to_string()),
        }
    };

    println!();
    println!("{report}");

    if !report.all_passed() {
        anyhow::bail!("some checks failed — see above for details");
    }

    Ok(())
}
