use std::path::Path;

use super::CONFIG_FILE;

const TEMPLATE: &str = r#"[project]
# cache_dir = ".gitlayer/cache"
# context_dir = ".gitlayer/context"
# lock_timeout_secs = 60

[image]
# The base image must provide git and zcat, plus sudo when owner/group is set.
# Named owners/groups are applied with chown after the snapshot is unpacked.
# base_image = "debian:bookworm-slim"
# tag = "gitlayer:latest"

[[artifact]]
repo = "."
branch = "master"
target = "/app"
# name = "app"
# cwd = "src"
# paths = ["**/*.rs"]
# owner = "app"
# group = "app"
# interlayer_period_secs = 604800
# flush_cache = false
"#;

/// Write a gitlayer.toml template into the current directory.
pub async fn init_project() -> anyhow::Result<()> {
    let path = Path::new(CONFIG_FILE);
    if path.exists() {
        eprintln!("{CONFIG_FILE} already exists, skipping");
        println!("Nothing to create — already initialized.");
        return Ok(());
    }

    std::fs::write(path, TEMPLATE)?;
    println!("Created {CONFIG_FILE}");

    if !Path::new(".git").exists() {
        eprintln!("warning: no .git directory here; point [[artifact]].repo at your repository");
    }

    println!();
    println!("Next steps:");
    println!();
    println!("  1. Edit the [[artifact]] entry: repo, branch, target");
    println!();
    println!("  2. Check your setup:");
    println!("     gitlayer doctor");
    println!();
    println!("  3. Build the image:");
    println!("     gitlayer build");

    Ok(())
}
