use gitlayer_core::GitlayerConfig;
use gitlayer_docker::DockerClient;
use std::path::Path;

/// Materialize, then `docker build` the rendered context.
pub async fn build(tag: Option<String>) -> anyhow::Result<()> {
    let context_dir = super::materialize().await?;

    let tag = match tag {
        Some(tag) => tag,
        None => GitlayerConfig::load(Path::new("."))?.image.tag,
    };

    let client = DockerClient::new();
    println!("Building {tag}...");
    client.build_image(&context_dir, &tag).await?;

    let id = client.image_id(&tag).await?;
    println!();
    println!("Built: {tag} ({id})");

    Ok(())
}
