mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gitlayer", about = "Ship git branches into container images as incremental layers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a gitlayer.toml template
    Init,
    /// Bring every artifact up to its branch head and render the build context
    Materialize,
    /// Materialize, then build the image with docker
    Build {
        /// Image tag (default: [image].tag from gitlayer.toml)
        #[arg(long, short = 't')]
        tag: Option<String>,
    },
    /// Show cached snapshots, layers, and latest patches
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Discard cached payloads so the next materialize starts from a snapshot
    Flush {
        /// Only flush the artifact with this key (e.g. `repo_a.master`)
        #[arg(long)]
        artifact: Option<String>,
    },
    /// Check git, docker, and configuration readiness
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init_project().await?,
        Commands::Materialize => commands::materialize().await.map(|_| ())?,
        Commands::Build { tag } => commands::build(tag).await?,
        Commands::Status { json } => commands::status(json).await?,
        Commands::Flush { artifact } => commands::flush(artifact).await?,
        Commands::Doctor => commands::doctor().await?,
    }

    Ok(())
}
