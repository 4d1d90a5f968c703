use anyhow::Context;
use blobns::cadapter::s3::S3BlobStore;
use blobns::vfs::config::MountConfig;
use blobns::vfs::{BlobNamespace, DirectoryState, NamespaceError};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blobns")]
#[command(about = "Browse and reorganize a blob container as a directory tree", long_about = None)]
struct Cli {
    /// Mount configuration in YAML.
    #[arg(long, global = true, value_name = "CONFIG_YAML")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Print the attributes of a path")]
    Stat {
        #[arg(value_name = "PATH")]
        path: String,
    },
    #[command(about = "List a directory")]
    Ls {
        #[arg(value_name = "PATH", default_value = "/")]
        path: String,
    },
    #[command(about = "Rename a file or a whole directory subtree")]
    Rename {
        #[arg(value_name = "SRC")]
        src: String,
        #[arg(value_name = "DST")]
        dst: String,
    },
    #[command(about = "Remove an empty directory")]
    Rmdir {
        #[arg(value_name = "PATH")]
        path: String,
    },
    #[command(about = "Report whether a directory exists and is empty")]
    IsEmpty {
        #[arg(value_name = "PATH")]
        path: String,
    },
    #[command(about = "Delete everything in the local cache mirror")]
    PurgeCache,
}

fn report(err: NamespaceError) -> anyhow::Error {
    anyhow::anyhow!("{err} (errno {})", err.errno())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MountConfig::from_yaml_file(path)?,
        None => MountConfig::default(),
    };
    let store = S3BlobStore::new(&config.s3).await;
    let ns = BlobNamespace::new(config, Arc::new(store));

    match cli.command {
        Commands::Stat { path } => {
            let attr = ns.getattr(&path).await.map_err(report)?;
            println!(
                "{path}: {:?} mode={:o} nlink={} size={} uid={} gid={}",
                attr.kind,
                attr.mode(),
                attr.nlink,
                attr.size,
                attr.uid,
                attr.gid
            );
        }
        Commands::Ls { path } => {
            for entry in ns.read_dir(&path).await.map_err(report)? {
                println!("{:?}\t{}", entry.kind, entry.name);
            }
        }
        Commands::Rename { src, dst } => {
            ns.rename(&src, &dst)
                .await
                .map_err(report)
                .with_context(|| format!("rename {src} -> {dst} may be partially applied"))?;
        }
        Commands::Rmdir { path } => ns.remove_directory(&path).await.map_err(report)?,
        Commands::IsEmpty { path } => match ns.is_directory_empty(&path).await {
            DirectoryState::Error(e) => anyhow::bail!("failed to inspect {path}: {e}"),
            state => println!("{path}: {state:?}"),
        },
        Commands::PurgeCache => ns.purge_cache().await.map_err(report)?,
    }
    Ok(())
}
