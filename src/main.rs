//! bucketroute -- command-line access to S3 buckets across regions.
//!
//! Every bucket command resolves the bucket's home region first and runs
//! against a client for that region, whatever region the session started in.

use std::path::PathBuf;

use bucketroute::config::{load_config, Config};
use bucketroute::metrics;
use bucketroute::{Region, StorageSession};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

/// Command-line arguments for bucketroute.
#[derive(Parser, Debug)]
#[command(
    name = "bucketroute",
    version,
    about = "Region-aware S3 bucket and object access"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the initial region.
    #[arg(short, long)]
    region: Option<Region>,

    /// Override the credential profile.
    #[arg(short, long)]
    profile: Option<String>,

    /// Print listings as JSON.
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics to stderr before exiting.
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List credential profiles from the shared AWS config files.
    Profiles,
    /// List buckets, optionally only those hosted in one region.
    Buckets {
        #[arg(long)]
        region: Option<Region>,
    },
    /// Print the region hosting a bucket.
    Locate { bucket: String },
    /// Create a bucket in the session's region.
    Mb { bucket: String },
    /// Delete an empty bucket.
    Rb { bucket: String },
    /// List the objects in a bucket.
    Ls { bucket: String },
    /// List the versions of one object.
    Versions { bucket: String, key: String },
    /// Upload a local file.
    Put {
        bucket: String,
        key: String,
        file: PathBuf,
    },
    /// Download an object into a directory.
    Get {
        bucket: String,
        key: String,
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Delete an object (adds a delete marker on versioned buckets).
    Rm { bucket: String, key: String },
    /// Make an older version the latest one.
    Restore {
        bucket: String,
        key: String,
        version_id: String,
    },
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_listing<T: Serialize>(
    json: bool,
    items: &[T],
    line: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else {
        for item in items {
            println!("{}", line(item));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if let Some(region) = cli.region {
        config.region = region;
    }
    if let Some(profile) = &cli.profile {
        config.credentials.profile = profile.clone();
        config.credentials.access_key_id.clear();
        config.credentials.secret_access_key.clear();
    }

    init_tracing(&config);
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {}", path.display());
    }

    if config.observability.metrics || cli.metrics {
        metrics::init_metrics()?;
        metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let mut session = StorageSession::from_config(&config).await?;

    match cli.command {
        Command::Profiles => {
            for name in session.list_profiles().await? {
                println!("{name}");
            }
        }
        Command::Buckets { region } => {
            let buckets = match region {
                Some(region) => session.list_buckets_in_region(region).await?,
                None => session.list_buckets().await?,
            };
            print_listing(cli.json, &buckets, |b| match b.created {
                Some(created) => format!("{}  {}", created.format("%Y-%m-%d %H:%M:%S"), b.name),
                None => b.name.clone(),
            })?;
        }
        Command::Locate { bucket } => {
            let resolution = session.resolve(&bucket).await?;
            let region = resolution.handle.region();
            println!("{}  {}", region, region.display_name());
        }
        Command::Mb { bucket } => {
            session.create_bucket(&bucket).await?;
            println!("make_bucket: {bucket}");
        }
        Command::Rb { bucket } => {
            session.delete_bucket(&bucket).await?;
            println!("remove_bucket: {bucket}");
        }
        Command::Ls { bucket } => {
            let objects = session.list_bucket_contents(&bucket).await?;
            print_listing(cli.json, &objects, |o| format!("{:>12}  {}", o.size, o.key))?;
        }
        Command::Versions { bucket, key } => {
            let versions = session.list_object_versions(&bucket, &key).await?;
            print_listing(cli.json, &versions, |v| {
                format!(
                    "{}{}  {:>12}  {}",
                    v.version_id,
                    if v.is_latest { " (latest)" } else { "" },
                    v.size,
                    if v.is_delete_marker { "delete marker" } else { "" }
                )
            })?;
        }
        Command::Put { bucket, key, file } => {
            let receipt = session.upload(&bucket, &key, &file).await?;
            println!(
                "upload: {} to s3://{}/{} (version {})",
                file.display(),
                bucket,
                key,
                receipt.version_id.as_deref().unwrap_or("null")
            );
        }
        Command::Get { bucket, key, dir } => {
            let path = session.download(&bucket, &key, &dir).await?;
            println!("download: s3://{}/{} to {}", bucket, key, path.display());
        }
        Command::Rm { bucket, key } => {
            session.delete_object(&bucket, &key).await?;
            println!("delete: s3://{bucket}/{key}");
        }
        Command::Restore {
            bucket,
            key,
            version_id,
        } => {
            let receipt = session
                .restore_object_version(&bucket, &key, &version_id)
                .await?;
            println!(
                "restore: s3://{}/{} from {} (new version {})",
                bucket,
                key,
                version_id,
                receipt.version_id.as_deref().unwrap_or("null")
            );
        }
    }

    if let Some(text) = metrics::render() {
        eprint!("{text}");
    }

    Ok(())
}
