use std::env;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use package::{get_latest_package_version, get_package_info, PackageVersionInfo};
use salesforce::{ToolingClient, ToolingConnection, DEFAULT_API_VERSION};

mod package;
mod salesforce;

/// Look up package versions on a Salesforce org through the Tooling API.
#[derive(Parser)]
#[clap(version)]
struct Args {
    /// Instance URL of the org, e.g. https://acme.my.salesforce.com.
    /// You can also pass it via the SF_INSTANCE_URL env variable.
    #[clap(long)]
    instance_url: Option<String>,

    /// Path to a file containing an access token.
    /// You can also pass a token verbatim via the SF_ACCESS_TOKEN env variable.
    #[clap(long)]
    token: Option<String>,

    /// API version to use (defaults to SF_API_VERSION or 56.0)
    #[clap(long)]
    api_version: Option<String>,

    /// Print results as JSON
    #[clap(long)]
    json: bool,

    /// Make logging more verbose.
    /// You can also specify the log level via the RUST_LOG env variable.
    #[clap(long, short)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show a package version by number or by subscriber package version id
    Info {
        /// Package name
        package_name: String,

        /// Version as major.minor.patch.build
        version: Option<String>,

        /// Subscriber package version id (04t...), overrides name and version
        #[clap(long)]
        id: Option<String>,

        /// Show every build of major.minor.patch, newest first
        #[clap(long)]
        all_builds: bool,
    },

    /// Show the most recently created version of a package
    Latest {
        /// Package name
        package_name: String,

        /// Only consider released versions
        #[clap(long)]
        released: bool,

        /// List all versions instead of only the latest one
        #[clap(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if env::var("RUST_LOG").is_err() {
        let level = match args.verbose {
            true => "debug",
            false => "info",
        };
        env::set_var("RUST_LOG", format!("{}={}", env!("CARGO_PKG_NAME"), level));
    }
    env_logger::init();

    log::info!(
        "Starting {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
    log::debug!("With arguments {:?}", env::args().collect::<Vec<_>>());

    if let Err(error) = run(args).await {
        log::error!("{:?}", error);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let instance_url = match args.instance_url {
        Some(url) => url,
        None => env::var("SF_INSTANCE_URL")
            .context("No instance url provided via --instance-url or SF_INSTANCE_URL")?,
    };

    let token = match args.token {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .context(format!("Failed to read the access token from {}", path))?
            .trim()
            .to_string(),
        None => env::var("SF_ACCESS_TOKEN")
            .context("No access token provided via --token or SF_ACCESS_TOKEN")?,
    };

    let api_version = args
        .api_version
        .or_else(|| env::var("SF_API_VERSION").ok())
        .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

    let client = ToolingClient::new(&instance_url, token, &api_version)
        .context("Failed to create tooling api client")?;

    let versions = fetch(&client, args.command).await?;
    print_versions(&versions, args.json)
}

async fn fetch(
    connection: &impl ToolingConnection,
    command: Command,
) -> Result<Vec<PackageVersionInfo>> {
    match command {
        Command::Info {
            package_name,
            version,
            id,
            all_builds,
        } => {
            let id = id.unwrap_or_default();
            let version = version.unwrap_or_default();
            if id.is_empty() && version.is_empty() {
                return Err(anyhow!("Either a version or --id is required"));
            }
            log::info!("Looking up package {} {}{}", package_name, version, id);

            get_package_info(connection, &package_name, &version, &id, all_builds)
                .await
                .context(format!("Failed to get package info for {}", package_name))
        }
        Command::Latest {
            package_name,
            released,
            all,
        } => {
            log::info!("Looking up latest version of package {}", package_name);

            let mut versions = get_latest_package_version(connection, &package_name, released)
                .await
                .context(format!(
                    "Failed to get latest version of {}",
                    package_name
                ))?;
            if !all {
                versions.truncate(1);
            }
            Ok(versions)
        }
    }
}

fn print_versions(versions: &[PackageVersionInfo], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(versions)?);
        return Ok(());
    }

    if versions.is_empty() {
        log::info!("No matching package versions found");
        return Ok(());
    }

    for version in versions {
        println!("{}", format_version(version));
    }
    Ok(())
}

fn format_version(version: &PackageVersionInfo) -> String {
    format!(
        "{} {} released={} coverage={}% passed={} {}",
        version.package_version_number,
        version.subscriber_package_version_id,
        version.is_released,
        version.code_coverage,
        version.code_coverage_check_passed,
        version.tag.as_deref().unwrap_or("-"),
    )
}
