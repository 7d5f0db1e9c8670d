use anyhow::Context;
use clap::{Parser, Subcommand};
use membership_directory::config::Settings;
use membership_directory::membership::{GatewayListProvider, MembershipTable};
use membership_directory::storage::client::connect_with_retries;
use membership_directory::storage::node::StoreNode;
use membership_directory::storage::{ColumnStore, QuorumStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "membership-directory", version, about = "Cluster membership directory")]
struct Cli {
    /// TOML settings file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `cluster_id` from the settings.
    #[arg(long, global = true)]
    cluster: Option<String>,

    /// Store node to contact. Overrides `clustering.contact_points`.
    #[arg(long = "contact-point", global = true)]
    contact_point: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a store node serving the replicated column store over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:9042")]
        bind: SocketAddr,
    },
    /// Create the membership table and seed the cluster version row.
    Init {
        /// Only create keyspace and table.
        #[arg(long)]
        no_version_row: bool,
    },
    /// List every silo of the cluster with the table version.
    Members,
    /// List the gateways clients can connect to.
    Gateways,
    /// Delete every membership row of the cluster, version row included.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(cluster) = cli.cluster {
        settings.cluster_id = cluster;
    }
    if let Some(contact_point) = cli.contact_point {
        settings.clustering.contact_points = vec![contact_point];
    }
    settings.validate()?;

    match cli.command {
        Command::Serve { bind } => serve(bind).await,
        Command::Init { no_version_row } => init(&settings, !no_version_row).await,
        Command::Members => members(&settings).await,
        Command::Gateways => gateways(&settings).await,
        Command::Reset => reset(&settings).await,
    }
}

async fn serve(bind: SocketAddr) -> anyhow::Result<()> {
    let node = StoreNode::new(&bind.to_string(), ColumnStore::new());
    let app = node.router();

    tracing::info!("Store node listening on {}", bind);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn connect(settings: &Settings) -> anyhow::Result<Arc<dyn QuorumStore>> {
    let store = connect_with_retries(&settings.clustering, &settings.client)
        .await
        .with_context(|| {
            format!(
                "could not reach store node {:?}",
                settings.clustering.contact_points
            )
        })?;
    Ok(store as Arc<dyn QuorumStore>)
}

async fn open_table(
    settings: &Settings,
    create_version_row: bool,
) -> anyhow::Result<MembershipTable> {
    let table = MembershipTable::with_backend(
        &settings.cluster_id,
        settings.clustering.clone(),
        connect(settings).await?,
    );
    table.initialize(create_version_row).await?;
    Ok(table)
}

async fn init(settings: &Settings, create_version_row: bool) -> anyhow::Result<()> {
    let table = open_table(settings, create_version_row).await?;
    tracing::info!("Cluster {} initialized", table.cluster_id());
    Ok(())
}

async fn members(settings: &Settings) -> anyhow::Result<()> {
    let table = open_table(settings, false).await?;
    let data = table.read_all().await?;

    println!(
        "cluster {} at version {} ({} silo(s))",
        settings.cluster_id,
        data.version.version,
        data.len()
    );
    for entry in data.entries() {
        println!(
            "  {} {} name={} host={} proxy={} alive={} suspicions={}",
            entry.silo_address,
            entry.status,
            entry.silo_name,
            entry.host_name,
            entry
                .proxy_port
                .map(|port| port.to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry.i_am_alive_time.to_rfc3339(),
            entry.suspect_times.len()
        );
    }

    Ok(())
}

async fn gateways(settings: &Settings) -> anyhow::Result<()> {
    let provider = GatewayListProvider::with_backend(
        &settings.cluster_id,
        &settings.clustering,
        &settings.gateway,
        connect(settings).await?,
    );
    provider.initialize().await?;

    let gateways = provider.get_gateways().await?;
    println!(
        "{} gateway(s), refresh every {:?}",
        gateways.len(),
        provider.max_staleness()
    );
    for gateway in gateways {
        println!("  {}", gateway);
    }

    Ok(())
}

async fn reset(settings: &Settings) -> anyhow::Result<()> {
    let table = open_table(settings, false).await?;
    table
        .delete_membership_table_entries(table.cluster_id())
        .await?;
    tracing::info!("Cluster {} reset", table.cluster_id());
    Ok(())
}
