use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use upgrader_core::ObjectKey;
use upgrader_runtime::{
    ApiClient, ClientConfig, ClusterClient, MockCluster, UpgradeController,
    UpgradeControllerConfig,
};

#[derive(Parser)]
#[command(
    name = "upgrader",
    about = "Partial rolling image upgrades driven by UpGrade requests"
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Log output format
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// API server URL; skips kubeconfig when set
    #[arg(long, env = "UPGRADER_API_URL")]
    api_url: Option<String>,
    /// Bearer token for the API server
    #[arg(long, env = "UPGRADER_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Path to a kubeconfig file (defaults to $KUBECONFIG or ~/.kube/config)
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout: u64,
    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,
    /// Serve cluster state from YAML manifests in this directory instead of an API server
    #[arg(long)]
    mock: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch UpGrade requests and reconcile them until interrupted
    Run {
        /// Seconds between polls of the request list
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,
        /// Only watch requests in this namespace
        #[arg(long)]
        namespace: Option<String>,
    },
    /// Reconcile one UpGrade request once and print the result
    Reconcile {
        #[arg(long, default_value = "default")]
        namespace: String,
        #[arg(long)]
        name: String,
    },
    /// Print an UpGrade request as YAML
    Show {
        #[arg(long, default_value = "default")]
        namespace: String,
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_format);

    let client = create_client(&cli.connection).await?;

    match cli.command {
        Commands::Run {
            poll_interval,
            namespace,
        } => run_controller(client, poll_interval, namespace).await,
        Commands::Reconcile { namespace, name } => {
            reconcile_once(client, ObjectKey::new(namespace, name)).await
        }
        Commands::Show { namespace, name } => show(client, ObjectKey::new(namespace, name)).await,
    }
}

fn init_tracing(format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Build the cluster client once; every component shares it
async fn create_client(args: &ConnectionArgs) -> miette::Result<Arc<dyn ClusterClient>> {
    if let Some(dir) = &args.mock {
        let cluster = MockCluster::new();
        let loaded = cluster.load_manifests(dir).await.map_err(|e| {
            miette::miette!("Failed to load manifests from '{}': {}", dir.display(), e)
        })?;
        info!("Mock cluster seeded with {} objects from {}", loaded, dir.display());
        return Ok(Arc::new(cluster));
    }

    let mut config = match &args.api_url {
        Some(url) => ClientConfig::new(url),
        None => {
            let path = args
                .kubeconfig
                .clone()
                .or_else(ClientConfig::default_kubeconfig_path)
                .ok_or_else(|| {
                    miette::miette!("No API server configured: pass --api-url or --kubeconfig")
                })?;
            ClientConfig::from_kubeconfig(&path)
                .map_err(|e| miette::miette!("Failed to load kubeconfig: {}", e))?
        }
    };
    if let Some(token) = &args.token {
        config = config.with_token(token);
    }
    config = config.with_timeout(Duration::from_secs(args.request_timeout));
    if args.insecure {
        config.accept_invalid_certs = true;
    }

    let client = ApiClient::new(&config)
        .map_err(|e| miette::miette!("Failed to create API client: {}", e))?;
    info!("Using API server at {}", client.base_url());
    Ok(Arc::new(client))
}

/// Run the trigger loop until Ctrl-C
async fn run_controller(
    client: Arc<dyn ClusterClient>,
    poll_interval: u64,
    namespace: Option<String>,
) -> miette::Result<()> {
    let config = UpgradeControllerConfig {
        poll_interval: Duration::from_secs(poll_interval),
        namespace,
    };
    config
        .validate()
        .map_err(|e| miette::miette!("Invalid controller configuration: {}", e))?;

    let controller = UpgradeController::new(client, config);
    let token = CancellationToken::new();
    let controller_token = token.clone();
    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run(controller_token).await {
            error!("Upgrade controller error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    let shutdown_timeout = Duration::from_secs(5);
    let _ = tokio::time::timeout(shutdown_timeout, controller_handle).await;

    info!("Shutdown complete");
    Ok(())
}

async fn reconcile_once(client: Arc<dyn ClusterClient>, key: ObjectKey) -> miette::Result<()> {
    let controller = UpgradeController::new(client.clone(), UpgradeControllerConfig::default());

    let action = controller
        .reconcile(&key)
        .await
        .map_err(|e| miette::miette!("Reconcile of {} failed: {}", key, e))?;
    info!(request = %key, requeue = action.requeue, "Reconcile finished");

    show(client, key).await
}

async fn show(client: Arc<dyn ClusterClient>, key: ObjectKey) -> miette::Result<()> {
    let request = client
        .get_upgrade_request(&key)
        .await
        .map_err(|e| miette::miette!("Failed to get {}: {}", key, e))?;
    let yaml = upgrader_core::to_yaml(&request)
        .map_err(|e| miette::miette!("Failed to render {}: {}", key, e))?;
    print!("{}", yaml);
    Ok(())
}
