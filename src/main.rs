//! Traffic correlation service entry point.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mongodb::bson::{to_document, Bson, Document};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use traffic_service::api::{create_router, AppState};
use traffic_service::config::Config;
use traffic_service::correlator::Correlator;
use traffic_service::metrics;
use traffic_service::orchestrator::{
    create_service, KubeRegistry, RecordTarget, RetryPolicy, ServiceData, ServiceRegistry,
};
use traffic_service::store::{DocumentStore, MongoStore};
use traffic_service::utils::shutdown_signal;

/// Network traffic correlation service.
#[derive(Parser, Debug)]
#[command(name = "traffic-service")]
#[command(about = "Correlates network traffic records with service metadata")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port (overrides PORT).
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// HTTP server port (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Insert a JSON array file into a collection.
    Seed {
        /// Target database.
        #[arg(long)]
        database: String,
        /// Target collection.
        #[arg(long)]
        collection: String,
        /// Path to a JSON file holding an array of objects.
        file: PathBuf,
    },

    /// Print every document in a collection.
    Dump {
        /// Source database.
        #[arg(long)]
        database: String,
        /// Source collection.
        #[arg(long)]
        collection: String,
    },

    /// Run one correlation and print the rows as JSON.
    Correlate {
        /// Database holding both collections.
        #[arg(long)]
        database: String,
        /// Collection of traffic records.
        #[arg(long)]
        network_collection: String,
        /// Service to correlate.
        service_name: String,
    },

    /// Manage cluster services.
    Service {
        /// Kubeconfig path; defaults to kube's inference.
        #[arg(long, env = "KUBECONFIG", global = true)]
        kubeconfig: Option<String>,

        /// Namespace to operate in.
        #[arg(short, long, default_value = "default", global = true)]
        namespace: String,

        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand, Debug)]
enum ServiceAction {
    /// Create a ClusterIP service and record it in the document store.
    Create {
        /// Service name.
        name: String,
        /// Listening port.
        #[arg(long)]
        port: i32,
        /// Maximum creation attempts.
        #[arg(long, default_value = "3")]
        attempts: u32,
    },

    /// Show one service.
    Get {
        /// Service name.
        name: String,
    },

    /// List services in the namespace.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("traffic_service=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if args.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    // Handle subcommands
    match args.command {
        Some(Command::Serve { port }) => cmd_serve(port.or(args.port)).await,
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::Seed {
            database,
            collection,
            file,
        }) => cmd_seed(&database, &collection, &file).await,
        Some(Command::Dump {
            database,
            collection,
        }) => cmd_dump(&database, &collection).await,
        Some(Command::Correlate {
            database,
            network_collection,
            service_name,
        }) => cmd_correlate(&database, &network_collection, &service_name).await,
        Some(Command::Service {
            kubeconfig,
            namespace,
            action,
        }) => cmd_service(kubeconfig.as_deref(), &namespace, action).await,
        None => cmd_serve(args.port).await,
    }
}

/// Load and validate configuration.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("TRAFFIC SERVICE - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    print!("Connecting to MongoDB... ");
    match MongoStore::connect(&config.store_config()).await {
        Ok(store) => {
            println!("OK");
            store.disconnect().await?;
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("MongoDB unreachable"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Service Collection: {}", config.service_collection);
    println!(
        "  Service Records: {}/{}",
        config.service_record_database, config.service_record_collection
    );
    println!("  Store Timeout: {}s", config.store_timeout_secs);
    println!("  Port: {}", config.port);
    println!("  CORS Origins: {}", config.allowed_origins().join(", "));
    println!("  Log Level: {}", config.rust_log);
    println!("  Verbose: {}", config.verbose);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run the HTTP server.
async fn cmd_serve(port_override: Option<u16>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = load_config()?;
    let port = port_override.unwrap_or(config.port);

    let metrics_handle = metrics::install_recorder()?;

    let store = Arc::new(MongoStore::connect(&config.store_config()).await?);
    let correlator = Correlator::new(store.clone(), config.service_collection.clone());
    let app_state = AppState::new(correlator).with_metrics(metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state, &config.allowed_origins());
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = store.disconnect().await {
        warn!("Failed to disconnect cleanly: {}", e);
    }
    info!("Server stopped");

    Ok(())
}

/// Insert a JSON array file into a collection.
async fn cmd_seed(database: &str, collection: &str, file: &Path) -> anyhow::Result<()> {
    let config = load_config()?;

    let raw = tokio::fs::read_to_string(file).await?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&raw)?;
    let documents = values
        .iter()
        .map(to_document)
        .collect::<Result<Vec<Document>, _>>()
        .map_err(|e| anyhow::anyhow!("Every entry must be a JSON object: {}", e))?;

    let store = MongoStore::connect(&config.store_config()).await?;
    let written = store.insert_many(database, collection, documents).await?;
    store.disconnect().await?;

    info!("Inserted {} documents into {}/{}", written, database, collection);
    Ok(())
}

/// Print every document in a collection.
async fn cmd_dump(database: &str, collection: &str) -> anyhow::Result<()> {
    let config = load_config()?;

    let store = MongoStore::connect(&config.store_config()).await?;
    let documents = store.find_all(database, collection).await?;
    store.disconnect().await?;

    let values: Vec<serde_json::Value> = documents
        .into_iter()
        .map(|document| Bson::Document(document).into_relaxed_extjson())
        .collect();
    println!("{}", serde_json::to_string_pretty(&values)?);

    Ok(())
}

/// Run one correlation and print the rows as JSON.
async fn cmd_correlate(
    database: &str,
    network_collection: &str,
    service_name: &str,
) -> anyhow::Result<()> {
    let config = load_config()?;

    let store = Arc::new(MongoStore::connect(&config.store_config()).await?);
    let correlator = Correlator::new(store.clone(), config.service_collection.clone());

    let result = correlator
        .traffic_for_service(database, network_collection, service_name)
        .await;
    store.disconnect().await?;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

/// Manage cluster services.
async fn cmd_service(
    kubeconfig: Option<&str>,
    namespace: &str,
    action: ServiceAction,
) -> anyhow::Result<()> {
    let registry = KubeRegistry::connect(kubeconfig).await?;

    match action {
        ServiceAction::Create {
            name,
            port,
            attempts,
        } => {
            let config = load_config()?;
            let store = MongoStore::connect(&config.store_config()).await?;
            let target = RecordTarget {
                database: config.service_record_database.clone(),
                collection: config.service_record_collection.clone(),
            };
            let policy = RetryPolicy {
                max_attempts: attempts,
                ..Default::default()
            };
            let service = ServiceData {
                name,
                ip: String::new(),
                port,
            };

            let result =
                create_service(&registry, &store, &target, namespace, &service, &policy).await;
            store.disconnect().await?;

            println!("{}", serde_json::to_string_pretty(&result?)?);
        }
        ServiceAction::Get { name } => {
            let service = registry.get(namespace, &name).await?;
            println!("{}", serde_json::to_string_pretty(&service)?);
        }
        ServiceAction::List => {
            let services = registry.list(namespace).await?;
            println!("{}", serde_json::to_string_pretty(&services)?);
        }
    }

    Ok(())
}
