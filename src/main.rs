mod cli;

use hivecast::{
    auth, config,
    effects::{FfmpegThumbnailer, NullAnnouncer, SideEffectDispatcher, StreamAnnouncer},
    hive::HiveClient,
    lifecycle::StreamCoordinator,
    monitor::LivenessMonitor,
    server::{self, AppContext},
    transcode::{self, TranscodeSupervisor},
};
use hivecast_db::pool::init_pool;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn start_server(host: String, port: u16, config_path: Option<&std::path::Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting hivecast");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let db_path = config.server.db_path.to_string_lossy().to_string();
    tracing::info!("Initializing record store at {}", db_path);
    let pool = init_pool(&db_path)?;

    let transcoder = Arc::new(TranscodeSupervisor::new(
        config.media.clone(),
        config.transcode.clone(),
    ));

    let announcer: Arc<dyn StreamAnnouncer> = if config.hive.enabled {
        Arc::new(HiveClient::new(&config.hive)?)
    } else {
        tracing::info!("Hive announcements disabled");
        Arc::new(NullAnnouncer)
    };
    let thumbnailer = Arc::new(FfmpegThumbnailer::new(
        config.media.clone(),
        &config.transcode,
    ));
    let effects = Arc::new(SideEffectDispatcher::new(announcer, thumbnailer));

    let coordinator = Arc::new(StreamCoordinator::new(
        pool.clone(),
        transcoder.clone(),
        effects,
        config.ingest.clone(),
    ));

    // Filesystem-evidence reconciliation catches the streams whose end
    // events never arrived.
    let monitor_handle = if config.liveness.enabled {
        let monitor = Arc::new(LivenessMonitor::new(
            pool.clone(),
            coordinator.clone(),
            config.media.clone(),
            config.liveness.clone(),
            config.transcode.primary_tier().to_string(),
        ));
        Some(monitor.start())
    } else {
        tracing::warn!("Liveness monitor disabled, silently-dead streams will linger");
        None
    };

    let ctx = AppContext {
        pool,
        config: Arc::new(config),
        coordinator,
        transcoder,
    };

    let result = server::start_server(ctx).await;

    tracing::info!("Shutting down...");
    if let Some(handle) = monitor_handle {
        handle.abort();
    }

    result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "hivecast=trace,hivecast_db=debug,hivecast_common=debug,tower_http=debug".to_string()
        } else {
            "hivecast=debug,hivecast_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::GenerateKey { account } => generate_key(&account, cli.config.as_deref()),
        Commands::RevokeKey { account } => revoke_key(&account, cli.config.as_deref()),
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("hivecast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn open_pool(config_path: Option<&std::path::Path>) -> Result<hivecast_db::pool::DbPool> {
    let config = config::load_config_or_default(config_path)?;
    let db_path = config.server.db_path.to_string_lossy().to_string();
    Ok(init_pool(&db_path)?)
}

fn generate_key(account: &str, config_path: Option<&std::path::Path>) -> Result<()> {
    let pool = open_pool(config_path)?;
    let conn = pool.get()?;
    let key = auth::issue_stream_key(&conn, account)?;

    println!("Stream key for {}:", account);
    println!("{}", key);
    Ok(())
}

fn revoke_key(account: &str, config_path: Option<&std::path::Path>) -> Result<()> {
    let pool = open_pool(config_path)?;
    let conn = pool.get()?;

    if hivecast_db::queries::stream_keys::revoke(&conn, account)? {
        println!("Revoked stream key for {}", account);
    } else {
        println!("No stream key record for {}", account);
    }
    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = transcode::check_tools();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable all features.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Media root: {:?}", config.media.root);
            println!("  Ingest: {}", config.ingest.rtmp_url);
            println!("  Tiers: {}", config.transcode.tiers.len());
            println!(
                "  Liveness: every {}s (index {}s, segments {}s)",
                config.liveness.interval_secs,
                config.liveness.index_stale_secs,
                config.liveness.segment_stale_secs
            );
            println!("  Hive announcements: {}", config.hive.enabled);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
