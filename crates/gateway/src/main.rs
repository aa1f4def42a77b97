use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gort_auth::ServiceTokenWindow;
use gort_client::{GortClient, ProfileEntry, Profiles};
use gort_data::DataAccessHolder;
use gort_domain::config::{Config, ConfigSeverity};
use gort_gateway::cli::{self, Cli, Command, ConfigCommand};
use gort_gateway::dispatch::worker::ProcessWorker;
use gort_gateway::scheduler::Scheduler;
use gort_gateway::state::{AppState, REQUEST_CHANNEL_CAPACITY};
use gort_gateway::{api, dispatch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config()?;
            cli::show(&config);
            Ok(())
        }
        Some(Command::Bootstrap {
            url,
            allow_insecure,
            profile,
            password,
        }) => run_bootstrap(url, allow_insecure, profile, password).await,
        Some(Command::Version) => {
            println!("gort {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gort_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the controller with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("Gort controller starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Data access layer ────────────────────────────────────────────
    let data = Arc::new(DataAccessHolder::new());
    data.initialize(&config.database)
        .await
        .context("initializing data access layer")?;
    tracing::info!(backend = ?config.database.backend, "data access layer ready");

    // ── Service token window ─────────────────────────────────────────
    let service_token = Arc::new(ServiceTokenWindow::from_env());

    // ── Request channel + scheduler ──────────────────────────────────
    let (request_tx, request_rx) = tokio::sync::mpsc::channel(REQUEST_CHANNEL_CAPACITY);
    let scheduler = Arc::new(Scheduler::new(data.clone(), request_tx.clone()));
    match scheduler.hydrate().await {
        Ok(count) => tracing::info!(schedules = count, "scheduler hydrated"),
        Err(e) => tracing::warn!(error = %e, "scheduler hydration failed"),
    }
    tokio::spawn(scheduler.clone().run());
    tracing::info!("scheduler started (1s tick)");

    // ── App state + dispatcher ───────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        data,
        service_token,
        scheduler,
        worker: Arc::new(ProcessWorker),
        request_tx,
    };
    dispatch::spawn_dispatcher(state.clone(), request_rx);
    tracing::info!("dispatcher started");

    // ── Concurrency limit (backpressure protection) ──────────────────
    let max_concurrent = config.server.max_concurrent_requests;
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Rate-limit layer (per-IP token bucket via governor) ──────────
    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: std::sync::Arc::new(gov_config),
        }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no [server.rate_limit] in config)");
    }

    // ── Router ───────────────────────────────────────────────────────
    let router = api::router()
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state)
    } else {
        router.with_state(state)
    };

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "Gort controller listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}

/// Client-side bootstrap: provision the first user against a fresh
/// controller and record a profile for it.
async fn run_bootstrap(
    url: String,
    allow_insecure: bool,
    profile: String,
    password: Option<String>,
) -> anyhow::Result<()> {
    let password = match password {
        Some(p) => p,
        // Empty answer means "generate one for me".
        None => rpassword::prompt_password("Admin password (empty to generate): ")
            .unwrap_or_default(),
    };

    let entry = ProfileEntry {
        name: profile.clone(),
        url: url.clone(),
        user: String::new(),
        password: String::new(),
        allow_insecure,
        tls_cert_file: String::new(),
    };
    let mut client =
        GortClient::connect_with_new_profile(entry.clone()).context("building client")?;

    let provisioned = client.bootstrap(&password).await.context("bootstrap call")?;
    println!("bootstrapped user {}", provisioned.user.username);
    if let Some(generated) = &provisioned.password {
        println!("generated password: {generated}");
    }

    let mut profiles = Profiles::load_default().unwrap_or_default();
    let mut entry = entry;
    entry.user = provisioned.user.username.clone();
    entry.password = provisioned
        .password
        .clone()
        .unwrap_or_else(|| password.clone());
    profiles.insert(profile.clone(), entry);
    profiles.save_default().context("writing profile file")?;
    println!("profile {profile} written");

    Ok(())
}
