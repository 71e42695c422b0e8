//! Gatekeep — authentication session and token lifecycle engine.

mod config;
mod delivery;

use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use gatekeep_auth::{AuthService, TracingActivitySink, password};
use gatekeep_core::models::principal::{CreatePrincipal, PrincipalKind};
use gatekeep_core::repository::CredentialRepository;
use gatekeep_store::{DbManager, RedisTtlStore, RemotePrincipalRepository};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::Settings;
use crate::delivery::TracingCodeDelivery;

type Service = AuthService<RemotePrincipalRepository, RedisTtlStore, TracingCodeDelivery>;

#[derive(Debug, Parser)]
#[command(name = "gatekeep", about = "Gatekeep authentication engine", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Connect to the stores and run until interrupted
    Serve,
    /// Provision a principal; omitting --tenant creates an admin
    CreatePrincipal(CreatePrincipalArgs),
    /// Deactivate a principal and revoke its tokens
    Deactivate(PrincipalArgs),
    /// Revoke every token a principal holds in a tenant
    Revoke(RevokeArgs),
}

#[derive(Debug, Args)]
struct CreatePrincipalArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "GATEKEEP_NEW_PASSWORD", hide_env_values = true)]
    password: String,

    /// Tenant application the user belongs to
    #[arg(long)]
    tenant: Option<Uuid>,
}

#[derive(Debug, Args)]
struct PrincipalArgs {
    #[arg(long)]
    principal: Uuid,
}

#[derive(Debug, Args)]
struct RevokeArgs {
    #[arg(long)]
    principal: Uuid,

    #[arg(long)]
    tenant: Uuid,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gatekeep=info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        tracing::error!(%error, "gatekeep failed");
        eprintln!("{error}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Serve => serve(&cli.settings).await,
        Commands::CreatePrincipal(args) => create_principal(&cli.settings, args).await,
        Commands::Deactivate(args) => deactivate(&cli.settings, args).await,
        Commands::Revoke(args) => revoke(&cli.settings, args).await,
    }
}

async fn connect_db(settings: &Settings) -> Result<DbManager, String> {
    DbManager::connect(&settings.db_config())
        .await
        .map_err(|error| format!("failed to connect to credential store: {error}"))
}

async fn build_service(settings: &Settings, db: &DbManager) -> Result<Service, String> {
    let config = settings.auth_config()?;
    let store = RedisTtlStore::connect(&settings.redis_config())
        .await
        .map_err(|error| format!("failed to connect to Redis: {error}"))?;

    AuthService::new(
        db.principals(),
        store,
        TracingCodeDelivery::new(settings.dev_log_codes),
        config,
        Arc::new(TracingActivitySink),
    )
    .map_err(|error| format!("invalid configuration: {error}"))
}

async fn serve(settings: &Settings) -> Result<(), String> {
    info!("Starting gatekeep...");

    let db = connect_db(settings).await?;
    let _service = build_service(settings, &db).await?;
    if settings.dev_log_codes {
        warn!("verification codes are written to the log; do not use this in production");
    }
    info!("gatekeep ready");

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| format!("failed to listen for shutdown signal: {error}"))?;

    info!("gatekeep stopped.");
    Ok(())
}

async fn create_principal(settings: &Settings, args: CreatePrincipalArgs) -> Result<(), String> {
    let config = settings.auth_config()?;
    if args.password.chars().count() < config.min_password_length {
        return Err(format!(
            "password must be at least {} characters",
            config.min_password_length
        ));
    }

    let password_hash = password::hash_password(&args.password, config.pepper.as_deref())
        .map_err(|error| format!("failed to hash password: {error}"))?;
    let kind = match args.tenant {
        Some(_) => PrincipalKind::User,
        None => PrincipalKind::Admin,
    };

    let db = connect_db(settings).await?;
    let principal = db
        .principals()
        .create(CreatePrincipal {
            kind,
            tenant_id: args.tenant,
            email: args.email,
            password_hash,
        })
        .await
        .map_err(|error| format!("failed to create principal: {error}"))?;

    println!("principal_id: {}", principal.id);
    println!("kind: {:?}", principal.kind);
    if let Some(tenant_id) = principal.tenant_id {
        println!("tenant_id: {tenant_id}");
    }
    Ok(())
}

async fn deactivate(settings: &Settings, args: PrincipalArgs) -> Result<(), String> {
    let db = connect_db(settings).await?;
    let repo = db.principals();
    let principal = repo
        .get_principal(args.principal)
        .await
        .map_err(|error| format!("failed to load principal: {error}"))?;

    repo.set_active(principal.id, false)
        .await
        .map_err(|error| format!("failed to deactivate principal: {error}"))?;

    if let Some(tenant_id) = principal.tenant_id {
        build_service(settings, &db)
            .await?
            .revoke_principal(tenant_id, principal.id)
            .await
            .map_err(|error| format!("failed to revoke tokens: {error}"))?;
    }

    println!("deactivated: {}", principal.id);
    Ok(())
}

async fn revoke(settings: &Settings, args: RevokeArgs) -> Result<(), String> {
    let db = connect_db(settings).await?;
    build_service(settings, &db)
        .await?
        .revoke_principal(args.tenant, args.principal)
        .await
        .map_err(|error| format!("failed to revoke tokens: {error}"))?;

    println!("revoked: {} in {}", args.principal, args.tenant);
    Ok(())
}
