//! Keygate license activation service
//!
//! Verifies and activates license codes against a SQLite store and signs
//! every answer with the operator's Ed25519 key.
//!
//! Usage:
//!   keygate-server keygen --out signing.pem
//!   keygate-server seed --database-url licenses.db ABC123 TRIAL-XYZ
//!   keygate-server serve --database-url licenses.db --signing-key-file signing.pem

use std::sync::Arc;
use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::Parser;
use keygate_db::SqliteStore;
use keygate_license::{ActivationEngine, LicenseStore, NewLicense, ResponseSigner};
use keygate_server::{
    build_router,
    config::{Cli, Command, DatabaseArgs, KeygenArgs, SeedArgs, ServeArgs, ShowArgs},
    ACTIVATE_PATH,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Keygen(args) => keygen(&args),
        Command::Seed(args) => seed(&args),
        Command::Show(args) => show(&args),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    info!("Keygate starting...");
    let signer = args.load_signer()?;
    let store = Arc::new(open_store(&args.database)?);

    let engine = ActivationEngine::new(
        Arc::clone(&store) as Arc<dyn LicenseStore>,
        signer,
        args.trial_policy(),
    );
    let app = build_router(engine);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!(
        address = %listener.local_addr()?,
        path = ACTIVATE_PATH,
        trial_minutes = args.trial_minutes,
        "HTTP activation endpoint listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped");
    match Arc::try_unwrap(store) {
        Ok(store) => store.close().context("Failed to close license store")?,
        Err(_) => warn!("license store still referenced at shutdown; leaving it to drop"),
    }
    Ok(())
}

fn open_store(database: &DatabaseArgs) -> Result<SqliteStore> {
    let store = SqliteStore::open(&database.database_url).context("Failed to open license store")?;
    store.migrate().context("Failed to migrate license store")?;
    Ok(store)
}

fn keygen(args: &KeygenArgs) -> Result<()> {
    let signer = ResponseSigner::generate();
    args.write_key(&signer.to_pkcs8_pem()?)?;
    info!(path = %args.out.display(), "signing key written");

    let Some(verifier) = signer.verifier() else {
        bail!("generated signer has no key");
    };
    println!("{}", verifier.to_public_key_pem()?);
    println!("Raw public key (base64): {}", BASE64.encode(verifier.to_bytes()));
    Ok(())
}

fn seed(args: &SeedArgs) -> Result<()> {
    let store = open_store(&args.database)?;
    for code in &args.codes {
        let license = NewLicense {
            code: code.clone(),
            is_trial: args.trial,
        };
        let record = store
            .insert(&license)
            .with_context(|| format!("Failed to insert {code}"))?;
        info!(code = %record.code, id = record.id, is_trial = record.is_trial, "license seeded");
    }
    store.close()?;
    Ok(())
}

fn show(args: &ShowArgs) -> Result<()> {
    let store = open_store(&args.database)?;
    let Some(record) = store.get(&args.code)? else {
        bail!("no license with code {}", args.code);
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    store.close()?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
