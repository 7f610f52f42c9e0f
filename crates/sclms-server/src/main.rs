use anyhow::Context;
use clap::Parser;
use sclms_db::{DbManager, run_migrations};
use sclms_server::{AppState, ServerArgs, router};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sclms=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    let args = ServerArgs::parse();
    let auth_config = args.auth_config()?;
    let bootstrap = args.bootstrap()?;

    let db = DbManager::connect(&args.db_config())
        .await
        .context("connecting to SurrealDB")?;
    run_migrations(db.client())
        .await
        .context("running schema migrations")?;

    let state = AppState::new(db.client().clone(), auth_config);

    if let Some(admin) = bootstrap {
        let created = state
            .auth
            .provision_admin(&admin.email, &admin.password, &admin.name)
            .await
            .context("provisioning bootstrap administrator")?;
        if created {
            info!(email = %admin.email, "Bootstrap administrator must change its password at first login");
        }
    }

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, "SCLMS server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gracefully shutdown");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
}
