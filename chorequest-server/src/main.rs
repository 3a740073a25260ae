use chorequest_server::{server, storage};
mod cli;
mod install;

use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// How long a graceful stop may take before open connections (SSE in
/// particular) are dropped by force.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() {
    use clap::Parser;
    let args = cli::Cli::parse();
    if let Some(cmd) = args.command {
        run_command(cmd);
        return;
    }

    // Console-only logging with env-driven level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = match server::AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error=%e, "failed to load config");
            std::process::exit(2);
        }
    };
    tracing::info!(
        family_id = %config.family_id,
        plan = ?config.plan,
        children = config.children.len(),
        "config loaded"
    );

    let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "data/chorequest.db".into());
    if let Some(parent) = std::path::Path::new(&db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        let _ = std::fs::create_dir_all(parent);
    }
    let store = match storage::Store::connect_sqlite(&db_path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error=%e, path=%db_path, "failed to open database");
            std::process::exit(3);
        }
    };
    if let Err(e) = store
        .seed_from_config(&config.children, &config.achievement_defs())
        .await
    {
        tracing::error!(error=%e, "failed to seed database");
        std::process::exit(4);
    }

    // PORT beats config.listen_port beats the default.
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .or(config.listen_port)
        .unwrap_or(5252);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let state = server::AppState::new(config, store);
    let shutdown_token = state.shutdown_token();
    let app = server::router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error=%e, %addr, "failed to bind");
            std::process::exit(5);
        }
    };
    tracing::info!(%addr, "listening");

    let graceful = shutdown_token.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(graceful.cancelled_owned())
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown requested");
    // Cancelling the token ends the SSE streams along with the accept loop.
    shutdown_token.cancel();
    finish_within_grace(server_task).await;
}

fn run_command(cmd: cli::Command) {
    match cmd {
        cli::Command::Install {
            unit_path,
            config_path,
            db_path,
            bin_path,
            user,
            group,
            working_dir,
            force,
        } => {
            let bin = bin_path.unwrap_or_else(|| {
                std::env::current_exe().unwrap_or_else(|_| {
                    std::path::PathBuf::from("/usr/local/bin/chorequest-server")
                })
            });
            if let Err(e) = install::install_system(
                &unit_path,
                &config_path,
                &db_path,
                &bin,
                &user,
                &group,
                &working_dir,
                force,
            ) {
                eprintln!("Install error: {e}");
                std::process::exit(2);
            }
        }
        cli::Command::Uninstall {
            unit_path,
            remove_config,
            config_path,
        } => {
            if let Err(e) = install::uninstall_system(&unit_path, remove_config, &config_path) {
                eprintln!("Uninstall error: {e}");
                std::process::exit(2);
            }
        }
    }
}

/// Wait for the serve task to wind down; abort it if the grace period runs
/// out with connections still open.
async fn finish_within_grace(mut task: tokio::task::JoinHandle<std::io::Result<()>>) {
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error=%e, "server error"),
        Ok(Err(e)) => tracing::error!(error=%e, "server task join error"),
        Err(_) => {
            tracing::warn!("grace period elapsed; aborting server task");
            task.abort();
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt()).expect("listen SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("listen SIGTERM");
        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received Ctrl+C");
    }
}
