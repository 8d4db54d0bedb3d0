//! `autopost-worker` -- run one automation job and stream its events.
//!
//! Every notification (snapshot, log lines, terminal outcome) is printed to
//! stdout as one JSON object per line; diagnostics go to stderr. Ctrl-C or
//! SIGTERM cancels the running job. The process exits with the job's exit
//! code.
//!
//! Configuration is read from the environment (and `.env`), see
//! [`SupervisorConfig::from_env`].

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autopost_core::job::JobRequest;
use autopost_events::Notification;
use autopost_worker::{Supervisor, SupervisorConfig};

#[derive(Debug, Parser)]
#[command(name = "autopost-worker", about = "Run automation jobs and stream their events")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and store a session under NAME.
    Login {
        #[arg(short = 'n', long)]
        name: String,
    },
    /// Upload a video using a stored session.
    Upload {
        #[arg(short = 'u', long)]
        user: String,
        #[arg(short = 'v', long)]
        video: String,
        #[arg(short = 't', long)]
        title: String,
    },
    /// List sessions with stored credentials.
    Sessions,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autopost_worker=info,autopost_events=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = SupervisorConfig::from_env();

    let supervisor = Supervisor::new(config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to initialize supervisor");
        std::process::exit(1);
    });

    let request = match cli.command {
        Command::Sessions => {
            for session in supervisor.sessions() {
                println!("{session}");
            }
            return;
        }
        Command::Login { name } => JobRequest::login(name),
        Command::Upload { user, video, title } => JobRequest::upload(user, video, title),
    };

    let mut observer = supervisor.subscribe();

    let handle = supervisor.start_job(request).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Job was not started");
        std::process::exit(1);
    });

    let job_id = handle.id();
    let printer = tokio::spawn(async move {
        while let Some(notification) = observer.recv().await {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize notification"),
            }

            let terminal = match &notification {
                Notification::JobSucceeded { job_id: id, .. }
                | Notification::JobFailed { job_id: id, .. } => *id == job_id,
                _ => false,
            };
            if terminal {
                break;
            }
        }
    });

    let cancel = handle.cancel_token();
    let wait = handle.wait();
    tokio::pin!(wait);

    let result = tokio::select! {
        result = &mut wait => result,
        _ = shutdown_signal() => {
            tracing::warn!(%job_id, "Signal received, cancelling job");
            cancel.cancel();
            wait.await
        }
    };

    let _ = printer.await;

    let code = if result.succeeded {
        0
    } else {
        result.exit_code.filter(|code| *code != 0).unwrap_or(1)
    };
    std::process::exit(code);
}

/// Wait for Ctrl-C or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
