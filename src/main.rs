//! Storefront Session - command-line session client for the grocery-delivery storefront

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::time::Duration;
use storefront_session::config::Config;
use storefront_session::session::{
    check_expiry, decode_expiry, ExpiryCheck, RegisterOutcome, SessionController,
};
use storefront_session::types::{Credentials, Registration, SessionState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Storefront Session - log in, inspect and hold a storefront session
#[derive(Parser, Debug)]
#[command(name = "storefront-session")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Storefront API base URL (overrides config)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in with e-mail and password and persist the session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// End the session (remote invalidation is best-effort)
    Logout,
    /// Resolve the persisted token into a profile
    Whoami,
    /// Show when a token expires (defaults to the persisted token)
    TokenInfo {
        #[arg(long)]
        token: Option<String>,
    },
    /// Hold the session open, enforcing inactivity and expiry, until it ends
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = if let Some(ref path) = cli.config {
        let mut config = Config::from_file(path)?;
        config.apply_env();
        config
    } else {
        Config::load()
    };

    if let Some(ref url) = cli.api_url {
        config.api_base_url = url.clone();
    }
    config.validate()?;

    // Initialize tracing
    let log_level = if cli.verbose {
        "storefront_session=trace".to_string()
    } else {
        config.log_level.clone()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Storefront API: {}", config.api_base_url);

    let (session, mut navigation) = SessionController::from_config(&config)?;

    match cli.command {
        Command::Login { email, password } => {
            let profile = session.sign_in(&Credentials { email, password }).await?;
            println!("Logged in as {} <{}>", profile.name, profile.email);
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let registration = Registration {
                name,
                email,
                password_confirmation: password.clone(),
                password,
            };
            match session.register(&registration).await? {
                RegisterOutcome::SignedIn(profile) => {
                    println!("Registered and logged in as {}", profile.email);
                }
                RegisterOutcome::VerificationPending { email } => {
                    println!("Registered; check {} for a verification link", email);
                }
            }
        }
        Command::Logout => {
            // install the persisted token so the remote call is authenticated
            let _ = session.tokens().load();
            session.logout().await;
            println!("Logged out");
        }
        Command::Whoami => match session.restore().await? {
            SessionState::Authenticated(profile) => {
                let verified = if profile.verified { "verified" } else { "unverified" };
                println!(
                    "{} <{}> (id {}, {})",
                    profile.name, profile.email, profile.id, verified
                );
            }
            _ => println!("Not logged in"),
        },
        Command::TokenInfo { token } => {
            let Some(token) = token.or_else(|| session.tokens().get()) else {
                println!("No token");
                return Ok(());
            };
            match check_expiry(&token, Utc::now()) {
                ExpiryCheck::ExpiresIn(remaining) => {
                    let at = decode_expiry(&token).map(|t| t.to_rfc3339()).unwrap_or_default();
                    println!(
                        "Expires at {} (in {})",
                        at,
                        humantime::format_duration(Duration::from_secs(remaining.as_secs()))
                    );
                }
                ExpiryCheck::Expired => println!("Expired"),
                ExpiryCheck::Undecodable => println!("Expiry cannot be decoded"),
            }
        }
        Command::Watch => {
            let state = session.restore().await?;
            let Some(profile) = state.profile() else {
                println!("Not logged in");
                return Ok(());
            };
            info!(
                "Holding session for {}; idle timeout {}",
                profile.email,
                humantime::format_duration(config.session.inactivity_timeout)
            );

            tokio::select! {
                route = navigation.recv() => {
                    if let Some(route) = route {
                        println!("Session ended, redirect to {}", config.routes.path_for(route));
                    }
                }
                _ = shutdown_signal() => {
                    session.shutdown();
                }
            }
        }
    }

    Ok(())
}

/// Handle shutdown signals (SIGINT, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, releasing session...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, releasing session...");
        }
    }
}
