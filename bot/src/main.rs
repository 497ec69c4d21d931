//! Guild Wars 2 alliance service.
//!
//! Keeps Discord member roles and nicknames in line with the accounts linked
//! in the verification backend.
//!
//! ```bash
//! DISCORD_TOKEN=... BACKEND_URL=... BACKEND_TOKEN=... SERVICE_UUID=... cargo run -p alliance-bot
//! ```

mod config;

use alliance::prelude::{
    BackendClient, DiscordRest, GuildDirectory, MemberSync, RoleReconciler, ServiceSettings,
    WorldLinks,
};
use config::BotConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Pause between failed settings loads at startup
const SETTINGS_RETRY: Duration = Duration::from_secs(5);

/// Interval between settings refreshes
const SETTINGS_RESYNC: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run with --help to list the required environment variables.");
            std::process::exit(1);
        }
    };

    let platform = Arc::new(DiscordRest::new(&config.discord_token)?);
    let backend = Arc::new(BackendClient::new(
        &config.backend_url,
        &config.backend_token,
        &config.service_uuid,
    )?);
    let game = match &config.gw2_api_url {
        Some(url) => gw2api::Client::new()?.with_base_url(url),
        None => gw2api::Client::new()?,
    };
    let game = Arc::new(game);

    let settings = Arc::new(ServiceSettings::new(backend.clone()));
    load_settings(&settings).await;
    spawn_settings_resync(settings.clone());

    let directory = Arc::new(GuildDirectory::new(game.clone()));
    let worlds = Arc::new(WorldLinks::new(game));
    worlds.spawn();

    tracing::info!("waiting for linked worlds");
    tokio::select! {
        _ = worlds.synchronized() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted before start");
            return Ok(());
        }
    }

    let sync = Arc::new(
        MemberSync::new(
            platform,
            backend,
            settings,
            RoleReconciler::new(directory, worlds),
        )
        .with_debug_user(config.debug_user.clone())
        .with_page_size(config.sweep_page_size)
        .with_page_pause(config.sweep_page_pause),
    );

    tokio::spawn(sync.clone().run_updates());
    tokio::spawn(sync.run_sweep());
    tracing::info!(debug_user = ?config.debug_user, "service started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}

/// Load service settings, retrying until the backend answers.
async fn load_settings(settings: &ServiceSettings) {
    loop {
        match settings.synchronize().await {
            Ok(subjects) => {
                tracing::info!(subjects, "service settings loaded");
                return;
            }
            Err(error) => {
                tracing::error!(%error, "unable to load service settings");
                tokio::time::sleep(SETTINGS_RETRY).await;
            }
        }
    }
}

fn spawn_settings_resync(settings: Arc<ServiceSettings>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SETTINGS_RESYNC);
        // The first tick fires immediately and the settings are fresh.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(error) = settings.synchronize().await {
                tracing::warn!(%error, "unable to refresh service settings");
            }
        }
    });
}

fn print_help() {
    println!("alliance-bot - Guild Wars 2 alliance role and nickname service");
    println!();
    println!("USAGE:");
    println!("  alliance-bot");
    println!();
    println!("ENVIRONMENT (a .env file is read if present):");
    println!("  DISCORD_TOKEN           Discord bot token (required)");
    println!("  BACKEND_URL             Verification backend base URL (required)");
    println!("  BACKEND_TOKEN           Verification backend token (required)");
    println!("  SERVICE_UUID            Service registration ID (required)");
    println!("  DEBUG_USER              Only act on this Discord user");
    println!("  SWEEP_PAGE_SIZE         Members per sweep page (default: 25)");
    println!("  SWEEP_PAGE_PAUSE_SECS   Pause between sweep pages (default: 5)");
    println!("  GW2_API_URL             Guild Wars 2 API base URL override");
    println!("  RUST_LOG                Log filter (default: info)");
}
