mod backend;
mod commands;
mod docid;
mod notify;
mod quote;
mod records;
mod session;
mod settings;
mod state;
mod store;
mod sync;

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use poise::serenity_prelude as serenity;
use poise::{Framework, FrameworkOptions};
use tracing::{error, info, warn, Level};

use backend::{RestClient, TableBackend};
use docid::DocIdGenerator;
use notify::{Notifier, TelegramTransport};
use records::Client;
use state::{AppState, ConsoleConfig};
use store::types::CLIENTS_KEY;
use store::LocalStore;
use sync::{FetchOutcome, SyncedCollection};

fn log_outcome(entity: &str, outcome: FetchOutcome) {
    match outcome {
        FetchOutcome::Remote(n) => info!(entity, count = n, "loaded from backend"),
        FetchOutcome::Cache(n) => warn!(entity, count = n, "backend unavailable, using cache"),
        FetchOutcome::Defaults(n) => info!(entity, count = n, "seeded with defaults"),
        FetchOutcome::Unchanged => warn!(entity, "backend unavailable, nothing cached"),
    }
}

/// Load every mirror once before accepting commands.
async fn warm_up(state: &AppState) {
    let loads: Vec<BoxFuture<'_, ()>> = vec![
        state.settings.fetch_all().boxed(),
        async { log_outcome("clients", state.clients.fetch_all().await) }.boxed(),
        async { log_outcome("departments", state.departments.fetch_all().await) }.boxed(),
        async { log_outcome("hsn_codes", state.hsn_codes.fetch_all().await) }.boxed(),
        async { log_outcome("technicals", state.technicals.fetch_all().await) }.boxed(),
        async { log_outcome("terms", state.terms.fetch_all().await) }.boxed(),
        async {
            if let Err(e) = state.saved.fetch().await {
                warn!("Saved records not loaded: {}", e);
            }
        }
        .boxed(),
    ];
    join_all(loads).await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let config = ConsoleConfig::from_env()?;

    // Init storage
    let store = Arc::new(LocalStore::new(&config.store_dir).await?);
    info!("Local store initialized at {:?}", config.store_dir);

    let backend: Arc<dyn TableBackend> = Arc::new(RestClient::from_env()?);
    info!("Backend client initialized");

    let notifier = match TelegramTransport::from_env()? {
        Some(transport) => {
            info!(interval_secs = config.notify_interval.as_secs(), "Login notifications enabled");
            Some(Arc::new(Notifier::new(Arc::new(transport), config.notify_interval)))
        }
        None => {
            info!("Telegram not configured, login notifications disabled");
            None
        }
    };

    let clients = Arc::new(
        SyncedCollection::<Client>::new(backend.clone()).with_cache(store.clone(), CLIENTS_KEY),
    );
    clients.watch_cache();

    let app_state = AppState::new(
        backend,
        store,
        notifier,
        clients,
        DocIdGenerator::from_name(&config.doc_sequence),
    );
    warm_up(&app_state).await;

    let intents = serenity::GatewayIntents::GUILDS;
    let guild_id = config.guild_id;

    let framework = Framework::builder()
        .options(FrameworkOptions {
            commands: vec![commands::console()],
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot connected as: {} ({})", ready.user.name, ready.user.id);

                let commands = &framework.options().commands;
                info!("Registering {} top-level command(s):", commands.len());
                for cmd in commands {
                    info!("  /{} ({} subcommands)", cmd.name, cmd.subcommands.len());
                    for sub in &cmd.subcommands {
                        info!("    /{} {}", cmd.name, sub.name);
                    }
                }

                if let Some(gid) = guild_id {
                    info!("Registering to guild {} (instant)", gid);
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        gid,
                    )
                    .await?;
                } else {
                    info!("Registering globally (up to 1 hour delay)");
                    poise::builtins::register_globally(
                        ctx,
                        &framework.options().commands,
                    )
                    .await?;
                }

                Ok(app_state)
            })
        })
        .build();

    info!("Starting EESIPL console bot...");

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    if let Err(e) = client.start().await {
        error!("Client error: {}", e);
    }

    Ok(())
}
