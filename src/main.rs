use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::{Duration, Instant};
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tourbot::bot::{schema, BotContext};
use tourbot::config::BotConfig;
use tourbot::db::{init_database_schema, PgSubmissionStore};
use tourbot::delivery::{DeliveryChannel, DeliveryFanout};
use tourbot::dialogue::ConversationState;
use tourbot::localization::LocalizationManager;
use tourbot::messenger::Messenger;
use tourbot::notification::OperatorNotifier;
use tourbot::reporting::AdminService;
use tourbot::sheets::SheetsExporter;
use tourbot::store::{InMemorySubmissionStore, SubmissionStore};
use tourbot::throttle::RateLimiter;

const DB_MAX_CONNECTIONS: u32 = 5;
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn open_store(config: &BotConfig) -> Result<Arc<dyn SubmissionStore>> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL is not set, requests are kept in memory and lost on restart");
        return Ok(Arc::new(InMemorySubmissionStore::new()));
    };

    info!("Connecting to PostgreSQL");
    let pool = PgPoolOptions::new()
        .max_connections(DB_MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    init_database_schema(&pool).await?;

    Ok(Arc::new(PgSubmissionStore::new(pool)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file before reading LOG_FORMAT
    dotenv::dotenv().ok();
    init_tracing();

    info!("Starting tour request bot");

    let config = BotConfig::from_env().context("Invalid configuration")?;
    info!(?config, "Configuration loaded");

    let store = open_store(&config).await?;

    let i18n = Arc::new(match &config.locales_dir {
        Some(dir) => LocalizationManager::from_dir(dir)?,
        None => LocalizationManager::new()?,
    });

    let bot = Bot::new(&config.telegram_token);
    let messenger: Arc<dyn Messenger> = Arc::new(bot.clone());

    let mut channels: Vec<Arc<dyn DeliveryChannel>> = Vec::new();
    match &config.sheets {
        Some(sheets) => match SheetsExporter::from_config(sheets) {
            Ok(exporter) => channels.push(Arc::new(exporter)),
            Err(e) => warn!(error = %e, "Spreadsheet export disabled"),
        },
        None => info!("SPREADSHEET_ID is not set, spreadsheet export disabled"),
    }
    channels.push(Arc::new(OperatorNotifier::new(
        Arc::clone(&messenger),
        Arc::clone(&i18n),
        ChatId(config.operator_id),
        config.operator_locale.clone(),
    )));

    let fanout = DeliveryFanout::new(Arc::clone(&store), channels);
    info!(channels = ?fanout.channel_names(), "Delivery channels ready");

    let limiter = Arc::new(RateLimiter::new(config.throttle));
    {
        let limiter = Arc::clone(&limiter);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                limiter.prune(Instant::now());
            }
        });
    }

    let ctx = Arc::new(BotContext {
        rules: config.rules.clone(),
        i18n,
        limiter,
        fanout,
        admin: AdminService::new(store, config.operator_id),
        messenger,
        idle_timeout: config.idle_timeout,
    });

    info!(operator_id = config.operator_id, "Bot initialized, starting dispatcher");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![InMemStorage::<ConversationState>::new(), ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Dispatcher stopped");
    Ok(())
}
