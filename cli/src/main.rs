//! moodwalk – command-line front end for the mood-based walk recommender.
//!
//! This binary:
//! 1. Reads configuration from `moodwalk.conf`
//! 2. Signs in with the account in `MOODWALK_EMAIL` / `MOODWALK_PASSWORD`
//! 3. Runs one command against the backend and prints the result

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use moodwalk_client::api::ApiClient;
use moodwalk_client::auth::AuthSession;
use moodwalk_client::community::{ChatStore, LocalChatStore};
use moodwalk_client::firebase::FirebaseIdentity;
use moodwalk_client::kakao::KakaoGeocoder;
use moodwalk_client::location::{FixedGeolocator, Geolocator, LocationProvider, ReverseGeocoder};
use moodwalk_client::store::{FileStore, LocalStore, SelectedTrailStore};
use moodwalk_common::config::Config;

use commands::Command;

const USAGE: &str = "usage: moodwalk [CONFIG] <command> [args]

commands:
  analyze <text...>                           analyse a mood and recommend music and trails
  history                                     list past analyses
  delete-history <id>                         delete one past analysis
  me                                          show the stored profile
  update-me <username> <music> <residence>    update the stored profile
  register <username> <music> <residence>     create the account and store its profile
  coupons                                     list issued coupons
  community [message...]                      open the room of the last selected trail";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── arguments ────────────────────────────────────────────────────
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = match args.first() {
        Some(first) if Command::NAMES.contains(&first.as_str()) => Config::default_path().to_string(),
        Some(_) => args.remove(0),
        None => bail!("{USAGE}"),
    };
    let command = Command::parse(&args).with_context(|| USAGE.to_string())?;

    // ── load config ──────────────────────────────────────────────────
    let config = moodwalk_common::config::load(&PathBuf::from(&config_path))
        .context("Config load failed")?;
    info!("moodwalk starting (backend={})", config.api_base_url);

    let app = build(&config)?;
    commands::run(&app, command).await?;

    app.auth.shutdown();
    Ok(())
}

/// Everything the commands need, wired from the config.
pub struct App {
    pub api: ApiClient,
    pub auth: Arc<AuthSession>,
    pub location: Arc<LocationProvider>,
    pub selected: SelectedTrailStore,
    pub chat: Arc<dyn ChatStore>,
    pub chat_history_limit: usize,
}

fn build(config: &Config) -> Result<App> {
    let api_key = config
        .firebase_api_key
        .as_deref()
        .context("FIREBASE_API_KEY is not set")?;
    let identity = FirebaseIdentity::new(api_key).context("Cannot create identity client")?;
    let auth = AuthSession::start(
        Arc::new(identity),
        config.token_refresh_interval(),
        config.token_retry_backoff(),
    );

    let geolocator: Arc<dyn Geolocator> = Arc::new(FixedGeolocator::new(config.fixed_location()));
    let geocoder: Option<Arc<dyn ReverseGeocoder>> = match config.kakao_rest_key.as_deref() {
        Some(key) => Some(Arc::new(
            KakaoGeocoder::new(key).context("Cannot create geocoding client")?,
        )),
        None => None,
    };
    let location = Arc::new(LocationProvider::new(
        Some(geolocator),
        geocoder,
        config.location_timeout(),
        config.location_max_age(),
    ));

    let store: Arc<dyn LocalStore> = Arc::new(FileStore::new(&config.store_dir));
    let selected = SelectedTrailStore::new(store.clone(), config.selected_trail_ttl());
    let chat: Arc<dyn ChatStore> = Arc::new(LocalChatStore::new(store));

    let api = ApiClient::new(config).context("Cannot create API client")?;
    Ok(App {
        api,
        auth,
        location,
        selected,
        chat,
        chat_history_limit: config.chat_history_limit,
    })
}
