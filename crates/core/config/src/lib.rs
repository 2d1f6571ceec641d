use cached::proc_macro::cached;
use config::{Config, File, FileFormat};
use futures_locks::RwLock;
use once_cell::sync::Lazy;
use serde::Deserialize;

static CONFIG_BUILDER: Lazy<RwLock<Config>> = Lazy::new(|| {
    RwLock::new({
        let mut builder = Config::builder().add_source(File::from_str(
            include_str!("../Sso.toml"),
            FileFormat::Toml,
        ));

        if std::path::Path::new("Sso.toml").exists() {
            builder = builder.add_source(File::new("Sso.toml", FileFormat::Toml));
        }

        builder.build().unwrap()
    })
});

#[derive(Deserialize, Debug, Clone)]
pub struct ProvidersSingleFlight {
    pub enabled: bool,
    pub max_concurrent: usize,
    pub metric: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Providers {
    pub singleflight: ProvidersSingleFlight,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Validators {
    pub group_grace_period_secs: u64,
    #[serde(default)]
    pub email_addresses: Vec<String>,
    #[serde(default)]
    pub email_domains: Vec<String>,
    #[serde(default)]
    pub allowed_groups: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub providers: Providers,
    pub validators: Validators,
}

impl ProvidersSingleFlight {
    /// Concurrency cap, where zero means unlimited
    pub fn max_concurrent(&self) -> Option<usize> {
        (self.max_concurrent > 0).then_some(self.max_concurrent)
    }
}

/// Configure logging and common Rust variables
pub fn setup_logging() {
    dotenv::dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }

    // Embedding applications may have installed their own logger already
    if pretty_env_logger::try_init().is_err() {
        log::debug!("Logger was already initialised, keeping it.");
    }
}

pub async fn init() {
    log::info!(":: SSO Proxy Configuration ::\n{:?}", config().await);
}

pub async fn read() -> Config {
    CONFIG_BUILDER.read().await.clone()
}

#[cached(time = 30)]
pub async fn config() -> Settings {
    read().await.try_deserialize::<Settings>().unwrap()
}
