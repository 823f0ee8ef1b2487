use std::sync::Arc;

use anyhow::{Context, Result};
use shared::domain::{Car, Customer};
use storage::Storage;
use tokio::task::JoinHandle;
use tracing::info;

pub mod completion;
pub mod config;
pub mod filters;
pub mod prompt;
pub mod state;
pub mod streamer;
pub mod telemetry;
pub mod validation;

use completion::{CompletionClient, CompletionSettings, LazyCompletionClient};
use config::Settings;
use prompt::SellerProfile;
use state::StateStore;
use streamer::{CompletionStreamer, GenerationOutcome};

/// One user session: a store per entity kind plus the shared generation client.
#[derive(Clone)]
pub struct Dashboard {
    storage: Storage,
    customers: Arc<StateStore<Customer>>,
    cars: Arc<StateStore<Car>>,
    streamer: CompletionStreamer,
}

impl Dashboard {
    /// Opens the database (running migrations). The completion client is not
    /// built until the first generation request.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let database_url = config::prepare_database_url(&settings.database_url)?;
        let storage = Storage::new(&database_url)
            .await
            .with_context(|| format!("failed to open store at '{database_url}'"))?;
        info!(database_url = %database_url, "dashboard: store ready");
        let client = LazyCompletionClient::new(CompletionSettings::from(settings));
        Ok(Self::with_storage(
            storage,
            Arc::new(client),
            settings.page_size,
        ))
    }

    pub fn with_storage(
        storage: Storage,
        client: Arc<dyn CompletionClient>,
        page_size: u32,
    ) -> Self {
        Self {
            customers: Arc::new(StateStore::new(storage.clone(), page_size)),
            cars: Arc::new(StateStore::new(storage.clone(), page_size)),
            streamer: CompletionStreamer::new(client, SellerProfile::default()),
            storage,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn customers(&self) -> &Arc<StateStore<Customer>> {
        &self.customers
    }

    pub fn cars(&self) -> &Arc<StateStore<Car>> {
        &self.cars
    }

    /// Loads the first page of both tables with their current criteria.
    pub async fn refresh(&self) -> Result<(usize, usize), shared::error::StateError> {
        let customers = self.customers.reload().await?;
        let cars = self.cars.reload().await?;
        Ok((customers, cars))
    }

    /// Streams an email for a loaded customer to completion.
    pub async fn generate_email(&self, customer_id: i64) -> GenerationOutcome {
        self.streamer.run(&self.customers, customer_id).await
    }

    /// Like [`Dashboard::generate_email`], but runs on the tokio runtime so
    /// the caller can keep reading `generation_text` while it streams.
    pub fn start_generation(&self, customer_id: i64) -> JoinHandle<GenerationOutcome> {
        let streamer = self.streamer.clone();
        let customers = Arc::clone(&self.customers);
        tokio::spawn(async move { streamer.run(&customers, customer_id).await })
    }
}
