//! Drives one generation session from request to terminal state.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use storage::Entity;
use tracing::{debug, info, warn};

use crate::{
    completion::CompletionClient,
    prompt::{build_request, PromptSubject, SellerProfile},
    state::StateStore,
};

pub const SUPERSEDED: &str = "superseded by a newer generation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Completed,
    /// Text received before the failure stays in `generation_text`.
    Failed(String),
    /// The selection was not among the loaded records; no request was made.
    NotStarted,
}

#[derive(Clone)]
pub struct CompletionStreamer {
    client: Arc<dyn CompletionClient>,
    seller: SellerProfile,
}

impl CompletionStreamer {
    pub fn new(client: Arc<dyn CompletionClient>, seller: SellerProfile) -> Self {
        Self { client, seller }
    }

    /// Generates text for `selection_id`, appending each content chunk to the
    /// store in arrival order. Observers reading `generation_text` mid-stream
    /// always see a prefix of the final text.
    pub async fn run<E>(&self, store: &StateStore<E>, selection_id: i64) -> GenerationOutcome
    where
        E: Entity + PromptSubject,
    {
        let Some(session) = store.begin_generation(selection_id).await else {
            warn!(entity = E::KIND, selection_id, "generation: selection not loaded");
            return GenerationOutcome::NotStarted;
        };

        let request = build_request(&session.subject, &self.seller, &session.preferences);
        info!(
            entity = E::KIND,
            selection_id,
            tone = %session.preferences.tone,
            length = session.preferences.length,
            "generation: request issued"
        );

        let mut chunks = match self.client.stream(request).await {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(selection_id, %err, "generation: request failed");
                return store
                    .finish_generation(session.token, GenerationOutcome::Failed(err.to_string()))
                    .await;
            }
        };

        let mut appended = 0usize;
        while let Some(item) = chunks.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(selection_id, appended, %err, "generation: stream failed");
                    return store
                        .finish_generation(
                            session.token,
                            GenerationOutcome::Failed(err.to_string()),
                        )
                        .await;
                }
            };
            let Some(text) = chunk.content() else {
                continue;
            };
            if !store.append_generation(session.token, text).await {
                debug!(selection_id, "generation: session superseded");
                return store
                    .finish_generation(session.token, GenerationOutcome::Failed(SUPERSEDED.into()))
                    .await;
            }
            appended += 1;
        }

        info!(selection_id, appended, "generation: completed");
        store
            .finish_generation(session.token, GenerationOutcome::Completed)
            .await
    }
}

#[cfg(test)]
#[path = "tests/streamer_tests.rs"]
mod tests;
