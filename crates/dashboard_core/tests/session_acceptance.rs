use std::sync::Arc;

use async_trait::async_trait;
use dashboard_core::{
    completion::{ChunkStream, CompletionChunk, CompletionClient, CompletionError, CompletionRequest},
    config::Settings,
    streamer::GenerationOutcome,
    telemetry,
    validation::raw_input,
    Dashboard,
};
use futures::{stream, StreamExt};
use shared::error::ErrorCode;
use storage::Storage;

struct Echo;

#[async_trait]
impl CompletionClient for Echo {
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, CompletionError> {
        let addressee = if request.conversation[0].content.contains("Ana") {
            "Ana"
        } else {
            "customer"
        };
        let chunks = vec![
            Ok(CompletionChunk::Content("Dear ".into())),
            Ok(CompletionChunk::Empty),
            Ok(CompletionChunk::Content(addressee.into())),
        ];
        Ok(stream::iter(chunks).boxed())
    }
}

fn ana() -> dashboard_core::validation::RawInput {
    raw_input([
        ("customer_name", "Ana"),
        ("email", "a@x.com"),
        ("age", "34"),
        ("gender", "Female"),
        ("location", "Lisbon"),
        ("job", "Architect"),
        ("salary", "72000"),
    ])
}

#[tokio::test]
async fn session_manages_records_and_streams_an_email() {
    telemetry::init_tracing("warn");
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let dashboard = Dashboard::with_storage(storage, Arc::new(Echo), 10);

    let customer = dashboard.customers().create(&ana()).await.expect("create");
    dashboard
        .cars()
        .create(&raw_input([
            ("make", "Honda"),
            ("model", "Civic"),
            ("version", "EX"),
            ("year", "2019"),
            ("price", "18500"),
        ]))
        .await
        .expect("car");
    assert_eq!(dashboard.refresh().await.expect("refresh"), (1, 1));

    let outcome = dashboard
        .start_generation(customer.id.0)
        .await
        .expect("join");
    assert_eq!(outcome, GenerationOutcome::Completed);
    assert_eq!(dashboard.customers().generation_text().await, "Dear Ana");

    let err = dashboard
        .customers()
        .create(&ana())
        .await
        .expect_err("duplicate");
    assert_eq!(err.code(), ErrorCode::DuplicateKey);
}

#[tokio::test]
async fn connect_opens_file_store_and_reports_missing_credential_at_generation() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("sales.db");
    let settings = Settings {
        database_url: db_path.to_string_lossy().replace('\\', "/"),
        openai_api_key: None,
        ..Settings::default()
    };

    let dashboard = Dashboard::connect(&settings).await.expect("connect");
    dashboard.storage().health_check().await.expect("health");
    assert!(db_path.exists());

    let customer = dashboard.customers().create(&ana()).await.expect("create");
    let outcome = dashboard.generate_email(customer.id.0).await;
    assert!(
        matches!(&outcome, GenerationOutcome::Failed(reason) if reason.contains("OPENAI_API_KEY")),
        "unexpected outcome: {outcome:?}"
    );
    assert_eq!(dashboard.customers().generation_text().await, "");
    assert!(!dashboard.customers().is_generating().await);
}
