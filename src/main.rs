use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use ai_studio::{
    FileStore, GenerationController, GenerationRequest, HistoryStore, KeyValueStore, MemoryStore, MockEndpoint,
    StudioConfig, SubmitOptions,
};

// 1x1 PNG used as the demo upload.
const SAMPLE_IMAGE: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = StudioConfig::from_env();
    let storage: Arc<dyn KeyValueStore> = match &config.data_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "Using file-backed storage");
            Arc::new(FileStore::new(dir))
        }
        None => Arc::new(MemoryStore::new()),
    };
    let history = Arc::new(HistoryStore::load(storage));
    let settings = history.settings();

    let controller = GenerationController::new(
        Arc::new(MockEndpoint::new(config.mock.clone())),
        history.clone(),
        config.controller.clone(),
    );

    let request = GenerationRequest::new(
        SAMPLE_IMAGE,
        "Red silk dress on a runway, dramatic side lighting",
        settings.default_style,
    );
    let request_id = request.request_id.clone();
    let mut options = SubmitOptions::default()
        .on_retry(|attempt, err| tracing::warn!("Attempt {attempt} failed: {}", err.message))
        .on_progress(|percent| tracing::info!("Progress {percent}%"));
    if let Some(retry) = settings.retry {
        options = options.retry_config(retry);
    }

    let submit = controller.submit(request, options);
    tokio::pin!(submit);
    let outcome = tokio::select! {
        outcome = &mut submit => outcome,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel(&request_id);
            submit.await
        }
    };

    match outcome {
        Ok(result) => tracing::info!(id = %result.id, url = %result.image_url, "Generation finished"),
        Err(e) if e.is_cancelled() => tracing::info!("Generation cancelled"),
        Err(e) => tracing::warn!("Generation failed: {e}"),
    }

    let session = history.session();
    tracing::info!(generations = session.generation_count, "Session summary");
    println!("{}", serde_json::to_string_pretty(&history.list())?);
    Ok(())
}
