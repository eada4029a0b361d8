use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use clinic_booking::config::AppConfig;
use clinic_booking::handlers;
use clinic_booking::services::ai::openai::OpenAiCompatProvider;
use clinic_booking::services::ai::prompt::load_system_prompt;
use clinic_booking::services::ai::LlmProvider;
use clinic_booking::services::booking::{BookingFlow, FlowSettings};
use clinic_booking::services::calendar::google::{GoogleCalendarProvider, TokenSource};
use clinic_booking::services::calendar::ics::IcsCalendarProvider;
use clinic_booking::services::calendar::CalendarProvider;
use clinic_booking::services::sessions::{InMemorySessionStore, SessionStore};
use clinic_booking::state::AppState;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    let timeout = Duration::from_secs(config.http_timeout_secs);

    let llm: Option<Arc<dyn LlmProvider>> = if config.llm_api_key.is_empty() {
        tracing::warn!("LLM_API_KEY not set, running without a completion provider");
        None
    } else {
        tracing::info!(
            "using completion provider {} (model: {})",
            config.llm_api_base,
            config.llm_model
        );
        Some(Arc::new(OpenAiCompatProvider::new(
            config.llm_api_key.clone(),
            config.llm_api_base.clone(),
            config.llm_model.clone(),
            config.llm_temperature,
            timeout,
        )?))
    };

    let calendar: Arc<dyn CalendarProvider> = match config.calendar_provider.as_str() {
        "google" => {
            let tokens = if !config.google_service_account_file.is_empty() {
                let path = PathBuf::from(&config.google_service_account_file);
                anyhow::ensure!(
                    path.exists(),
                    "GOOGLE_SERVICE_ACCOUNT_FILE ({}) does not exist",
                    path.display()
                );
                TokenSource::ServiceAccountFile(path)
            } else if !config.google_access_token.is_empty() {
                TokenSource::Static(config.google_access_token.clone())
            } else {
                let path = PathBuf::from(&config.google_token_file);
                anyhow::ensure!(
                    path.exists(),
                    "GOOGLE_SERVICE_ACCOUNT_FILE, GOOGLE_ACCESS_TOKEN or an existing GOOGLE_TOKEN_FILE ({}) is required when CALENDAR_PROVIDER=google",
                    path.display()
                );
                TokenSource::AuthorizedUserFile(path)
            };
            tracing::info!(
                "using Google Calendar provider (calendar: {})",
                config.google_calendar_id
            );
            Arc::new(GoogleCalendarProvider::new(
                config.google_calendar_id.clone(),
                tokens,
                timeout,
            )?)
        }
        other => {
            if other != "ics" {
                tracing::warn!("unknown CALENDAR_PROVIDER {other:?}, falling back to ics");
            }
            tracing::info!("using ICS calendar provider (dir: {})", config.ics_dir);
            Arc::new(IcsCalendarProvider::new(&config.ics_dir))
        }
    };

    let sessions = Arc::new(InMemorySessionStore::new(chrono::Duration::minutes(
        config.session_ttl_minutes,
    )));

    let booking = BookingFlow::new(
        sessions.clone(),
        llm,
        calendar,
        FlowSettings {
            system_prompt: load_system_prompt(&config.system_prompt_path),
            slot_offset: chrono::Duration::minutes(config.slot_offset_minutes),
            appointment_minutes: config.appointment_minutes,
        },
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            let pruned = sessions.prune_expired();
            if pruned > 0 {
                tracing::debug!(pruned, remaining = sessions.len(), "pruned expired sessions");
            }
        }
    });

    let state = Arc::new(AppState {
        config: config.clone(),
        booking,
    });

    let app = Router::new()
        .route("/", get(handlers::chat::chat_page))
        .route("/chat", post(handlers::chat::chat))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
