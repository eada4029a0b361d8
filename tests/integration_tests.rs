use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::{Duration, Timelike};
use tower::ServiceExt;

use clinic_booking::config::AppConfig;
use clinic_booking::errors::{CALENDAR_FAILED_REPLY, CLARIFY_REPLY, RETRY_REPLY};
use clinic_booking::handlers;
use clinic_booking::models::{clinic_now, Appointment, ConversationMessage, Role, SessionStatus};
use clinic_booking::services::ai::prompt::GREETING;
use clinic_booking::services::ai::LlmProvider;
use clinic_booking::services::booking::{
    BookingFlow, FlowSettings, CONFIRMED_REPLY, CONFIRM_PROMPT_REPLY, DECLINED_REPLY,
};
use clinic_booking::services::calendar::CalendarProvider;
use clinic_booking::services::sessions::{InMemorySessionStore, SessionStore};
use clinic_booking::state::AppState;

// ── Mock Providers ──

struct MockLlm {
    reply: String,
    calls: Arc<Mutex<Vec<Vec<ConversationMessage>>>>,
}

impl MockLlm {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Arc::new(Mutex::new(vec![])),
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn chat(
        &self,
        _system_prompt: &str,
        messages: &[ConversationMessage],
    ) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        Ok(self.reply.clone())
    }
}

struct FailingLlm;

#[async_trait]
impl LlmProvider for FailingLlm {
    async fn chat(
        &self,
        _system_prompt: &str,
        _messages: &[ConversationMessage],
    ) -> anyhow::Result<String> {
        anyhow::bail!("connection refused")
    }
}

#[derive(Default)]
struct MockCalendar {
    events: Mutex<Vec<Appointment>>,
    fail: bool,
}

impl MockCalendar {
    fn failing() -> Self {
        Self {
            events: Mutex::new(vec![]),
            fail: true,
        }
    }

    fn events(&self) -> Vec<Appointment> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProvider for MockCalendar {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_event(&self, appointment: &Appointment) -> anyhow::Result<String> {
        self.events.lock().unwrap().push(appointment.clone());
        if self.fail {
            anyhow::bail!("403 Forbidden");
        }
        Ok("https://calendar.example/event/1".to_string())
    }
}

// ── Helpers ──

struct Harness {
    sessions: Arc<InMemorySessionStore>,
    calendar: Arc<MockCalendar>,
    flow: BookingFlow,
}

fn harness(llm: Option<Arc<dyn LlmProvider>>, calendar: MockCalendar) -> Harness {
    let sessions = Arc::new(InMemorySessionStore::new(Duration::minutes(30)));
    let calendar = Arc::new(calendar);
    let flow = BookingFlow::new(
        sessions.clone(),
        llm,
        calendar.clone(),
        FlowSettings {
            system_prompt: "Ты ассистент регистратуры.".to_string(),
            slot_offset: Duration::hours(2),
            appointment_minutes: 60,
        },
    );
    Harness {
        sessions,
        calendar,
        flow,
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        llm_api_key: "".to_string(),
        llm_api_base: "http://localhost:11434/v1".to_string(),
        llm_model: "test".to_string(),
        llm_temperature: 0.7,
        system_prompt_path: "prompt-doctor.txt".to_string(),
        calendar_provider: "outlook".to_string(),
        google_calendar_id: "primary".to_string(),
        google_service_account_file: "".to_string(),
        google_access_token: "".to_string(),
        google_token_file: "token.json".to_string(),
        ics_dir: "appointments".to_string(),
        slot_offset_minutes: 120,
        appointment_minutes: 60,
        session_ttl_minutes: 30,
        http_timeout_secs: 5,
    }
}

fn test_state(h: Harness) -> (Arc<AppState>, Arc<MockCalendar>) {
    let calendar = h.calendar.clone();
    let state = Arc::new(AppState {
        config: test_config(),
        booking: h.flow,
    });
    (state, calendar)
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::chat::chat_page))
        .route("/chat", post(handlers::chat::chat))
        .route("/health", get(handlers::health::health))
        .with_state(state)
}

async fn post_chat(state: &Arc<AppState>, body: &str) -> (StatusCode, serde_json::Value) {
    let res = test_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat")
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn chat_body(message: &str, session_id: &str) -> String {
    serde_json::json!({ "message": message, "session_id": session_id }).to_string()
}

const IVAN: &str = "Меня зовут Иван, у меня болит горло";

// ── HTTP Surface ──

#[tokio::test]
async fn test_chat_page_serves_html() {
    let (state, _) = test_state(harness(None, MockCalendar::default()));

    let res = test_app(state)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("<html"));
    assert!(html.contains("Сообщите ваше Имя и опишите симптомы"));
    assert!(!html.contains("{{greeting}}"));
}

#[tokio::test]
async fn test_health() {
    let (state, _) = test_state(harness(None, MockCalendar::default()));

    let res = test_app(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sessions"], 0);
    // Reports the wired backend, not the configured name.
    assert_eq!(json["calendar"], "mock");
}

#[tokio::test]
async fn test_missing_message_rejected() {
    let (state, _) = test_state(harness(None, MockCalendar::default()));

    let (status, json) = post_chat(&state, r#"{"session_id":"abc"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No message provided");

    let (status, _) = post_chat(&state, r#"{"message":"   "}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let (state, _) = test_state(harness(None, MockCalendar::default()));

    let (status, json) = post_chat(&state, "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_first_message_gets_generated_session_id() {
    let (state, _) = test_state(harness(None, MockCalendar::default()));

    let (status, json) = post_chat(&state, r#"{"message":"Здравствуйте"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["response"], CLARIFY_REPLY);
    let id = json["session_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_http_booking_round_trip() {
    let (state, calendar) = test_state(harness(None, MockCalendar::default()));

    let (status, json) = post_chat(&state, &serde_json::json!({ "message": IVAN }).to_string()).await;
    assert_eq!(status, StatusCode::OK);
    let response = json["response"].as_str().unwrap();
    assert!(response.contains("терапевт (ЛОР)"));
    assert!(response.contains("(Да/Нет)"));
    let id = json["session_id"].as_str().unwrap().to_string();

    let (_, json) = post_chat(&state, &chat_body("Да", &id)).await;
    assert_eq!(json["response"], CONFIRMED_REPLY);
    assert_eq!(json["session_id"], id);
    assert_eq!(calendar.events().len(), 1);
    assert_eq!(state.booking.sessions().len(), 0);
}

// ── Booking Flow ──

#[tokio::test]
async fn test_identity_message_proposes_slot() {
    let h = harness(None, MockCalendar::default());
    let before = clinic_now();

    let turn = h.flow.handle_message("s1", IVAN).await;

    assert_eq!(turn.status, SessionStatus::SlotProposed);
    let session = h.sessions.get_or_create("s1");
    assert_eq!(session.patient_name(), Some("Иван"));
    assert_eq!(session.symptoms(), Some("болит горло"));
    assert_eq!(session.specialist(), Some("терапевт (ЛОР)"));

    let slot = session.proposed_slot().unwrap();
    let ahead = slot - before;
    assert!(ahead > Duration::minutes(118) && ahead <= Duration::minutes(121));
    assert_eq!(slot.second(), 0);
    assert_eq!(slot.offset().local_minus_utc(), 3 * 3600);

    assert_eq!(session.transcript.len(), 3);
    assert_eq!(session.transcript[0].role, Role::Assistant);
    assert_eq!(session.transcript[0].content, GREETING);
    assert_eq!(session.transcript[1].role, Role::User);
    assert_eq!(session.transcript[1].content, IVAN);
    assert_eq!(session.transcript[2].role, Role::Assistant);
    assert_eq!(session.transcript[2].content, turn.reply);
}

#[tokio::test]
async fn test_affirmative_creates_exactly_one_event() {
    let h = harness(None, MockCalendar::default());
    h.flow.handle_message("s1", IVAN).await;
    let proposed = h.sessions.get_or_create("s1");

    let turn = h.flow.handle_message("s1", "да").await;

    assert_eq!(turn.reply, CONFIRMED_REPLY);
    assert_eq!(turn.status, SessionStatus::Confirmed);
    let events = h.calendar.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].patient_name, "Иван");
    assert_eq!(events[0].specialist, "терапевт (ЛОР)");
    assert_eq!(Some(events[0].start), proposed.proposed_slot());
    assert_eq!(events[0].duration_minutes, 60);
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn test_negative_declines_without_event() {
    let h = harness(None, MockCalendar::default());
    h.flow.handle_message("s1", IVAN).await;

    let turn = h.flow.handle_message("s1", "Нет").await;

    assert_eq!(turn.reply, DECLINED_REPLY);
    assert_eq!(turn.status, SessionStatus::Declined);
    assert!(turn.reply.contains("103"));
    assert!(h.calendar.events().is_empty());
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn test_same_id_after_confirm_starts_fresh() {
    let h = harness(None, MockCalendar::default());
    h.flow.handle_message("s1", IVAN).await;
    h.flow.handle_message("s1", "да").await;

    let turn = h.flow.handle_message("s1", "да").await;

    assert_eq!(turn.reply, CLARIFY_REPLY);
    assert_eq!(turn.status, SessionStatus::CollectingIdentity);
    assert_eq!(h.calendar.events().len(), 1);

    let session = h.sessions.get_or_create("s1");
    assert!(session.patient_name().is_none());
    assert!(session.proposed_slot().is_none());
}

#[tokio::test]
async fn test_extraction_failure_leaves_session_untouched() {
    let h = harness(None, MockCalendar::default());

    let turn = h
        .flow
        .handle_message("s1", "Меня зовут Иван у меня болит горло")
        .await;

    assert_eq!(turn.reply, CLARIFY_REPLY);
    assert_eq!(turn.status, SessionStatus::CollectingIdentity);
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn test_token_before_proposal_is_not_a_confirmation() {
    let h = harness(None, MockCalendar::default());

    let turn = h.flow.handle_message("s1", "да").await;

    assert_eq!(turn.reply, CLARIFY_REPLY);
    assert!(h.calendar.events().is_empty());
}

#[tokio::test]
async fn test_without_provider_unclear_answer_reprompts() {
    let h = harness(None, MockCalendar::default());
    h.flow.handle_message("s1", IVAN).await;

    let turn = h.flow.handle_message("s1", "а когда именно?").await;

    assert_eq!(turn.reply, CONFIRM_PROMPT_REPLY);
    assert_eq!(turn.status, SessionStatus::SlotProposed);
    assert_eq!(h.sessions.get_or_create("s1").transcript.len(), 5);
}

#[tokio::test]
async fn test_unclear_answer_is_relayed_to_provider() {
    let llm = Arc::new(MockLlm::new("Приём займёт около часа."));
    let calls = llm.calls.clone();
    let h = harness(Some(llm as Arc<dyn LlmProvider>), MockCalendar::default());
    h.flow.handle_message("s1", IVAN).await;

    let turn = h.flow.handle_message("s1", "сколько длится приём?").await;

    assert_eq!(turn.reply, "Приём займёт около часа.");
    assert_eq!(turn.status, SessionStatus::SlotProposed);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].len(), 2);
    let last_call = calls.last().unwrap();
    assert_eq!(last_call.len(), 4);
    assert_eq!(last_call[0].role, Role::Assistant);
    assert_eq!(last_call[0].content, GREETING);
    assert_eq!(last_call[1].content, IVAN);
    assert_eq!(last_call[3].content, "сколько длится приём?");
    assert!(h.calendar.events().is_empty());
}

#[tokio::test]
async fn test_provider_reply_refines_default_specialist_and_time() {
    let llm = Arc::new(MockLlm::new(
        "Рекомендую обратиться к неврологу. Предлагаем запись на сегодня в 15:30.",
    ));
    let h = harness(Some(llm as Arc<dyn LlmProvider>), MockCalendar::default());

    let turn = h
        .flow
        .handle_message("s1", "Меня зовут Анна, у меня болит голова")
        .await;

    assert_eq!(turn.status, SessionStatus::SlotProposed);
    assert!(turn.reply.starts_with("Рекомендую обратиться к неврологу."));
    let session = h.sessions.get_or_create("s1");
    assert_eq!(session.specialist(), Some("неврологу"));
    let slot = session.proposed_slot().unwrap();
    assert_eq!((slot.hour(), slot.minute()), (15, 30));
    assert!(slot > clinic_now());
}

#[tokio::test]
async fn test_routed_specialist_wins_over_provider_mention() {
    let llm = Arc::new(MockLlm::new("Рекомендую обратиться к неврологу."));
    let h = harness(Some(llm as Arc<dyn LlmProvider>), MockCalendar::default());

    h.flow.handle_message("s1", IVAN).await;

    let session = h.sessions.get_or_create("s1");
    assert_eq!(session.specialist(), Some("терапевт (ЛОР)"));
}

#[tokio::test]
async fn test_provider_outage_still_proposes_slot() {
    let h = harness(Some(Arc::new(FailingLlm) as Arc<dyn LlmProvider>), MockCalendar::default());
    let before = clinic_now();

    let turn = h.flow.handle_message("s1", IVAN).await;

    assert_eq!(turn.status, SessionStatus::SlotProposed);
    assert!(turn.reply.starts_with("Отлично, Иван!"));
    let session = h.sessions.get_or_create("s1");
    assert_eq!(session.patient_name(), Some("Иван"));
    assert_eq!(session.specialist(), Some("терапевт (ЛОР)"));
    let ahead = session.proposed_slot().unwrap() - before;
    assert!(ahead > Duration::minutes(118) && ahead <= Duration::minutes(121));

    let turn = h.flow.handle_message("s1", "да").await;
    assert_eq!(turn.reply, CONFIRMED_REPLY);
    assert_eq!(h.calendar.events().len(), 1);
}

#[tokio::test]
async fn test_provider_failure_during_proposal_keeps_slot() {
    let flaky: Arc<dyn LlmProvider> = Arc::new(FailingLlm);
    let h = harness(None, MockCalendar::default());
    h.flow.handle_message("s1", IVAN).await;
    let saved = h.sessions.get_or_create("s1");

    // Same store, now wired to a failing provider.
    let flow = BookingFlow::new(
        h.sessions.clone(),
        Some(flaky),
        h.calendar.clone(),
        FlowSettings {
            system_prompt: String::new(),
            slot_offset: Duration::hours(2),
            appointment_minutes: 60,
        },
    );
    let turn = flow.handle_message("s1", "а можно позже?").await;

    assert_eq!(turn.reply, RETRY_REPLY);
    assert_eq!(turn.status, SessionStatus::SlotProposed);
    let session = h.sessions.get_or_create("s1");
    assert_eq!(session.proposed_slot(), saved.proposed_slot());
    assert_eq!(session.transcript.len(), saved.transcript.len());
}

#[tokio::test]
async fn test_calendar_failure_still_removes_session() {
    let h = harness(None, MockCalendar::failing());
    h.flow.handle_message("s1", IVAN).await;

    let turn = h.flow.handle_message("s1", "да").await;

    assert_eq!(turn.reply, CALENDAR_FAILED_REPLY);
    assert_eq!(turn.status, SessionStatus::Declined);
    assert_eq!(h.calendar.events().len(), 1);
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let h = harness(None, MockCalendar::default());
    h.flow.handle_message("a", IVAN).await;
    h.flow
        .handle_message("b", "Меня зовут Ольга, болит живот")
        .await;

    h.flow.handle_message("b", "нет").await;

    assert_eq!(h.sessions.len(), 1);
    let a = h.sessions.get_or_create("a");
    assert_eq!(a.status(), SessionStatus::SlotProposed);
    assert!(h.calendar.events().is_empty());
}
