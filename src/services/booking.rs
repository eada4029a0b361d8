use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Timelike};

use crate::errors::BookingError;
use crate::models::{clinic_now, ConversationSession, PatientDetails, Role, SessionStatus};
use crate::services::ai::prompt::GREETING;
use crate::services::ai::LlmProvider;
use crate::services::calendar::CalendarProvider;
use crate::services::extract::{
    extract_name_and_symptoms, extract_proposed_time, extract_specialist_mention,
};
use crate::services::sessions::SessionStore;
use crate::services::specialist::{self, DEFAULT_SPECIALIST};

pub const CONFIRMED_REPLY: &str =
    "Запись к врачу оформлена. Подтверждения события в календаре отправлены. Ожидайте приема.";
pub const DECLINED_REPLY: &str =
    "В случае ухудшения состояния обратитесь в скорую помощь по телефону 103.";
pub const CONFIRM_PROMPT_REPLY: &str = "Подтвердите, пожалуйста, согласие на запись (Да/Нет).";

const AFFIRMATIVE: &[&str] = &["да", "yes", "подтверждаю", "согласен", "согласна"];
const NEGATIVE: &[&str] = &["нет", "no", "отказываюсь"];

#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub system_prompt: String,
    pub slot_offset: Duration,
    pub appointment_minutes: i64,
}

/// Result of one chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub reply: String,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Affirmative,
    Negative,
}

pub struct BookingFlow {
    sessions: Arc<dyn SessionStore>,
    llm: Option<Arc<dyn LlmProvider>>,
    calendar: Arc<dyn CalendarProvider>,
    settings: FlowSettings,
}

impl BookingFlow {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        llm: Option<Arc<dyn LlmProvider>>,
        calendar: Arc<dyn CalendarProvider>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            sessions,
            llm,
            calendar,
            settings,
        }
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    /// The calendar backend actually in use, which may differ from the
    /// configured name when that name was not recognised.
    pub fn calendar_name(&self) -> &'static str {
        self.calendar.name()
    }

    /// Processes one patient message. Never fails: every error kind is turned
    /// into its patient-facing reply here.
    pub async fn handle_message(&self, session_id: &str, message: &str) -> ChatTurn {
        let mut session = self.sessions.get_or_create(session_id);
        let status_before = session.status();
        if session.transcript.is_empty() {
            session.push(Role::Assistant, GREETING);
        }
        session.push(Role::User, message);

        let result = match status_before {
            SessionStatus::SlotProposed => self.on_slot_proposed(&mut session, message).await,
            _ => self.on_collecting_identity(&mut session, message).await,
        };

        match result {
            Ok(reply) => {
                session.push(Role::Assistant, reply.as_str());
                let status = session.status();
                if status.is_terminal() {
                    self.sessions.delete(session_id);
                } else {
                    session.touch();
                    self.sessions.save(session);
                }
                tracing::info!(session_id, status = status.as_str(), "chat turn processed");
                ChatTurn { reply, status }
            }
            Err(e) => {
                // Only a calendar failure touches the store: the booking is
                // abandoned. Everything else leaves the stored session as it was.
                let status = match &e {
                    BookingError::Calendar(_) => {
                        tracing::error!(session_id, error = %e, "calendar event creation failed");
                        self.sessions.delete(session_id);
                        SessionStatus::Declined
                    }
                    BookingError::Extraction => {
                        tracing::info!(session_id, "could not extract name and symptoms");
                        status_before
                    }
                    _ => {
                        tracing::error!(session_id, error = %e, "chat turn failed");
                        status_before
                    }
                };
                ChatTurn {
                    reply: e.user_message().to_string(),
                    status,
                }
            }
        }
    }

    async fn on_collecting_identity(
        &self,
        session: &mut ConversationSession,
        message: &str,
    ) -> Result<String, BookingError> {
        let patient = extract_name_and_symptoms(message).ok_or(BookingError::Extraction)?;
        tracing::debug!(
            session_id = %session.session_id,
            name = %patient.name,
            symptoms = %patient.symptoms,
            "extracted patient details"
        );
        session.record_patient(patient.clone())?;

        let now = clinic_now();
        let routed = specialist::route(&patient.symptoms);

        // The provider only refines the proposal; extraction alone is
        // enough to move on.
        let (specialist, slot, preamble) = match self.provider_reply(session).await {
            Some(assistant_text) => {
                let specialist = if routed == DEFAULT_SPECIALIST {
                    extract_specialist_mention(&assistant_text)
                } else {
                    routed.to_string()
                };
                let slot = extract_proposed_time(&assistant_text, now)
                    .unwrap_or_else(|| self.default_slot(now));
                (specialist, slot, Some(assistant_text))
            }
            None => (routed.to_string(), self.default_slot(now), None),
        };

        session.propose_slot(specialist.as_str(), slot)?;
        tracing::info!(
            session_id = %session.session_id,
            specialist = %specialist,
            slot = %slot.to_rfc3339(),
            "proposed appointment slot"
        );

        let proposal = proposal_text(&patient, &specialist, slot);
        Ok(match preamble {
            Some(text) => format!("{text}\n\n{proposal}"),
            None => proposal,
        })
    }

    async fn on_slot_proposed(
        &self,
        session: &mut ConversationSession,
        message: &str,
    ) -> Result<String, BookingError> {
        match detect_answer(message) {
            Some(Answer::Affirmative) => {
                let appointment = session.confirm(self.settings.appointment_minutes)?;
                let event = self
                    .calendar
                    .create_event(&appointment)
                    .await
                    .map_err(|e| BookingError::Calendar(e.to_string()))?;
                tracing::info!(
                    session_id = %session.session_id,
                    event = %event,
                    "appointment booked"
                );
                Ok(CONFIRMED_REPLY.to_string())
            }
            Some(Answer::Negative) => {
                session.decline()?;
                Ok(DECLINED_REPLY.to_string())
            }
            None => match &self.llm {
                Some(llm) => llm
                    .chat(&self.settings.system_prompt, &session.transcript)
                    .await
                    .map_err(|e| BookingError::Completion(e.to_string())),
                None => Ok(CONFIRM_PROMPT_REPLY.to_string()),
            },
        }
    }

    async fn provider_reply(&self, session: &ConversationSession) -> Option<String> {
        let llm = self.llm.as_ref()?;
        match llm
            .chat(&self.settings.system_prompt, &session.transcript)
            .await
        {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "completion provider unavailable, proposing default slot"
                );
                None
            }
        }
    }

    fn default_slot(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let slot = now + self.settings.slot_offset;
        slot.with_second(0)
            .and_then(|s| s.with_nanosecond(0))
            .unwrap_or(slot)
    }
}

fn proposal_text(patient: &PatientDetails, specialist: &str, slot: DateTime<FixedOffset>) -> String {
    format!(
        "Отлично, {name}! По вашим симптомам рекомендую обратиться к специалисту: {specialist}.\n\
         Предлагаем запись: Прием: {name}, {specialist}\n\
         Дата/Время: {slot}\n\
         Подтвердите согласие (Да/Нет).",
        name = patient.name,
        slot = slot.format("%Y-%m-%d %H:%M"),
    )
}

/// Whole-word, case-insensitive match. A message carrying both an affirmative
/// and a negative word is treated as no answer.
fn detect_answer(message: &str) -> Option<Answer> {
    let lower = message.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let yes = words.iter().any(|w| AFFIRMATIVE.contains(w));
    let no = words.iter().any(|w| NEGATIVE.contains(w));

    match (yes, no) {
        (true, false) => Some(Answer::Affirmative),
        (false, true) => Some(Answer::Negative),
        _ => None,
    }
}
