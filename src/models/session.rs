use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::Appointment;
use crate::errors::TransitionError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    CollectingIdentity,
    CollectingSymptoms,
    SlotProposed,
    Confirmed,
    Declined,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::CollectingIdentity => "collecting_identity",
            SessionStatus::CollectingSymptoms => "collecting_symptoms",
            SessionStatus::SlotProposed => "slot_proposed",
            SessionStatus::Confirmed => "confirmed",
            SessionStatus::Declined => "declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Confirmed | SessionStatus::Declined)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientDetails {
    pub name: String,
    pub symptoms: String,
}

/// Booking progress. Each variant carries only the fields that exist at that
/// point, so a slot can never be present without a specialist, nor a
/// specialist without symptoms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BookingState {
    CollectingIdentity,
    CollectingSymptoms {
        patient: PatientDetails,
    },
    SlotProposed {
        patient: PatientDetails,
        specialist: String,
        slot: DateTime<FixedOffset>,
    },
    Confirmed {
        appointment: Appointment,
    },
    Declined,
}

impl BookingState {
    pub fn status(&self) -> SessionStatus {
        match self {
            BookingState::CollectingIdentity => SessionStatus::CollectingIdentity,
            BookingState::CollectingSymptoms { .. } => SessionStatus::CollectingSymptoms,
            BookingState::SlotProposed { .. } => SessionStatus::SlotProposed,
            BookingState::Confirmed { .. } => SessionStatus::Confirmed,
            BookingState::Declined => SessionStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub transcript: Vec<ConversationMessage>,
    pub state: BookingState,
    pub last_activity: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            transcript: Vec::new(),
            state: BookingState::CollectingIdentity,
            last_activity: Utc::now(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn patient(&self) -> Option<&PatientDetails> {
        match &self.state {
            BookingState::CollectingSymptoms { patient }
            | BookingState::SlotProposed { patient, .. } => Some(patient),
            _ => None,
        }
    }

    pub fn patient_name(&self) -> Option<&str> {
        match &self.state {
            BookingState::Confirmed { appointment } => Some(&appointment.patient_name),
            _ => self.patient().map(|p| p.name.as_str()),
        }
    }

    pub fn symptoms(&self) -> Option<&str> {
        match &self.state {
            BookingState::Confirmed { appointment } => Some(&appointment.symptoms),
            _ => self.patient().map(|p| p.symptoms.as_str()),
        }
    }

    pub fn specialist(&self) -> Option<&str> {
        match &self.state {
            BookingState::SlotProposed { specialist, .. } => Some(specialist),
            BookingState::Confirmed { appointment } => Some(&appointment.specialist),
            _ => None,
        }
    }

    pub fn proposed_slot(&self) -> Option<DateTime<FixedOffset>> {
        match &self.state {
            BookingState::SlotProposed { slot, .. } => Some(*slot),
            BookingState::Confirmed { appointment } => Some(appointment.start),
            _ => None,
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.transcript.push(ConversationMessage::new(role, content));
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Name and symptoms are recorded once; later messages never overwrite them.
    pub fn record_patient(&mut self, patient: PatientDetails) -> Result<(), TransitionError> {
        if !matches!(self.state, BookingState::CollectingIdentity) {
            return Err(self.transition_error(SessionStatus::CollectingSymptoms));
        }
        self.state = BookingState::CollectingSymptoms { patient };
        Ok(())
    }

    pub fn propose_slot(
        &mut self,
        specialist: impl Into<String>,
        slot: DateTime<FixedOffset>,
    ) -> Result<(), TransitionError> {
        let BookingState::CollectingSymptoms { patient } = &self.state else {
            return Err(self.transition_error(SessionStatus::SlotProposed));
        };
        self.state = BookingState::SlotProposed {
            patient: patient.clone(),
            specialist: specialist.into(),
            slot,
        };
        Ok(())
    }

    pub fn confirm(&mut self, duration_minutes: i64) -> Result<Appointment, TransitionError> {
        let BookingState::SlotProposed {
            patient,
            specialist,
            slot,
        } = &self.state
        else {
            return Err(self.transition_error(SessionStatus::Confirmed));
        };
        let appointment = Appointment::new(patient, specialist, *slot, duration_minutes);
        self.state = BookingState::Confirmed {
            appointment: appointment.clone(),
        };
        Ok(appointment)
    }

    pub fn decline(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.state, BookingState::SlotProposed { .. }) {
            return Err(self.transition_error(SessionStatus::Declined));
        }
        self.state = BookingState::Declined;
        Ok(())
    }

    fn transition_error(&self, to: SessionStatus) -> TransitionError {
        TransitionError {
            from: self.status(),
            to,
        }
    }
}
