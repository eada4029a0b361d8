use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::PatientDetails;

/// IANA name sent to calendar providers alongside the fixed offset below.
pub const CLINIC_TIMEZONE: &str = "Europe/Moscow";
const CLINIC_UTC_OFFSET_SECS: i32 = 3 * 3600;

pub fn clinic_offset() -> FixedOffset {
    FixedOffset::east_opt(CLINIC_UTC_OFFSET_SECS).expect("UTC+03:00 is a valid offset")
}

pub fn clinic_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&clinic_offset())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub patient_name: String,
    pub symptoms: String,
    pub specialist: String,
    pub start: DateTime<FixedOffset>,
    pub duration_minutes: i64,
}

impl Appointment {
    pub fn new(
        patient: &PatientDetails,
        specialist: &str,
        start: DateTime<FixedOffset>,
        duration_minutes: i64,
    ) -> Self {
        Self {
            patient_name: patient.name.clone(),
            symptoms: patient.symptoms.clone(),
            specialist: specialist.to_string(),
            start,
            duration_minutes,
        }
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.start + Duration::minutes(self.duration_minutes)
    }

    pub fn summary(&self) -> String {
        format!("Прием: {}, {}", self.patient_name, self.specialist)
    }

    /// Every created event is tentative until the clinic confirms it.
    pub fn description(&self) -> String {
        format!("Симптомы: {}. Требует подтверждения.", self.symptoms)
    }
}
