use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::CalendarProvider;
use crate::models::Appointment;

/// Writes each appointment as a standalone `.ics` file.
pub struct IcsCalendarProvider {
    dir: PathBuf,
}

impl IcsCalendarProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl CalendarProvider for IcsCalendarProvider {
    fn name(&self) -> &'static str {
        "ics"
    }

    async fn create_event(&self, appointment: &Appointment) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let uid = uuid::Uuid::new_v4().to_string();
        let path = self.dir.join(format!("appointment-{uid}.ics"));
        let ics = generate_ics(appointment, &uid, Utc::now());

        tokio::fs::write(&path, ics)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(path.display().to_string())
    }
}

pub fn generate_ics(appointment: &Appointment, uid: &str, created_at: DateTime<Utc>) -> String {
    let dtstart = format_utc(appointment.start.with_timezone(&Utc));
    let dtend = format_utc(appointment.end().with_timezone(&Utc));
    let dtstamp = format_utc(created_at);
    let summary = escape_text(&appointment.summary());
    let description = escape_text(&appointment.description());

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Clinic Booking//Chat Assistant//RU\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}@clinic-booking\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         STATUS:TENTATIVE\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

// RFC 5545 TEXT escaping.
fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
