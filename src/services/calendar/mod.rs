pub mod google;
pub mod ics;

use async_trait::async_trait;

use crate::models::Appointment;

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Creates a tentative event for the appointment and returns a reference
    /// to it (a link, an id or a file path, depending on the backend).
    async fn create_event(&self, appointment: &Appointment) -> anyhow::Result<String>;
}
