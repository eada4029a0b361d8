use crate::config::AppConfig;
use crate::services::booking::BookingFlow;

pub struct AppState {
    pub config: AppConfig,
    pub booking: BookingFlow,
}
