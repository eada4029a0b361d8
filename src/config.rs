use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub llm_api_key: String,
    pub llm_api_base: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub system_prompt_path: String,
    pub calendar_provider: String,
    pub google_calendar_id: String,
    pub google_service_account_file: String,
    pub google_access_token: String,
    pub google_token_file: String,
    pub ics_dir: String,
    pub slot_offset_minutes: i64,
    pub appointment_minutes: i64,
    pub session_ttl_minutes: i64,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parse_var("PORT", 3000),
            llm_api_key: env::var("LLM_API_KEY")
                .or_else(|_| env::var("DEEPSEEK_API_KEY"))
                .unwrap_or_default(),
            llm_api_base: env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| "https://api.deepseek.com/v1".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "deepseek-chat".to_string()),
            llm_temperature: parse_var("LLM_TEMPERATURE", 0.7),
            system_prompt_path: env::var("SYSTEM_PROMPT_PATH")
                .unwrap_or_else(|_| "prompt-doctor.txt".to_string()),
            calendar_provider: env::var("CALENDAR_PROVIDER").unwrap_or_else(|_| "ics".to_string()),
            google_calendar_id: env::var("GOOGLE_CALENDAR_ID")
                .unwrap_or_else(|_| "primary".to_string()),
            google_service_account_file: env::var("GOOGLE_SERVICE_ACCOUNT_FILE")
                .or_else(|_| env::var("SERVICE_ACCOUNT_JSON"))
                .unwrap_or_default(),
            google_access_token: env::var("GOOGLE_ACCESS_TOKEN").unwrap_or_default(),
            google_token_file: env::var("GOOGLE_TOKEN_FILE")
                .unwrap_or_else(|_| "token.json".to_string()),
            ics_dir: env::var("ICS_DIR").unwrap_or_else(|_| "appointments".to_string()),
            slot_offset_minutes: parse_var("SLOT_OFFSET_MINUTES", 120),
            appointment_minutes: parse_var("APPOINTMENT_MINUTES", 60),
            session_ttl_minutes: parse_var("SESSION_TTL_MINUTES", 30),
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", 30),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
