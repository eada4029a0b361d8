use std::path::Path;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"Ты — вежливый ассистент регистратуры медицинской клиники.
Твоя задача — помочь пациенту записаться на приём к врачу.

Правила:
- Пациент сообщает имя и описывает симптомы.
- По симптомам порекомендуй специалиста фразой "рекомендую обратиться к <специалист>".
- Предлагая время, пиши его в формате "на сегодня в ЧЧ:ММ".
- Не ставь диагнозов и не назначай лечение.
- При угрозе жизни советуй немедленно звонить в скорую помощь по номеру 103.
- Отвечай кратко, по-русски.
"#;

pub const GREETING: &str =
    "Здравствуйте. Вы обратились в систему записи к врачу. Сообщите ваше Имя и опишите симптомы.";

/// Reads the system prompt once at startup, falling back to the built-in
/// prompt when the file is missing or empty.
pub fn load_system_prompt(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => {
            tracing::info!(path = %path.display(), "loaded system prompt");
            text.trim().to_string()
        }
        Ok(_) => {
            tracing::warn!(path = %path.display(), "system prompt file is empty, using built-in prompt");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "system prompt file unavailable, using built-in prompt");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}
