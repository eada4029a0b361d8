//! Best-effort field extraction from free-form chat text.
//!
//! Every function returns `None` (or a default) on input it does not
//! recognise; none of them can fail loudly.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime};
use regex::Regex;

use crate::models::PatientDetails;
use crate::services::specialist::DEFAULT_SPECIALIST;

static NAME_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:меня\s+зовут|мо[её]\s+имя|my\s+name\s+is|i\s+am|i'm|я)(?:\s+|$)").unwrap()
});

static SYMPTOM_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:у\s+меня|i\s+have|i've\s+got)(?:\s+|$)").unwrap()
});

static TIME_AFTER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:на\s+сегодня\s+в|на\s+время|время:|\bв|\bat)\s+(\d{1,2}):(\d{2})\b").unwrap()
});

static SPECIALIST_AFTER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:обратиться\s+к|запись\s+к|при[её]м\s+к|направляю\s+к|see\s+an?)\s+(\w+)")
        .unwrap()
});

/// Words that follow a referral marker without naming a specialty.
const GENERIC_REFERRALS: &[&str] = &["врачу", "доктору", "специалисту", "doctor", "specialist"];

/// Parses "<name phrase>, <symptom phrase>", e.g.
/// "Меня зовут Иван, у меня болит горло" -> ("Иван", "болит горло").
pub fn extract_name_and_symptoms(message: &str) -> Option<PatientDetails> {
    let (name_part, symptoms_part) = message.split_once(',')?;

    let name = collapse_whitespace(strip_marker(&NAME_MARKER, name_part));
    let symptoms = collapse_whitespace(strip_marker(&SYMPTOM_MARKER, symptoms_part));

    if name.is_empty() || symptoms.is_empty() {
        return None;
    }

    Some(PatientDetails {
        name: capitalize_words(&name),
        symptoms,
    })
}

/// Finds the first "HH:MM" that follows a time marker in assistant text and
/// places it on today's date in `now`'s offset, or tomorrow if that moment has
/// already passed.
pub fn extract_proposed_time(
    assistant_text: &str,
    now: DateTime<FixedOffset>,
) -> Option<DateTime<FixedOffset>> {
    TIME_AFTER_MARKER
        .captures_iter(assistant_text)
        .find_map(|caps| {
            let hour = caps.get(1)?.as_str().parse().ok()?;
            let minute = caps.get(2)?.as_str().parse().ok()?;
            NaiveTime::from_hms_opt(hour, minute, 0)
        })
        .and_then(|time| {
            now.date_naive()
                .and_time(time)
                .and_local_timezone(*now.offset())
                .single()
        })
        .map(|candidate| {
            if candidate < now {
                candidate + Duration::days(1)
            } else {
                candidate
            }
        })
}

/// Returns the specialist named after a referral phrase in assistant text,
/// lowercased, or the general practitioner label.
pub fn extract_specialist_mention(assistant_text: &str) -> String {
    SPECIALIST_AFTER_MARKER
        .captures_iter(assistant_text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .find(|word| !GENERIC_REFERRALS.contains(&word.as_str()))
        .unwrap_or_else(|| DEFAULT_SPECIALIST.to_string())
}

fn strip_marker<'a>(marker: &Regex, text: &'a str) -> &'a str {
    let text = text.trim();
    match marker.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capitalize_words(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
