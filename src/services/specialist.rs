/// General practitioner, used whenever nothing more specific matches.
pub const DEFAULT_SPECIALIST: &str = "терапевт";

/// Ordered keyword table; the first row with a matching keyword wins.
/// Keywords are lowercase stems matched as substrings.
const ROUTES: &[(&[&str], &str)] = &[
    (
        &["горло", "ангин", "насморк", "throat"],
        "терапевт (ЛОР)",
    ),
    (
        &["живот", "желуд", "тошнот", "stomach", "abdominal"],
        "гастроэнтеролог",
    ),
    (
        &["сердц", "сердеч", "давлен", "heart", "blood pressure"],
        "кардиолог",
    ),
];

pub fn route(symptoms: &str) -> &'static str {
    let symptoms = symptoms.to_lowercase();
    ROUTES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| symptoms.contains(*k)))
        .map(|(_, specialist)| *specialist)
        .unwrap_or(DEFAULT_SPECIALIST)
}
