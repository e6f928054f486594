use chrono::{DateTime, Datelike, SecondsFormat, Utc};

/// Текущее UTC-время.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Дата `YYYY-MM-DD` для момента времени (UTC).
pub fn date_string(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d").to_string()
}

/// Календарный день UTC как `(year, day_of_year)`. Кортеж упорядочен,
/// поэтому переход через новый год тоже считается "следующим днём".
pub fn utc_day(t: DateTime<Utc>) -> (i32, u32) {
    (t.year(), t.ordinal())
}

/// ISO-8601 с миллисекундами и суффиксом `Z`: `2024-03-01T12:00:00.000Z`.
pub fn format_iso8601(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Разобрать ISO-8601 / RFC 3339 строку. `None` если формат не распознан.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}
