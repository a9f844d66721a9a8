use chrono::{NaiveDate, NaiveTime};

fn date_part(raw: &str) -> &str {
    raw.split('T').next().unwrap_or("").trim()
}

/// Date of birth as the upstream expects it: the calendar date at midnight.
pub fn midnight_timestamp(birth_date: &str) -> String {
    format!("{}T00:00:00", date_part(birth_date))
}

/// Joins the date portion of `appointment_date` with a military `HHMM` begin time,
/// e.g. `("2024-05-01T00:00:00", "0930")` becomes `2024-05-01T09:30:00`.
pub fn splice_appointment_datetime(appointment_date: &str, begin_time: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(date_part(appointment_date), "%Y-%m-%d").ok()?;
    let digits = begin_time.trim();
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{:0>4}", digits);
    let time = NaiveTime::parse_from_str(&padded, "%H%M").ok()?;
    Some(date.and_time(time).format("%Y-%m-%dT%H:%M:%S").to_string())
}
