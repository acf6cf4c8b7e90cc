use super::{ContentItem, ContentSource, FetchError, FetchRequest, Payload};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SCHEDULE_UNAVAILABLE: &str = "Could Not Fetch Schedule Right Now!";
const FULL_WEEK_FOOTER: &str = "\n**Full Week:** <https://AnimeSchedule.net>";

/// Sunday-first, matching the `/schedule day` numbering.
const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

pub fn weekday_name(day: u32) -> &'static str {
    WEEKDAY_NAMES[(day % 7) as usize]
}

/// Day index (Sunday = 0) of a timestamp.
pub fn sunday_based_weekday(at: DateTime<Utc>) -> u32 {
    at.weekday().num_days_from_sunday()
}

/// Parse a day given as a number (0..6, Sunday = 0), a full name or a
/// three-letter abbreviation.
pub fn parse_day(input: &str) -> Option<u32> {
    let trimmed = input.trim().to_lowercase();
    if let Ok(n) = trimmed.parse::<u32>() {
        return (n < 7).then_some(n);
    }
    if trimmed.len() < 3 {
        return None;
    }
    WEEKDAY_NAMES
        .iter()
        .position(|name| name.to_lowercase().starts_with(&trimmed))
        .map(|i| i as u32)
}

/// Field lookup tolerant of naming drift: exact aliases first, then a
/// case-insensitive match. Nulls count as absent.
fn field<'a>(entry: &'a Value, names: &[&str]) -> Option<&'a Value> {
    let map = entry.as_object()?;
    for name in names {
        if let Some(value) = map.get(*name).filter(|v| !v.is_null()) {
            return Some(value);
        }
    }
    for name in names {
        let wanted = name.to_lowercase();
        if let Some((_, value)) = map
            .iter()
            .find(|(key, value)| key.to_lowercase() == wanted && !value.is_null())
        {
            return Some(value);
        }
    }
    None
}

fn field_str(entry: &Value, names: &[&str]) -> Option<String> {
    match field(entry, names)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_i64(entry: &Value, names: &[&str]) -> Option<i64> {
    match field(entry, names)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// ISO-8601 timestamps with or without offset; naive values are UTC.
pub fn parse_iso_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

const EPISODE_DATE: [&str; 3] = ["episode_date", "episodeDate", "EpisodeDate"];

fn episode_date(entry: &Value) -> Option<DateTime<Utc>> {
    field_str(entry, &EPISODE_DATE).and_then(|raw| parse_iso_datetime(&raw))
}

fn air_rank(entry: &Value) -> u8 {
    match field_str(entry, &["air_type", "airType"])
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "sub" => 3,
        "dub" => 2,
        "raw" => 1,
        _ => 0,
    }
}

fn is_chinese_ona(entry: &Value) -> bool {
    let Some(Value::Array(media_types)) = field(entry, &["mediaTypes", "media_types"]) else {
        return false;
    };
    media_types.iter().filter(|m| m.is_object()).any(|m| {
        let route = field_str(m, &["route", "Route"]).unwrap_or_default().to_lowercase();
        let name = field_str(m, &["name", "Name"]).unwrap_or_default().to_lowercase();
        route == "ona-chinese" || name == "ona (chinese)"
    })
}

fn episode_label(entry: &Value) -> String {
    let number = field_i64(entry, &["episode_number", "episodeNumber"]);
    let total = field_i64(entry, &["episodes", "Episodes"]);
    match (number, total) {
        (Some(n), Some(t)) if n == t => format!("Ep {}F", n),
        (Some(n), _) => format!("Ep {}", n),
        (None, _) => "Ep ?".to_string(),
    }
}

/// Unwrap the timetable list from either a bare list or a wrapping object.
pub fn extract_timetable(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Array(entries) => Some(entries),
        Value::Object(mut map) => ["timetables", "data", "results"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(entries)) => Some(entries),
                _ => None,
            }),
        _ => None,
    }
}

/// Render one day's airing list.
///
/// Per (route, day) the best release wins: sub over dub over raw, then the
/// later episode date. The first show that has not aired yet at `now` is
/// marked as next.
pub fn build_day_schedule(entries: &[Value], weekday: u32, now: DateTime<Utc>) -> String {
    struct Candidate<'a> {
        entry: &'a Value,
        aired_at: DateTime<Utc>,
        rank: u8,
    }

    let mut best: HashMap<(String, u32), Candidate<'_>> = HashMap::new();
    for entry in entries {
        let Some(route) = field_str(entry, &["route", "Route"]).filter(|r| !r.is_empty()) else {
            continue;
        };
        if is_chinese_ona(entry) {
            continue;
        }
        let Some(aired_at) = episode_date(entry) else {
            continue;
        };
        let candidate = Candidate {
            entry,
            aired_at,
            rank: air_rank(entry),
        };
        let key = (route, sunday_based_weekday(aired_at));
        let replace = match best.get(&key) {
            Some(current) => {
                candidate.rank > current.rank
                    || (candidate.rank == current.rank && candidate.aired_at > current.aired_at)
            }
            None => true,
        };
        if replace {
            best.insert(key, candidate);
        }
    }

    let mut shows: Vec<(String, String, DateTime<Utc>)> = best
        .into_iter()
        .filter(|((_, day), _)| *day == weekday)
        .map(|(_, c)| {
            let title = field_str(c.entry, &["title", "Title", "name"])
                .unwrap_or_else(|| "Unknown".to_string());
            (title, episode_label(c.entry), c.aired_at)
        })
        .collect();
    shows.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase())));

    let mut lines = vec![format!("**__{} Schedule :__**\n", weekday_name(weekday))];
    if shows.is_empty() {
        lines.push("_No Shows Found For The Day!_".to_string());
    } else {
        let next = shows.iter().position(|(_, _, at)| *at >= now);
        for (i, (title, episode, at)) in shows.iter().enumerate() {
            let prefix = if Some(i) == next { "➡️ " } else { "" };
            lines.push(format!("{}{} - {} - <t:{}:t>", prefix, title, episode, at.timestamp()));
        }
    }
    lines.push(FULL_WEEK_FOOTER.to_string());
    lines.join("\n")
}

/// Episode timetable provider with an on-disk snapshot fallback.
pub struct ScheduleSource {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    snapshot_path: PathBuf,
}

impl ScheduleSource {
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
        snapshot_path: PathBuf,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
            timeout,
            snapshot_path,
        }
    }

    async fn fetch_remote(&self) -> Result<Vec<Value>, FetchError> {
        let mut request = self
            .client
            .get(&self.endpoint)
            .header(USER_AGENT, "AstrumOtaku")
            .timeout(self.timeout);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("X-API-Key", key);
        }

        let resp = request.send().await?;
        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Payload(e.to_string()))?;
        extract_timetable(body).ok_or_else(|| FetchError::Payload("no timetable list".to_string()))
    }

    async fn load_snapshot(&self) -> Option<Vec<Value>> {
        let raw = tokio::fs::read_to_string(&self.snapshot_path).await.ok()?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(entries)) => Some(entries),
            Ok(_) => {
                warn!("Schedule snapshot {} is not a list", self.snapshot_path.display());
                None
            }
            Err(e) => {
                warn!("Schedule snapshot {} unreadable: {}", self.snapshot_path.display(), e);
                None
            }
        }
    }

    /// Remote timetable, else the local snapshot.
    pub async fn timetable(&self) -> Option<Vec<Value>> {
        match self.fetch_remote().await {
            Ok(entries) => {
                debug!("Fetched {} timetable entries", entries.len());
                Some(entries)
            }
            Err(e) => {
                warn!("Failed to fetch timetables: {}", e);
                let snapshot = self.load_snapshot().await;
                if snapshot.is_some() {
                    info!("Using local schedule snapshot {}", self.snapshot_path.display());
                }
                snapshot
            }
        }
    }

    pub async fn day_message(&self, weekday: u32, now: DateTime<Utc>) -> String {
        match self.timetable().await {
            Some(entries) if !entries.is_empty() => build_day_schedule(&entries, weekday, now),
            _ => SCHEDULE_UNAVAILABLE.to_string(),
        }
    }
}

#[async_trait]
impl ContentSource for ScheduleSource {
    fn name(&self) -> &'static str {
        "schedule"
    }

    async fn fetch(&self, _request: FetchRequest<'_>) -> Vec<ContentItem> {
        let now = Utc::now();
        let text = self.day_message(sunday_based_weekday(now), now).await;
        let item = if text == SCHEDULE_UNAVAILABLE {
            ContentItem::fallback(Payload::Schedule(text))
        } else {
            ContentItem::new(Payload::Schedule(text))
        };
        vec![item]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    // 2024-01-01 is a Monday.
    fn monday(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    fn entry(route: &str, title: &str, date: &str, air_type: &str, ep: i64) -> Value {
        json!({
            "route": route,
            "title": title,
            "episodeDate": date,
            "airType": air_type,
            "episodeNumber": ep,
            "episodes": 12
        })
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day("0"), Some(0));
        assert_eq!(parse_day("6"), Some(6));
        assert_eq!(parse_day("7"), None);
        assert_eq!(parse_day("Monday"), Some(1));
        assert_eq!(parse_day("sat"), Some(6));
        assert_eq!(parse_day("th"), None);
        assert_eq!(parse_day("someday"), None);
    }

    #[test]
    fn test_parse_iso_datetime_variants() {
        let expected = monday(15, 30);
        assert_eq!(parse_iso_datetime("2024-01-01T15:30:00Z"), Some(expected));
        assert_eq!(parse_iso_datetime("2024-01-01T17:30:00+02:00"), Some(expected));
        assert_eq!(parse_iso_datetime("2024-01-01T15:30:00"), Some(expected));
        assert_eq!(parse_iso_datetime("2024-01-01 15:30:00"), Some(expected));
        assert_eq!(parse_iso_datetime(""), None);
        assert_eq!(parse_iso_datetime("yesterday"), None);
    }

    #[test]
    fn test_best_release_per_route_and_next_marker() {
        let entries = vec![
            entry("frieren", "Frieren", "2024-01-01T14:00:00Z", "raw", 5),
            entry("frieren", "Frieren", "2024-01-01T16:00:00Z", "sub", 5),
            entry("frieren", "Frieren (Dub)", "2024-01-01T18:00:00Z", "dub", 3),
            entry("apothecary", "Apothecary Diaries", "2024-01-01T10:00:00Z", "sub", 12),
            entry("tuesday-show", "Tuesday Show", "2024-01-02T10:00:00Z", "sub", 1),
            json!({"route": "", "title": "No Route", "episodeDate": "2024-01-01T09:00:00Z"}),
            json!({
                "route": "donghua",
                "title": "Donghua",
                "episodeDate": "2024-01-01T12:00:00Z",
                "mediaTypes": [{"name": "ONA (Chinese)", "route": "ona-chinese"}]
            }),
        ];

        let message = build_day_schedule(&entries, 1, monday(12, 0));
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines[0], "**__Monday Schedule :__**");
        assert_eq!(lines[1], "");
        assert_eq!(
            lines[2],
            format!("Apothecary Diaries - Ep 12F - <t:{}:t>", monday(10, 0).timestamp())
        );
        assert_eq!(
            lines[3],
            format!("➡️ Frieren - Ep 5 - <t:{}:t>", monday(16, 0).timestamp())
        );
        assert_eq!(lines.len(), 6);
        assert!(message.ends_with("**Full Week:** <https://AnimeSchedule.net>"));
        assert!(!message.contains("Donghua"));
        assert!(!message.contains("Tuesday Show"));
    }

    #[test]
    fn test_first_show_can_be_next() {
        let entries = vec![entry("a", "Alpha", "2024-01-01T20:00:00Z", "sub", 1)];
        let message = build_day_schedule(&entries, 1, monday(8, 0));
        assert!(message.contains("➡️ Alpha"));
    }

    #[test]
    fn test_empty_day() {
        let message = build_day_schedule(&[], 3, monday(8, 0));
        assert!(message.starts_with("**__Wednesday Schedule :__**"));
        assert!(message.contains("_No Shows Found For The Day!_"));
    }

    #[test]
    fn test_alias_and_case_insensitive_fields() {
        let entries = vec![json!({
            "Route": "x",
            "TITLE": "Shouty",
            "EPISODE_DATE": "2024-01-01T09:00:00Z",
            "episode_number": "3"
        })];
        let message = build_day_schedule(&entries, 1, monday(10, 0));
        assert!(message.contains("Shouty - Ep 3 - "));
    }

    #[test]
    fn test_extract_timetable_shapes() {
        assert_eq!(extract_timetable(json!([1, 2])).map(|v| v.len()), Some(2));
        assert_eq!(extract_timetable(json!({"data": [1]})).map(|v| v.len()), Some(1));
        assert_eq!(extract_timetable(json!({"other": [1]})), None);
        assert_eq!(extract_timetable(json!("nope")), None);
    }

    #[tokio::test]
    async fn test_remote_failure_uses_snapshot_then_apology() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/timetables");
                then.status(500);
            })
            .await;
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("schedule.json");

        let source = ScheduleSource::new(
            reqwest::Client::new(),
            &server.url("/timetables"),
            None,
            Duration::from_secs(5),
            snapshot.clone(),
        );
        assert_eq!(source.day_message(1, monday(8, 0)).await, SCHEDULE_UNAVAILABLE);

        let entries = json!([entry("a", "Snapshot Show", "2024-01-01T20:00:00Z", "sub", 2)]);
        std::fs::write(&snapshot, entries.to_string()).unwrap();
        let message = source.day_message(1, monday(8, 0)).await;
        assert!(message.contains("Snapshot Show"));
    }

    #[tokio::test]
    async fn test_api_key_headers_are_sent() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/timetables")
                    .header("authorization", "Bearer secret")
                    .header("x-api-key", "secret")
                    .header("user-agent", "AstrumOtaku");
                then.status(200).json_body(json!({"timetables": []}));
            })
            .await;

        let source = ScheduleSource::new(
            reqwest::Client::new(),
            &server.url("/timetables"),
            Some("secret".to_string()),
            Duration::from_secs(5),
            PathBuf::from("missing-snapshot.json"),
        );
        assert_eq!(source.timetable().await, Some(Vec::new()));
        mock.assert_async().await;
    }
}
