use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use relay_api::{format_iso8601, parse_iso8601, RelayError};

// ════════════════════════════════════════════════════════════════
//  Wire keys
// ════════════════════════════════════════════════════════════════

pub const TYPE_KEY: &str = "Type";
pub const HEARTBEAT_TYPE: &str = "Heartbeat";
pub const TIME_KEY: &str = "Time";
pub const TOPIC_KEY: &str = "Topic";
pub const CLIENT_ID_KEY: &str = "ClientId";

/// Расширение файлов, в которые consumer сохраняет последний heartbeat.
pub const HEARTBEAT_FILE_EXTENSION: &str = "heartbeat";

// ════════════════════════════════════════════════════════════════
//  HeartbeatRecord
// ════════════════════════════════════════════════════════════════

/// Heartbeat as it travels on the wire. Every field may be absent after
/// decoding; `is_valid()` tells whether the record may drive liveness.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeartbeatRecord {
    pub time: Option<DateTime<Utc>>,
    pub topic: Option<String>,
    pub client_id: Option<String>,
}

impl HeartbeatRecord {
    pub fn new(time: DateTime<Utc>, topic: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            time: Some(time),
            topic: Some(topic.into()),
            client_id: Some(client_id.into()),
        }
    }

    /// Validation problems, empty when the record is usable.
    pub fn errors(&self) -> Vec<&'static str> {
        let mut errors = Vec::new();

        if self.time.is_none() {
            errors.push("No Time in Heartbeat.");
        }

        match self.topic.as_deref() {
            None => errors.push("No Topic in Heartbeat."),
            Some("") => errors.push("Empty Topic in Heartbeat."),
            Some(_) => {}
        }

        match self.client_id.as_deref() {
            None => errors.push("No Client Id in Heartbeat."),
            Some("") => errors.push("Empty Client Id in Heartbeat."),
            Some(_) => {}
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }
}

// ════════════════════════════════════════════════════════════════
//  encode / decode
// ════════════════════════════════════════════════════════════════

/// Serialize to the wire format. Absent fields are omitted, never
/// emitted as `null`.
pub fn encode(record: &HeartbeatRecord) -> Vec<u8> {
    let mut obj = Map::new();
    obj.insert(TYPE_KEY.into(), Value::String(HEARTBEAT_TYPE.into()));
    if let Some(time) = record.time {
        obj.insert(TIME_KEY.into(), Value::String(format_iso8601(time)));
    }
    if let Some(topic) = &record.topic {
        obj.insert(TOPIC_KEY.into(), Value::String(topic.clone()));
    }
    if let Some(client_id) = &record.client_id {
        obj.insert(CLIENT_ID_KEY.into(), Value::String(client_id.clone()));
    }
    Value::Object(obj).to_string().into_bytes()
}

/// Classify an inbound payload. Returns `None` ("not a heartbeat") for
/// anything that is not a JSON object tagged `"Type": "Heartbeat"`.
///
/// Runs on every inbound message, so it never fails: ordinary
/// application payloads simply come back as `None`.
pub fn decode(payload: &[u8]) -> Option<HeartbeatRecord> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    let obj = value.as_object()?;

    match obj.get(TYPE_KEY).and_then(Value::as_str) {
        Some(HEARTBEAT_TYPE) => {}
        _ => return None,
    }

    Some(HeartbeatRecord {
        time: string_field(obj, TIME_KEY).and_then(|s| parse_iso8601(&s)),
        topic: string_field(obj, TOPIC_KEY),
        client_id: string_field(obj, CLIENT_ID_KEY),
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

// ════════════════════════════════════════════════════════════════
//  Heartbeat files
// ════════════════════════════════════════════════════════════════

/// `<dir>/<topic>_<clientId>.heartbeat`
pub fn heartbeat_file_path(dir: &Path, topic: &str, client_id: &str) -> PathBuf {
    dir.join(format!("{topic}_{client_id}.{HEARTBEAT_FILE_EXTENSION}"))
}

/// Persist the latest heartbeat for a topic/client pair, overwriting the
/// previous one. Invalid records are rejected and nothing is written.
pub fn write_heartbeat_file(dir: &Path, record: &HeartbeatRecord) -> Result<PathBuf, RelayError> {
    let (Some(topic), Some(client_id)) = (record.topic.as_deref(), record.client_id.as_deref()) else {
        return Err(RelayError::validation(record.errors().join(" ")));
    };
    if !record.is_valid() {
        return Err(RelayError::validation(record.errors().join(" ")));
    }

    let path = heartbeat_file_path(dir, topic, client_id);
    let mut f = std::fs::File::create(&path)
        .map_err(|e| RelayError::sink(format!("create {}: {e}", path.display())))?;
    f.write_all(&encode(record))
        .map_err(|e| RelayError::sink(format!("write {}: {e}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use relay_api::ErrorKind;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn encode_emits_tag_and_present_fields() {
        let bytes = encode(&HeartbeatRecord::new(t0(), "quakes", "c1"));
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["Type"], "Heartbeat");
        assert_eq!(v["Time"], "2024-03-01T12:00:00.000Z");
        assert_eq!(v["Topic"], "quakes");
        assert_eq!(v["ClientId"], "c1");
    }

    #[test]
    fn encode_omits_absent_fields() {
        let rec = HeartbeatRecord { topic: Some("quakes".into()), ..Default::default() };
        let v: Value = serde_json::from_slice(&encode(&rec)).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(!obj.contains_key("Time"));
        assert!(!obj.contains_key("ClientId"));
    }

    #[test]
    fn full_record_decodes_as_valid() {
        let payload = br#"{"Type":"Heartbeat","Time":"2024-03-01T12:00:00.000Z","Topic":"quakes","ClientId":"c1"}"#;
        let rec = decode(payload).unwrap();
        assert!(rec.is_valid());
        assert_eq!(rec, HeartbeatRecord::new(t0(), "quakes", "c1"));
    }

    #[test]
    fn partial_record_is_heartbeat_but_invalid() {
        let rec = decode(br#"{"Type":"Heartbeat","Topic":"quakes"}"#).unwrap();
        assert!(!rec.is_valid());
        assert_eq!(rec.errors(), vec!["No Time in Heartbeat.", "No Client Id in Heartbeat."]);
    }

    #[test]
    fn empty_strings_fail_validation() {
        let rec = HeartbeatRecord::new(t0(), "", "");
        assert_eq!(rec.errors(), vec!["Empty Topic in Heartbeat.", "Empty Client Id in Heartbeat."]);
    }

    #[test]
    fn unparseable_time_counts_as_absent() {
        let rec = decode(br#"{"Type":"Heartbeat","Time":"noon","Topic":"q","ClientId":"c"}"#).unwrap();
        assert_eq!(rec.time, None);
        assert!(!rec.is_valid());
    }

    #[test]
    fn non_heartbeats_decode_to_none() {
        assert_eq!(decode(b"not json at all"), None);
        assert_eq!(decode(&[0xff, 0xfe, 0x00]), None);
        assert_eq!(decode(b""), None);
        assert_eq!(decode(br#"["Heartbeat"]"#), None);
        assert_eq!(decode(br#"{"Type":"Event","Topic":"quakes"}"#), None);
        assert_eq!(decode(br#"{"Topic":"quakes","ClientId":"c1"}"#), None);
        assert_eq!(decode(br#"{"Type":7}"#), None);
    }

    #[test]
    fn decode_inverts_encode() {
        let rec = HeartbeatRecord::new(t0(), "quakes", "c1");
        assert_eq!(decode(&encode(&rec)), Some(rec));
    }

    #[test]
    fn heartbeat_file_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let first = HeartbeatRecord::new(t0(), "quakes", "c1");
        let second = HeartbeatRecord::new(t0() + chrono::Duration::seconds(30), "quakes", "c1");

        let path = write_heartbeat_file(dir.path(), &first).unwrap();
        assert_eq!(path, dir.path().join("quakes_c1.heartbeat"));
        write_heartbeat_file(dir.path(), &second).unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(decode(&on_disk), Some(second));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn invalid_heartbeat_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let rec = HeartbeatRecord { topic: Some("quakes".into()), ..Default::default() };
        let err = write_heartbeat_file(dir.path(), &rec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
