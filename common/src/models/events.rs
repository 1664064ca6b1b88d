// common/src/models/events.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server→client: a resident pressed the SOS button
pub const SOS_ALERT: &str = "sos_alert";
/// Server→client: a PIN was issued for a visitor; cached notification
/// data is stale and should be refetched
pub const NEW_VISITOR_ALERT: &str = "new_visitor_alert";
/// Client→server: raise an emergency from the resident app
pub const RESIDENT_SOS: &str = "resident_sos";

/// One realtime frame: a named event plus its JSON payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    pub data: Value,
}

/// Payload of `sos_alert`. The backend fills missing fields with
/// "Unknown", so the client tolerates them the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosAlert {
    #[serde(default = "unknown")]
    pub flat_number: String,
    #[serde(default = "unknown")]
    pub phone_number: String,
}

fn unknown() -> String {
    "Unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sos_alert_defaults_missing_fields() {
        let alert: SosAlert = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(alert.flat_number, "Unknown");
        assert_eq!(alert.phone_number, "Unknown");
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = EventEnvelope {
            event: SOS_ALERT.to_string(),
            data: serde_json::json!({ "flat_number": "B2-101", "phone_number": "9999999999" }),
        };
        let text = serde_json::to_string(&envelope).unwrap();
        let parsed: EventEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.event, SOS_ALERT);
        assert_eq!(parsed.data["flat_number"], "B2-101");
    }
}
