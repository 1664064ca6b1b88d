// common/src/models/resident.rs
use serde::{Deserialize, Serialize};

/// Successful login payload
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub name: String,
}

/// New-resident registration payload
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub phone_number: String,
    pub flat_number: String,
    pub password: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vehicles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: String,
    pub flat_number: String,
    pub phone_number: String,
    pub profile_image_url: Option<String>,
}

/// One pending visitor-log entry, shown in the notification bell.
/// Owned by the backend; the client only caches a read-only copy.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub visitor_phone_number: String,
    pub pin_code: u32,
    /// Server-formatted timestamp, displayed as received
    pub entry_time: String,
    /// 0/1 flag as stored by the backend
    pub is_read: i64,
}

impl NotificationRecord {
    pub fn is_unread(&self) -> bool {
        self.is_read == 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRecord {
    pub visitor_phone_number: String,
    pub status: String,
    pub entry_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleRecord {
    pub id: i64,
    pub vehicle_number: String,
}
