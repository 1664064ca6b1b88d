// resident-app/src/api.rs
use common::backend::{message_of, BackendClient};
use common::error::ApiError;
use common::models::resident::{
    HistoryRecord, NotificationRecord, Profile, RegisterRequest, VehicleRecord,
};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

/// Typed wrappers over the resident endpoints. Everything except
/// `register` rides on the session's bearer credential; an `AuthExpired`
/// from any of these means the session layer must sign out.
#[derive(Clone)]
pub struct ResidentApi {
    backend: BackendClient,
}

impl ResidentApi {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<String, ApiError> {
        let body = serde_json::to_value(request)
            .map_err(|err| ApiError::Rejected(err.to_string()))?;
        let value = self.backend.post("/api/resident/register", &body).await?;
        Ok(message_of(&value))
    }

    pub async fn profile(&self) -> Result<Profile, ApiError> {
        let value = self.backend.get("/api/resident/me").await?;
        decode(value, "profile")
    }

    pub async fn notifications(&self) -> Result<Vec<NotificationRecord>, ApiError> {
        let value = self.backend.get("/api/resident/notifications").await?;
        decode(value, "notifications")
    }

    /// Idempotent on the backend; the caller refetches afterwards
    pub async fn mark_notifications_read(&self) -> Result<(), ApiError> {
        self.backend
            .post("/api/resident/notifications/mark-as-read", &json!({}))
            .await?;
        Ok(())
    }

    pub async fn history(&self) -> Result<Vec<HistoryRecord>, ApiError> {
        let value = self.backend.get("/api/resident/history").await?;
        decode(value, "history")
    }

    pub async fn vehicles(&self) -> Result<Vec<VehicleRecord>, ApiError> {
        let value = self.backend.get("/api/resident/vehicles").await?;
        decode(value, "vehicles")
    }

    pub async fn add_vehicle(&self, vehicle_number: &str) -> Result<String, ApiError> {
        let vehicle_number = vehicle_number.trim().to_uppercase();
        let value = self
            .backend
            .post(
                "/api/resident/vehicles/add",
                &json!({ "vehicle_number": vehicle_number }),
            )
            .await?;
        Ok(message_of(&value))
    }

    pub async fn delete_vehicle(&self, vehicle_id: i64) -> Result<String, ApiError> {
        let value = self
            .backend
            .post(
                "/api/resident/vehicles/delete",
                &json!({ "vehicle_id": vehicle_id }),
            )
            .await?;
        Ok(message_of(&value))
    }

    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<String, ApiError> {
        let value = self
            .backend
            .post(
                "/api/resident/change-password",
                &json!({ "old_password": old_password, "new_password": new_password }),
            )
            .await?;
        Ok(message_of(&value))
    }

    /// Hand the backend an opaque push token. Obtaining one is the push
    /// platform's business, not this client's.
    pub async fn update_push_token(&self, push_token: &str) -> Result<(), ApiError> {
        self.backend
            .post(
                "/api/resident/update-fcm-token",
                &json!({ "fcm_token": push_token }),
            )
            .await?;
        Ok(())
    }

    /// Upload a profile picture; returns the served image URL
    pub async fn upload_profile_picture(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ApiError> {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("profile_pic", part);
        let value = self
            .backend
            .post_multipart("/api/resident/picture", form)
            .await?;
        Ok(value
            .get("image_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    pub async fn remove_profile_picture(&self) -> Result<String, ApiError> {
        let value = self.backend.delete("/api/resident/picture").await?;
        Ok(message_of(&value))
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|err| {
        tracing::error!("unexpected {} response shape: {}", what, err);
        ApiError::Rejected(format!("Unexpected response from the server: {}", err))
    })
}
