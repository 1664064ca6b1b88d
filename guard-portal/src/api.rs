// guard-portal/src/api.rs
use common::backend::{message_of, BackendClient};
use common::error::ApiError;
use common::models::gate::VehicleCheckResult;
use serde_json::json;

/// Typed wrappers over the gate endpoints. None of them require a
/// session; the kiosk terminal is unauthenticated by design.
#[derive(Clone)]
pub struct GateApi {
    backend: BackendClient,
}

impl GateApi {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    pub async fn check_vehicle(
        &self,
        vehicle_number: &str,
    ) -> Result<VehicleCheckResult, ApiError> {
        let value = self
            .backend
            .post(
                "/api/gate/check-vehicle",
                &json!({ "vehicle_number": vehicle_number }),
            )
            .await?;
        serde_json::from_value(value).map_err(|err| {
            tracing::error!("unexpected check-vehicle response shape: {}", err);
            ApiError::Rejected(format!("Unexpected response from the server: {}", err))
        })
    }

    /// Ask the backend to generate a PIN and deliver it to the resident.
    /// Returns the confirmation message for the operator.
    pub async fn generate_pin(
        &self,
        visitor_phone_number: &str,
        resident_flat_number: &str,
    ) -> Result<String, ApiError> {
        let value = self
            .backend
            .post(
                "/api/gate/generate-pin",
                &json!({
                    "visitor_phone_number": visitor_phone_number,
                    "resident_flat_number": resident_flat_number,
                }),
            )
            .await?;
        Ok(message_of(&value))
    }

    pub async fn verify_pin(
        &self,
        pin_code: &str,
        resident_flat_number: &str,
    ) -> Result<String, ApiError> {
        let value = self
            .backend
            .post(
                "/api/gate/verify-pin",
                &json!({
                    "pin_code": pin_code,
                    "resident_flat_number": resident_flat_number,
                }),
            )
            .await?;
        Ok(message_of(&value))
    }
}
