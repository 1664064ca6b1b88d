// common/src/models/gate.rs
use serde::Deserialize;

/// Answer to a vehicle lookup at the gate. The backend tags the response
/// with `status`: a registered vehicle comes back with the owner details,
/// anything else is a visitor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status")]
pub enum VehicleCheckResult {
    Resident { details: ResidentVehicleDetails },
    Visitor,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResidentVehicleDetails {
    pub vehicle_number: String,
    pub name: String,
    pub flat_number: String,
}
