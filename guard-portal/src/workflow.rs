// guard-portal/src/workflow.rs
//
// One gate check, from vehicle lookup to grant or denial. The decision
// logic is a pure transition function over an explicit state enum; the
// driver around it owns the REST calls and the stale-response guard.
use std::sync::{Arc, Mutex};

use common::error::ApiError;
use common::models::gate::{ResidentVehicleDetails, VehicleCheckResult};

use crate::api::GateApi;

/// Visitor details collected by the operator, kept across PIN retries
#[derive(Debug, Clone, PartialEq)]
pub struct VisitorInfo {
    pub vehicle_number: String,
    pub phone_number: String,
    pub flat_number: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateCheckState {
    /// Waiting for a vehicle number
    Idle,
    /// Vehicle lookup in flight
    Checking { vehicle_number: String },
    /// Registered vehicle; terminal until the operator resets
    Approved { details: ResidentVehicleDetails },
    /// Unregistered vehicle; waiting for visitor phone + target flat
    AwaitingVisitorInfo {
        vehicle_number: String,
        error: Option<String>,
    },
    /// PIN generation in flight
    IssuingPin { visitor: VisitorInfo },
    /// The backend delivered a PIN to the resident; waiting for the
    /// visitor to hand it over. `error` carries the last failed attempt.
    PinIssued {
        visitor: VisitorInfo,
        notice: String,
        error: Option<String>,
    },
    /// PIN verification in flight
    Verifying { visitor: VisitorInfo, notice: String },
    /// Visitor admitted; terminal until the operator resets
    Granted { message: String },
    /// Unrecoverable error; the only way out is an explicit reset
    Failed { message: String },
}

#[derive(Debug, Clone)]
pub enum GateCheckEvent {
    VehicleSubmitted { vehicle_number: String },
    CheckResolved(VehicleCheckResult),
    VisitorInfoSubmitted {
        phone_number: String,
        flat_number: String,
    },
    PinDelivered { notice: String },
    PinRejected { message: String },
    PinSubmitted,
    VerifyResolved { message: String },
    VerifyRejected { message: String },
    CallFailed { message: String },
    Reset,
}

/// Pure transition function. Events that make no sense in the current
/// state leave it untouched; the driver logs them.
pub fn apply(state: &GateCheckState, event: GateCheckEvent) -> GateCheckState {
    use GateCheckEvent as Event;
    use GateCheckState as State;

    match (state, event) {
        (_, Event::Reset) => State::Idle,

        (State::Idle, Event::VehicleSubmitted { vehicle_number }) => {
            State::Checking { vehicle_number }
        }
        (State::Checking { .. }, Event::CheckResolved(VehicleCheckResult::Resident { details })) => {
            State::Approved { details }
        }
        (State::Checking { vehicle_number }, Event::CheckResolved(VehicleCheckResult::Visitor)) => {
            State::AwaitingVisitorInfo {
                vehicle_number: vehicle_number.clone(),
                error: None,
            }
        }

        (
            State::AwaitingVisitorInfo { vehicle_number, .. },
            Event::VisitorInfoSubmitted {
                phone_number,
                flat_number,
            },
        ) => State::IssuingPin {
            visitor: VisitorInfo {
                vehicle_number: vehicle_number.clone(),
                phone_number,
                flat_number,
            },
        },
        (State::IssuingPin { visitor }, Event::PinDelivered { notice }) => State::PinIssued {
            visitor: visitor.clone(),
            notice,
            error: None,
        },
        // A refused issuance (unknown flat, say) keeps the operator on the
        // visitor form with the reason; their input survives.
        (State::IssuingPin { visitor }, Event::PinRejected { message }) => {
            State::AwaitingVisitorInfo {
                vehicle_number: visitor.vehicle_number.clone(),
                error: Some(message),
            }
        }

        (State::PinIssued { visitor, notice, .. }, Event::PinSubmitted) => State::Verifying {
            visitor: visitor.clone(),
            notice: notice.clone(),
        },
        (State::Verifying { .. }, Event::VerifyResolved { message }) => State::Granted { message },
        // A wrong PIN returns to PIN entry with the failure message;
        // phone and flat are not re-entered.
        (State::Verifying { visitor, notice }, Event::VerifyRejected { message }) => {
            State::PinIssued {
                visitor: visitor.clone(),
                notice: notice.clone(),
                error: Some(message),
            }
        }

        (
            State::Checking { .. } | State::IssuingPin { .. } | State::Verifying { .. },
            Event::CallFailed { message },
        ) => State::Failed { message },

        (state, event) => {
            tracing::debug!("ignoring {:?} in state {:?}", event, state);
            state.clone()
        }
    }
}

struct Instance {
    state: GateCheckState,
    // Bumped on reset so a late REST response can tell it belongs to a
    // workflow instance that no longer exists.
    epoch: u64,
}

/// Async driver around the transition function. At most one REST call is
/// in flight per workflow; submissions while a call is pending are
/// ignored, and a response that lands after a reset is discarded.
#[derive(Clone)]
pub struct GateCheckWorkflow {
    api: GateApi,
    instance: Arc<Mutex<Instance>>,
}

impl GateCheckWorkflow {
    pub fn new(api: GateApi) -> Self {
        Self {
            api,
            instance: Arc::new(Mutex::new(Instance {
                state: GateCheckState::Idle,
                epoch: 0,
            })),
        }
    }

    pub fn state(&self) -> GateCheckState {
        self.instance.lock().expect("workflow poisoned").state.clone()
    }

    /// Discard all workflow-local state and return to `Idle`
    pub fn reset(&self) -> GateCheckState {
        let mut instance = self.instance.lock().expect("workflow poisoned");
        instance.epoch += 1;
        instance.state = apply(&instance.state, GateCheckEvent::Reset);
        instance.state.clone()
    }

    pub async fn submit_vehicle(&self, vehicle_number: &str) -> GateCheckState {
        let vehicle_number = vehicle_number.trim().to_uppercase();
        let epoch = match self.begin(
            GateCheckEvent::VehicleSubmitted {
                vehicle_number: vehicle_number.clone(),
            },
            |state| matches!(state, GateCheckState::Idle),
        ) {
            Some(epoch) => epoch,
            None => return self.state(),
        };

        let event = match self.api.check_vehicle(&vehicle_number).await {
            Ok(result) => GateCheckEvent::CheckResolved(result),
            Err(err) => GateCheckEvent::CallFailed {
                message: err.to_string(),
            },
        };
        self.finish(epoch, event)
    }

    pub async fn submit_visitor_info(
        &self,
        phone_number: &str,
        flat_number: &str,
    ) -> GateCheckState {
        let phone_number = phone_number.trim().to_string();
        let flat_number = flat_number.trim().to_uppercase();
        let epoch = match self.begin(
            GateCheckEvent::VisitorInfoSubmitted {
                phone_number: phone_number.clone(),
                flat_number: flat_number.clone(),
            },
            |state| matches!(state, GateCheckState::AwaitingVisitorInfo { .. }),
        ) {
            Some(epoch) => epoch,
            None => return self.state(),
        };

        let event = match self.api.generate_pin(&phone_number, &flat_number).await {
            Ok(notice) => GateCheckEvent::PinDelivered { notice },
            Err(ApiError::Rejected(message)) => GateCheckEvent::PinRejected { message },
            Err(err) => GateCheckEvent::CallFailed {
                message: err.to_string(),
            },
        };
        self.finish(epoch, event)
    }

    pub async fn submit_pin(&self, pin_code: &str) -> GateCheckState {
        let pin_code = pin_code.trim().to_string();
        let flat_number = {
            let instance = self.instance.lock().expect("workflow poisoned");
            match &instance.state {
                GateCheckState::PinIssued { visitor, .. } => visitor.flat_number.clone(),
                _ => return instance.state.clone(),
            }
        };
        let epoch = match self.begin(GateCheckEvent::PinSubmitted, |state| {
            matches!(state, GateCheckState::PinIssued { .. })
        }) {
            Some(epoch) => epoch,
            None => return self.state(),
        };

        let event = match self.api.verify_pin(&pin_code, &flat_number).await {
            Ok(message) => GateCheckEvent::VerifyResolved { message },
            Err(ApiError::Rejected(message)) => GateCheckEvent::VerifyRejected { message },
            Err(err) => GateCheckEvent::CallFailed {
                message: err.to_string(),
            },
        };
        self.finish(epoch, event)
    }

    fn begin(
        &self,
        event: GateCheckEvent,
        allowed: fn(&GateCheckState) -> bool,
    ) -> Option<u64> {
        let mut instance = self.instance.lock().expect("workflow poisoned");
        if !allowed(&instance.state) {
            tracing::warn!("ignoring {:?} in state {:?}", event, instance.state);
            return None;
        }
        instance.state = apply(&instance.state, event);
        Some(instance.epoch)
    }

    fn finish(&self, epoch: u64, event: GateCheckEvent) -> GateCheckState {
        let mut instance = self.instance.lock().expect("workflow poisoned");
        if instance.epoch != epoch {
            // The operator reset while the call was in flight; the late
            // outcome must not touch the new instance.
            tracing::info!("discarding stale gate-check response");
            return instance.state.clone();
        }
        instance.state = apply(&instance.state, event);
        instance.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> ResidentVehicleDetails {
        ResidentVehicleDetails {
            vehicle_number: "MH12AB1234".to_string(),
            name: "Asha Verma".to_string(),
            flat_number: "B2-101".to_string(),
        }
    }

    fn visitor() -> VisitorInfo {
        VisitorInfo {
            vehicle_number: "KA01ZZ0001".to_string(),
            phone_number: "9999999999".to_string(),
            flat_number: "B2-101".to_string(),
        }
    }

    #[test]
    fn vehicle_submission_starts_a_check() {
        let next = apply(
            &GateCheckState::Idle,
            GateCheckEvent::VehicleSubmitted {
                vehicle_number: "MH12AB1234".to_string(),
            },
        );
        assert_eq!(
            next,
            GateCheckState::Checking {
                vehicle_number: "MH12AB1234".to_string()
            }
        );
    }

    #[test]
    fn resident_result_approves() {
        let state = GateCheckState::Checking {
            vehicle_number: "MH12AB1234".to_string(),
        };
        let next = apply(
            &state,
            GateCheckEvent::CheckResolved(VehicleCheckResult::Resident { details: details() }),
        );
        assert_eq!(next, GateCheckState::Approved { details: details() });
    }

    #[test]
    fn visitor_result_asks_for_visitor_info() {
        let state = GateCheckState::Checking {
            vehicle_number: "KA01ZZ0001".to_string(),
        };
        let next = apply(
            &state,
            GateCheckEvent::CheckResolved(VehicleCheckResult::Visitor),
        );
        assert_eq!(
            next,
            GateCheckState::AwaitingVisitorInfo {
                vehicle_number: "KA01ZZ0001".to_string(),
                error: None,
            }
        );
    }

    #[test]
    fn visitor_info_flows_into_pin_issuance() {
        let state = GateCheckState::AwaitingVisitorInfo {
            vehicle_number: "KA01ZZ0001".to_string(),
            error: None,
        };
        let next = apply(
            &state,
            GateCheckEvent::VisitorInfoSubmitted {
                phone_number: "9999999999".to_string(),
                flat_number: "B2-101".to_string(),
            },
        );
        assert_eq!(next, GateCheckState::IssuingPin { visitor: visitor() });
    }

    #[test]
    fn pin_delivery_waits_for_the_pin() {
        let state = GateCheckState::IssuingPin { visitor: visitor() };
        let next = apply(
            &state,
            GateCheckEvent::PinDelivered {
                notice: "PIN sent.".to_string(),
            },
        );
        assert_eq!(
            next,
            GateCheckState::PinIssued {
                visitor: visitor(),
                notice: "PIN sent.".to_string(),
                error: None,
            }
        );
    }

    #[test]
    fn refused_issuance_returns_to_the_visitor_form_with_the_reason() {
        let state = GateCheckState::IssuingPin { visitor: visitor() };
        let next = apply(
            &state,
            GateCheckEvent::PinRejected {
                message: "This flat number does not exist.".to_string(),
            },
        );
        assert_eq!(
            next,
            GateCheckState::AwaitingVisitorInfo {
                vehicle_number: "KA01ZZ0001".to_string(),
                error: Some("This flat number does not exist.".to_string()),
            }
        );
    }

    #[test]
    fn correct_pin_grants_access() {
        let state = GateCheckState::Verifying {
            visitor: visitor(),
            notice: "PIN sent.".to_string(),
        };
        let next = apply(
            &state,
            GateCheckEvent::VerifyResolved {
                message: "ACCESS GRANTED".to_string(),
            },
        );
        assert_eq!(
            next,
            GateCheckState::Granted {
                message: "ACCESS GRANTED".to_string()
            }
        );
    }

    #[test]
    fn wrong_pin_returns_to_pin_entry_keeping_visitor_info() {
        let state = GateCheckState::Verifying {
            visitor: visitor(),
            notice: "PIN sent.".to_string(),
        };
        let next = apply(
            &state,
            GateCheckEvent::VerifyRejected {
                message: "Invalid or Expired PIN. Access DENIED.".to_string(),
            },
        );
        assert_eq!(
            next,
            GateCheckState::PinIssued {
                visitor: visitor(),
                notice: "PIN sent.".to_string(),
                error: Some("Invalid or Expired PIN. Access DENIED.".to_string()),
            }
        );
    }

    #[test]
    fn connectivity_failure_fails_the_check() {
        for state in [
            GateCheckState::Checking {
                vehicle_number: "X".to_string(),
            },
            GateCheckState::IssuingPin { visitor: visitor() },
            GateCheckState::Verifying {
                visitor: visitor(),
                notice: "PIN sent.".to_string(),
            },
        ] {
            let next = apply(
                &state,
                GateCheckEvent::CallFailed {
                    message: "down".to_string(),
                },
            );
            assert_eq!(
                next,
                GateCheckState::Failed {
                    message: "down".to_string()
                }
            );
        }
    }

    #[test]
    fn reset_returns_to_idle_from_anywhere() {
        for state in [
            GateCheckState::Approved { details: details() },
            GateCheckState::Granted {
                message: "ACCESS GRANTED".to_string(),
            },
            GateCheckState::Failed {
                message: "down".to_string(),
            },
            GateCheckState::PinIssued {
                visitor: visitor(),
                notice: "PIN sent.".to_string(),
                error: None,
            },
        ] {
            assert_eq!(apply(&state, GateCheckEvent::Reset), GateCheckState::Idle);
        }
    }

    #[test]
    fn mismatched_events_leave_the_state_alone() {
        let state = GateCheckState::Approved { details: details() };
        let next = apply(&state, GateCheckEvent::PinSubmitted);
        assert_eq!(next, state);

        let next = apply(
            &GateCheckState::Idle,
            GateCheckEvent::VerifyResolved {
                message: "ACCESS GRANTED".to_string(),
            },
        );
        assert_eq!(next, GateCheckState::Idle);
    }
}
