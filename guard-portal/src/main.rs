// guard-portal/src/main.rs
use common::alerts::{AlertRelay, EMERGENCY_ALERT_TIMEOUT};
use common::backend::BackendClient;
use common::models::session::CredentialSlot;
use common::realtime::RealtimeChannel;
use common::{setup_tracing, Config};
use tokio::io::{AsyncBufReadExt, BufReader};

use guard_portal::api::GateApi;
use guard_portal::workflow::{GateCheckState, GateCheckWorkflow};

#[tokio::main]
async fn main() {
    setup_tracing();

    let config = Config::from_env();
    tracing::info!("Starting guard portal against {}", config.api_base_url);

    // The kiosk terminal is shared hardware: it never holds a resident
    // session, and the gate endpoints do not require one.
    let backend = BackendClient::new(&config, CredentialSlot::new());
    let channel = RealtimeChannel::open(&config.realtime_url);

    let mut alerts = AlertRelay::new(EMERGENCY_ALERT_TIMEOUT);
    alerts.watch_emergencies(&channel, |alert| match alert {
        Some(alert) => println!(
            "\n!!! EMERGENCY SOS from flat {} (phone {}) — type 'dismiss' to clear\n",
            alert.flat_number, alert.phone_number
        ),
        None => println!("\n(emergency alert cleared)\n"),
    });

    let workflow = GateCheckWorkflow::new(GateApi::new(backend));
    println!("ApnaGate guard portal. Commands: reset, dismiss, quit.");
    print_prompt(&workflow.state());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            print_prompt(&workflow.state());
            continue;
        }

        let next = match (workflow.state(), line.as_str()) {
            (_, "quit") => break,
            (_, "dismiss") => {
                alerts.dismiss();
                workflow.state()
            }
            (_, "reset") => workflow.reset(),
            (GateCheckState::Idle, vehicle) => workflow.submit_vehicle(vehicle).await,
            (GateCheckState::AwaitingVisitorInfo { .. }, entry) => match entry.split_once(' ') {
                Some((phone, flat)) => workflow.submit_visitor_info(phone, flat).await,
                None => {
                    println!("Enter: <visitor phone> <resident flat>");
                    workflow.state()
                }
            },
            (GateCheckState::PinIssued { .. }, pin) => workflow.submit_pin(pin).await,
            (state, _) => {
                println!("Type 'reset' for the next vehicle.");
                state
            }
        };
        print_prompt(&next);
    }

    channel.close().await;
}

fn print_prompt(state: &GateCheckState) {
    match state {
        GateCheckState::Idle => println!("Enter vehicle number:"),
        GateCheckState::Checking { vehicle_number } => {
            println!("Checking {}...", vehicle_number)
        }
        GateCheckState::Approved { details } => println!(
            "ACCESS APPROVED — {} (flat {}). Type 'reset' for the next vehicle.",
            details.name, details.flat_number
        ),
        GateCheckState::AwaitingVisitorInfo {
            vehicle_number,
            error,
        } => {
            if let Some(error) = error {
                println!("{}", error);
            }
            println!(
                "{} is not registered. Enter: <visitor phone> <resident flat>",
                vehicle_number
            );
        }
        GateCheckState::IssuingPin { .. } => println!("Issuing PIN..."),
        GateCheckState::PinIssued { notice, error, .. } => {
            if let Some(error) = error {
                println!("{}", error);
            }
            println!("{} Enter the visitor's PIN:", notice);
        }
        GateCheckState::Verifying { .. } => println!("Verifying PIN..."),
        GateCheckState::Granted { message } => {
            println!("{} — type 'reset' for the next vehicle.", message)
        }
        GateCheckState::Failed { message } => {
            println!("Error: {} — type 'reset' to start over.", message)
        }
    }
}
