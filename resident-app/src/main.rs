// resident-app/src/main.rs
use std::sync::Arc;

use common::alerts::{AlertRelay, EMERGENCY_ALERT_TIMEOUT};
use common::error::ApiError;
use common::models::events::RESIDENT_SOS;
use common::models::resident::RegisterRequest;
use common::{setup_tracing, Config};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use resident_app::api::ResidentApi;
use resident_app::session::SessionController;
use resident_app::session_store::{FileTokenStore, MemoryTokenStore, SessionStore};

#[tokio::main]
async fn main() {
    setup_tracing();

    let config = Config::from_env();
    tracing::info!("Starting resident app against {}", config.api_base_url);

    let store: Arc<dyn SessionStore> = match FileTokenStore::new() {
        Some(store) => Arc::new(store),
        None => {
            tracing::warn!("no per-user data directory, session will not survive restarts");
            Arc::new(MemoryTokenStore::new())
        }
    };

    let controller = SessionController::new(&config, store);
    let api = ResidentApi::new(controller.backend());

    // Raised whenever a new_visitor_alert invalidates cached notifications
    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel();

    let mut alerts = if controller.restore_session().await {
        println!("Welcome back.");
        attach_alerts(&controller, refresh_tx.clone()).await
    } else {
        println!("Not signed in. Use: login <flat> <password>");
        None
    };

    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            refreshed = refresh_rx.recv() => {
                if refreshed.is_none() {
                    break;
                }
                println!("\nNew visitor at the gate — refreshing notifications...");
                show_notifications(&controller, &api, &mut alerts).await;
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
                match command {
                    "quit" => break,
                    "help" => print_help(),
                    "login" => match rest.split_once(' ') {
                        Some((flat, password)) => {
                            match controller.sign_in(flat, password).await {
                                Ok(_) => {
                                    println!("Signed in.");
                                    alerts = attach_alerts(&controller, refresh_tx.clone()).await;
                                }
                                Err(err) => println!("{}", err),
                            }
                        }
                        None => println!("Use: login <flat> <password>"),
                    },
                    "register" => match parse_register(rest) {
                        Some(request) => match api.register(&request).await {
                            Ok(message) => println!("{}", message),
                            Err(err) => println!("{}", err),
                        },
                        None => println!(
                            "Use: register <name>;<phone>;<flat>;<password>[;vehicle,vehicle]"
                        ),
                    },
                    "logout" => {
                        // Drop the relay first so its subscriptions release
                        // before the channel goes away.
                        alerts = None;
                        controller.sign_out().await;
                        println!("Signed out.");
                    }
                    "profile" => match api.profile().await {
                        Ok(profile) => {
                            println!("{} — flat {} — {}", profile.name, profile.flat_number, profile.phone_number);
                            if let Some(url) = profile.profile_image_url {
                                println!("picture: {}", url);
                            }
                        }
                        Err(err) => fail(&controller, err, &mut alerts).await,
                    },
                    "alerts" => show_notifications(&controller, &api, &mut alerts).await,
                    "read" => match api.mark_notifications_read().await {
                        Ok(()) => show_notifications(&controller, &api, &mut alerts).await,
                        Err(err) => fail(&controller, err, &mut alerts).await,
                    },
                    "history" => match api.history().await {
                        Ok(records) => {
                            for record in records {
                                println!(
                                    "{} — {} — {}",
                                    record.entry_time, record.visitor_phone_number, record.status
                                );
                            }
                        }
                        Err(err) => fail(&controller, err, &mut alerts).await,
                    },
                    "vehicles" => match api.vehicles().await {
                        Ok(records) => {
                            for record in records {
                                println!("#{} {}", record.id, record.vehicle_number);
                            }
                        }
                        Err(err) => fail(&controller, err, &mut alerts).await,
                    },
                    "addvehicle" => match api.add_vehicle(rest).await {
                        Ok(message) => println!("{}", message),
                        Err(err) => fail(&controller, err, &mut alerts).await,
                    },
                    "delvehicle" => match rest.trim().parse::<i64>() {
                        Ok(id) => match api.delete_vehicle(id).await {
                            Ok(message) => println!("{}", message),
                            Err(err) => fail(&controller, err, &mut alerts).await,
                        },
                        Err(_) => println!("Use: delvehicle <id>"),
                    },
                    "password" => match rest.split_once(' ') {
                        Some((old, new)) => match api.change_password(old, new).await {
                            Ok(message) => println!("{}", message),
                            Err(err) => fail(&controller, err, &mut alerts).await,
                        },
                        None => println!("Use: password <old> <new>"),
                    },
                    "pushtoken" => match api.update_push_token(rest.trim()).await {
                        Ok(()) => println!("Push token updated."),
                        Err(err) => fail(&controller, err, &mut alerts).await,
                    },
                    "picture" => match fs_err::read(rest.trim()) {
                        Ok(bytes) => {
                            let filename = rest.trim().rsplit('/').next().unwrap_or("picture.jpg");
                            match api.upload_profile_picture(filename, bytes).await {
                                Ok(url) => println!("Picture updated: {}", url),
                                Err(err) => fail(&controller, err, &mut alerts).await,
                            }
                        }
                        Err(err) => println!("Could not read {}: {}", rest.trim(), err),
                    },
                    "nopicture" => match api.remove_profile_picture().await {
                        Ok(message) => println!("{}", message),
                        Err(err) => fail(&controller, err, &mut alerts).await,
                    },
                    "sos" => send_sos(&controller, &api, &mut alerts).await,
                    other => println!("Unknown command '{}'. Type 'help'.", other),
                }
            }
        }
    }

    controller.sign_out().await;
}

/// Subscribe the notification surface to the freshly opened channel
async fn attach_alerts(
    controller: &SessionController,
    refresh: mpsc::UnboundedSender<()>,
) -> Option<AlertRelay> {
    let channel = controller.channel().await?;
    let mut relay = AlertRelay::new(EMERGENCY_ALERT_TIMEOUT);
    relay.watch_visitors(&channel, move || {
        let _ = refresh.send(());
    });
    Some(relay)
}

async fn show_notifications(
    controller: &SessionController,
    api: &ResidentApi,
    alerts: &mut Option<AlertRelay>,
) {
    match api.notifications().await {
        Ok(records) => {
            let unread: Vec<_> = records.iter().filter(|n| n.is_unread()).collect();
            if unread.is_empty() {
                println!("No new alerts.");
            }
            for record in unread {
                println!(
                    "Visitor {} — PIN {} — {}",
                    record.visitor_phone_number, record.pin_code, record.entry_time
                );
            }
        }
        Err(err) => fail(controller, err, alerts).await,
    }
}

async fn send_sos(
    controller: &SessionController,
    api: &ResidentApi,
    alerts: &mut Option<AlertRelay>,
) {
    // The SOS payload comes from the signed-in profile; without it there
    // is nothing meaningful to send.
    let profile = match api.profile().await {
        Ok(profile) => profile,
        Err(err) => {
            println!("Could not send SOS: profile unavailable.");
            fail(controller, err, alerts).await;
            return;
        }
    };
    match controller.channel().await {
        Some(channel) => {
            channel.emit(
                RESIDENT_SOS,
                json!({
                    "flat_number": profile.flat_number,
                    "phone_number": profile.phone_number,
                }),
            );
            println!("SOS sent! The guard has been alerted.");
        }
        None => println!("Could not send SOS: not connected."),
    }
}

/// Print the failure; an expired session additionally signs the user out
async fn fail(controller: &SessionController, err: ApiError, alerts: &mut Option<AlertRelay>) {
    if err.is_auth_expired() {
        *alerts = None;
        controller.handle_auth_expired().await;
    }
    println!("{}", err);
}

/// `name;phone;flat;password[;vehicle,vehicle]`
fn parse_register(rest: &str) -> Option<RegisterRequest> {
    let mut fields = rest.split(';').map(str::trim);
    let name = fields.next()?.to_string();
    let phone_number = fields.next()?.to_string();
    let flat_number = fields.next()?.to_uppercase();
    let password = fields.next()?.to_string();
    if name.is_empty() || phone_number.is_empty() || flat_number.is_empty() || password.is_empty() {
        return None;
    }
    let vehicles = fields
        .next()
        .map(|list| {
            list.split(',')
                .map(|v| v.trim().to_uppercase())
                .filter(|v| !v.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Some(RegisterRequest {
        name,
        phone_number,
        flat_number,
        password,
        vehicles,
    })
}

fn print_help() {
    println!("Commands:");
    println!("  login <flat> <password> | register <name>;<phone>;<flat>;<password>[;vehicles]");
    println!("  profile | alerts | read | history | sos");
    println!("  vehicles | addvehicle <number> | delvehicle <id>");
    println!("  password <old> <new> | pushtoken <token> | picture <path> | nopicture");
    println!("  logout | help | quit");
}
