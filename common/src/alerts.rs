// common/src/alerts.rs
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::events::{SosAlert, NEW_VISITOR_ALERT, SOS_ALERT};
use crate::realtime::{RealtimeChannel, Subscription};

/// How long an emergency alert stays on screen when nobody dismisses it
pub const EMERGENCY_ALERT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyAlert {
    pub flat_number: String,
    pub phone_number: String,
    pub received_at: DateTime<Utc>,
}

type ChangeFn = Arc<dyn Fn(Option<EmergencyAlert>) + Send + Sync>;

struct AlertState {
    active: Option<EmergencyAlert>,
    // Bumped on every raise/dismiss so a stale auto-dismiss timer can
    // tell it has been superseded.
    generation: u64,
}

struct Inner {
    state: Mutex<AlertState>,
    timeout: Duration,
    on_change: Mutex<Option<ChangeFn>>,
}

/// Routes the two pushed alert events to their UI surfaces.
///
/// Emergency alerts: newest wins, no queueing; cleared automatically
/// after `timeout` unless dismissed or superseded first. New-visitor
/// alerts carry no trusted state and only invalidate cached data.
pub struct AlertRelay {
    inner: Arc<Inner>,
    subscriptions: Vec<Subscription>,
}

impl AlertRelay {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(AlertState {
                    active: None,
                    generation: 0,
                }),
                timeout,
                on_change: Mutex::new(None),
            }),
            subscriptions: Vec::new(),
        }
    }

    /// Route `sos_alert` events into the emergency display. `on_change`
    /// fires with the alert on raise/supersede and with `None` on
    /// dismissal or timeout.
    pub fn watch_emergencies<F>(&mut self, channel: &RealtimeChannel, on_change: F)
    where
        F: Fn(Option<EmergencyAlert>) + Send + Sync + 'static,
    {
        *self.inner.on_change.lock().expect("alert state poisoned") = Some(Arc::new(on_change));

        let inner = Arc::clone(&self.inner);
        let subscription = channel.on(SOS_ALERT, move |data| {
            match serde_json::from_value::<SosAlert>(data) {
                Ok(alert) => Inner::raise(
                    &inner,
                    EmergencyAlert {
                        flat_number: alert.flat_number,
                        phone_number: alert.phone_number,
                        received_at: Utc::now(),
                    },
                ),
                Err(err) => tracing::warn!("malformed sos_alert payload: {}", err),
            }
        });
        self.subscriptions.push(subscription);
    }

    /// Route `new_visitor_alert` events to a refetch trigger. The payload
    /// is deliberately ignored: the event is an invalidation signal, not
    /// a data update.
    pub fn watch_visitors<F>(&mut self, channel: &RealtimeChannel, on_new_visitor: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let subscription = channel.on(NEW_VISITOR_ALERT, move |_data| on_new_visitor());
        self.subscriptions.push(subscription);
    }

    pub fn current_alert(&self) -> Option<EmergencyAlert> {
        self.inner
            .state
            .lock()
            .expect("alert state poisoned")
            .active
            .clone()
    }

    /// Operator dismissed the alert; cancels the pending auto-dismiss
    pub fn dismiss(&self) {
        Inner::clear(&self.inner);
    }

    #[cfg(test)]
    fn raise(&self, alert: EmergencyAlert) {
        Inner::raise(&self.inner, alert);
    }
}

impl Inner {
    fn raise(inner: &Arc<Inner>, alert: EmergencyAlert) {
        let generation = {
            let mut state = inner.state.lock().expect("alert state poisoned");
            state.generation += 1;
            state.active = Some(alert.clone());
            state.generation
        };
        Self::notify(inner, Some(alert));

        // Auto-dismiss exactly `timeout` after this raise. A newer alert
        // or a manual dismissal bumps the generation and the timer no-ops.
        let timer = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(timer.timeout).await;
            let expired = {
                let mut state = timer.state.lock().expect("alert state poisoned");
                if state.generation == generation && state.active.is_some() {
                    state.active = None;
                    true
                } else {
                    false
                }
            };
            if expired {
                Self::notify(&timer, None);
            }
        });
    }

    fn clear(inner: &Arc<Inner>) {
        let had_alert = {
            let mut state = inner.state.lock().expect("alert state poisoned");
            state.generation += 1;
            state.active.take().is_some()
        };
        if had_alert {
            Self::notify(inner, None);
        }
    }

    fn notify(inner: &Arc<Inner>, alert: Option<EmergencyAlert>) {
        let callback = inner
            .on_change
            .lock()
            .expect("alert state poisoned")
            .clone();
        if let Some(callback) = callback {
            callback(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(flat: &str) -> EmergencyAlert {
        EmergencyAlert {
            flat_number: flat.to_string(),
            phone_number: "9999999999".to_string(),
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn alert_clears_after_timeout() {
        let relay = AlertRelay::new(Duration::from_millis(200));
        relay.raise(alert("A1-001"));
        assert_eq!(relay.current_alert().unwrap().flat_number, "A1-001");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(relay.current_alert(), None);
    }

    #[tokio::test]
    async fn newer_alert_replaces_and_restarts_the_timer() {
        let relay = AlertRelay::new(Duration::from_millis(300));

        relay.raise(alert("A1-001"));
        tokio::time::sleep(Duration::from_millis(150)).await;
        relay.raise(alert("B2-101"));

        // Past the first alert's deadline: the second must survive,
        // its window measured from its own arrival.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(relay.current_alert().unwrap().flat_number, "B2-101");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(relay.current_alert(), None);
    }

    #[tokio::test]
    async fn manual_dismissal_cancels_the_timer() {
        let relay = AlertRelay::new(Duration::from_millis(200));
        relay.raise(alert("A1-001"));
        relay.dismiss();
        assert_eq!(relay.current_alert(), None);

        // A new alert raised after the dismissal must not be cleared by
        // the first alert's (cancelled) timer.
        relay.raise(alert("B2-101"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(relay.current_alert().unwrap().flat_number, "B2-101");
    }

    #[tokio::test]
    async fn change_callback_sees_raise_and_clear() {
        let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let relay = AlertRelay::new(Duration::from_millis(100));

        // Wire the callback without a live channel.
        let sink = Arc::clone(&seen);
        *relay.inner.on_change.lock().unwrap() = Some(Arc::new(move |alert| {
            sink.lock()
                .unwrap()
                .push(alert.map(|a: EmergencyAlert| a.flat_number));
        }));

        relay.raise(alert("A1-001"));
        tokio::time::sleep(Duration::from_millis(250)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![Some("A1-001".to_string()), None]);
    }
}
