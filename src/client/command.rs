//! Command helpers that fold transport failures into denials.

use tracing::{debug, warn};

use super::{ChargingProfile, CommandChannel, CommandResponse};

/// Sends a charging profile, re-sending the identical payload up to
/// `retries` more times while the channel errors or does not accept.
///
/// # Returns
///
/// * `Some(response)` - An accepted response
/// * `None` - Every attempt failed or was rejected
pub fn set_charging_profile<C: CommandChannel + ?Sized>(
    channel: &C,
    profile: &ChargingProfile,
    retries: u32,
) -> Option<CommandResponse> {
    let attempts = retries.saturating_add(1);
    for attempt in 1..=attempts {
        match channel.set_charging_profile(profile) {
            Ok(resp) if resp.is_accepted() => return Some(resp),
            Ok(resp) => debug!(
                device_id = %profile.device_id,
                connector_id = profile.connector_id,
                attempt,
                status = %resp.status,
                "charging profile not accepted"
            ),
            Err(e) => debug!(
                device_id = %profile.device_id,
                connector_id = profile.connector_id,
                attempt,
                error = %e,
                "charging profile request failed"
            ),
        }
    }
    warn!(
        device_id = %profile.device_id,
        connector_id = profile.connector_id,
        attempts,
        "charging profile denied"
    );
    None
}

/// Sends one battery set-point; any error counts as a denial.
pub fn power_command_accepted<C: CommandChannel + ?Sized>(
    channel: &C,
    device_id: &str,
    power_kw: f64,
) -> bool {
    match channel.send_power_command(device_id, power_kw) {
        Ok(resp) if resp.is_accepted() => true,
        Ok(resp) => {
            warn!(device_id, power_kw, status = %resp.status, "battery command rejected");
            false
        }
        Err(e) => {
            warn!(device_id, power_kw, error = %e, "battery command failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::client::RateUnit;
    use crate::error::ClientError;
    use crate::telemetry::Protocol;

    /// Replays scripted outcomes, then rejects.
    struct Scripted {
        replies: RefCell<Vec<Result<CommandResponse, ClientError>>>,
        calls: Cell<u32>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<CommandResponse, ClientError>>) -> Self {
            replies.reverse();
            Self {
                replies: RefCell::new(replies),
                calls: Cell::new(0),
            }
        }

        fn next(&self) -> Result<CommandResponse, ClientError> {
            self.calls.set(self.calls.get() + 1);
            self.replies
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Ok(CommandResponse::rejected()))
        }
    }

    impl CommandChannel for Scripted {
        fn set_charging_profile(&self, _: &ChargingProfile) -> Result<CommandResponse, ClientError> {
            self.next()
        }
        fn send_power_command(&self, _: &str, _: f64) -> Result<CommandResponse, ClientError> {
            self.next()
        }
    }

    fn profile() -> ChargingProfile {
        ChargingProfile {
            device_id: "cp1".into(),
            connector_id: 0,
            unit: RateUnit::A,
            limit: 16.0,
            protocol: Protocol::Ocpp16,
        }
    }

    fn server_error() -> Result<CommandResponse, ClientError> {
        Err(ClientError::Status {
            status: 503,
            body: String::new(),
        })
    }

    #[test]
    fn returns_first_accepted_response() {
        let ch = Scripted::new(vec![server_error(), Ok(CommandResponse::accepted())]);
        let r = set_charging_profile(&ch, &profile(), 3);
        assert!(r.is_some_and(|r| r.is_accepted()));
        assert_eq!(ch.calls.get(), 2);
    }

    #[test]
    fn exhausts_after_one_plus_retries_attempts() {
        let ch = Scripted::new(vec![server_error(), server_error(), server_error(), server_error()]);
        assert!(set_charging_profile(&ch, &profile(), 3).is_none());
        assert_eq!(ch.calls.get(), 4);
    }

    #[test]
    fn zero_retries_is_a_single_attempt() {
        let ch = Scripted::new(vec![Ok(CommandResponse::rejected())]);
        assert!(set_charging_profile(&ch, &profile(), 0).is_none());
        assert_eq!(ch.calls.get(), 1);
    }

    #[test]
    fn battery_command_errors_are_denials() {
        let ch = Scripted::new(vec![server_error(), Ok(CommandResponse::accepted())]);
        assert!(!power_command_accepted(&ch, "b1", -5.0));
        assert!(power_command_accepted(&ch, "b1", -5.0));
        assert_eq!(ch.calls.get(), 2);
    }
}
