//! Reconnection state machine.
//!
//! Decides what to do after an unexpected transport failure and hands out
//! timer identities for scheduled retries. A retry only runs if its identity
//! is still the armed one, so `disconnect()` or a fresh `connect()` disarms
//! every retry scheduled before it.

use std::time::Duration;

use agent_bridge_core::ReconnectPolicy;
use rand::Rng;

/// Identity of a scheduled retry.
pub type TimerId = u64;

/// What an armed timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    /// Reopen the transport and replay the pending connection.
    Reconnect,
    /// Resend the `start` handshake on the open transport.
    Handshake,
}

/// Outcome of an unexpected transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// The disconnect was requested; do nothing.
    Ignore,
    /// No network path; wait for it to come back.
    WaitForNetwork,
    /// The attempt cap was exceeded. Terminal until the next `connect()`.
    GiveUp { attempts: u32 },
    /// Retry after `delay`.
    Retry {
        attempt: u32,
        delay: Duration,
        timer: TimerId,
    },
}

#[derive(Debug)]
pub struct ReconnectController {
    policy: ReconnectPolicy,
    attempt: u32,
    manual: bool,
    waiting_for_network: bool,
    next_timer: TimerId,
    armed: Option<(TimerId, RetryKind)>,
}

impl ReconnectController {
    #[must_use]
    pub const fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            manual: false,
            waiting_for_network: false,
            next_timer: 0,
            armed: None,
        }
    }

    /// Attempts made since the last successful handshake.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Overwrite the attempt counter, e.g. when restoring a controller.
    pub const fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    #[must_use]
    pub const fn is_manual(&self) -> bool {
        self.manual
    }

    #[must_use]
    pub const fn is_waiting_for_network(&self) -> bool {
        self.waiting_for_network
    }

    #[must_use]
    pub const fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// A fresh `connect()` starts a new retry budget.
    pub const fn begin_connect(&mut self) {
        self.manual = false;
        self.waiting_for_network = false;
        self.attempt = 0;
        self.armed = None;
    }

    /// `disconnect()` suppresses any retry until the next `connect()`.
    pub const fn mark_manual_disconnect(&mut self) {
        self.manual = true;
        self.waiting_for_network = false;
        self.armed = None;
    }

    /// The server acknowledged the handshake. A pending handshake retry is
    /// moot once the session is up.
    pub const fn on_connected(&mut self) {
        self.attempt = 0;
        self.waiting_for_network = false;
        if matches!(self.armed, Some((_, RetryKind::Handshake))) {
            self.armed = None;
        }
    }

    /// React to a transport failure the caller did not ask for.
    pub fn on_unexpected_disconnect(&mut self, network_available: bool) -> ReconnectDecision {
        if self.manual {
            return ReconnectDecision::Ignore;
        }
        if !network_available {
            self.waiting_for_network = true;
            self.armed = None;
            return ReconnectDecision::WaitForNetwork;
        }
        self.attempt_reconnect()
    }

    /// The network came back. Yields a decision only if a retry was parked.
    pub fn on_network_restored(&mut self) -> Option<ReconnectDecision> {
        if !self.waiting_for_network || self.manual {
            return None;
        }
        self.waiting_for_network = false;
        Some(self.attempt_reconnect())
    }

    /// Count one more attempt and schedule it, or give up past the cap.
    pub fn attempt_reconnect(&mut self) -> ReconnectDecision {
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt > self.policy.max_attempts {
            self.armed = None;
            return ReconnectDecision::GiveUp {
                attempts: self.policy.max_attempts,
            };
        }
        let jitter_unit = rand::thread_rng().gen_range(0.0..=1.0);
        let delay = self.policy.delay_for(self.attempt, jitter_unit);
        let timer = self.arm(RetryKind::Reconnect);
        ReconnectDecision::Retry {
            attempt: self.attempt,
            delay,
            timer,
        }
    }

    /// Arm a handshake retry, replacing any other armed timer.
    pub const fn arm_handshake_retry(&mut self) -> TimerId {
        self.arm(RetryKind::Handshake)
    }

    /// Disarm whatever is scheduled.
    pub const fn cancel(&mut self) {
        self.armed = None;
    }

    /// Consume a fired timer. Returns its kind only if it is still armed.
    pub fn take_fired(&mut self, timer: TimerId) -> Option<RetryKind> {
        match self.armed {
            Some((armed, kind)) if armed == timer => {
                self.armed = None;
                Some(kind)
            }
            _ => None,
        }
    }

    const fn arm(&mut self, kind: RetryKind) -> TimerId {
        self.next_timer = self.next_timer.wrapping_add(1);
        self.armed = Some((self.next_timer, kind));
        self.next_timer
    }
}
