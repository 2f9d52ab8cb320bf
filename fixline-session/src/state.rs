/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Session state machine.
//!
//! [`SessionState::on`] is a pure function from (state, trigger) to the next
//! state and the [`Action`]s the engine must perform, in order. The engine
//! owns every side effect; the machine only decides.
//!
//! ```text
//! Disconnected -> LogonPending -> Active <-> Recovering
//!                                    |
//!                                    v
//!                              LogoutPending -> Disconnected
//! ```
//!
//! Triggers that make no sense in the current state leave it unchanged and
//! produce no actions.

use crate::config::SessionRole;
use fixline_core::types::SeqNum;
use std::fmt;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Transport up, Logon exchange in progress.
    LogonPending,
    /// Logged on, sequence numbers in step.
    Active,
    /// Logged on, waiting for a requested range to be resent.
    Recovering {
        /// First requested sequence number.
        begin: SeqNum,
        /// Last requested sequence number.
        end: SeqNum,
    },
    /// Logout sent, waiting for the counterparty's Logout.
    LogoutPending,
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Transport established.
    Connected {
        /// Local role.
        role: SessionRole,
    },
    /// Counterparty Logon validated.
    LogonAccepted {
        /// Local role.
        role: SessionRole,
    },
    /// Counterparty Logon refused.
    LogonRejected {
        /// Text sent in the Logout.
        reason: String,
    },
    /// Inbound sequence numbers `[begin, end]` are missing.
    GapDetected {
        /// First missing sequence number.
        begin: SeqNum,
        /// Last missing sequence number.
        end: SeqNum,
    },
    /// Expected sequence number moved past the requested range.
    GapClosed,
    /// Counterparty sent Logout.
    LogoutReceived,
    /// Local side asked to log out.
    LogoutRequested {
        /// Optional Logout text.
        reason: Option<String>,
    },
    /// Counterparty broke the protocol.
    ProtocolViolation {
        /// Text sent in the Logout.
        reason: String,
    },
    /// Logon, logout or heartbeat deadline expired.
    Timeout,
    /// Transport failed.
    TransportFailed,
    /// Local shutdown.
    Shutdown,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a Logon.
    SendLogon,
    /// Send a Logout.
    SendLogout {
        /// Optional Text(58).
        reason: Option<String>,
    },
    /// Send a ResendRequest for `[begin, end]`.
    SendResendRequest {
        /// BeginSeqNo(7).
        begin: SeqNum,
        /// EndSeqNo(16).
        end: SeqNum,
    },
    /// Start heartbeat supervision.
    StartHeartbeat,
    /// Drop the transport.
    Disconnect,
}

/// Result of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the trigger.
    pub next: SessionState,
    /// Side effects, in order.
    pub actions: Vec<Action>,
}

impl Transition {
    fn to(next: SessionState, actions: Vec<Action>) -> Self {
        Self { next, actions }
    }

    fn stay(state: SessionState) -> Self {
        Self::to(state, Vec::new())
    }
}

impl SessionState {
    /// Computes the transition for `trigger`.
    #[must_use]
    pub fn on(self, trigger: Trigger) -> Transition {
        use SessionState::{Active, Disconnected, LogonPending, LogoutPending, Recovering};

        match (self, trigger) {
            (_, Trigger::TransportFailed) => Transition::stay(Disconnected),

            (Disconnected, Trigger::Connected { role }) => {
                let actions = match role {
                    SessionRole::Initiator => vec![Action::SendLogon],
                    SessionRole::Acceptor => Vec::new(),
                };
                Transition::to(LogonPending, actions)
            }

            (LogonPending, Trigger::LogonAccepted { role }) => {
                let actions = match role {
                    SessionRole::Acceptor => vec![Action::SendLogon, Action::StartHeartbeat],
                    SessionRole::Initiator => vec![Action::StartHeartbeat],
                };
                Transition::to(Active, actions)
            }
            (LogonPending, Trigger::LogonRejected { reason }) => Transition::to(
                Disconnected,
                vec![
                    Action::SendLogout {
                        reason: Some(reason),
                    },
                    Action::Disconnect,
                ],
            ),

            (Active, Trigger::GapDetected { begin, end }) => Transition::to(
                Recovering { begin, end },
                vec![Action::SendResendRequest { begin, end }],
            ),
            (Recovering { begin, end }, Trigger::GapDetected { begin: from, end: to }) => {
                if to <= end {
                    Transition::stay(self)
                } else {
                    let first = if from > end { from } else { end.next() };
                    Transition::to(
                        Recovering { begin, end: to },
                        vec![Action::SendResendRequest {
                            begin: first,
                            end: to,
                        }],
                    )
                }
            }
            (Recovering { .. }, Trigger::GapClosed) => Transition::stay(Active),

            (Active | Recovering { .. }, Trigger::LogoutReceived) => Transition::to(
                Disconnected,
                vec![Action::SendLogout { reason: None }, Action::Disconnect],
            ),
            (LogonPending | LogoutPending, Trigger::LogoutReceived) => {
                Transition::to(Disconnected, vec![Action::Disconnect])
            }

            (Active | Recovering { .. }, Trigger::LogoutRequested { reason }) => {
                Transition::to(LogoutPending, vec![Action::SendLogout { reason }])
            }
            (LogonPending, Trigger::LogoutRequested { .. }) => {
                Transition::to(Disconnected, vec![Action::Disconnect])
            }

            (
                LogonPending | Active | Recovering { .. } | LogoutPending,
                Trigger::ProtocolViolation { reason },
            ) => Transition::to(
                Disconnected,
                vec![
                    Action::SendLogout {
                        reason: Some(reason),
                    },
                    Action::Disconnect,
                ],
            ),

            (LogonPending | Active | Recovering { .. } | LogoutPending, Trigger::Timeout) => {
                Transition::to(Disconnected, vec![Action::Disconnect])
            }

            (LogonPending | Active | Recovering { .. } | LogoutPending, Trigger::Shutdown) => {
                Transition::to(Disconnected, vec![Action::Disconnect])
            }

            (state, _) => Transition::stay(state),
        }
    }

    /// Returns true when a transport is attached.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Returns true when application messages may flow.
    #[must_use]
    pub const fn is_logged_on(&self) -> bool {
        matches!(self, Self::Active | Self::Recovering { .. })
    }

    /// Returns the state name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::LogonPending => "LogonPending",
            Self::Active => "Active",
            Self::Recovering { .. } => "Recovering",
            Self::LogoutPending => "LogoutPending",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recovering { begin, end } => write!(f, "Recovering[{begin},{end}]"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: u64) -> SeqNum {
        SeqNum::new(n)
    }

    #[test]
    fn test_initiator_logon_flow() {
        let t = SessionState::Disconnected.on(Trigger::Connected {
            role: SessionRole::Initiator,
        });
        assert_eq!(t.next, SessionState::LogonPending);
        assert_eq!(t.actions, vec![Action::SendLogon]);

        let t = t.next.on(Trigger::LogonAccepted {
            role: SessionRole::Initiator,
        });
        assert_eq!(t.next, SessionState::Active);
        assert_eq!(t.actions, vec![Action::StartHeartbeat]);
    }

    #[test]
    fn test_acceptor_replies_with_logon() {
        let t = SessionState::Disconnected.on(Trigger::Connected {
            role: SessionRole::Acceptor,
        });
        assert_eq!(t.next, SessionState::LogonPending);
        assert!(t.actions.is_empty());

        let t = t.next.on(Trigger::LogonAccepted {
            role: SessionRole::Acceptor,
        });
        assert_eq!(t.actions, vec![Action::SendLogon, Action::StartHeartbeat]);
    }

    #[test]
    fn test_logon_rejected() {
        let t = SessionState::LogonPending.on(Trigger::LogonRejected {
            reason: "bad HeartBtInt".to_string(),
        });
        assert_eq!(t.next, SessionState::Disconnected);
        assert_eq!(
            t.actions,
            vec![
                Action::SendLogout {
                    reason: Some("bad HeartBtInt".to_string())
                },
                Action::Disconnect
            ]
        );
    }

    #[test]
    fn test_gap_requests_once() {
        let t = SessionState::Active.on(Trigger::GapDetected {
            begin: seq(5),
            end: seq(7),
        });
        assert_eq!(
            t.next,
            SessionState::Recovering {
                begin: seq(5),
                end: seq(7)
            }
        );
        assert_eq!(
            t.actions,
            vec![Action::SendResendRequest {
                begin: seq(5),
                end: seq(7)
            }]
        );

        let inside = t.next.on(Trigger::GapDetected {
            begin: seq(6),
            end: seq(7),
        });
        assert_eq!(inside.next, t.next);
        assert!(inside.actions.is_empty());
    }

    #[test]
    fn test_gap_beyond_outstanding_range_extends_it() {
        let recovering = SessionState::Recovering {
            begin: seq(5),
            end: seq(7),
        };
        let t = recovering.on(Trigger::GapDetected {
            begin: seq(5),
            end: seq(10),
        });
        assert_eq!(
            t.next,
            SessionState::Recovering {
                begin: seq(5),
                end: seq(10)
            }
        );
        assert_eq!(
            t.actions,
            vec![Action::SendResendRequest {
                begin: seq(8),
                end: seq(10)
            }]
        );

        assert_eq!(t.next.on(Trigger::GapClosed).next, SessionState::Active);
    }

    #[test]
    fn test_logout_paths() {
        let t = SessionState::Active.on(Trigger::LogoutReceived);
        assert_eq!(t.next, SessionState::Disconnected);
        assert_eq!(
            t.actions,
            vec![Action::SendLogout { reason: None }, Action::Disconnect]
        );

        let t = SessionState::Active.on(Trigger::LogoutRequested { reason: None });
        assert_eq!(t.next, SessionState::LogoutPending);
        assert_eq!(t.actions, vec![Action::SendLogout { reason: None }]);

        let t = t.next.on(Trigger::LogoutReceived);
        assert_eq!(t.next, SessionState::Disconnected);
        assert_eq!(t.actions, vec![Action::Disconnect]);

        let t = SessionState::LogoutPending.on(Trigger::Timeout);
        assert_eq!(t.next, SessionState::Disconnected);
    }

    #[test]
    fn test_transport_failure_from_any_state() {
        for state in [
            SessionState::LogonPending,
            SessionState::Active,
            SessionState::Recovering {
                begin: seq(1),
                end: seq(2),
            },
            SessionState::LogoutPending,
        ] {
            let t = state.on(Trigger::TransportFailed);
            assert_eq!(t.next, SessionState::Disconnected);
            assert!(t.actions.is_empty());
        }
    }

    #[test]
    fn test_invalid_triggers_are_ignored() {
        let t = SessionState::Disconnected.on(Trigger::LogoutReceived);
        assert_eq!(t.next, SessionState::Disconnected);
        assert!(t.actions.is_empty());

        let t = SessionState::Active.on(Trigger::Connected {
            role: SessionRole::Initiator,
        });
        assert_eq!(t.next, SessionState::Active);
        assert!(t.actions.is_empty());

        let t = SessionState::Active.on(Trigger::GapClosed);
        assert_eq!(t.next, SessionState::Active);
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::Active.to_string(), "Active");
        assert_eq!(
            SessionState::Recovering {
                begin: seq(5),
                end: seq(7)
            }
            .to_string(),
            "Recovering[5,7]"
        );
        assert!(!SessionState::Disconnected.is_connected());
        assert!(SessionState::Recovering {
            begin: seq(1),
            end: seq(1)
        }
        .is_logged_on());
    }
}
