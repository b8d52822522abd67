//! The payment lifecycle state machine.
//!
//! Encodes every allowed transition in the gateway's lifecycle as a single
//! exhaustive match, the same shape as a classic event-driven state machine
//! but addressed directly by target state rather than by an intermediate
//! event enum: callers already know which state they want to reach (the bank
//! response, the caller's cancel amount, the sweeper's deadline check all
//! pick a concrete target), so `CanTransition(from, to)` is the natural seam.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The full lifecycle of a payment.
///
/// `SUBMITPASSIVIZATION` / `SUBMITPASSIVIZATION2` are retained as opaque
/// intermediate 3-D Secure sub-states driven entirely by bank responses;
/// no semantic distinction between them is documented anywhere upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Init,
    New,
    FormShowed,
    OneChooseVision,
    FinishAuthorize,
    Authorizing,
    ThreeDsChecking,
    SubmitPassivization,
    SubmitPassivization2,
    ThreeDsChecked,
    Authorized,
    AuthFail,
    Confirming,
    Confirmed,
    Reversing,
    Refunding,
    Cancelled,
    DeadlineExpired,
    Rejected,
    Reversed,
    PartialReversed,
    Refunded,
    PartialRefunded,
}

impl PaymentStatus {
    /// States with no outgoing edges.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Cancelled
                | PaymentStatus::DeadlineExpired
                | PaymentStatus::Rejected
                | PaymentStatus::Reversed
                | PaymentStatus::PartialReversed
                | PaymentStatus::Refunded
                | PaymentStatus::PartialRefunded
        )
    }

    /// States in which `bank_ref` may be set, per the §3 invariant.
    pub fn carries_bank_ref(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Authorizing
                | PaymentStatus::ThreeDsChecking
                | PaymentStatus::SubmitPassivization
                | PaymentStatus::SubmitPassivization2
                | PaymentStatus::ThreeDsChecked
                | PaymentStatus::Authorized
                | PaymentStatus::Confirming
                | PaymentStatus::Confirmed
                | PaymentStatus::Reversing
                | PaymentStatus::Refunding
                | PaymentStatus::Reversed
                | PaymentStatus::PartialReversed
                | PaymentStatus::Refunded
                | PaymentStatus::PartialRefunded
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Init => "INIT",
            PaymentStatus::New => "NEW",
            PaymentStatus::FormShowed => "FORM_SHOWED",
            PaymentStatus::OneChooseVision => "ONECHOOSEVISION",
            PaymentStatus::FinishAuthorize => "FINISHAUTHORIZE",
            PaymentStatus::Authorizing => "AUTHORIZING",
            PaymentStatus::ThreeDsChecking => "THREE_DS_CHECKING",
            PaymentStatus::SubmitPassivization => "SUBMITPASSIVIZATION",
            PaymentStatus::SubmitPassivization2 => "SUBMITPASSIVIZATION2",
            PaymentStatus::ThreeDsChecked => "THREE_DS_CHECKED",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::AuthFail => "AUTH_FAIL",
            PaymentStatus::Confirming => "CONFIRMING",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::Reversing => "REVERSING",
            PaymentStatus::Refunding => "REFUNDING",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::DeadlineExpired => "DEADLINE_EXPIRED",
            PaymentStatus::Rejected => "REJECTED",
            PaymentStatus::Reversed => "REVERSED",
            PaymentStatus::PartialReversed => "PARTIAL_REVERSED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartialRefunded => "PARTIAL_REFUNDED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "INIT" => PaymentStatus::Init,
            "NEW" => PaymentStatus::New,
            "FORM_SHOWED" => PaymentStatus::FormShowed,
            "ONECHOOSEVISION" => PaymentStatus::OneChooseVision,
            "FINISHAUTHORIZE" => PaymentStatus::FinishAuthorize,
            "AUTHORIZING" => PaymentStatus::Authorizing,
            "THREE_DS_CHECKING" => PaymentStatus::ThreeDsChecking,
            "SUBMITPASSIVIZATION" => PaymentStatus::SubmitPassivization,
            "SUBMITPASSIVIZATION2" => PaymentStatus::SubmitPassivization2,
            "THREE_DS_CHECKED" => PaymentStatus::ThreeDsChecked,
            "AUTHORIZED" => PaymentStatus::Authorized,
            "AUTH_FAIL" => PaymentStatus::AuthFail,
            "CONFIRMING" => PaymentStatus::Confirming,
            "CONFIRMED" => PaymentStatus::Confirmed,
            "REVERSING" => PaymentStatus::Reversing,
            "REFUNDING" => PaymentStatus::Refunding,
            "CANCELLED" => PaymentStatus::Cancelled,
            "DEADLINE_EXPIRED" => PaymentStatus::DeadlineExpired,
            "REJECTED" => PaymentStatus::Rejected,
            "REVERSED" => PaymentStatus::Reversed,
            "PARTIAL_REVERSED" => PaymentStatus::PartialReversed,
            "REFUNDED" => PaymentStatus::Refunded,
            "PARTIAL_REFUNDED" => PaymentStatus::PartialRefunded,
            other => return Err(format!("unknown payment status: {other}")),
        })
    }
}

/// Pure lookup over the lifecycle's edge table.
///
/// An exhaustive `match` table keyed on `(from, to)` rather than
/// `(from, event)`, since callers address transitions by target state
/// directly.
pub struct StateMachine;

impl StateMachine {
    /// Whether an edge exists from `from` to `to` in the lifecycle table.
    pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (from, to),
            (Init, New)
                | (New, FormShowed)
                | (New, Cancelled)
                | (New, DeadlineExpired)
                | (FormShowed, OneChooseVision)
                | (FormShowed, Cancelled)
                | (FormShowed, DeadlineExpired)
                | (OneChooseVision, FinishAuthorize)
                | (OneChooseVision, DeadlineExpired)
                | (FinishAuthorize, Authorizing)
                | (FinishAuthorize, DeadlineExpired)
                | (Authorizing, ThreeDsChecking)
                | (Authorizing, Authorized)
                | (Authorizing, AuthFail)
                | (Authorizing, Rejected)
                | (ThreeDsChecking, SubmitPassivization)
                | (ThreeDsChecking, SubmitPassivization2)
                | (ThreeDsChecking, ThreeDsChecked)
                | (ThreeDsChecking, DeadlineExpired)
                | (SubmitPassivization, ThreeDsChecked)
                | (SubmitPassivization, DeadlineExpired)
                | (SubmitPassivization2, ThreeDsChecked)
                | (SubmitPassivization2, DeadlineExpired)
                | (ThreeDsChecked, Authorized)
                | (ThreeDsChecked, AuthFail)
                | (ThreeDsChecked, Authorizing)
                | (Authorized, Confirming)
                | (Authorized, Reversing)
                | (AuthFail, Authorizing)
                | (AuthFail, Rejected)
                | (Confirming, Confirmed)
                | (Confirming, AuthFail)
                | (Confirmed, Refunding)
                | (Reversing, Reversed)
                | (Reversing, PartialReversed)
                | (Refunding, Refunded)
                | (Refunding, PartialRefunded)
        )
    }

    /// All states reachable from `from` in one step.
    pub fn valid_next(from: PaymentStatus) -> Vec<PaymentStatus> {
        use PaymentStatus::*;
        let all = [
            Init,
            New,
            FormShowed,
            OneChooseVision,
            FinishAuthorize,
            Authorizing,
            ThreeDsChecking,
            SubmitPassivization,
            SubmitPassivization2,
            ThreeDsChecked,
            Authorized,
            AuthFail,
            Confirming,
            Confirmed,
            Reversing,
            Refunding,
            Cancelled,
            DeadlineExpired,
            Rejected,
            Reversed,
            PartialReversed,
            Refunded,
            PartialRefunded,
        ];
        all.into_iter().filter(|&to| Self::can_transition(from, to)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    #[test]
    fn happy_single_stage_path_is_all_valid_edges() {
        let path = [
            Init,
            New,
            FormShowed,
            OneChooseVision,
            FinishAuthorize,
            Authorizing,
            Authorized,
            Confirming,
            Confirmed,
        ];
        for w in path.windows(2) {
            assert!(
                StateMachine::can_transition(w[0], w[1]),
                "{:?} -> {:?} should be a valid edge",
                w[0],
                w[1]
            );
        }
    }

    #[test]
    fn three_ds_path_is_valid() {
        assert!(StateMachine::can_transition(Authorizing, ThreeDsChecking));
        assert!(StateMachine::can_transition(ThreeDsChecking, ThreeDsChecked));
        assert!(StateMachine::can_transition(ThreeDsChecked, Authorized));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for terminal in [Cancelled, DeadlineExpired, Rejected, Reversed, PartialReversed, Refunded, PartialRefunded] {
            assert!(terminal.is_terminal());
            assert!(StateMachine::valid_next(terminal).is_empty());
        }
    }

    #[test]
    fn non_terminal_states_have_at_least_one_edge_or_are_awaiting_bank() {
        // Every non-terminal state in the table has an outgoing edge.
        for s in [
            Init,
            New,
            FormShowed,
            OneChooseVision,
            FinishAuthorize,
            Authorizing,
            ThreeDsChecking,
            SubmitPassivization,
            SubmitPassivization2,
            ThreeDsChecked,
            Authorized,
            AuthFail,
            Confirming,
            Confirmed,
            Reversing,
            Refunding,
        ] {
            assert!(!StateMachine::valid_next(s).is_empty(), "{s:?} has no outgoing edges");
        }
    }

    #[test]
    fn arbitrary_non_edges_are_rejected() {
        assert!(!StateMachine::can_transition(New, Confirmed));
        assert!(!StateMachine::can_transition(Confirmed, New));
        assert!(!StateMachine::can_transition(Cancelled, New));
        assert!(!StateMachine::can_transition(Init, Confirmed));
    }

    #[test]
    fn rejected_is_reachable_from_authorizing_and_auth_fail() {
        assert!(StateMachine::can_transition(Authorizing, Rejected));
        assert!(StateMachine::can_transition(AuthFail, Rejected));
    }

    #[test]
    fn bank_ref_window_matches_spec() {
        assert!(Authorizing.carries_bank_ref());
        assert!(Confirmed.carries_bank_ref());
        assert!(!New.carries_bank_ref());
        assert!(!Init.carries_bank_ref());
        assert!(!Cancelled.carries_bank_ref());
    }

    #[test]
    fn display_and_parse_roundtrip() {
        for s in [
            Init,
            New,
            FormShowed,
            OneChooseVision,
            FinishAuthorize,
            Authorizing,
            ThreeDsChecking,
            SubmitPassivization,
            SubmitPassivization2,
            ThreeDsChecked,
            Authorized,
            AuthFail,
            Confirming,
            Confirmed,
            Reversing,
            Refunding,
            Cancelled,
            DeadlineExpired,
            Rejected,
            Reversed,
            PartialReversed,
            Refunded,
            PartialRefunded,
        ] {
            let text = s.to_string();
            let back: PaymentStatus = text.parse().unwrap();
            assert_eq!(s, back);
        }
    }
}
