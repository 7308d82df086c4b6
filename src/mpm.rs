//! MPM state machine: the per-peer peering FSM. Consumes
//! events derived from inbound self-protected action frames and from
//! expiring timers, drives the codec in [`crate::ampe`] and [`crate::frame`]
//! to build outbound OPEN/CONFIRM/CLOSE frames.

use crate::frame::{MeshPeeringMgmt, ParsedFrame, SelfProtectedAction};
#[cfg(test)]
use crate::addr::MacAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlinkState {
    Listen,
    OpenSent,
    OpenRcvd,
    CnfRcvd,
    Estab,
    Holding,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlinkEvent {
    OpnAcpt,
    OpnRjct,
    OpnIgnr,
    CnfAcpt,
    CnfRjct,
    CnfIgnr,
    ClsAcpt,
    ClsIgnr,
    Timeout(TimeoutKind),
    /// Local SAE acceptance authorizing this station to open its own
    /// peering instance, rather than an event derived from a received
    /// frame.
    Authorize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Retry,
    Confirm,
    Holding,
}

/// Reason codes carried on CLOSE (subset needed by this crate; IEEE
/// 802.11-2020 Table 9-49).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PeeringCancelled = 52,
    MeshMaxPeers = 53,
    MeshCapabilityPolicyViolation = 55,
    MeshCloseRcvd = 56,
    MeshMaxRetries = 57,
    MeshConfirmTimeout = 58,
}

/// What the FSM wants the caller to do as a result of a transition. The
/// caller (station orchestration) is responsible for actually invoking
/// the codec/driver; `mpm::transition` stays a pure function over state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Actions {
    pub send_open: bool,
    pub send_confirm: bool,
    pub send_close: Option<CloseReasonCode>,
    pub arm_retry: bool,
    pub arm_confirm: bool,
    pub arm_holding: bool,
    pub cancel_timers: bool,
    pub install_keys: bool,
    pub established: bool,
}

pub type CloseReasonCode = u16;

/// Pure transition function. Given the current
/// state and an event, returns the new state and the actions the caller
/// must perform. `Blocked` absorbs every event with no output, matching
/// the "ignore all peering events" row.
pub fn transition(state: PlinkState, event: PlinkEvent) -> (PlinkState, Actions) {
    use PlinkEvent::*;
    use PlinkState::*;

    if state == Blocked {
        return (Blocked, Actions::default());
    }

    match (state, event) {
        (_, OpnIgnr) | (_, CnfIgnr) | (_, ClsIgnr) => (state, Actions::default()),

        (Listen, OpnAcpt) => (
            OpenSent,
            Actions {
                send_open: true,
                send_confirm: true,
                arm_retry: true,
                ..Default::default()
            },
        ),
        (Listen, ClsAcpt) => (Listen, Actions::default()),
        (Listen, Authorize) => (
            OpenSent,
            Actions {
                send_open: true,
                arm_retry: true,
                ..Default::default()
            },
        ),

        (OpenSent, OpnAcpt) => (
            OpenRcvd,
            Actions {
                send_confirm: true,
                ..Default::default()
            },
        ),
        (OpenSent, OpnRjct) | (OpenSent, CnfRjct) => (
            Holding,
            Actions {
                send_close: Some(CloseReason::MeshCapabilityPolicyViolation as u16),
                arm_holding: true,
                ..Default::default()
            },
        ),
        (OpenSent, CnfAcpt) => (
            CnfRcvd,
            Actions {
                arm_confirm: true,
                ..Default::default()
            },
        ),
        (OpenSent, ClsAcpt) => (
            Holding,
            Actions {
                send_close: Some(CloseReason::MeshCloseRcvd as u16),
                arm_holding: true,
                ..Default::default()
            },
        ),

        (OpenRcvd, OpnAcpt) => (
            OpenRcvd,
            Actions {
                send_confirm: true,
                ..Default::default()
            },
        ),
        (OpenRcvd, OpnRjct) | (OpenRcvd, CnfRjct) => (
            Holding,
            Actions {
                send_close: Some(CloseReason::MeshCapabilityPolicyViolation as u16),
                arm_holding: true,
                ..Default::default()
            },
        ),
        (OpenRcvd, CnfAcpt) => (
            Estab,
            Actions {
                install_keys: true,
                established: true,
                ..Default::default()
            },
        ),
        (OpenRcvd, ClsAcpt) => (
            Holding,
            Actions {
                send_close: Some(CloseReason::MeshCloseRcvd as u16),
                arm_holding: true,
                ..Default::default()
            },
        ),

        (CnfRcvd, OpnAcpt) => (
            Estab,
            Actions {
                send_confirm: true,
                install_keys: true,
                established: true,
                ..Default::default()
            },
        ),
        (CnfRcvd, OpnRjct) | (CnfRcvd, CnfRjct) => (
            Holding,
            Actions {
                send_close: Some(CloseReason::MeshCapabilityPolicyViolation as u16),
                arm_holding: true,
                ..Default::default()
            },
        ),
        (CnfRcvd, ClsAcpt) => (
            Holding,
            Actions {
                send_close: Some(CloseReason::MeshCloseRcvd as u16),
                arm_holding: true,
                ..Default::default()
            },
        ),

        (Estab, OpnAcpt) => (
            Estab,
            Actions {
                send_confirm: true,
                ..Default::default()
            },
        ),
        (Estab, ClsAcpt) => (
            Holding,
            Actions {
                send_close: Some(CloseReason::MeshCloseRcvd as u16),
                arm_holding: true,
                ..Default::default()
            },
        ),

        (Holding, OpnAcpt) | (Holding, OpnRjct) | (Holding, CnfAcpt) | (Holding, CnfRjct) => (
            Holding,
            Actions {
                send_close: Some(CloseReason::PeeringCancelled as u16),
                ..Default::default()
            },
        ),
        (Holding, ClsAcpt) => (
            Listen,
            Actions {
                cancel_timers: true,
                ..Default::default()
            },
        ),

        (_, Timeout(TimeoutKind::Retry)) => (state, Actions::default()),
        (_, Timeout(TimeoutKind::Confirm)) => (state, Actions::default()),
        (_, Timeout(TimeoutKind::Holding)) => (
            Listen,
            Actions {
                cancel_timers: true,
                ..Default::default()
            },
        ),

        (Blocked, _) => unreachable!("handled above"),

        // No row in the transition table names this (state, event) pair
        // (e.g. a CNF_ACPT while already in CnfRcvd, or an Authorize
        // outside Listen because peering already started from a received
        // frame): log and drop it rather than transition.
        (state, event) => {
            log::debug!("mpm: unhandled transition {state:?} + {event:?}, dropping");
            (state, Actions::default())
        }
    }
}

/// Derive a `PlinkEvent` from a parsed OPEN/CONFIRM/CLOSE frame and the
/// peer's current record. `free_slot` is whether the local
/// station still has room for a new peering (peer table capacity).
pub fn derive_event(
    parsed: &ParsedFrame,
    current_state: PlinkState,
    stored_my_lid: u16,
    stored_peer_lid: u16,
    free_slot: bool,
) -> PlinkEvent {
    let mgmt = match &parsed.mesh_peering {
        Some(m) => *m,
        None => return ignr_for(parsed.action),
    };

    match parsed.action {
        SelfProtectedAction::Open => {
            let plid = mgmt.local_lid;
            if !free_slot || (stored_peer_lid != 0 && stored_peer_lid != plid) {
                PlinkEvent::OpnIgnr
            } else {
                PlinkEvent::OpnAcpt
            }
        }
        SelfProtectedAction::Confirm => {
            // `mgmt.local_lid` is the sender's own LID (their "plid" as far
            // as we're concerned); `mgmt.peer_lid` is the sender's record
            // of what our LID is (their "llid" echoed back to us).
            let echoed_my_lid = mgmt.peer_lid.unwrap_or(0);
            let senders_own_lid = mgmt.local_lid;
            if !free_slot || stored_my_lid != echoed_my_lid || stored_peer_lid != senders_own_lid {
                PlinkEvent::CnfIgnr
            } else {
                PlinkEvent::CnfAcpt
            }
        }
        SelfProtectedAction::Close => {
            // Accepting Estab -> Close unconditionally breaks the livelock
            // where one side believes Estab and the other has already
            // restarted.
            if current_state == PlinkState::Estab {
                return PlinkEvent::ClsAcpt;
            }
            let senders_own_lid = mgmt.local_lid;
            if stored_peer_lid != senders_own_lid {
                PlinkEvent::ClsIgnr
            } else {
                PlinkEvent::ClsAcpt
            }
        }
    }
}

fn ignr_for(action: SelfProtectedAction) -> PlinkEvent {
    match action {
        SelfProtectedAction::Open => PlinkEvent::OpnIgnr,
        SelfProtectedAction::Confirm => PlinkEvent::CnfIgnr,
        SelfProtectedAction::Close => PlinkEvent::ClsIgnr,
    }
}

/// Build the Mesh Peering Management IE content for an outbound frame in
/// the current state, used by the station orchestration when assembling
/// OPEN/CONFIRM/CLOSE frames.
pub fn mesh_peering_ie(my_lid: u16, peer_lid: Option<u16>, reason: Option<u16>) -> MeshPeeringMgmt {
    MeshPeeringMgmt {
        local_lid: my_lid,
        peer_lid,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_to_open_sent_arms_retry_and_sends_both_frames() {
        let (next, actions) = transition(PlinkState::Listen, PlinkEvent::OpnAcpt);
        assert_eq!(next, PlinkState::OpenSent);
        assert!(actions.send_open && actions.send_confirm && actions.arm_retry);
    }

    #[test]
    fn open_rcvd_confirm_establishes_and_installs_keys() {
        let (next, actions) = transition(PlinkState::OpenRcvd, PlinkEvent::CnfAcpt);
        assert_eq!(next, PlinkState::Estab);
        assert!(actions.install_keys && actions.established);
    }

    #[test]
    fn ignr_events_never_change_state() {
        for state in [
            PlinkState::Listen,
            PlinkState::OpenSent,
            PlinkState::OpenRcvd,
            PlinkState::CnfRcvd,
            PlinkState::Estab,
            PlinkState::Holding,
        ] {
            for event in [PlinkEvent::OpnIgnr, PlinkEvent::CnfIgnr, PlinkEvent::ClsIgnr] {
                let (next, actions) = transition(state, event);
                assert_eq!(next, state);
                assert_eq!(actions, Actions::default());
            }
        }
    }

    #[test]
    fn blocked_absorbs_every_event_with_no_output() {
        for event in [
            PlinkEvent::OpnAcpt,
            PlinkEvent::OpnRjct,
            PlinkEvent::CnfAcpt,
            PlinkEvent::CnfRjct,
            PlinkEvent::ClsAcpt,
            PlinkEvent::Timeout(TimeoutKind::Holding),
        ] {
            let (next, actions) = transition(PlinkState::Blocked, event);
            assert_eq!(next, PlinkState::Blocked);
            assert_eq!(actions, Actions::default());
        }
    }

    #[test]
    fn holding_timeout_restarts_to_listen_and_cancels_timers() {
        let (next, actions) = transition(PlinkState::Holding, PlinkEvent::Timeout(TimeoutKind::Holding));
        assert_eq!(next, PlinkState::Listen);
        assert!(actions.cancel_timers);
    }

    #[test]
    fn close_with_mismatched_lid_while_established_is_accepted_not_ignored() {
        let parsed = parsed_close(0x9999);
        let event = derive_event(&parsed, PlinkState::Estab, 0x0001, 0x0002, true);
        assert_eq!(event, PlinkEvent::ClsAcpt);
    }

    #[test]
    fn close_with_mismatched_lid_while_not_established_is_ignored() {
        let parsed = parsed_close(0x9999);
        let event = derive_event(&parsed, PlinkState::OpenSent, 0x0001, 0x0002, true);
        assert_eq!(event, PlinkEvent::ClsIgnr);
    }

    #[test]
    fn close_is_ignored_when_no_peer_lid_is_stored_yet() {
        // stored_peer_lid == 0 (nothing recorded yet) must not be
        // treated as "anything matches".
        let parsed = parsed_close(0x9999);
        let event = derive_event(&parsed, PlinkState::OpenSent, 0x0001, 0, true);
        assert_eq!(event, PlinkEvent::ClsIgnr);
    }

    #[test]
    fn authorize_in_listen_sends_open_only() {
        let (next, actions) = transition(PlinkState::Listen, PlinkEvent::Authorize);
        assert_eq!(next, PlinkState::OpenSent);
        assert!(actions.send_open && actions.arm_retry && !actions.send_confirm);
    }

    #[test]
    fn authorize_outside_listen_is_dropped() {
        let (next, actions) = transition(PlinkState::Estab, PlinkEvent::Authorize);
        assert_eq!(next, PlinkState::Estab);
        assert_eq!(actions, Actions::default());
    }

    /// `senders_own_lid` is the CLOSE frame's `local_lid` field (the
    /// sender's own LID); it's compared against our stored `peer_lid`.
    fn parsed_close(senders_own_lid: u16) -> ParsedFrame {
        ParsedFrame {
            action: SelfProtectedAction::Close,
            mesh_peering: Some(MeshPeeringMgmt {
                local_lid: senders_own_lid,
                peer_lid: Some(0x0001),
                reason: Some(1),
            }),
            mesh_id: None,
            supp_rates: Vec::new(),
            mic_header_offset: None,
            frame_len: 0,
        }
    }

    #[allow(dead_code)]
    fn addr(last: u8) -> MacAddr {
        MacAddr::new([0x02, 0, 0, 0, 0, last])
    }
}
