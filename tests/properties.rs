use mesh_mpm::prelude::*;
use mesh_mpm::crypto::{aes_siv_decrypt, aes_siv_encrypt};
use mesh_mpm::keys::{derive_aek, derive_mtk};
use mesh_mpm::mpm::{transition, Actions, TimeoutKind};
use mesh_mpm::peer::PeerTable;
use proptest::prelude::*;

fn mac(bytes: [u8; 6]) -> MacAddr {
    let mut b = bytes;
    b[0] |= 0x02; // locally administered, avoids multicast bit
    b[0] &= !0x01;
    MacAddr::new(b)
}

fn arb_mac() -> impl Strategy<Value = MacAddr> {
    any::<[u8; 6]>().prop_map(mac)
}

fn arb_nonce() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

proptest! {
    /// AEK derivation is symmetric under MAC swap for any pair of
    /// addresses, not just the fixed pair the unit test uses.
    #[test]
    fn aek_symmetric_under_mac_swap(a in arb_mac(), b in arb_mac(), pmk in any::<[u8; 32]>()) {
        prop_assume!(a != b);
        let ab = derive_aek(&pmk, a, b, 16);
        let ba = derive_aek(&pmk, b, a, 16);
        prop_assert_eq!(ab, ba);
    }

    /// MTK derivation is symmetric under a full local/peer role swap
    /// (MACs, nonces and link IDs all swapped together).
    #[test]
    fn mtk_symmetric_under_full_role_swap(
        a in arb_mac(), b in arb_mac(),
        n1 in arb_nonce(), n2 in arb_nonce(),
        lid1 in any::<u16>(), lid2 in any::<u16>(),
        pmk in any::<[u8; 32]>(),
    ) {
        prop_assume!(a != b);
        prop_assume!(lid1 != lid2);
        let view_a = derive_mtk(&pmk, a, b, &n1, &n2, lid1, lid2, 16);
        let view_b = derive_mtk(&pmk, b, a, &n2, &n1, lid2, lid1, 16);
        prop_assert_eq!(view_a, view_b);
    }

    /// AES-SIV round-trips arbitrary plaintext under arbitrary AAD, and a
    /// single flipped AAD byte always breaks verification.
    #[test]
    fn siv_round_trips_and_detects_aad_tamper(
        key in any::<[u8; 32]>(),
        plaintext in proptest::collection::vec(any::<u8>(), 0..128),
        aad_a in proptest::collection::vec(any::<u8>(), 1..32),
        aad_b in proptest::collection::vec(any::<u8>(), 1..32),
        flip_index in any::<usize>(),
    ) {
        let aad: [&[u8]; 2] = [&aad_a, &aad_b];
        let ct = aes_siv_encrypt(&key, &plaintext, &aad).unwrap();
        let pt = aes_siv_decrypt(&key, &ct, &aad).unwrap();
        prop_assert_eq!(pt, plaintext);

        let mut tampered_b = aad_b.clone();
        let idx = flip_index % tampered_b.len();
        tampered_b[idx] ^= 0x01;
        let bad_aad: [&[u8]; 2] = [&aad_a, &tampered_b];
        prop_assert!(aes_siv_decrypt(&key, &ct, &bad_aad).is_err());
    }

    /// `Blocked` absorbs every event with zero side effects, for any event
    /// the FSM can be fed, not just the fixed list the unit test
    /// enumerates.
    #[test]
    fn blocked_never_transmits(event_tag in 0u8..9) {
        let event = tag_to_event(event_tag);
        let (next, actions) = transition(PlinkState::Blocked, event);
        prop_assert_eq!(next, PlinkState::Blocked);
        prop_assert_eq!(actions, Actions::default());
    }

    /// An `*_Ignr` event never changes state, whatever the starting state
    /// is.
    #[test]
    fn ignr_never_changes_state(state_tag in 0u8..7, event_tag in 0u8..3) {
        let state = tag_to_non_blocked_state(state_tag);
        let event = match event_tag {
            0 => PlinkEvent::OpnIgnr,
            1 => PlinkEvent::CnfIgnr,
            _ => PlinkEvent::ClsIgnr,
        };
        let (next, actions) = transition(state, event);
        prop_assert_eq!(next, state);
        prop_assert_eq!(actions, Actions::default());
    }

    /// A timer identity captured before a peer is removed never matches
    /// the identity of any record later created for the same address,
    /// across arbitrary remove/reinsert cycles.
    #[test]
    fn stale_timer_identity_never_matches_after_reinsert(cycles in 1usize..20) {
        let addr = mac([9, 9, 9, 9, 9, 9]);
        let mut table = PeerTable::new(8);

        let mut seen_generations = std::collections::HashSet::new();
        for _ in 0..cycles {
            let generation = table.get_or_insert(addr, &[]).unwrap().generation;
            prop_assert!(seen_generations.insert(generation), "generation reused after removal");
            table.remove(&addr);
        }
    }
}

fn tag_to_event(tag: u8) -> PlinkEvent {
    match tag {
        0 => PlinkEvent::OpnAcpt,
        1 => PlinkEvent::OpnRjct,
        2 => PlinkEvent::OpnIgnr,
        3 => PlinkEvent::CnfAcpt,
        4 => PlinkEvent::CnfRjct,
        5 => PlinkEvent::CnfIgnr,
        6 => PlinkEvent::ClsAcpt,
        7 => PlinkEvent::ClsIgnr,
        _ => PlinkEvent::Timeout(TimeoutKind::Holding),
    }
}

fn tag_to_non_blocked_state(tag: u8) -> PlinkState {
    match tag {
        0 => PlinkState::Listen,
        1 => PlinkState::OpenSent,
        2 => PlinkState::OpenRcvd,
        3 => PlinkState::CnfRcvd,
        4 => PlinkState::Estab,
        _ => PlinkState::Holding,
    }
}
