//! Key schedule: AEK and MTK derivation from the SAE PMK.
//!
//! Both derivations sort their MAC/nonce/link-ID inputs before hashing so
//! that the initiator and responder compute byte-identical keys without
//! needing to agree out of band on who is "local" and who is "peer".

use crate::addr::MacAddr;
use crate::crypto::sha256_prf;

/// 4-byte AKM/cipher suite selector for SAE, used as a domain separator
/// in both derivations so a key derived under one suite can never
/// collide with one derived under another.
pub const SUITE_SELECTOR_SAE: [u8; 4] = [0x00, 0x0f, 0xac, 0x08];

/// Derive the Authenticated Encryption Key used by AES-SIV to protect
/// AMPE.
///
/// Context = `suite_selector || min(local, peer) || max(local, peer)`.
pub fn derive_aek(pmk: &[u8], local: MacAddr, peer: MacAddr, aek_len: usize) -> Vec<u8> {
    let (min, max) = MacAddr::sorted_pair(local, peer);

    let mut context = Vec::with_capacity(4 + 6 + 6);
    context.extend_from_slice(&SUITE_SELECTOR_SAE);
    context.extend_from_slice(min.as_bytes());
    context.extend_from_slice(max.as_bytes());

    sha256_prf(pmk, "AEK Derivation", &context, aek_len)
}

/// Derive the Mesh Temporal Key from the SAE PMK plus the full peering
/// instance context. Binding both nonces, both
/// link IDs, and both MAC addresses prevents reflection: an attacker who
/// replays one side's nonce back at it cannot make MTK derivation
/// succeed because the other half of the context won't match.
pub fn derive_mtk(
    pmk: &[u8],
    local: MacAddr,
    peer: MacAddr,
    local_nonce: &[u8; 32],
    peer_nonce: &[u8; 32],
    local_lid: u16,
    peer_lid: u16,
    mtk_len: usize,
) -> Vec<u8> {
    let (nonce_min, nonce_max) = if local_nonce <= peer_nonce {
        (local_nonce, peer_nonce)
    } else {
        (peer_nonce, local_nonce)
    };

    let (lid_min, lid_max) = if local_lid <= peer_lid {
        (local_lid, peer_lid)
    } else {
        (peer_lid, local_lid)
    };

    let (mac_min, mac_max) = MacAddr::sorted_pair(local, peer);

    let mut context = Vec::with_capacity(32 + 32 + 2 + 2 + 4 + 6 + 6);
    context.extend_from_slice(nonce_min);
    context.extend_from_slice(nonce_max);
    context.extend_from_slice(&lid_min.to_be_bytes());
    context.extend_from_slice(&lid_max.to_be_bytes());
    context.extend_from_slice(&SUITE_SELECTOR_SAE);
    context.extend_from_slice(mac_min.as_bytes());
    context.extend_from_slice(mac_max.as_bytes());

    sha256_prf(pmk, "Temporal Key Derivation", &context, mtk_len)
}
