//! AMPE frame codec: build/parse the encrypted Authenticated Mesh
//! Peering Element carried inside peering action frames.

use crate::addr::MacAddr;
use crate::crypto::{aes_siv_decrypt, aes_siv_encrypt};
use crate::error::{MeshError, Result};
use crate::frame::{FrameBuilder, ParsedFrame, AMPE_PAYLOAD_LEN, EID_AMPE, EID_MIC, MIC_LEN};

/// 4-byte cipher suite selector written into the AMPE payload's
/// `selected_pairwise_suite` field. CCMP-128, IEEE 802.11-2020 Table 9-149.
pub const SUITE_SELECTOR_CCMP: [u8; 4] = [0x00, 0x0f, 0xac, 0x04];

/// The plaintext AMPE element payload, before it is wrapped
/// as an IE and encrypted.
#[derive(Debug, Clone)]
pub struct AmpePayload {
    pub selected_pairwise_suite: [u8; 4],
    pub local_nonce: [u8; 32],
    pub peer_nonce: [u8; 32],
    pub mgtk: [u8; 16],
    pub key_rsc: [u8; 8],
    /// All-ones under the static-MGTK non-goal: "expires" effectively never.
    pub key_expiration: [u8; 4],
}

impl AmpePayload {
    fn to_bytes(&self) -> [u8; AMPE_PAYLOAD_LEN] {
        let mut out = [0u8; AMPE_PAYLOAD_LEN];
        let mut o = 0;
        out[o..o + 4].copy_from_slice(&self.selected_pairwise_suite);
        o += 4;
        out[o..o + 32].copy_from_slice(&self.local_nonce);
        o += 32;
        out[o..o + 32].copy_from_slice(&self.peer_nonce);
        o += 32;
        out[o..o + 16].copy_from_slice(&self.mgtk);
        o += 16;
        out[o..o + 8].copy_from_slice(&self.key_rsc);
        o += 8;
        out[o..o + 4].copy_from_slice(&self.key_expiration);
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < AMPE_PAYLOAD_LEN {
            return Err(MeshError::TransientFrameError("AMPE payload too short".into()));
        }
        let mut o = 0;
        let mut selected_pairwise_suite = [0u8; 4];
        selected_pairwise_suite.copy_from_slice(&data[o..o + 4]);
        o += 4;
        let mut local_nonce = [0u8; 32];
        local_nonce.copy_from_slice(&data[o..o + 32]);
        o += 32;
        let mut peer_nonce = [0u8; 32];
        peer_nonce.copy_from_slice(&data[o..o + 32]);
        o += 32;
        let mut mgtk = [0u8; 16];
        mgtk.copy_from_slice(&data[o..o + 16]);
        o += 16;
        let mut key_rsc = [0u8; 8];
        key_rsc.copy_from_slice(&data[o..o + 8]);
        o += 8;
        let mut key_expiration = [0u8; 4];
        key_expiration.copy_from_slice(&data[o..o + 4]);

        Ok(Self {
            selected_pairwise_suite,
            local_nonce,
            peer_nonce,
            mgtk,
            key_rsc,
            key_expiration,
        })
    }
}

/// Everything `process_ampe` learns from a verified frame, to be folded
/// into the peer record by the caller.
pub struct AmpeUpdate {
    pub peer_local_nonce: [u8; 32],
    pub mgtk: [u8; 16],
}

/// Append the encrypted AMPE IE and MIC IE to `builder`, whose contents
/// from `cat_offset` up to the current length are the plaintext public
/// IEs that get folded into the AAD.
///
/// `aek` must be the 32-byte AES-SIV key shared with `peer`.
pub fn protect_frame(
    builder: &mut FrameBuilder,
    cat_offset: usize,
    aek: &[u8],
    local: MacAddr,
    peer: MacAddr,
    local_nonce: [u8; 32],
    peer_nonce: [u8; 32],
    mgtk: [u8; 16],
) -> Result<()> {
    let payload = AmpePayload {
        selected_pairwise_suite: SUITE_SELECTOR_CCMP,
        local_nonce,
        peer_nonce,
        mgtk,
        key_rsc: [0u8; 8],
        key_expiration: [0xffu8; 4],
    };

    let mut ampe_ie = Vec::with_capacity(2 + AMPE_PAYLOAD_LEN);
    ampe_ie.push(EID_AMPE);
    ampe_ie.push(AMPE_PAYLOAD_LEN as u8);
    ampe_ie.extend_from_slice(&payload.to_bytes());

    // AAD = [local_mac, peer_mac, plaintext frame from cat up to the MIC
    // IE header we're about to append].
    let plaintext_prefix = builder.as_slice()[cat_offset..].to_vec();
    let aad: [&[u8]; 3] = [local.as_bytes(), peer.as_bytes(), &plaintext_prefix];

    let ciphertext = aes_siv_encrypt(aek, &ampe_ie, &aad)?;
    debug_assert_eq!(ciphertext.len(), ampe_ie.len() + MIC_LEN);

    builder.put_u8(EID_MIC)?;
    builder.put_u8(MIC_LEN as u8)?;
    builder.put_bytes(&ciphertext)?;
    Ok(())
}

/// Decrypt and validate the AMPE+MIC tail of a parsed frame.
/// `local`/`peer` are used to reconstruct the (swapped) AAD;
/// `our_nonce` is this station's current nonce for the peer, used to
/// validate the replay-protection rule in step 6.
pub fn process_ampe(
    parsed: &ParsedFrame,
    frame: &[u8],
    cat_offset: usize,
    aek: &[u8],
    local: MacAddr,
    peer: MacAddr,
    our_nonce: &[u8; 32],
) -> Result<AmpeUpdate> {
    let mic_header_offset = parsed
        .mic_header_offset
        .ok_or_else(|| MeshError::TransientFrameError("missing MIC IE".into()))?;

    let mic_len = frame
        .get(mic_header_offset + 1)
        .copied()
        .unwrap_or(0) as usize;
    if mic_len < MIC_LEN {
        return Err(MeshError::TransientFrameError("MIC IE too short".into()));
    }

    let mic_payload_offset = mic_header_offset + 2;
    let crypt_len = parsed.frame_len.saturating_sub(mic_payload_offset);
    if crypt_len < 2 {
        return Err(MeshError::TransientFrameError("missing AMPE ciphertext".into()));
    }

    let crypt = &frame[mic_payload_offset..parsed.frame_len];

    // AAD[0] and AAD[1] are swapped relative to the sender: the sender
    // bound [local, peer, ...], so the receiver must bind [peer, local, ...].
    let plaintext_prefix = &frame[cat_offset..mic_header_offset];
    let aad: [&[u8]; 3] = [peer.as_bytes(), local.as_bytes(), plaintext_prefix];

    let ampe_ie = aes_siv_decrypt(aek, crypt, &aad)?;

    if ampe_ie.len() < 2 {
        return Err(MeshError::TransientFrameError("decrypted AMPE IE truncated".into()));
    }
    let eid = ampe_ie[0];
    let len = ampe_ie[1] as usize;
    if eid != EID_AMPE || len < AMPE_PAYLOAD_LEN {
        return Err(MeshError::TransientFrameError("invalid AMPE element".into()));
    }

    let payload = AmpePayload::from_bytes(&ampe_ie[2..])?;

    let null_nonce = [0u8; 32];
    if payload.peer_nonce != null_nonce && payload.peer_nonce != *our_nonce {
        return Err(MeshError::TransientFrameError(
            "AMPE peer_nonce is neither zero nor our current nonce".into(),
        ));
    }

    Ok(AmpeUpdate {
        peer_local_nonce: payload.local_nonce,
        mgtk: payload.mgtk,
    })
}
