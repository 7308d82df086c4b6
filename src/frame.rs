//! Wire types for self-protected action frames.
//!
//! Element parsing is treated as an external collaborator in the design
//! doc ("returns a typed view of the IEs"), but no such collaborator is
//! available to this crate, so this module implements the minimal parser
//! the rest of the stack needs: enough to find the Mesh Peering
//! Management IE and the boundary between plaintext and the
//! MIC/AMPE ciphertext tail.

use crate::error::{MeshError, Result};

/// Self-protected action frame category, IEEE 802.11-2020 Table 9-76.
pub const CATEGORY_SELF_PROTECTED: u8 = 15;

pub const EID_SUPP_RATES: u8 = 1;
pub const EID_EXT_SUPP_RATES: u8 = 50;
pub const EID_MESH_ID: u8 = 114;
pub const EID_MESH_CONFIG: u8 = 113;
pub const EID_MESH_PEERING_MGMT: u8 = 117;
pub const EID_HT_CAPABILITIES: u8 = 45;
pub const EID_HT_OPERATION: u8 = 61;
pub const EID_AMPE: u8 = 139;
pub const EID_MIC: u8 = 140;

/// Fixed size of a MIC IE payload (the AES-SIV synthetic IV).
pub const MIC_LEN: usize = 16;

/// Size of the plaintext AMPE element payload:
/// `suite(4) + local_nonce(32) + peer_nonce(32) + mgtk(16) + key_rsc(8) + key_expiration(4)`.
pub const AMPE_PAYLOAD_LEN: usize = 4 + 32 + 32 + 16 + 8 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfProtectedAction {
    Open = 1,
    Confirm = 2,
    Close = 3,
}

impl SelfProtectedAction {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Open),
            2 => Some(Self::Confirm),
            3 => Some(Self::Close),
            _ => None,
        }
    }
}

/// Tracks written length against a fixed capacity, refusing overflow as a
/// typed error instead of scattering ad hoc tailroom checks through frame
/// construction.
pub struct FrameBuilder {
    buf: Vec<u8>,
    max_len: usize,
}

impl FrameBuilder {
    pub fn with_capacity(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len.min(1500)),
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn reserve(&self, extra: usize) -> Result<()> {
        if self.buf.len() + extra > self.max_len {
            return Err(MeshError::TransientFrameError(format!(
                "frame builder overflow: {} + {} > {}",
                self.buf.len(),
                extra,
                self.max_len
            )));
        }
        Ok(())
    }

    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        self.reserve(1)?;
        self.buf.push(v);
        Ok(())
    }

    pub fn put_u16_be(&mut self, v: u16) -> Result<()> {
        self.reserve(2)?;
        self.buf.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Append a complete information element: `EID, LEN, payload...`.
    pub fn put_ie(&mut self, eid: u8, payload: &[u8]) -> Result<()> {
        if payload.len() > u8::MAX as usize {
            return Err(MeshError::TransientFrameError("IE payload too long".into()));
        }
        self.reserve(2 + payload.len())?;
        self.buf.push(eid);
        self.buf.push(payload.len() as u8);
        self.buf.extend_from_slice(payload);
        Ok(())
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// Mesh Peering Management IE contents (local/peer link ID, reason code).
/// The peer/reason fields are only present on Confirm/Close frames
/// respectively.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshPeeringMgmt {
    pub local_lid: u16,
    pub peer_lid: Option<u16>,
    pub reason: Option<u16>,
}

impl MeshPeeringMgmt {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6);
        out.extend_from_slice(&self.local_lid.to_be_bytes());
        if let Some(plid) = self.peer_lid {
            out.extend_from_slice(&plid.to_be_bytes());
        }
        if let Some(reason) = self.reason {
            out.extend_from_slice(&reason.to_be_bytes());
        }
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(MeshError::TransientFrameError(
                "mesh peering management IE too short".into(),
            ));
        }
        let local_lid = u16::from_be_bytes([data[0], data[1]]);
        let peer_lid = if data.len() >= 4 {
            Some(u16::from_be_bytes([data[2], data[3]]))
        } else {
            None
        };
        let reason = if data.len() >= 6 {
            Some(u16::from_be_bytes([data[4], data[5]]))
        } else {
            None
        };
        Ok(Self {
            local_lid,
            peer_lid,
            reason,
        })
    }
}

/// Typed view over the plaintext elements of a received self-protected
/// action frame, plus pointers into the ciphertext tail.
#[derive(Debug, Clone)]
pub struct ParsedFrame {
    pub action: SelfProtectedAction,
    pub mesh_peering: Option<MeshPeeringMgmt>,
    pub mesh_id: Option<Vec<u8>>,
    pub supp_rates: Vec<u8>,
    /// Offset of the MIC IE's EID byte, if present.
    pub mic_header_offset: Option<usize>,
    /// Total length of the frame (== end of the ciphertext tail).
    pub frame_len: usize,
}

impl ParsedFrame {
    /// Offset of the start of the ciphertext (just past the 2-byte MIC
    /// IE header): `frame[mic_payload_offset..frame_len]` is
    /// `SIV(16) || encrypted AMPE IE`.
    pub fn mic_payload_offset(&self) -> Option<usize> {
        self.mic_header_offset.map(|o| o + 2)
    }
}

/// Parse a self-protected action frame: `[category, action, IE...]`.
/// Stops scanning elements at the first MIC IE, since everything from
/// there on is opaque ciphertext, not further nested IEs.
pub fn parse_self_protected(frame: &[u8]) -> Result<ParsedFrame> {
    if frame.len() < 2 {
        return Err(MeshError::TransientFrameError("frame too short".into()));
    }
    if frame[0] != CATEGORY_SELF_PROTECTED {
        return Err(MeshError::TransientFrameError(
            "not a self-protected action frame".into(),
        ));
    }
    let action = SelfProtectedAction::from_u8(frame[1])
        .ok_or_else(|| MeshError::TransientFrameError("unknown self-protected subtype".into()))?;

    let mut offset = 2usize;
    let mut mesh_peering = None;
    let mut mesh_id = None;
    let mut supp_rates = Vec::new();
    let mut mic_header_offset = None;

    while offset + 2 <= frame.len() {
        let eid = frame[offset];
        let len = frame[offset + 1] as usize;
        let payload_start = offset + 2;
        let payload_end = payload_start + len;
        if payload_end > frame.len() {
            return Err(MeshError::TransientFrameError("IE length runs past frame".into()));
        }
        let payload = &frame[payload_start..payload_end];

        match eid {
            EID_MIC => {
                mic_header_offset = Some(offset);
                break;
            }
            EID_MESH_PEERING_MGMT => {
                mesh_peering = Some(MeshPeeringMgmt::from_bytes(payload)?);
            }
            EID_MESH_ID => {
                mesh_id = Some(payload.to_vec());
            }
            EID_SUPP_RATES | EID_EXT_SUPP_RATES => {
                supp_rates.extend_from_slice(payload);
            }
            _ => {}
        }

        offset = payload_end;
    }

    Ok(ParsedFrame {
        action,
        mesh_peering,
        mesh_id,
        supp_rates,
        mic_header_offset,
        frame_len: frame.len(),
    })
}
