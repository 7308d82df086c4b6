//! Error taxonomy for the mesh peering stack.
//!
//! Every variant is strictly local to the event that produced it; nothing
//! here is globally fatal short of losing the underlying interface.

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, MeshError>;

#[derive(thiserror::Error, Debug)]
pub enum MeshError {
    /// Malformed element, missing IE, or bad length. Caller drops the
    /// frame without changing FSM state.
    #[error("transient frame error: {0}")]
    TransientFrameError(String),

    /// AES-SIV tag mismatch on decrypt. Caller drops the frame, logs, and
    /// does not change FSM state.
    #[error("AMPE authentication failed")]
    CryptoAuthFail,

    /// Unsupported cipher/group/rateset. Causes an OPN_RJCT/CNF_RJCT
    /// event, which in turn sends a CLOSE.
    #[error("policy mismatch: {0}")]
    PolicyMismatch(String),

    /// No free peer slot, or allocation failure. Treated as `*_IGNR` for
    /// peering; refuses to add the peer.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// Driver send or key-install call returned an error. Logged; the
    /// retry timer is what recovers from this, not this error path.
    #[error("driver failure: {0}")]
    DriverFailure(String),

    /// SAE group unavailable, or retries exhausted. Peer moves to
    /// Blocked and its SAE session resets to Nothing.
    #[error("SAE failure: {0}")]
    SaeFailure(String),

    /// Functionality deliberately left out of scope; surfaced as an
    /// explicit stub rather than silently guessed behavior.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}
