//! Commonly used types, re-exported for `use mesh_mpm::prelude::*;`.

pub use crate::addr::MacAddr;
pub use crate::ampe::{AmpeUpdate, AmpePayload};
pub use crate::config::MeshConfig;
pub use crate::driver::{CipherSuite, KeyTarget, MeshDriver, StaAddParams, StaFlags};
pub use crate::error::{MeshError, Result};
pub use crate::frame::{MeshPeeringMgmt, ParsedFrame, SelfProtectedAction};
pub use crate::mpm::{PlinkEvent, PlinkState};
pub use crate::peer::{PeerRecord, PeerTable, PeerTimerId, TimerKind};
pub use crate::rsn::RsnContext;
pub use crate::sae::{RefSaeExchange, SaeExchange, SaeOutcome, SaeSession, SaeState};
pub use crate::station::{MeshStation, SaeFactory, StationEvent};
