#![no_std]
//! The on-air control protocol spoken by a fleet of singing boxes.
//!
//! A small group of single-board radios shares one narrowband sub-GHz
//! channel and plays one multi-track song together, one stem per node. This
//! crate defines the control frames they exchange to agree on who is in the
//! group, who leads it, which stem each member plays, and when playback
//! started.
//!
//! ## Roles
//!
//! Each node acts as either the **leader** or a **follower**:
//!
//! - The **leader** announces membership, assigns stems, probes liveness,
//!   and broadcasts the playback start instant.
//! - **Followers** answer the leader's probes and keep a mirror of the
//!   membership it announces. Followers holding no stem are *reserves*.
//!
//! ## Frame model
//!
//! Every exchange is a single self-contained frame, 116 bits wide,
//! described in [`frame`]. The same four slots are reused by every opcode;
//! the [`message`] module projects a frame into a typed view whose variants
//! carry only the fields that are meaningful for that opcode, so protocol
//! code never reads a raw slot at a call site.
//!
//! The channel is lossy and frames are never acknowledged at this layer.
//! Senders compensate by repeating a frame for a fixed duration with
//! jittered gaps; receivers compensate by tolerating duplicates (every
//! operation in the protocol is idempotent per frame).

pub mod frame;
pub mod message;

pub use frame::{Frame, MalformedFrame, Opcode};
pub use message::Message;

use core::fmt;

/// A 48-bit node identifier, unique within the fleet.
///
/// In practice this is the node's NIC MAC address, which gives the fleet
/// stable, collision-free identities with no coordination. Identifiers
/// order the fleet: elections are won by the numerically largest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Addr(u64);

impl Addr {
    /// Width of an identifier on the wire.
    pub const BITS: u32 = 48;

    /// The all-zero identifier, used where an address slot is unused.
    pub const ZERO: Self = Self(0);

    /// The largest representable identifier.
    pub const MAX: Self = Self((1 << Self::BITS) - 1);

    /// Builds an identifier from a raw integer, discarding bits above 48.
    #[inline(always)]
    pub const fn new(raw: u64) -> Self {
        Self(raw & Self::MAX.0)
    }

    /// Returns the identifier as an integer.
    #[inline(always)]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012x}", self.0)
    }
}

impl From<Addr> for u64 {
    #[inline(always)]
    fn from(addr: Addr) -> Self {
        addr.get()
    }
}
