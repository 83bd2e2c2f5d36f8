//! Node-side implementation of the chorus group-synchronisation protocol.
//!
//! This crate contains everything that runs on a box: the membership table
//! kept in lock-step across the fleet, the per-node state machine, the
//! leader's duty cycle, the follower's dispatch loop, the election rules,
//! and the timing profile of the shared channel.
//!
//! ## Scope
//!
//! The crate is deliberately transport- and hardware-agnostic. Everything
//! it needs from the outside world comes in through four small contracts
//! defined in [`port`]:
//!
//! - [`Radio`](port::Radio), the shared-channel PHY (a CC1101 in
//!   production, UDP broadcast on a bench)
//! - [`Clock`](port::Clock), wall time and sleeping
//! - [`Player`](port::Player), the song catalog and stem playback
//! - [`StatusSink`](port::StatusSink), the local role/track display
//!
//! The protocol itself is single-threaded and cooperative: one loop, one
//! thread, every blocking operation bounded by an explicit timeout, and a
//! single shared [`CancelToken`](cancel::CancelToken) polled at the top of
//! each round and inside every send gap. The only other thread in the
//! system belongs to the audio collaborator and is controlled exclusively
//! through `is_playing` and `stop`.

pub mod cancel;
pub mod member;
pub mod node;
pub mod port;
pub mod timing;

pub use cancel::CancelToken;
pub use member::{Member, MemberTable, TrackSlot};
pub use node::{Node, Role};
pub use port::{Clock, LogStatus, PlayError, Player, Radio, StatusSink, SystemClock, WallMillis};
pub use timing::Timings;

pub use chorus_proto as proto;
