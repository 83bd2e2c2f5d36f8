//! Contracts for the collaborators the protocol engine drives.
//!
//! The engine owns one implementation of each of these and calls nothing
//! else: the radio PHY, the wall clock, the audio player, and the local
//! status display. Test suites substitute scripted implementations.

use crate::cancel::CancelToken;
use crate::member::TrackSlot;
use crate::node::Role;
use core::time::Duration;
use std::io;

/// Wall-clock milliseconds since the Unix epoch, as shared by the fleet.
///
/// Song start instants travel the wire in this unit, packed into the
/// 48-bit payload slot.
pub type WallMillis = u64;

/// The shared-channel PHY.
///
/// In production this is the CC1101 configured per
/// [`CHANNEL`](crate::timing::CHANNEL); on a bench it can be anything that
/// behaves like one lossy broadcast domain.
pub trait Radio {
    /// Transmits `frame` repeatedly for roughly `duration`.
    ///
    /// Repetition is the protocol's only defence against collisions on the
    /// unacknowledged channel. Implementations must leave a strictly
    /// positive random gap between repetitions, drawn uniformly from
    /// [`SEND_GAP_MIN`](crate::timing::SEND_GAP_MIN) to
    /// [`SEND_GAP_MAX`](crate::timing::SEND_GAP_MAX), and must poll
    /// `cancel` in the gaps, returning early when it is set.
    fn send(
        &mut self,
        frame: &chorus_proto::Frame,
        duration: Duration,
        cancel: &CancelToken,
    ) -> io::Result<()>;

    /// Blocks up to `timeout` for one frame that passed the PHY checksum.
    ///
    /// Returns `Ok(None)` on timeout. Frames that fail the checksum or the
    /// codec never surface here; they count as silence.
    fn receive(&mut self, timeout: Duration) -> io::Result<Option<chorus_proto::Frame>>;
}

/// Monotonic-enough wall time and bounded sleeping.
pub trait Clock {
    fn now_ms(&self) -> WallMillis;
    fn sleep(&self, duration: Duration);
}

/// The process clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> WallMillis {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            // A clock before the epoch is as good as zero.
            .map_or(0, |since| since.as_millis() as WallMillis)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Raised when a stem cannot be started.
///
/// Playback failures are never fatal to the protocol; the engine logs them
/// and carries on without audio.
#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    #[error("no stem for song {song}, track {track}")]
    NoSuchStem { song: u16, track: u16 },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// The audio collaborator: the song catalog plus a one-stem player.
///
/// The player runs on its own background thread; this contract is the only
/// way the protocol touches it.
pub trait Player {
    /// Number of songs in the shared catalog.
    fn song_count(&self) -> usize;

    /// Number of stems in the given song, zero when the index is out of
    /// range.
    fn track_count(&self, song_index: u16) -> usize;

    /// Starts (or restarts) playback of one stem, aligned to the
    /// fleet-wide start instant.
    ///
    /// If `started_at_ms` is still in the future the call busy-waits until
    /// it arrives and plays from the top; if it has already passed, the
    /// elapsed time plus the player's own decode latency is trimmed off
    /// the head. Replaces whatever was playing.
    fn play_synced(
        &mut self,
        song_index: u16,
        track_index: u16,
        started_at_ms: WallMillis,
    ) -> Result<(), PlayError>;

    /// Whether a stem is currently audible (or about to be).
    fn is_playing(&self) -> bool;

    /// Stops playback. Idempotent.
    fn stop(&mut self);
}

/// The local user-facing status surface.
pub trait StatusSink {
    fn role_changed(&mut self, role: Role);
    /// `None` means the node holds no assignment at all (evicted or not
    /// yet admitted).
    fn track_changed(&mut self, track: Option<TrackSlot>);
}

/// Status sink that narrates changes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn role_changed(&mut self, role: Role) {
        log::info!("role: {role}");
    }

    fn track_changed(&mut self, track: Option<TrackSlot>) {
        match track {
            Some(slot) => log::info!("assignment: {slot}"),
            None => log::info!("assignment cleared"),
        }
    }
}
