//! Channel constants and the protocol timing profile.

use core::time::Duration;

/// PHY parameters every radio backend must configure identically, so that
/// the whole fleet actually shares one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelProfile {
    pub base_freq_hz: u64,
    pub symbol_rate_baud: u32,
    /// OOK off/on power levels. `0xC0` is the CC1101's maximum.
    pub power_profile: (u8, u8),
}

/// The one channel the fleet talks on.
pub const CHANNEL: ChannelProfile = ChannelProfile {
    base_freq_hz: 433_920_000,
    symbol_rate_baud: 4800,
    power_profile: (0x00, 0xC0),
};

/// Bounds of the random gap between frame repetitions inside one send.
///
/// The lower bound must stay strictly positive or the PHY errors out on
/// back-to-back transmissions.
pub const SEND_GAP_MIN: Duration = Duration::from_millis(50);
pub const SEND_GAP_MAX: Duration = Duration::from_millis(500);

/// Gain taken off every stem so the summed mix keeps some headroom.
pub const REDUCE_VOLUME_DB: f32 = 5.0;

/// Every timeout and delay the state machine uses.
///
/// Defaults are the values the protocol was tuned with on the 4800 baud
/// channel; a configuration file may override individual entries, but all
/// nodes of one fleet should run the same profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Boot-time passive listen before declaring ourselves leader.
    pub wait_for_attendance: Duration,
    /// Inner wait for the attendance beacon itself once the channel is
    /// known to be busy.
    pub attendance_seek: Duration,
    /// Send duration of a follower's attendance response, and the window
    /// in which the leader collects such responses.
    pub attendance_response: Duration,
    /// Pause between consecutive membership list rows.
    pub send_list_delay: Duration,
    /// How long the leader waits for one follower's check-in response.
    pub wait_for_check_in_response: Duration,
    /// Send duration of a follower's check-in response.
    pub check_in_response: Duration,
    /// Leader-side pause between probing two followers, and follower-side
    /// pause before answering a probe.
    pub check_in_delay: Duration,
    /// Follower listen bound; silence for this long triggers an election.
    pub follower_listen: Duration,
    /// Baseline send duration for a single broadcast.
    pub single_send: Duration,
    /// Lead time between announcing a song and its start instant.
    pub song_start_offset: Duration,
    /// Consecutive unanswered check-ins tolerated before eviction. Absorbs
    /// ordinary packet loss on the noisy channel.
    pub max_missed_check_ins: u8,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            wait_for_attendance: Duration::from_secs(2),
            attendance_seek: Duration::from_secs(5),
            attendance_response: Duration::from_millis(1500),
            send_list_delay: Duration::from_millis(100),
            wait_for_check_in_response: Duration::from_millis(1500),
            check_in_response: Duration::from_secs(1),
            check_in_delay: Duration::from_millis(500),
            follower_listen: Duration::from_secs(4),
            single_send: Duration::from_millis(500),
            song_start_offset: Duration::from_secs(2),
            max_missed_check_ins: 2,
        }
    }
}
