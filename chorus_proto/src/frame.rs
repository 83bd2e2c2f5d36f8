//! The 116-bit on-air frame: bit layout, packing and unpacking.
//!
//! A frame is one unsigned integer serialised big-endian with the minimum
//! number of bytes that cover its most significant set bit. The radio adds a
//! one-byte length prefix and a CRC around it; both are stripped before the
//! bytes reach this module, and frames failing the CRC never reach it at
//! all.

use crate::Addr;
use core::fmt;

// Slot layout, least significant bits first.
//
// | bits    | slot        |
// |---------|-------------|
// | 0..4    | ACTION      |
// | 4..52   | FOLLOW_ADDR |
// | 52..100 | LEADER_ADDR |
// | 100..116| OPTIONS     |

const ACTION_BITS: u32 = 4;
const ACTION_MASK: u128 = (1 << ACTION_BITS) - 1;

const ADDR_MASK: u128 = (1 << Addr::BITS) - 1;
const FOLLOW_SHIFT: u32 = ACTION_BITS;
const LEADER_SHIFT: u32 = FOLLOW_SHIFT + Addr::BITS;

const OPTIONS_BITS: u32 = 16;
const OPTIONS_SHIFT: u32 = LEADER_SHIFT + Addr::BITS;

// The all-ones OPTIONS value is the two's complement encoding of -1 and
// marks the slot as carrying no index (a reserve, in membership frames).
const OPTIONS_NONE: u16 = u16::MAX;

/// Total width of a frame in bits.
pub const FRAME_BITS: u32 = OPTIONS_SHIFT + OPTIONS_BITS;

/// Longest possible serialised frame.
pub const MAX_FRAME_BYTES: usize = FRAME_BITS.div_ceil(8) as usize;

/// Frame opcodes.
///
/// `FirstList` and `NewLeader` are reserved: the codec accepts them so a
/// newer sender does not look like noise, but receivers act on neither (see
/// [`Message::from_frame`](crate::Message::from_frame)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Follower acknowledging an `Attendance` or `CheckIn`.
    Response = 0x1,
    /// Leader announcing a song and its start instant.
    Song = 0x2,
    /// Reserved, never emitted.
    FirstList = 0x3,
    /// One row of the leader's membership snapshot.
    List = 0x4,
    /// Leader probing one follower for liveness.
    CheckIn = 0x5,
    /// Leader evicting a member, fleet-wide.
    Delete = 0x6,
    /// Leader soliciting responses from nodes it does not know yet.
    Attendance = 0x8,
    /// Leader re-broadcasting the running song so a late joiner can sync.
    SongJoin = 0xC,
    /// Reserved, never emitted.
    NewLeader = 0xF,
}

impl Opcode {
    /// Maps the 4-bit wire value to an opcode.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        Some(match bits {
            0x1 => Self::Response,
            0x2 => Self::Song,
            0x3 => Self::FirstList,
            0x4 => Self::List,
            0x5 => Self::CheckIn,
            0x6 => Self::Delete,
            0x8 => Self::Attendance,
            0xC => Self::SongJoin,
            0xF => Self::NewLeader,
            _ => return None,
        })
    }

    /// The opcode's 4-bit wire value.
    #[inline(always)]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Whether the opcode is defined but carries no behaviour.
    #[inline(always)]
    pub const fn is_reserved(self) -> bool {
        matches!(self, Self::FirstList | Self::NewLeader)
    }
}

/// Raised when incoming bytes cannot be a frame of this protocol.
///
/// Receivers treat a malformed frame exactly like silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MalformedFrame {
    /// The 4-bit action slot holds a value outside the opcode table.
    #[error("unknown opcode {0:#03x}")]
    UnknownOpcode(u8),
    /// The payload has set bits above the 116-bit layout.
    #[error("payload of {0} bytes does not fit the frame layout")]
    Oversized(usize),
}

/// One decoded on-air frame.
///
/// This is the raw slot view. The `follow` slot is kept as a plain integer
/// because its meaning depends on the opcode: an addressee identifier for
/// most frames, but the packed start-instant payload for `Song` and
/// `SongJoin`. Use [`Message`](crate::Message) for the typed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub action: Opcode,
    /// 48-bit slot: addressee identifier or song-start milliseconds.
    pub follow: u64,
    /// Identifier of the leader this frame belongs to.
    pub leader: Addr,
    /// 16-bit slot: track or song index. `None` is the all-ones sentinel,
    /// transmitted as two's complement -1, so downstream code can never
    /// confuse "no track" with track 65535.
    pub options: Option<u16>,
}

impl Frame {
    /// Packs the frame into its wire bytes, shortest encoding first.
    ///
    /// Frames whose high slots are zero serialise to fewer bytes; a
    /// `Response` with zero addresses is a single byte. The length prefix
    /// the radio expects is not included here.
    pub fn encode(&self) -> arrayvec::ArrayVec<u8, MAX_FRAME_BYTES> {
        let mut word = self.action.bits() as u128;
        word |= ((self.follow as u128) & ADDR_MASK) << FOLLOW_SHIFT;
        word |= (self.leader.get() as u128) << LEADER_SHIFT;
        word |= (self.options.unwrap_or(OPTIONS_NONE) as u128) << OPTIONS_SHIFT;

        // A frame always has at least its action bits set, so the minimum
        // encoding is one byte.
        let n_bytes = ((u128::BITS - word.leading_zeros()).div_ceil(8) as usize).max(1);

        let mut out = arrayvec::ArrayVec::new_const();
        out.extend(
            word.to_be_bytes()
                .into_iter()
                .skip(size_of::<u128>() - n_bytes),
        );
        out
    }

    /// Unpacks wire bytes into a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedFrame> {
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(MalformedFrame::Oversized(bytes.len()));
        }

        let mut word = 0u128;
        for &byte in bytes {
            word = (word << 8) | byte as u128;
        }

        if word >> FRAME_BITS != 0 {
            return Err(MalformedFrame::Oversized(bytes.len()));
        }

        let action_bits = (word & ACTION_MASK) as u8;
        let action =
            Opcode::from_bits(action_bits).ok_or(MalformedFrame::UnknownOpcode(action_bits))?;

        let raw_options = (word >> OPTIONS_SHIFT) as u16;

        Ok(Self {
            action,
            follow: ((word >> FOLLOW_SHIFT) as u64) & ADDR_MASK as u64,
            leader: Addr::new((word >> LEADER_SHIFT) as u64),
            options: (raw_options != OPTIONS_NONE).then_some(raw_options),
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} follow={:#014x} leader={} options=",
            self.action, self.follow, self.leader
        )?;
        match self.options {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("-1"),
        }
    }
}
