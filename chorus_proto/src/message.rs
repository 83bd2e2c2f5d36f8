//! Typed view of the frame model.
//!
//! Protocol code builds and matches on [`Message`], whose variants expose
//! only the slots that are meaningful for each opcode. The projection to
//! and from the raw [`Frame`] slots lives here, in one place, so the rest
//! of the codebase never does slot arithmetic.

use crate::frame::{Frame, Opcode};
use crate::Addr;

/// Mask applied to the start instant before it rides the 48-bit slot.
const START_MS_MASK: u64 = (1 << Addr::BITS) - 1;

/// One protocol message, as acted upon by nodes.
///
/// Every variant carries the identifier of the leader it belongs to;
/// followers use it to discard traffic from stale or rival leaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Leader beacon soliciting responses from nodes not yet in the group.
    Attendance { leader: Addr },
    /// Follower acknowledgement of an `Attendance` or `CheckIn`.
    Response { node: Addr, leader: Addr },
    /// Song announcement: which song, and the wall-clock millisecond at
    /// which the leader's own stem starts.
    Song {
        start_ms: u64,
        leader: Addr,
        song_index: u16,
    },
    /// Like `Song`, but emitted mid-song so a newcomer can join the mix.
    SongJoin {
        start_ms: u64,
        leader: Addr,
        song_index: u16,
    },
    /// One membership row: `node` holds `track`, `None` meaning reserve.
    List {
        node: Addr,
        leader: Addr,
        track: Option<u16>,
    },
    /// Liveness probe addressed to one follower.
    CheckIn { node: Addr, leader: Addr },
    /// Fleet-wide eviction of one member.
    Delete { node: Addr, leader: Addr },
}

impl Message {
    /// Projects a decoded frame into its typed view.
    ///
    /// Returns `None` for the reserved opcodes, which receivers must
    /// ignore without treating the frame as noise.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let leader = frame.leader;
        Some(match frame.action {
            Opcode::Attendance => Self::Attendance { leader },
            Opcode::Response => Self::Response {
                node: Addr::new(frame.follow),
                leader,
            },
            Opcode::Song => Self::Song {
                start_ms: frame.follow,
                leader,
                song_index: frame.options.unwrap_or(0),
            },
            Opcode::SongJoin => Self::SongJoin {
                start_ms: frame.follow,
                leader,
                song_index: frame.options.unwrap_or(0),
            },
            Opcode::List => Self::List {
                node: Addr::new(frame.follow),
                leader,
                track: frame.options,
            },
            Opcode::CheckIn => Self::CheckIn {
                node: Addr::new(frame.follow),
                leader,
            },
            Opcode::Delete => Self::Delete {
                node: Addr::new(frame.follow),
                leader,
            },
            Opcode::FirstList | Opcode::NewLeader => return None,
        })
    }

    /// The leader this message belongs to.
    pub const fn leader(&self) -> Addr {
        match *self {
            Self::Attendance { leader }
            | Self::Response { leader, .. }
            | Self::Song { leader, .. }
            | Self::SongJoin { leader, .. }
            | Self::List { leader, .. }
            | Self::CheckIn { leader, .. }
            | Self::Delete { leader, .. } => leader,
        }
    }

    /// Packs the message back into raw frame slots.
    pub const fn to_frame(&self) -> Frame {
        match *self {
            Self::Attendance { leader } => Frame {
                action: Opcode::Attendance,
                follow: 0,
                leader,
                options: Some(0),
            },
            Self::Response { node, leader } => Frame {
                action: Opcode::Response,
                follow: node.get(),
                leader,
                options: Some(0),
            },
            Self::Song {
                start_ms,
                leader,
                song_index,
            } => Frame {
                action: Opcode::Song,
                follow: start_ms & START_MS_MASK,
                leader,
                options: Some(song_index),
            },
            Self::SongJoin {
                start_ms,
                leader,
                song_index,
            } => Frame {
                action: Opcode::SongJoin,
                follow: start_ms & START_MS_MASK,
                leader,
                options: Some(song_index),
            },
            Self::List {
                node,
                leader,
                track,
            } => Frame {
                action: Opcode::List,
                follow: node.get(),
                leader,
                options: track,
            },
            Self::CheckIn { node, leader } => Frame {
                action: Opcode::CheckIn,
                follow: node.get(),
                leader,
                options: Some(0),
            },
            Self::Delete { node, leader } => Frame {
                action: Opcode::Delete,
                follow: node.get(),
                leader,
                options: Some(0),
            },
        }
    }
}

impl From<Message> for Frame {
    #[inline(always)]
    fn from(message: Message) -> Self {
        message.to_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEADER: Addr = Addr::new(0xAAAA_BBBB_CCCC);
    const NODE: Addr = Addr::new(0x0102_0304_0506);

    #[test]
    fn messages_survive_the_wire() {
        let messages = [
            Message::Attendance { leader: LEADER },
            Message::Response {
                node: NODE,
                leader: LEADER,
            },
            Message::Song {
                start_ms: 1_722_000_123_456 & START_MS_MASK,
                leader: LEADER,
                song_index: 3,
            },
            Message::SongJoin {
                start_ms: 42,
                leader: LEADER,
                song_index: 0,
            },
            Message::List {
                node: NODE,
                leader: LEADER,
                track: Some(1),
            },
            Message::List {
                node: NODE,
                leader: LEADER,
                track: None,
            },
            Message::CheckIn {
                node: NODE,
                leader: LEADER,
            },
            Message::Delete {
                node: NODE,
                leader: LEADER,
            },
        ];

        for sent in messages {
            let frame = Frame::decode(&sent.to_frame().encode()).unwrap();
            assert_eq!(Message::from_frame(&frame), Some(sent));
        }
    }

    #[test]
    fn reserve_rows_keep_their_sentinel() {
        let row = Message::List {
            node: NODE,
            leader: LEADER,
            track: None,
        };
        let frame = Frame::decode(&row.to_frame().encode()).unwrap();
        let Some(Message::List { track, .. }) = Message::from_frame(&frame) else {
            panic!("not a list row");
        };
        assert_eq!(track, None);
    }

    #[test]
    fn reserved_opcodes_project_to_nothing() {
        for action in [Opcode::FirstList, Opcode::NewLeader] {
            let frame = Frame {
                action,
                follow: NODE.get(),
                leader: LEADER,
                options: Some(0),
            };
            assert!(action.is_reserved());
            assert_eq!(Message::from_frame(&frame), None);
        }
    }

    #[test]
    fn start_instants_ride_the_follow_slot() {
        let sent = Message::Song {
            start_ms: 0x1234_5678_9ABC,
            leader: LEADER,
            song_index: 7,
        };
        let frame = sent.to_frame();
        assert_eq!(frame.follow, 0x1234_5678_9ABC);
        assert_eq!(frame.options, Some(7));
    }
}
