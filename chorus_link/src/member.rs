//! The membership table every node keeps in lock-step with the leader.
//!
//! Insertion order is part of the protocol: the leader sweeps the table in
//! that order when checking in, and "the first reserve" (the one promoted
//! into a freed track) is the reserve at the smallest insertion position.

use chorus_proto::Addr;
use core::fmt;

/// A member's stem assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSlot {
    /// Plays the stem at this index of the current song.
    Assigned(u16),
    /// Holds no stem; promoted when one frees up.
    Reserve,
}

impl TrackSlot {
    /// The assigned index, if any.
    #[inline(always)]
    pub const fn index(self) -> Option<u16> {
        match self {
            Self::Assigned(index) => Some(index),
            Self::Reserve => None,
        }
    }

    #[inline(always)]
    pub const fn is_reserve(self) -> bool {
        matches!(self, Self::Reserve)
    }

    /// Maps the wire-level options slot (`None` is the -1 sentinel).
    #[inline(always)]
    pub const fn from_wire(options: Option<u16>) -> Self {
        match options {
            Some(index) => Self::Assigned(index),
            None => Self::Reserve,
        }
    }

    #[inline(always)]
    pub const fn to_wire(self) -> Option<u16> {
        self.index()
    }
}

impl fmt::Display for TrackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assigned(index) => write!(f, "track {index}"),
            Self::Reserve => f.write_str("reserve"),
        }
    }
}

/// One row of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub addr: Addr,
    pub track: TrackSlot,
    /// Unanswered check-ins so far. Only the leader advances this.
    pub missed: u8,
}

/// Insertion-ordered set of known peers and their assignments.
#[derive(Debug, Clone, Default)]
pub struct MemberTable {
    members: Vec<Member>,
    num_tracks: usize,
}

impl MemberTable {
    pub fn new(num_tracks: usize) -> Self {
        Self {
            members: Vec::new(),
            num_tracks,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Member> {
        self.members.iter()
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.get(addr).is_some()
    }

    pub fn get(&self, addr: Addr) -> Option<&Member> {
        self.members.iter().find(|m| m.addr == addr)
    }

    pub fn get_mut(&mut self, addr: Addr) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.addr == addr)
    }

    /// Appends a newly admitted member.
    pub fn admit(&mut self, addr: Addr, track: TrackSlot) {
        self.members.push(Member {
            addr,
            track,
            missed: 0,
        });
    }

    /// Puts the leader in row 0 with track 0, unless it is already known.
    ///
    /// Row 0 is where the check-in response flow expects to find the
    /// leader afterwards.
    pub fn seat_leader(&mut self, addr: Addr) {
        if !self.contains(addr) {
            self.members.insert(
                0,
                Member {
                    addr,
                    track: TrackSlot::Assigned(0),
                    missed: 0,
                },
            );
        }
    }

    /// Removes and returns the member with the given identifier.
    pub fn remove(&mut self, addr: Addr) -> Option<Member> {
        let position = self.members.iter().position(|m| m.addr == addr)?;
        Some(self.members.remove(position))
    }

    /// Reassigns one member's slot. Unknown identifiers are ignored.
    pub fn set_track(&mut self, addr: Addr, track: TrackSlot) {
        if let Some(member) = self.get_mut(addr) {
            member.track = track;
        }
    }

    /// Number of stems in the current song, the universe of valid indices.
    #[inline(always)]
    pub fn num_tracks(&self) -> usize {
        self.num_tracks
    }

    /// Resets the universe of valid indices when the song changes.
    pub fn set_num_tracks(&mut self, num_tracks: usize) {
        self.num_tracks = num_tracks;
    }

    /// Indices of the current song not held by any member, ascending.
    pub fn unused_tracks(&self) -> Vec<u16> {
        (0..self.num_tracks as u16)
            .filter(|&index| {
                !self
                    .members
                    .iter()
                    .any(|m| m.track.index() == Some(index))
            })
            .collect()
    }

    /// The numerically largest identifier present, the election winner.
    pub fn highest_addr(&self) -> Option<Addr> {
        self.members.iter().map(|m| m.addr).max()
    }

    /// Moves the first reserve (in insertion order) into the lowest unused
    /// track, returning who was promoted and to which index.
    pub fn promote_first_reserve(&mut self) -> Option<(Addr, u16)> {
        let track = *self.unused_tracks().first()?;
        let member = self.members.iter_mut().find(|m| m.track.is_reserve())?;
        member.track = TrackSlot::Assigned(track);
        Some((member.addr, track))
    }
}

impl fmt::Display for MemberTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "members ({} tracks):", self.num_tracks)?;
        if self.members.is_empty() {
            return f.write_str(" none");
        }
        for member in &self.members {
            write!(f, " [{} {}]", member.addr, member.track)?;
        }
        Ok(())
    }
}
