//! Per-node protocol state and the main loop.
//!
//! One [`Node`] is the whole protocol presence of a box: its identity, its
//! role, its mirror of the membership, and the collaborators it drives.
//! [`Node::run`] is the single-threaded cooperative loop described by the
//! protocol; [`Node::startup`] and [`Node::step`] are exposed separately
//! so an embedder (or a test harness) can drive rounds by hand.

mod election;
mod follower;
mod leader;

use crate::cancel::CancelToken;
use crate::member::{MemberTable, TrackSlot};
use crate::port::{Clock, Player, Radio, StatusSink, WallMillis};
use crate::timing::Timings;
use chorus_proto::{Addr, Frame, Message};
use core::fmt;
use core::time::Duration;
use std::io;

/// The two protocol roles. Reserves are followers whose slot is
/// [`TrackSlot::Reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Leader => "leader",
            Self::Follower => "follower",
        })
    }
}

/// One node of the fleet.
pub struct Node<R, C, P, S> {
    id: Addr,
    role: Role,
    /// Own assignment. `None` until admitted, and again after eviction.
    track: Option<TrackSlot>,
    /// The leader whose frames we act on. Equals `id` while leading.
    leader: Addr,
    members: MemberTable,
    /// Instant the leader's stem started, from the last song broadcast.
    leader_started_at: Option<WallMillis>,
    /// Which catalog entry the fleet is currently playing.
    song_index: Option<u16>,
    timings: Timings,
    cancel: CancelToken,
    radio: R,
    clock: C,
    player: P,
    status: S,
}

impl<R: Radio, C: Clock, P: Player, S: StatusSink> Node<R, C, P, S> {
    pub fn new(
        id: Addr,
        timings: Timings,
        cancel: CancelToken,
        radio: R,
        clock: C,
        player: P,
        status: S,
    ) -> Self {
        Self {
            id,
            role: Role::Follower,
            track: None,
            leader: Addr::ZERO,
            members: MemberTable::new(0),
            leader_started_at: None,
            song_index: None,
            timings,
            cancel,
            radio,
            clock,
            player,
            status,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> Addr {
        self.id
    }

    #[inline(always)]
    pub fn role(&self) -> Role {
        self.role
    }

    #[inline(always)]
    pub fn leader(&self) -> Addr {
        self.leader
    }

    /// Own assignment: `None` when unadmitted or evicted.
    #[inline(always)]
    pub fn own_track(&self) -> Option<TrackSlot> {
        self.track
    }

    #[inline(always)]
    pub fn members(&self) -> &MemberTable {
        &self.members
    }

    /// The song currently in flight, as `(start instant, song index)`.
    #[inline(always)]
    pub fn song_context(&self) -> Option<(WallMillis, u16)> {
        self.leader_started_at.zip(self.song_index)
    }

    /// Boot sequence: a passive listen, then either join the group that is
    /// already on the air or seed a new one as its leader.
    pub fn startup(&mut self) -> io::Result<()> {
        log::info!("{}: listening for an existing group", self.id);
        match self.recv(self.timings.wait_for_attendance)? {
            Some(frame) => self.join_via_attendance(Some(frame)),
            None => self.seed_group(),
        }
    }

    /// Runs one duty-cycle round for the current role.
    ///
    /// Returns `false` when the loop should exit: cancellation, or a
    /// follower left alone on a silent channel.
    pub fn step(&mut self) -> io::Result<bool> {
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        log::debug!("{}: {}", self.id, self.members);
        match self.role {
            Role::Leader => {
                self.leader_round()?;
                Ok(true)
            }
            Role::Follower => self.follower_round(),
        }
    }

    /// The whole protocol: startup, then rounds until cancelled or alone.
    pub fn run(&mut self) -> io::Result<()> {
        self.startup()?;
        while self.step()? {}
        self.player.stop();
        log::info!("{}: protocol loop stopped", self.id);
        Ok(())
    }

    // ---- plumbing shared by both roles ----

    pub(crate) fn recv(&mut self, timeout: Duration) -> io::Result<Option<Frame>> {
        let frame = self.radio.receive(timeout)?;
        if let Some(frame) = &frame {
            log::trace!("{}: rx {frame}", self.id);
        }
        Ok(frame)
    }

    pub(crate) fn send(&mut self, message: Message, duration: Duration) -> io::Result<()> {
        let frame = message.to_frame();
        log::trace!("{}: tx {frame}", self.id);
        self.radio.send(&frame, duration, &self.cancel)
    }

    pub(crate) fn set_role(&mut self, role: Role) {
        if self.role != role {
            self.role = role;
            self.status.role_changed(role);
        }
    }

    pub(crate) fn set_own_track(&mut self, track: Option<TrackSlot>) {
        if self.track != track {
            self.track = track;
            self.status.track_changed(track);
        }
    }

    /// Milliseconds left until `deadline`, if any.
    pub(crate) fn remaining(&self, deadline: WallMillis) -> Option<Duration> {
        let now = self.clock.now_ms();
        (now < deadline).then(|| Duration::from_millis(deadline - now))
    }

    pub(crate) fn deadline_after(&self, duration: Duration) -> WallMillis {
        self.clock.now_ms() + duration.as_millis() as WallMillis
    }

    /// Declares this node the leader of a brand-new group.
    fn seed_group(&mut self) -> io::Result<()> {
        log::info!("{}: channel silent, leading a new group", self.id);
        self.leader = self.id;
        self.set_role(Role::Leader);
        self.set_own_track(Some(TrackSlot::Assigned(0)));
        self.members.admit(self.id, TrackSlot::Assigned(0));
        self.send(Message::Attendance { leader: self.id }, self.timings.single_send)
    }

    /// Waits for an attendance beacon (the frame in hand may already be
    /// one), records its leader, seats it in row 0, and answers it.
    ///
    /// Used both at boot and when an evicted node wants back in.
    pub(crate) fn join_via_attendance(&mut self, first: Option<Frame>) -> io::Result<()> {
        let mut frame = first;
        let leader = loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            match frame.as_ref().and_then(Message::from_frame) {
                Some(Message::Attendance { leader }) => break leader,
                _ => {
                    log::debug!("{}: channel busy, waiting for the beacon", self.id);
                    frame = self.recv(self.timings.attendance_seek)?;
                }
            }
        };

        log::info!("{}: joining the group led by {leader}", self.id);
        self.leader = leader;
        self.set_role(Role::Follower);
        self.members.seat_leader(leader);
        self.send(
            Message::Response {
                node: self.id,
                leader,
            },
            self.timings.attendance_response,
        )
    }

    /// Applies a table-side promotion to our own state when we are the
    /// reserve that won it, late-joining the running song if one is known.
    pub(crate) fn apply_promotion(&mut self, addr: Addr, track: u16) {
        log::info!("{}: reserve {addr} promoted to track {track}", self.id);
        if addr != self.id {
            return;
        }
        self.set_own_track(Some(TrackSlot::Assigned(track)));
        if let Some((started_at, song_index)) = self.song_context() {
            if let Err(error) = self.player.play_synced(song_index, track, started_at) {
                log::warn!("{}: could not pick up track {track}: {error}", self.id);
            }
        }
    }
}
