//! Follower dispatch: one bounded listen, one action per opcode.

use super::Node;
use crate::member::TrackSlot;
use crate::port::{Clock, Player, Radio, StatusSink, WallMillis};
use chorus_proto::{Addr, Message};
use std::io;

impl<R: Radio, C: Clock, P: Player, S: StatusSink> Node<R, C, P, S> {
    /// One follower round. Returns `false` when the node is alone on a
    /// silent channel and the loop should exit.
    pub(super) fn follower_round(&mut self) -> io::Result<bool> {
        let Some(frame) = self.recv(self.timings.follower_listen)? else {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            if self.members.is_empty() {
                log::info!("{}: nobody out there, shutting down", self.id);
                return Ok(false);
            }
            self.elect_leader();
            return Ok(true);
        };

        let Some(message) = Message::from_frame(&frame) else {
            // Reserved opcode: defined, but carries no behaviour yet.
            return Ok(true);
        };

        // Traffic from any other leader is stale or rival noise. The one
        // exception: a node holding no assignment latches onto whichever
        // beacon it hears, so an evicted box can find its way back.
        let rejoin_beacon =
            matches!(message, Message::Attendance { .. }) && self.track.is_none();
        if message.leader() != self.leader && !rejoin_beacon {
            log::trace!(
                "{}: dropping frame from unknown leader {}",
                self.id,
                message.leader()
            );
            return Ok(true);
        }

        match message {
            Message::List { node, track, .. } => self.on_list_row(node, track),
            Message::Attendance { .. } if self.track.is_none() => {
                self.join_via_attendance(Some(frame))?
            }
            // The periodic beacon; we are already seated.
            Message::Attendance { .. } => {}
            Message::Song {
                start_ms,
                song_index,
                ..
            } => self.on_song(start_ms, song_index, false),
            Message::SongJoin {
                start_ms,
                song_index,
                ..
            } => self.on_song(start_ms, song_index, true),
            Message::CheckIn { node, .. } if node == self.id => self.answer_check_in()?,
            Message::CheckIn { .. } | Message::Response { .. } => {}
            Message::Delete { node, .. } => self.on_delete(node),
        }
        Ok(true)
    }

    /// One row of the leader's membership snapshot.
    fn on_list_row(&mut self, node: Addr, track: Option<u16>) {
        let slot = TrackSlot::from_wire(track);
        if self.members.contains(node) {
            self.members.set_track(node, slot);
        } else {
            self.members.admit(node, slot);
        }
        if node == self.id {
            self.set_own_track(Some(slot));
        }
    }

    /// A song (re)start. `late_join` rows are only honoured while idle,
    /// so a mid-song republish cannot restart running stems.
    fn on_song(&mut self, start_ms: WallMillis, song_index: u16, late_join: bool) {
        if late_join && self.player.is_playing() {
            return;
        }

        self.leader_started_at = Some(start_ms);
        self.song_index = Some(song_index);
        let num_tracks = self.player.track_count(song_index);
        self.members.set_num_tracks(num_tracks);

        let Some(TrackSlot::Assigned(track)) = self.track else {
            // Reserves keep the song context and wait for a promotion.
            return;
        };
        if track as usize >= num_tracks {
            // This song has fewer stems than our index; sit it out.
            self.set_own_track(Some(TrackSlot::Reserve));
            self.members.set_track(self.id, TrackSlot::Reserve);
            return;
        }
        if let Err(error) = self.player.play_synced(song_index, track, start_ms) {
            log::warn!("{}: could not start stem {track}: {error}", self.id);
        }
    }

    /// A liveness probe addressed to us.
    fn answer_check_in(&mut self) -> io::Result<()> {
        // Give the leader time to turn around from transmit to receive.
        self.clock.sleep(self.timings.check_in_delay);
        // Row 0 holds the leader; the attendance flow seated it there.
        let leader = self
            .members
            .iter()
            .next()
            .map(|m| m.addr)
            .unwrap_or(self.leader);
        self.send(
            Message::Response {
                node: self.id,
                leader,
            },
            self.timings.check_in_response,
        )
    }

    /// A fleet-wide eviction, possibly of ourselves.
    fn on_delete(&mut self, node: Addr) {
        if node == self.id {
            log::warn!(
                "{}: evicted by the leader, rejoining at the next beacon",
                self.id
            );
            self.player.stop();
            self.set_own_track(None);
        }

        let Some(removed) = self.members.remove(node) else {
            return;
        };
        log::info!("{}: removed {node} from the group", self.id);
        if removed.track.index().is_some() {
            if let Some((addr, track)) = self.members.promote_first_reserve() {
                self.apply_promotion(addr, track);
            }
        }
    }
}
