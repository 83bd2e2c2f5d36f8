//! The leader's duty cycle: song management, check-in sweep, attendance.

use super::{Node, Role};
use crate::member::TrackSlot;
use crate::port::{Clock, Player, Radio, StatusSink};
use chorus_proto::{Addr, Message};
use rand::Rng;
use std::io;

impl<R: Radio, C: Clock, P: Player, S: StatusSink> Node<R, C, P, S> {
    /// One full round. Order matters: the sweep completes before the
    /// beacon, and a new song is only started while nothing is playing.
    pub(super) fn leader_round(&mut self) -> io::Result<()> {
        if !self.player.is_playing() {
            self.start_song()?;
        }
        if self.role != Role::Leader {
            return Ok(());
        }
        self.check_in_sweep()?;
        if self.role != Role::Leader {
            return Ok(());
        }
        self.attendance_round()
    }

    /// Picks a song at random, broadcasts its start instant, and starts
    /// our own stem exactly at that instant.
    fn start_song(&mut self) -> io::Result<()> {
        let songs = self.player.song_count();
        if songs == 0 {
            log::warn!("{}: catalog is empty, nothing to start", self.id);
            return Ok(());
        }

        let song_index = rand::thread_rng().gen_range(0..songs) as u16;
        let start_at = self.deadline_after(self.timings.song_start_offset);
        log::info!("{}: starting song {song_index} at {start_at}", self.id);
        self.send(
            Message::Song {
                start_ms: start_at,
                leader: self.id,
                song_index,
            },
            self.timings.single_send,
        )?;

        self.members.set_num_tracks(self.player.track_count(song_index));
        self.leader_started_at = Some(start_at);
        self.song_index = Some(song_index);

        // play_synced busy-waits out the remaining offset, so our stem
        // begins at the same instant we just broadcast.
        if let Some(TrackSlot::Assigned(track)) = self.track {
            if (track as usize) < self.members.num_tracks() {
                if let Err(error) = self.player.play_synced(song_index, track, start_at) {
                    log::warn!("{}: could not start own stem: {error}", self.id);
                }
            }
        }
        Ok(())
    }

    /// Probes every other member in insertion order, evicting the ones
    /// that stay silent too often.
    fn check_in_sweep(&mut self) -> io::Result<()> {
        let peers: Vec<Addr> = self
            .members
            .iter()
            .map(|m| m.addr)
            .filter(|&addr| addr != self.id)
            .collect();

        for peer in peers {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            self.send(
                Message::CheckIn {
                    node: peer,
                    leader: self.id,
                },
                self.timings.single_send,
            )?;

            let responded = self.await_check_in(peer)?;
            if self.role != Role::Leader {
                return Ok(());
            }
            if !responded {
                self.record_miss(peer)?;
            }
            self.clock.sleep(self.timings.check_in_delay);
        }
        Ok(())
    }

    /// Waits for `peer`'s response, discarding unrelated traffic but still
    /// watching for a rival beacon.
    fn await_check_in(&mut self, peer: Addr) -> io::Result<bool> {
        let deadline = self.deadline_after(self.timings.wait_for_check_in_response);
        while let Some(left) = self.remaining(deadline) {
            let Some(frame) = self.recv(left)? else {
                return Ok(false);
            };
            match Message::from_frame(&frame) {
                Some(Message::Response { node, .. }) if node == peer => return Ok(true),
                Some(message) => {
                    if self.concede_if_outranked(&message) {
                        return Ok(false);
                    }
                }
                None => {}
            }
        }
        Ok(false)
    }

    fn record_miss(&mut self, peer: Addr) -> io::Result<()> {
        let missed = {
            let Some(member) = self.members.get_mut(peer) else {
                return Ok(());
            };
            member.missed += 1;
            member.missed
        };
        log::debug!("{}: {peer} missed a check-in ({missed} so far)", self.id);
        if missed < self.timings.max_missed_check_ins {
            return Ok(());
        }

        // One silent peer too many: evict fleet-wide and refill its slot.
        let Some(evicted) = self.members.remove(peer) else {
            return Ok(());
        };
        log::info!("{}: evicting {peer} after {missed} missed check-ins", self.id);
        self.send(
            Message::Delete {
                node: peer,
                leader: self.id,
            },
            self.timings.single_send,
        )?;
        if evicted.track.index().is_some() {
            if let Some((addr, track)) = self.members.promote_first_reserve() {
                self.apply_promotion(addr, track);
            }
        }
        Ok(())
    }

    /// Beacons for newcomers, admits unique responders, and republishes
    /// membership (plus the running song) when anyone new showed up.
    fn attendance_round(&mut self) -> io::Result<()> {
        self.send(Message::Attendance { leader: self.id }, self.timings.single_send)?;

        let mut open_tracks = self.members.unused_tracks().into_iter();
        let mut admitted_any = false;
        let deadline = self.deadline_after(self.timings.attendance_response);

        while let Some(left) = self.remaining(deadline) {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let Some(frame) = self.recv(left)? else {
                break;
            };
            match Message::from_frame(&frame) {
                Some(Message::Response { node, .. }) if !self.members.contains(node) => {
                    let track = open_tracks
                        .next()
                        .map(TrackSlot::Assigned)
                        .unwrap_or(TrackSlot::Reserve);
                    self.members.admit(node, track);
                    admitted_any = true;
                    log::info!("{}: admitted {node} as {track}", self.id);
                }
                Some(message) => {
                    if self.concede_if_outranked(&message) {
                        return Ok(());
                    }
                }
                None => {}
            }
        }

        if admitted_any {
            self.broadcast_list()?;
            if self.player.is_playing() {
                if let Some((start_ms, song_index)) = self.song_context() {
                    self.send(
                        Message::SongJoin {
                            start_ms,
                            leader: self.id,
                            song_index,
                        },
                        self.timings.single_send,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Emits the full table, one row per frame, in insertion order.
    fn broadcast_list(&mut self) -> io::Result<()> {
        let rows: Vec<(Addr, Option<u16>)> = self
            .members
            .iter()
            .map(|m| (m.addr, m.track.to_wire()))
            .collect();
        for (node, track) in rows {
            self.send(
                Message::List {
                    node,
                    leader: self.id,
                    track,
                },
                self.timings.single_send,
            )?;
            self.clock.sleep(self.timings.send_list_delay);
        }
        Ok(())
    }

    /// Split-brain tiebreak: a leader that hears a beacon from a strictly
    /// higher identifier concedes on the spot; the fleet converges on the
    /// survivor within one attendance cycle.
    pub(super) fn concede_if_outranked(&mut self, message: &Message) -> bool {
        let Message::Attendance { leader } = *message else {
            return false;
        };
        if leader <= self.id {
            if leader != self.id {
                log::debug!("{}: outranking rival leader {leader}, staying", self.id);
            }
            return false;
        }

        log::info!("{}: conceding leadership to {leader}", self.id);
        self.leader = leader;
        self.set_role(Role::Follower);
        self.player.stop();
        // Dropping our assignment lets the winner's next beacon admit us
        // like any other newcomer.
        self.set_own_track(None);
        true
    }
}
