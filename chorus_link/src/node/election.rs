//! Leader takeover after silence, and reserve promotion into the vacancy.

use super::{Node, Role};
use crate::port::{Clock, Player, Radio, StatusSink};
use chorus_proto::Addr;

impl<R: Radio, C: Clock, P: Player, S: StatusSink> Node<R, C, P, S> {
    /// Elects a successor after the leader went silent.
    ///
    /// Deterministic by construction: every survivor removes the same dead
    /// leader from the same table and picks the same maximum identifier,
    /// so the fleet agrees without exchanging a single frame. Should two
    /// leaders ever emerge anyway, the beacon tiebreak resolves it.
    pub(super) fn elect_leader(&mut self) {
        log::info!(
            "{}: leader {} went silent, electing a successor",
            self.id,
            self.leader
        );
        let vacated = self
            .members
            .remove(self.leader)
            .and_then(|m| m.track.index());

        let Some(winner) = self.members.highest_addr() else {
            self.leader = Addr::ZERO;
            return;
        };
        self.leader = winner;
        if winner == self.id {
            log::info!("{}: taking over as leader", self.id);
            self.set_role(Role::Leader);
        } else {
            log::info!("{}: staying follower under {winner}", self.id);
        }

        // A reserve that wins the election simply leads without a track
        // until its next song-start round, so promotion stays independent
        // of who won.
        if vacated.is_some() {
            if let Some((addr, track)) = self.members.promote_first_reserve() {
                self.apply_promotion(addr, track);
            }
        }
    }
}
