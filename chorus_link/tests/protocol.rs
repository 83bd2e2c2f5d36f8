//! End-to-end protocol scenarios, driven round by round against scripted
//! collaborators: a scripted radio, a virtual clock, and a recording
//! player. Silence is explicit in the scripts, so every receive window
//! closes exactly where the scenario says it does.

use chorus_link::{
    CancelToken, Clock, LogStatus, MemberTable, Node, PlayError, Player, Radio, Role, Timings,
    TrackSlot, WallMillis,
};
use chorus_proto::{Addr, Frame, Message};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

/// Some arbitrary wall-clock epoch for the virtual clock.
const BOOT_MS: u64 = 1_722_000_000_000;

/// How long "hearing a frame" takes on the virtual clock.
const RX_LATENCY_MS: u64 = 10;

#[derive(Clone)]
struct TestClock(Rc<Cell<u64>>);

impl TestClock {
    fn new() -> Self {
        Self(Rc::new(Cell::new(BOOT_MS)))
    }

    fn advance_to(&self, instant: u64) {
        if instant > self.0.get() {
            self.0.set(instant);
        }
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> WallMillis {
        self.0.get()
    }

    fn sleep(&self, duration: Duration) {
        self.0.set(self.0.get() + duration.as_millis() as u64);
    }
}

enum AirEvent {
    Frame(Frame),
    Silence,
}

/// Pops one scripted event per receive; sends are recorded and consume
/// their full send duration on the clock.
struct ScriptedRadio {
    clock: TestClock,
    inbound: Rc<RefCell<VecDeque<AirEvent>>>,
    sent: Rc<RefCell<Vec<Frame>>>,
}

impl Radio for ScriptedRadio {
    fn send(&mut self, frame: &Frame, duration: Duration, _cancel: &CancelToken) -> io::Result<()> {
        self.sent.borrow_mut().push(*frame);
        self.clock.sleep(duration);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> io::Result<Option<Frame>> {
        match self.inbound.borrow_mut().pop_front() {
            Some(AirEvent::Frame(frame)) => {
                self.clock.sleep(Duration::from_millis(RX_LATENCY_MS));
                Ok(Some(frame))
            }
            Some(AirEvent::Silence) | None => {
                self.clock.sleep(timeout);
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlayCall {
    song: u16,
    track: u16,
    started_at: u64,
    called_at: u64,
}

/// Records every playback request; busy-waits the virtual clock forward
/// when the start instant is still ahead, like the real player does.
#[derive(Clone)]
struct FakePlayer {
    clock: TestClock,
    track_counts: Rc<Vec<usize>>,
    playing: Rc<Cell<bool>>,
    plays: Rc<RefCell<Vec<PlayCall>>>,
}

impl Player for FakePlayer {
    fn song_count(&self) -> usize {
        self.track_counts.len()
    }

    fn track_count(&self, song_index: u16) -> usize {
        self.track_counts
            .get(song_index as usize)
            .copied()
            .unwrap_or(0)
    }

    fn play_synced(
        &mut self,
        song_index: u16,
        track_index: u16,
        started_at_ms: WallMillis,
    ) -> Result<(), PlayError> {
        self.plays.borrow_mut().push(PlayCall {
            song: song_index,
            track: track_index,
            started_at: started_at_ms,
            called_at: self.clock.now_ms(),
        });
        self.clock.advance_to(started_at_ms);
        self.playing.set(true);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.get()
    }

    fn stop(&mut self) {
        self.playing.set(false);
    }
}

struct Harness {
    clock: TestClock,
    inbound: Rc<RefCell<VecDeque<AirEvent>>>,
    sent: Rc<RefCell<Vec<Frame>>>,
    playing: Rc<Cell<bool>>,
    plays: Rc<RefCell<Vec<PlayCall>>>,
    node: Node<ScriptedRadio, TestClock, FakePlayer, LogStatus>,
}

impl Harness {
    fn new(id: u64, track_counts: &[usize]) -> Self {
        let clock = TestClock::new();
        let inbound = Rc::new(RefCell::new(VecDeque::new()));
        let sent = Rc::new(RefCell::new(Vec::new()));
        let playing = Rc::new(Cell::new(false));
        let plays = Rc::new(RefCell::new(Vec::new()));

        let radio = ScriptedRadio {
            clock: clock.clone(),
            inbound: inbound.clone(),
            sent: sent.clone(),
        };
        let player = FakePlayer {
            clock: clock.clone(),
            track_counts: Rc::new(track_counts.to_vec()),
            playing: playing.clone(),
            plays: plays.clone(),
        };
        let node = Node::new(
            Addr::new(id),
            Timings::default(),
            CancelToken::new(),
            radio,
            clock.clone(),
            player,
            LogStatus,
        );

        Self {
            clock,
            inbound,
            sent,
            playing,
            plays,
            node,
        }
    }

    fn hear(&self, message: Message) {
        self.inbound
            .borrow_mut()
            .push_back(AirEvent::Frame(message.to_frame()));
    }

    fn hear_silence(&self) {
        self.inbound.borrow_mut().push_back(AirEvent::Silence);
    }

    fn sent_messages(&self) -> Vec<Message> {
        self.sent
            .borrow()
            .iter()
            .filter_map(Message::from_frame)
            .collect()
    }

    fn plays(&self) -> Vec<PlayCall> {
        self.plays.borrow().clone()
    }
}

fn assert_unique_tracks(members: &MemberTable) {
    let mut seen = Vec::new();
    for member in members.iter() {
        if let Some(index) = member.track.index() {
            assert!(
                !seen.contains(&index),
                "track {index} held twice in {members}"
            );
            seen.push(index);
        }
    }
}

const ID_A: u64 = 0xAAAA_0000_0001;
const ID_B: u64 = 0xBBBB_0000_0002;
const ID_C: u64 = 0xCCCC_0000_0003;

/// Seats a follower under leader `leader` and feeds it the given list
/// rows, one round each.
fn seat_follower(h: &mut Harness, leader: u64, rows: &[(u64, Option<u16>)]) {
    h.hear(Message::Attendance {
        leader: Addr::new(leader),
    });
    h.node.startup().unwrap();
    for &(node, track) in rows {
        h.hear(Message::List {
            node: Addr::new(node),
            leader: Addr::new(leader),
            track,
        });
        assert!(h.node.step().unwrap());
    }
}

#[test]
fn solo_boot_becomes_leader() {
    let mut h = Harness::new(0x0102_0304_0506, &[4]);

    h.node.startup().unwrap();

    assert_eq!(h.node.role(), Role::Leader);
    assert_eq!(h.node.leader(), h.node.id());
    assert_eq!(h.node.own_track(), Some(TrackSlot::Assigned(0)));

    let members: Vec<_> = h
        .node
        .members()
        .iter()
        .map(|m| (m.addr, m.track))
        .collect();
    assert_eq!(members, [(h.node.id(), TrackSlot::Assigned(0))]);

    assert_eq!(
        h.sent_messages(),
        [Message::Attendance {
            leader: h.node.id()
        }]
    );
    // Beacon is out within the boot listen plus one send duration.
    assert!(h.clock.now_ms() <= BOOT_MS + 2500);
}

#[test]
fn newcomer_is_admitted_listed_and_synced() {
    // Leader side: A leads alone with a one-song catalog, B responds to
    // the beacon.
    let mut h = Harness::new(ID_A, &[4]);
    h.node.startup().unwrap();

    h.hear(Message::Response {
        node: Addr::new(ID_B),
        leader: Addr::new(ID_A),
    });
    h.hear_silence();
    assert!(h.node.step().unwrap());

    let sent = h.sent_messages();
    let song_start = sent
        .iter()
        .find_map(|m| match *m {
            Message::Song { start_ms, .. } => Some(start_ms),
            _ => None,
        })
        .expect("no song broadcast");

    // B lands on the first unused track after the leader's own.
    assert_eq!(
        h.node.members().get(Addr::new(ID_B)).unwrap().track,
        TrackSlot::Assigned(1)
    );
    assert_unique_tracks(h.node.members());

    // The republish covers both members, in insertion order, then lets
    // the newcomer late-join the running song.
    let tail: Vec<Message> = sent
        .iter()
        .copied()
        .skip_while(|m| !matches!(m, Message::List { .. }))
        .collect();
    assert_eq!(
        tail,
        [
            Message::List {
                node: Addr::new(ID_A),
                leader: Addr::new(ID_A),
                track: Some(0),
            },
            Message::List {
                node: Addr::new(ID_B),
                leader: Addr::new(ID_A),
                track: Some(1),
            },
            Message::SongJoin {
                start_ms: song_start,
                leader: Addr::new(ID_A),
                song_index: 0,
            },
        ]
    );
}

#[test]
fn joining_follower_adopts_list_and_late_join_offset() {
    // Follower side of the join: B hears the beacon, the list, and the
    // mid-song sync.
    let mut h = Harness::new(ID_B, &[2, 2, 2, 4]);
    let start_ms = BOOT_MS - 30_000; // A started its stem half a minute ago

    seat_follower(&mut h, ID_A, &[(ID_A, Some(0)), (ID_B, Some(1))]);

    assert_eq!(h.node.role(), Role::Follower);
    assert_eq!(h.node.leader(), Addr::new(ID_A));
    assert_eq!(h.node.own_track(), Some(TrackSlot::Assigned(1)));
    assert_eq!(
        h.sent_messages().first(),
        Some(&Message::Response {
            node: Addr::new(ID_B),
            leader: Addr::new(ID_A),
        })
    );

    h.hear(Message::SongJoin {
        start_ms,
        leader: Addr::new(ID_A),
        song_index: 3,
    });
    assert!(h.node.step().unwrap());

    assert_eq!(h.node.song_context(), Some((start_ms, 3)));
    let plays = h.plays();
    assert_eq!(plays.len(), 1);
    assert_eq!(plays[0].song, 3);
    assert_eq!(plays[0].track, 1);
    // The player is handed the fleet start instant while the clock is
    // already past it; the trim it computes is exactly now - start.
    assert_eq!(plays[0].started_at, start_ms);
    assert!(plays[0].called_at > start_ms);
}

#[test]
fn silent_peer_is_evicted_and_reserve_promoted() {
    // A leads a two-stem song; B holds track 1, C is a reserve.
    let mut h = Harness::new(ID_A, &[2]);
    h.node.startup().unwrap();

    h.hear(Message::Response {
        node: Addr::new(ID_B),
        leader: Addr::new(ID_A),
    });
    h.hear(Message::Response {
        node: Addr::new(ID_C),
        leader: Addr::new(ID_A),
    });
    h.hear_silence();
    assert!(h.node.step().unwrap());
    assert_eq!(
        h.node.members().get(Addr::new(ID_C)).unwrap().track,
        TrackSlot::Reserve
    );

    let respond_c = Message::Response {
        node: Addr::new(ID_C),
        leader: Addr::new(ID_A),
    };

    // Round: B silent (first miss), C answers, nobody new.
    h.hear_silence();
    h.hear(respond_c);
    h.hear_silence();
    assert!(h.node.step().unwrap());
    assert!(h.node.members().contains(Addr::new(ID_B)), "one miss must not evict");

    // Round: B silent again (second miss): eviction and promotion.
    h.hear_silence();
    h.hear(respond_c);
    h.hear_silence();
    assert!(h.node.step().unwrap());

    assert!(!h.node.members().contains(Addr::new(ID_B)));
    assert_eq!(
        h.node.members().get(Addr::new(ID_C)).unwrap().track,
        TrackSlot::Assigned(1)
    );
    assert_unique_tracks(h.node.members());
    assert!(h.sent_messages().contains(&Message::Delete {
        node: Addr::new(ID_B),
        leader: Addr::new(ID_A),
    }));
}

#[test]
fn responding_after_one_miss_survives() {
    let mut h = Harness::new(ID_A, &[2]);
    h.node.startup().unwrap();

    h.hear(Message::Response {
        node: Addr::new(ID_B),
        leader: Addr::new(ID_A),
    });
    h.hear_silence();
    assert!(h.node.step().unwrap());

    let respond_b = Message::Response {
        node: Addr::new(ID_B),
        leader: Addr::new(ID_A),
    };

    // Miss one short of the threshold, then respond: still a member.
    h.hear_silence();
    h.hear_silence();
    assert!(h.node.step().unwrap());
    h.hear(respond_b);
    h.hear_silence();
    assert!(h.node.step().unwrap());
    assert!(h.node.members().contains(Addr::new(ID_B)));

    // One more miss tips it over.
    h.hear_silence();
    h.hear_silence();
    assert!(h.node.step().unwrap());
    assert!(!h.node.members().contains(Addr::new(ID_B)));
}

#[test]
fn election_picks_the_highest_survivor() {
    // C has the highest identifier and must take over; B must defer to C.
    // Both run the same election on the same table.
    let mut c = Harness::new(ID_C, &[3]);
    seat_follower(
        &mut c,
        ID_A,
        &[(ID_A, Some(0)), (ID_B, Some(1)), (ID_C, Some(2))],
    );
    c.hear_silence();
    assert!(c.node.step().unwrap());

    assert_eq!(c.node.role(), Role::Leader);
    assert_eq!(c.node.leader(), Addr::new(ID_C));
    assert!(!c.node.members().contains(Addr::new(ID_A)));

    let mut b = Harness::new(ID_B, &[3]);
    seat_follower(
        &mut b,
        ID_A,
        &[(ID_A, Some(0)), (ID_B, Some(1)), (ID_C, Some(2))],
    );
    b.hear_silence();
    assert!(b.node.step().unwrap());

    assert_eq!(b.node.role(), Role::Follower);
    assert_eq!(b.node.leader(), Addr::new(ID_C));
    assert!(!b.node.members().contains(Addr::new(ID_A)));
}

#[test]
fn election_promotes_the_first_reserve_into_the_vacancy() {
    // C is a reserve that heard the song context earlier; the dead leader
    // vacates track 0 and C picks it up mid-song.
    let mut h = Harness::new(ID_C, &[2]);
    let start_ms = BOOT_MS - 5_000;

    seat_follower(&mut h, ID_A, &[(ID_A, Some(0)), (ID_B, Some(1)), (ID_C, None)]);
    h.hear(Message::Song {
        start_ms,
        leader: Addr::new(ID_A),
        song_index: 0,
    });
    assert!(h.node.step().unwrap());
    assert!(h.plays().is_empty(), "reserves do not play");

    h.hear_silence();
    assert!(h.node.step().unwrap());

    // C outranks B, so it both leads and inherits the vacated stem.
    assert_eq!(h.node.role(), Role::Leader);
    assert_eq!(h.node.own_track(), Some(TrackSlot::Assigned(0)));
    let plays = h.plays();
    assert_eq!(plays.len(), 1);
    assert_eq!(
        (plays[0].song, plays[0].track, plays[0].started_at),
        (0, 0, start_ms)
    );
    assert_unique_tracks(h.node.members());
}

#[test]
fn lower_id_leader_concedes_to_a_higher_beacon() {
    let low = 0x0000_0000_0010;
    let high = 0xFFFF_0000_0001;

    let mut h = Harness::new(low, &[1]);
    h.node.startup().unwrap();
    assert_eq!(h.node.role(), Role::Leader);

    // The rival's beacon lands in our attendance window.
    h.hear(Message::Attendance {
        leader: Addr::new(high),
    });
    assert!(h.node.step().unwrap());

    assert_eq!(h.node.role(), Role::Follower);
    assert_eq!(h.node.leader(), Addr::new(high));
    assert!(!h.playing.get(), "conceding stops audio");
    assert_eq!(h.node.own_track(), None);

    // The next beacon admits us into the survivor's group.
    h.hear(Message::Attendance {
        leader: Addr::new(high),
    });
    assert!(h.node.step().unwrap());
    assert!(h.sent_messages().contains(&Message::Response {
        node: Addr::new(low),
        leader: Addr::new(high),
    }));
}

#[test]
fn a_leader_keeps_leading_past_lower_rivals() {
    let high = 0xFFFF_0000_0001;
    let low = 0x0000_0000_0010;

    let mut h = Harness::new(high, &[1]);
    h.node.startup().unwrap();

    h.hear(Message::Attendance {
        leader: Addr::new(low),
    });
    h.hear_silence();
    assert!(h.node.step().unwrap());

    assert_eq!(h.node.role(), Role::Leader);
    assert_eq!(h.node.leader(), Addr::new(high));
}

#[test]
fn wrongly_deleted_follower_recovers() {
    let mut h = Harness::new(ID_B, &[2, 3]);
    let start_ms = BOOT_MS - 2_000;

    seat_follower(&mut h, ID_A, &[(ID_A, Some(0)), (ID_B, Some(1))]);
    h.hear(Message::SongJoin {
        start_ms,
        leader: Addr::new(ID_A),
        song_index: 1,
    });
    assert!(h.node.step().unwrap());
    assert_eq!(h.plays().len(), 1);

    // The leader evicts us by mistake.
    h.hear(Message::Delete {
        node: Addr::new(ID_B),
        leader: Addr::new(ID_A),
    });
    assert!(h.node.step().unwrap());
    assert_eq!(h.node.own_track(), None);
    assert!(!h.playing.get());
    assert!(!h.node.members().contains(Addr::new(ID_B)));

    // Next beacon: we respond again and get re-admitted and re-synced.
    h.hear(Message::Attendance {
        leader: Addr::new(ID_A),
    });
    assert!(h.node.step().unwrap());
    assert!(
        h.sent_messages()
            .iter()
            .filter(|m| matches!(m, Message::Response { .. }))
            .count()
            >= 2
    );

    h.hear(Message::List {
        node: Addr::new(ID_B),
        leader: Addr::new(ID_A),
        track: Some(1),
    });
    assert!(h.node.step().unwrap());
    h.hear(Message::SongJoin {
        start_ms,
        leader: Addr::new(ID_A),
        song_index: 1,
    });
    assert!(h.node.step().unwrap());

    assert_eq!(h.node.own_track(), Some(TrackSlot::Assigned(1)));
    let plays = h.plays();
    assert_eq!(plays.len(), 2);
    assert_eq!(plays[1].started_at, start_ms);
}

#[test]
fn deletion_of_a_tracked_peer_promotes_self_when_first_reserve() {
    // D sits in reserve with the song context recorded; when the peer
    // holding track 1 is deleted, D inherits the stem mid-song.
    let id_d = 0xDDDD_0000_0004;
    let mut h = Harness::new(id_d, &[2]);
    let start_ms = BOOT_MS - 1_000;

    seat_follower(
        &mut h,
        ID_A,
        &[(ID_A, Some(0)), (ID_B, Some(1)), (id_d, None)],
    );
    h.hear(Message::Song {
        start_ms,
        leader: Addr::new(ID_A),
        song_index: 0,
    });
    assert!(h.node.step().unwrap());

    h.hear(Message::Delete {
        node: Addr::new(ID_B),
        leader: Addr::new(ID_A),
    });
    assert!(h.node.step().unwrap());

    assert_eq!(h.node.own_track(), Some(TrackSlot::Assigned(1)));
    let plays = h.plays();
    assert_eq!(plays.len(), 1);
    assert_eq!(
        (plays[0].song, plays[0].track, plays[0].started_at),
        (0, 1, start_ms)
    );
    assert_unique_tracks(h.node.members());
}

#[test]
fn songs_with_too_few_stems_demote_to_reserve() {
    let mut h = Harness::new(ID_B, &[2]);
    // The list seats us at track 5, which song 0 cannot satisfy.
    seat_follower(&mut h, ID_A, &[(ID_A, Some(0)), (ID_B, Some(5))]);

    h.hear(Message::Song {
        start_ms: BOOT_MS,
        leader: Addr::new(ID_A),
        song_index: 0,
    });
    assert!(h.node.step().unwrap());

    assert_eq!(h.node.own_track(), Some(TrackSlot::Reserve));
    assert!(h.plays().is_empty());
}

#[test]
fn frames_from_unknown_leaders_are_ignored() {
    let mut h = Harness::new(ID_B, &[2]);
    seat_follower(&mut h, ID_A, &[(ID_A, Some(0)), (ID_B, Some(1))]);

    // A rival leader tries to evict and re-seat us; both frames must be
    // dropped because we are seated under A.
    let rival = Addr::new(ID_C);
    h.hear(Message::Delete {
        node: Addr::new(ID_B),
        leader: rival,
    });
    assert!(h.node.step().unwrap());
    h.hear(Message::List {
        node: Addr::new(ID_B),
        leader: rival,
        track: Some(0),
    });
    assert!(h.node.step().unwrap());

    assert_eq!(h.node.own_track(), Some(TrackSlot::Assigned(1)));
    assert!(h.node.members().contains(Addr::new(ID_B)));
}

#[test]
fn a_lone_follower_exits_on_silence() {
    let mut h = Harness::new(ID_B, &[2]);
    h.hear(Message::Attendance {
        leader: Addr::new(ID_A),
    });
    h.node.startup().unwrap();

    // Leader silent: the election removes it and leaves the table empty.
    h.hear_silence();
    assert!(h.node.step().unwrap());

    // Alone on a silent channel: exit gracefully.
    h.hear_silence();
    assert!(!h.node.step().unwrap());
}
