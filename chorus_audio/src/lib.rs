//! The audio collaborator: song catalog and synchronised stem playback.
//!
//! The protocol engine only ever sees the [`chorus_link::Player`] contract;
//! this crate implements it on top of a lexicographically ordered on-disk
//! catalog, a whole-stem decoder, and one background playback thread that
//! owns the output device.
//!
//! Alignment works in wall-clock time: the leader broadcasts the instant
//! its own stem started, and [`StemPlayer::play_synced`] either busy-waits
//! until that instant or trims the already-elapsed time (decode latency
//! included) off the head of the stem before it reaches the device.

mod decode;
mod output;

pub mod catalog;

pub use catalog::Catalog;

use chorus_link::{Clock, PlayError, Player, SystemClock, WallMillis};
use chorus_link::timing::REDUCE_VOLUME_DB;
use std::path::PathBuf;

/// Everything that can go wrong below the [`Player`] contract.
///
/// Only catalog problems at startup are worth failing a process over;
/// playback problems during a song are logged and swallowed.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("cannot read catalog root {}", path.display())]
    CatalogRoot {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("catalog root {} holds no songs", .0.display())]
    CatalogEmpty(PathBuf),
    #[error("cannot read song folder {}", path.display())]
    SongFolder {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot open stem {}", path.display())]
    OpenStem {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot decode stem {}", path.display())]
    Decode {
        path: PathBuf,
        source: symphonia::core::errors::Error,
    },
    #[error("stem {} contains no decodable audio", .0.display())]
    NoAudioTrack(PathBuf),
}

/// The concrete [`Player`] used on a box.
///
/// Decoding happens on the protocol thread (its duration is folded into
/// the head trim); the device callback runs on the playback thread, fed
/// through a ring buffer. The protocol only talks to that thread through
/// `is_playing` and `stop`.
pub struct StemPlayer {
    catalog: Catalog,
    output: output::OutputThread,
    clock: SystemClock,
}

impl StemPlayer {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            output: output::OutputThread::spawn(),
            clock: SystemClock,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

impl Player for StemPlayer {
    fn song_count(&self) -> usize {
        self.catalog.song_count()
    }

    fn track_count(&self, song_index: u16) -> usize {
        self.catalog.track_count(song_index)
    }

    fn play_synced(
        &mut self,
        song_index: u16,
        track_index: u16,
        started_at_ms: WallMillis,
    ) -> Result<(), PlayError> {
        let path = self
            .catalog
            .stem(song_index, track_index)
            .ok_or(PlayError::NoSuchStem {
                song: song_index,
                track: track_index,
            })?
            .to_owned();

        log::info!("playing {}", path.display());
        let mut stem =
            decode::decode_stem(&path).map_err(|error| anyhow::Error::new(error))?;
        stem.attenuate_db(REDUCE_VOLUME_DB);

        let now = self.clock.now_ms();
        if now < started_at_ms {
            // The one deliberate busy-wait in the system: the start instant
            // is at most one song-start offset away, and yielding here
            // would cost the alignment the whole protocol exists for.
            while self.clock.now_ms() < started_at_ms {
                core::hint::spin_loop();
            }
        } else {
            // `now` was read after decoding, so the trim already covers
            // both the elapsed wall time and our own decode latency.
            stem.trim_head_ms(now - started_at_ms);
        }

        self.output.play(stem);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.output.is_playing()
    }

    fn stop(&mut self) {
        self.output.stop();
    }
}
