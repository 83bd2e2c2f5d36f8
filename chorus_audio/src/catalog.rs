//! The on-disk song catalog shared by the fleet.
//!
//! A catalog is a directory of song folders, each holding one audio stem
//! per track. The fleet never exchanges file names: a frame carries
//! `(song index, track index)` and every node resolves it against its own
//! copy of the catalog. That only works because the resolution order is
//! fixed (bytewise lexicographic, folders and stems alike) and because
//! deployments keep the directory trees identical on every box.

use crate::AudioError;
use std::fs;
use std::path::{Path, PathBuf};

/// One song folder: its name and its stems in resolution order.
#[derive(Debug, Clone)]
pub struct Song {
    pub name: String,
    pub stems: Vec<PathBuf>,
}

/// An immutable snapshot of the catalog directory, scanned once at boot.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    songs: Vec<Song>,
}

impl Catalog {
    /// Scans `root`. The only hard failure in the whole system: a missing
    /// or empty catalog means the box cannot take part at all.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AudioError> {
        let root = root.into();
        let read_root = |source| AudioError::CatalogRoot {
            path: root.clone(),
            source,
        };

        let mut folders = Vec::new();
        for entry in fs::read_dir(&root).map_err(read_root)? {
            let path = entry.map_err(read_root)?.path();
            if path.is_dir() {
                folders.push(path);
            }
        }
        folders.sort();

        let mut songs = Vec::new();
        for folder in folders {
            let read_song = |source| AudioError::SongFolder {
                path: folder.clone(),
                source,
            };

            let mut stems = Vec::new();
            for entry in fs::read_dir(&folder).map_err(read_song)? {
                let path = entry.map_err(read_song)?.path();
                if path.is_file() {
                    stems.push(path);
                }
            }
            stems.sort();
            if stems.is_empty() {
                // Kept anyway: dropping it would shift every later song
                // index and desynchronise us from the rest of the fleet.
                log::warn!("song folder {} holds no stems", folder.display());
            }

            songs.push(Song {
                name: folder
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                stems,
            });
        }

        if songs.is_empty() {
            return Err(AudioError::CatalogEmpty(root));
        }
        log::info!(
            "catalog at {}: {} songs",
            root.display(),
            songs.len()
        );
        Ok(Self { root, songs })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn song_count(&self) -> usize {
        self.songs.len()
    }

    /// Stems in the given song, zero when the index is out of range.
    pub fn track_count(&self, song_index: u16) -> usize {
        self.songs
            .get(song_index as usize)
            .map_or(0, |song| song.stems.len())
    }

    /// Resolves one `(song, track)` pair to its stem file.
    pub fn stem(&self, song_index: u16, track_index: u16) -> Option<&Path> {
        self.songs
            .get(song_index as usize)?
            .stems
            .get(track_index as usize)
            .map(PathBuf::as_path)
    }
}
