//! Optional TOML overrides for the protocol timing profile.
//!
//! Every field is optional and given in milliseconds; anything absent
//! keeps its default. All boxes of one fleet should run the same file.

use anyhow::Context;
use chorus_link::Timings;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub timings: TimingOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingOverrides {
    pub wait_for_attendance_ms: Option<u64>,
    pub attendance_seek_ms: Option<u64>,
    pub attendance_response_ms: Option<u64>,
    pub send_list_delay_ms: Option<u64>,
    pub wait_for_check_in_response_ms: Option<u64>,
    pub check_in_response_ms: Option<u64>,
    pub check_in_delay_ms: Option<u64>,
    pub follower_listen_ms: Option<u64>,
    pub single_send_ms: Option<u64>,
    pub song_start_offset_ms: Option<u64>,
    pub max_missed_check_ins: Option<u8>,
}

pub fn load(path: &Path) -> anyhow::Result<ConfigFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

impl ConfigFile {
    pub fn apply(&self, timings: &mut Timings) {
        let overrides = &self.timings;
        let ms = Duration::from_millis;

        if let Some(v) = overrides.wait_for_attendance_ms {
            timings.wait_for_attendance = ms(v);
        }
        if let Some(v) = overrides.attendance_seek_ms {
            timings.attendance_seek = ms(v);
        }
        if let Some(v) = overrides.attendance_response_ms {
            timings.attendance_response = ms(v);
        }
        if let Some(v) = overrides.send_list_delay_ms {
            timings.send_list_delay = ms(v);
        }
        if let Some(v) = overrides.wait_for_check_in_response_ms {
            timings.wait_for_check_in_response = ms(v);
        }
        if let Some(v) = overrides.check_in_response_ms {
            timings.check_in_response = ms(v);
        }
        if let Some(v) = overrides.check_in_delay_ms {
            timings.check_in_delay = ms(v);
        }
        if let Some(v) = overrides.follower_listen_ms {
            timings.follower_listen = ms(v);
        }
        if let Some(v) = overrides.single_send_ms {
            timings.single_send = ms(v);
        }
        if let Some(v) = overrides.song_start_offset_ms {
            timings.song_start_offset = ms(v);
        }
        if let Some(v) = overrides.max_missed_check_ins {
            timings.max_missed_check_ins = v;
        }
    }
}
