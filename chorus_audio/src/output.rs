//! The playback thread.
//!
//! One long-lived thread owns the output device. The stream object is not
//! `Send` on every platform cpal supports, so it is created, driven, and
//! dropped entirely on this thread; the rest of the crate communicates
//! over a command channel and an atomic playing flag.

use crate::decode::DecodedStem;
use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Feed-loop pause while the ring buffer or the device catches up.
const FEED_IDLE: Duration = Duration::from_millis(10);

enum Command {
    Play(DecodedStem),
    Stop,
}

pub(crate) struct OutputThread {
    commands: Sender<Command>,
    playing: Arc<AtomicBool>,
}

impl OutputThread {
    pub fn spawn() -> Self {
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let playing = Arc::new(AtomicBool::new(false));

        let thread_flag = playing.clone();
        thread::Builder::new()
            .name("chorus-audio".into())
            .spawn(move || run(command_rx, thread_flag))
            .expect("spawning the playback thread");

        Self { commands, playing }
    }

    /// Queues a stem for immediate playback, replacing the current one.
    pub fn play(&self, stem: DecodedStem) {
        self.playing.store(true, Ordering::SeqCst);
        if self.commands.send(Command::Play(stem)).is_err() {
            self.playing.store(false, Ordering::SeqCst);
            log::error!("playback thread is gone");
        }
    }

    pub fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Stop);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

fn run(commands: Receiver<Command>, playing: Arc<AtomicBool>) {
    let mut pending: Option<Command> = None;
    loop {
        let command = match pending.take() {
            Some(command) => command,
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => return,
            },
        };
        match command {
            // Nothing runs between commands; the flag was already cleared
            // by the caller.
            Command::Stop => {}
            Command::Play(stem) => {
                if let Err(error) = play_stem(stem, &commands, &mut pending) {
                    log::error!("playback failed: {error:#}");
                }
                // A pending command carries its own flag state; a natural
                // finish means silence.
                if pending.is_none() {
                    playing.store(false, Ordering::SeqCst);
                }
            }
        }
    }
}

/// Plays one stem to completion, or until the next command preempts it.
/// The preempting command is handed back through `pending`.
fn play_stem(
    stem: DecodedStem,
    commands: &Receiver<Command>,
    pending: &mut Option<Command>,
) -> anyhow::Result<()> {
    let total = stem.samples.len();
    if total == 0 {
        // Trimmed past the end: the song is effectively over for us.
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default output device")?;
    let config = cpal::StreamConfig {
        channels: stem.channels as cpal::ChannelCount,
        sample_rate: cpal::SampleRate(stem.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    // Roughly half a second of buffered audio between us and the device.
    let ring_len = (stem.sample_rate as usize / 2).max(1024) * stem.channels as usize;
    let (mut producer, mut consumer) = rtrb::RingBuffer::<f32>::new(ring_len);

    let consumed = Arc::new(AtomicUsize::new(0));
    let callback_consumed = consumed.clone();

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let available = consumer.slots().min(data.len());
                let (head, tail) = data.split_at_mut(available);
                // Never fails: available <= slots().
                let chunk = consumer.read_chunk(available).unwrap();
                for (destination, sample) in head.iter_mut().zip(chunk) {
                    *destination = sample;
                }
                // Underruns play out as silence.
                tail.fill(0.0);
                callback_consumed.fetch_add(available, Ordering::Relaxed);
            },
            |error| log::error!("output stream error: {error}"),
            None,
        )
        .context("building the output stream")?;
    stream.play().context("starting the output stream")?;

    let mut offset = 0;
    while offset < total {
        match commands.try_recv() {
            Ok(command) => {
                *pending = Some(command);
                return Ok(());
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return Ok(()),
        }

        let writable = producer.slots().min(total - offset);
        if writable == 0 {
            thread::sleep(FEED_IDLE);
            continue;
        }
        // Never fails: writable <= slots().
        let chunk = producer.write_chunk_uninit(writable).unwrap();
        offset += chunk.fill_from_iter(stem.samples[offset..].iter().copied());
    }

    // All samples queued; let the device drain them.
    while consumed.load(Ordering::Relaxed) < total {
        match commands.try_recv() {
            Ok(command) => {
                *pending = Some(command);
                return Ok(());
            }
            Err(TryRecvError::Empty) => thread::sleep(FEED_IDLE),
            Err(TryRecvError::Disconnected) => return Ok(()),
        }
    }

    Ok(())
}
