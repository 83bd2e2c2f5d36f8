//! A development stand-in for the CC1101: one lossy broadcast domain over
//! UDP.
//!
//! Every node sends to the same broadcast address and port, so a LAN (or a
//! handful of processes on one machine, each bound to its own port) behaves
//! like the shared radio channel: every frame reaches everyone, nothing is
//! acknowledged, and whatever collides is simply lost. The repetition and
//! jitter behaviour required of a [`Radio`] is implemented here exactly as
//! it is on the real PHY.
//!
//! Framing mirrors what the radio does in hardware: the codec bytes are
//! wrapped in a magic tag (to shrug off foreign traffic by looking at four
//! bytes), an origin token (UDP loops our own broadcasts back at us, the
//! air does not), and the PHY's one-byte length prefix. UDP's checksum
//! stands in for the radio CRC; anything that does not parse is silence.

use chorus_link::cancel::CancelToken;
use chorus_link::port::Radio;
use chorus_link::timing::{SEND_GAP_MAX, SEND_GAP_MIN};
use chorus_proto::{Frame, frame::MAX_FRAME_BYTES};
use rand::Rng;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

// All packets of this transport start with this tag.
const PACKET_TYPE_ID: [u8; 4] = *b"ChRf";

// Tag (4) + origin token (4) + length prefix (1) + frame payload.
const HEADER_LEN: usize = PACKET_TYPE_ID.len() + size_of::<u32>() + 1;
const MAX_PACKET_LEN: usize = HEADER_LEN + MAX_FRAME_BYTES;

#[inline(always)]
fn io_err_is_timeout(kind: io::ErrorKind) -> bool {
    use io::ErrorKind::*;
    [WouldBlock, TimedOut].contains(&kind)
}

fn encode_packet(origin: u32, frame: &Frame) -> arrayvec::ArrayVec<u8, MAX_PACKET_LEN> {
    let payload = frame.encode();

    let mut packet = arrayvec::ArrayVec::new_const();
    packet.extend(PACKET_TYPE_ID);
    packet.extend(origin.to_le_bytes());
    packet.push(payload.len() as u8);
    packet.extend(payload);
    packet
}

/// Parses one datagram back into `(origin, frame)`. `None` is anything a
/// radio would have discarded before the protocol saw it.
fn parse_packet(packet: &[u8]) -> Option<(u32, Frame)> {
    let (&tag, rem) = packet.split_first_chunk()?;
    if tag != PACKET_TYPE_ID {
        return None;
    }

    let (&origin, rem) = rem.split_first_chunk()?;
    let origin = u32::from_le_bytes(origin);

    let (&[length], payload) = rem.split_first_chunk()?;
    if payload.len() != length as usize {
        return None;
    }

    let frame = Frame::decode(payload).ok()?;
    Some((origin, frame))
}

/// A [`Radio`] backed by a broadcast UDP socket.
pub struct UdpRadio {
    socket: UdpSocket,
    dest: SocketAddr,
    /// Random per-socket token used to drop our own looped-back frames.
    origin: u32,
}

impl UdpRadio {
    /// Binds `bind` and aims every send at `dest` (normally a broadcast
    /// address; anything unicast also works for two-box setups).
    pub fn open(bind: SocketAddr, dest: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind)?;
        socket.set_broadcast(true)?;
        log::info!(
            "udp radio on {} -> {dest}",
            socket.local_addr()?
        );
        Ok(Self {
            socket,
            dest,
            origin: rand::random(),
        })
    }
}

impl Radio for UdpRadio {
    fn send(&mut self, frame: &Frame, duration: Duration, cancel: &CancelToken) -> io::Result<()> {
        let packet = encode_packet(self.origin, frame);
        let deadline = Instant::now() + duration;

        // Repeat for the whole window; the jittered gap keeps two nodes
        // from colliding on every single repetition.
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            self.socket.send_to(&packet, self.dest)?;
            if Instant::now() >= deadline {
                return Ok(());
            }
            let gap = rand::thread_rng().gen_range(SEND_GAP_MIN..=SEND_GAP_MAX);
            std::thread::sleep(gap);
        }
    }

    fn receive(&mut self, timeout: Duration) -> io::Result<Option<Frame>> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 512];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket.set_read_timeout(Some(remaining))?;

            let read = match self.socket.recv_from(&mut buf) {
                Ok((read, _)) => read,
                Err(error) if io_err_is_timeout(error.kind()) => return Ok(None),
                Err(error) => return Err(error),
            };

            match parse_packet(&buf[..read]) {
                // Our own broadcast coming back around.
                Some((origin, _)) if origin == self.origin => continue,
                Some((_, frame)) => return Ok(Some(frame)),
                // Foreign or mangled traffic counts as silence.
                None => continue,
            }
        }
    }
}
