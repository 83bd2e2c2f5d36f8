//! Node identity: the NIC MAC address, or an explicit override.

use anyhow::Context;
use chorus_proto::Addr;

/// Parses a 12-hex-digit identifier, with or without `:` or `-` group
/// separators.
pub fn parse(text: &str) -> anyhow::Result<Addr> {
    let digits: String = text.chars().filter(|c| !matches!(c, ':' | '-')).collect();
    anyhow::ensure!(
        digits.len() == 12,
        "identifier must be 12 hex digits, got {text:?}"
    );
    let raw = u64::from_str_radix(&digits, 16)
        .with_context(|| format!("bad identifier {text:?}"))?;
    Ok(Addr::new(raw))
}

/// The first usable interface MAC, or a random identifier (stable for the
/// lifetime of this process) when none can be found.
pub fn detect() -> Addr {
    if let Some(addr) = first_interface_mac() {
        return addr;
    }
    let fallback = Addr::new(rand::random::<u64>());
    log::warn!("no NIC MAC found, using random identifier {fallback}");
    fallback
}

fn first_interface_mac() -> Option<Addr> {
    let mut interfaces: Vec<_> = std::fs::read_dir("/sys/class/net")
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    interfaces.sort();

    for interface in interfaces {
        let Ok(text) = std::fs::read_to_string(interface.join("address")) else {
            continue;
        };
        let Ok(addr) = parse(text.trim()) else {
            continue;
        };
        // The loopback interface reports an all-zero address.
        if addr != Addr::ZERO {
            return Some(addr);
        }
    }
    None
}
