//! Operating-system queries.
//!
//! Unknown values are `None`, distinct from a real zero. The record stores 0
//! for unknown.

use tracing::warn;

/// Source of host facts the profiler cannot measure itself
pub trait SystemProbe {
    /// Logical CPU cores, at least 1
    fn cpu_cores(&self) -> u32;
    /// Physical memory in bytes, total or currently available
    fn physical_memory(&self, available: bool) -> Option<u64>;
    /// Swap in bytes, total or currently free
    fn swap_memory(&self, available: bool) -> Option<u64>;
    fn device_name(&self) -> String;
}

/// The machine this process runs on
#[derive(Debug, Default)]
pub struct HostSystem;

impl SystemProbe for HostSystem {
    fn cpu_cores(&self) -> u32 {
        match std::thread::available_parallelism() {
            Ok(n) => u32::try_from(n.get()).unwrap_or(u32::MAX),
            Err(e) => {
                warn!(error = %e, "unable to query core count, assuming 1");
                1
            }
        }
    }

    fn physical_memory(&self, available: bool) -> Option<u64> {
        let key = if available { "MemAvailable" } else { "MemTotal" };
        memory_value(key, |s| {
            if available {
                s.available_memory()
            } else {
                s.total_memory()
            }
        })
    }

    fn swap_memory(&self, available: bool) -> Option<u64> {
        let key = if available { "SwapFree" } else { "SwapTotal" };
        memory_value(key, |s| {
            if available {
                s.free_swap()
            } else {
                s.total_swap()
            }
        })
    }

    fn device_name(&self) -> String {
        match hostname::get() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                warn!(error = %e, "unable to query hostname");
                format!("unknown-{}", std::env::consts::OS)
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn memory_value(key: &str, query: impl Fn(&sysinfo::System) -> u64) -> Option<u64> {
    meminfo_or(std::fs::read_to_string("/proc/meminfo"), key, || {
        Some(sysinfo_memory(query))
    })
}

/// `key` from `/proc/meminfo` contents, or `fallback` when they are unusable
#[cfg(target_os = "linux")]
fn meminfo_or(
    contents: std::io::Result<String>,
    key: &str,
    fallback: impl FnOnce() -> Option<u64>,
) -> Option<u64> {
    match contents {
        Ok(contents) => parse_meminfo(&contents, key).or_else(|| {
            warn!(key, "field missing from /proc/meminfo, asking sysinfo");
            fallback()
        }),
        Err(e) => {
            warn!(error = %e, "unable to read /proc/meminfo, asking sysinfo");
            fallback()
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn memory_value(_key: &str, query: impl Fn(&sysinfo::System) -> u64) -> Option<u64> {
    Some(sysinfo_memory(query))
}

fn sysinfo_memory(query: impl Fn(&sysinfo::System) -> u64) -> u64 {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    query(&system)
}

/// Look up `key` in `/proc/meminfo` contents and return it in bytes
///
/// Values are reported by the kernel in kB.
pub fn parse_meminfo(contents: &str, key: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        let mut parts = rest.split_whitespace();
        let value: u64 = parts.next()?.parse().ok()?;
        let scale = match parts.next() {
            Some("kB") => 1024,
            Some(_) => return None,
            None => 1,
        };
        value.checked_mul(scale)
    })
}

/// Bytes to GiB, with 0 for unknown
pub fn to_gib(bytes: Option<u64>) -> f32 {
    bytes.map_or(0.0, |b| (b as f64 / (1u64 << 30) as f64) as f32)
}
