//! Process and host resource sampling.
//!
//! Backed by a shared `sysinfo::System` so repeated snapshots only refresh
//! the pieces they read. CPU time comes from `getrusage(2)` on unix.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use sysinfo::{Pid, System};

static SYSTEM: LazyLock<Mutex<System>> = LazyLock::new(|| Mutex::new(System::new()));

/// Memory figures for the current process and the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    /// Resident set size of this process, in bytes
    pub rss_bytes: u64,
    /// Virtual memory size of this process, in bytes
    pub virtual_bytes: u64,
    /// Total host memory, in bytes
    pub system_total_bytes: u64,
    /// Used host memory, in bytes
    pub system_used_bytes: u64,
}

impl MemorySnapshot {
    /// Host memory usage as a percentage of total.
    pub fn system_usage_percent(&self) -> f64 {
        percent(self.system_used_bytes, self.system_total_bytes)
    }

    /// Process resident memory as a percentage of `limit_bytes`.
    pub fn process_usage_percent(&self, limit_bytes: u64) -> f64 {
        percent(self.rss_bytes, limit_bytes)
    }
}

/// Accumulated CPU time of this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsage {
    pub user_micros: u64,
    pub system_micros: u64,
}

impl CpuUsage {
    /// CPU time spent between `earlier` and `self`.
    pub fn since(&self, earlier: &CpuUsage) -> CpuUsage {
        CpuUsage {
            user_micros: self.user_micros.saturating_sub(earlier.user_micros),
            system_micros: self.system_micros.saturating_sub(earlier.system_micros),
        }
    }

    pub fn total_micros(&self) -> u64 {
        self.user_micros + self.system_micros
    }
}

/// Host load averages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Sample process and host memory.
pub fn memory_snapshot() -> MemorySnapshot {
    let mut sys = SYSTEM.lock();
    sys.refresh_memory();

    let (rss_bytes, virtual_bytes) = match sysinfo::get_current_pid() {
        Ok(pid) => process_memory(&mut sys, pid),
        Err(_) => (0, 0),
    };

    MemorySnapshot {
        rss_bytes,
        virtual_bytes,
        system_total_bytes: sys.total_memory(),
        system_used_bytes: sys.used_memory(),
    }
}

fn process_memory(sys: &mut System, pid: Pid) -> (u64, u64) {
    if !sys.refresh_process(pid) {
        return (0, 0);
    }
    sys.process(pid)
        .map(|process| (process.memory(), process.virtual_memory()))
        .unwrap_or((0, 0))
}

/// Sample accumulated CPU time of this process.
#[cfg(unix)]
pub fn cpu_usage() -> CpuUsage {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
    // SAFETY: getrusage only writes into the provided struct.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return CpuUsage::default();
    }
    // SAFETY: rc == 0 means the struct was fully initialized.
    let usage = unsafe { usage.assume_init() };

    CpuUsage {
        user_micros: timeval_micros(usage.ru_utime),
        system_micros: timeval_micros(usage.ru_stime),
    }
}

#[cfg(not(unix))]
pub fn cpu_usage() -> CpuUsage {
    CpuUsage::default()
}

#[cfg(unix)]
fn timeval_micros(tv: libc::timeval) -> u64 {
    (tv.tv_sec.max(0) as u64) * 1_000_000 + tv.tv_usec.max(0) as u64
}

/// Host load averages (zero on platforms without them).
pub fn load_average() -> LoadAverage {
    let load = System::load_average();
    LoadAverage {
        one: load.one,
        five: load.five,
        fifteen: load.fifteen,
    }
}

/// Number of logical CPUs.
pub fn cpu_count() -> usize {
    num_cpus::get().max(1)
}

/// Host name, if the platform reports one.
pub fn host_name() -> Option<String> {
    System::host_name()
}

/// Operating system name and version, e.g. "Ubuntu 24.04".
pub fn os_description() -> String {
    match (System::name(), System::os_version()) {
        (Some(name), Some(version)) => format!("{} {}", name, version),
        (Some(name), None) => name,
        _ => std::env::consts::OS.to_string(),
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
