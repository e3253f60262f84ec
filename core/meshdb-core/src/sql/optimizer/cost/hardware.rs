//! Host hardware probing.
//!
//! Linux-first: memory comes from `/proc/meminfo`, disk rotational flags
//! from `/sys/block`. Every probe has a conservative fallback so the
//! profile is always usable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskType {
    Nvme,
    Ssd,
    Hdd,
}

impl DiskType {
    /// Sequential throughput default, MB/s.
    pub fn throughput_mb_s(self) -> f64 {
        match self {
            DiskType::Nvme => 3000.0,
            DiskType::Ssd => 500.0,
            DiskType::Hdd => 150.0,
        }
    }

    /// Seek time default, milliseconds.
    pub fn seek_ms(self) -> f64 {
        match self {
            DiskType::Nvme => 0.02,
            DiskType::Ssd => 0.1,
            DiskType::Hdd => 8.0,
        }
    }
}

/// The four factors every operator cost formula is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostFactors {
    pub io: f64,
    pub cpu: f64,
    pub memory: f64,
    pub network: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub cpu_cores: usize,
    /// Rough estimate, GHz
    pub cpu_frequency_ghz: f64,
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
    pub disk_type: DiskType,
    pub disk_throughput_mb_s: f64,
    pub disk_seek_ms: f64,
    pub cloud_environment: bool,
}

impl HardwareProfile {
    /// Probe the host. Never fails; unknown values fall back to the
    /// defaults of a small cloud VM.
    pub fn detect() -> Self {
        let cpu_cores = num_cpus::get();
        let cpu_frequency_ghz = detect_cpu_frequency().unwrap_or(2.4);
        let (total_memory_bytes, available_memory_bytes) =
            detect_memory().unwrap_or((8 << 30, 4 << 30));
        let disk_type = detect_disk_type().unwrap_or(DiskType::Ssd);
        let cloud_environment = detect_cloud();

        Self {
            cpu_cores,
            cpu_frequency_ghz,
            total_memory_bytes,
            available_memory_bytes,
            disk_type,
            disk_throughput_mb_s: disk_type.throughput_mb_s(),
            disk_seek_ms: disk_type.seek_ms(),
            cloud_environment,
        }
    }

    /// Fixed profile for deterministic tests.
    pub fn baseline() -> Self {
        Self {
            cpu_cores: 8,
            cpu_frequency_ghz: 3.0,
            total_memory_bytes: 16 << 30,
            available_memory_bytes: 8 << 30,
            disk_type: DiskType::Ssd,
            disk_throughput_mb_s: DiskType::Ssd.throughput_mb_s(),
            disk_seek_ms: DiskType::Ssd.seek_ms(),
            cloud_environment: false,
        }
    }

    /// Derive the cost factors. Faster hardware yields smaller factors,
    /// so plan costs stay comparable across hosts.
    pub fn cost_factors(&self) -> CostFactors {
        let io = 1000.0 / self.disk_throughput_mb_s;
        let cpu = 2.4 / self.cpu_frequency_ghz / (self.cpu_cores as f64).sqrt();
        let memory_pressure =
            1.0 - (self.available_memory_bytes as f64 / self.total_memory_bytes as f64).min(1.0);
        let memory = 0.5 + memory_pressure;
        let network = if self.cloud_environment { 4.0 } else { 1.0 };
        CostFactors {
            io,
            cpu,
            memory,
            network,
        }
    }
}

fn detect_cpu_frequency() -> Option<f64> {
    let cpuinfo = fs::read_to_string("/proc/cpuinfo").ok()?;
    for line in cpuinfo.lines() {
        if line.starts_with("cpu MHz") {
            let mhz: f64 = line.split(':').nth(1)?.trim().parse().ok()?;
            return Some(mhz / 1000.0);
        }
    }
    None
}

fn detect_memory() -> Option<(u64, u64)> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        let mut parse_kb = |prefix: &str| -> Option<u64> {
            line.strip_prefix(prefix)?
                .trim()
                .trim_end_matches(" kB")
                .trim()
                .parse::<u64>()
                .ok()
                .map(|kb| kb * 1024)
        };
        if line.starts_with("MemTotal:") {
            total = parse_kb("MemTotal:");
        } else if line.starts_with("MemAvailable:") {
            available = parse_kb("MemAvailable:");
        }
    }
    Some((total?, available.or(total)?))
}

fn detect_disk_type() -> Option<DiskType> {
    let blocks = fs::read_dir("/sys/block").ok()?;
    for entry in blocks.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("loop") || name.starts_with("ram") {
            continue;
        }
        if name.starts_with("nvme") {
            return Some(DiskType::Nvme);
        }
        let rotational = Path::new("/sys/block").join(&name).join("queue/rotational");
        if let Ok(flag) = fs::read_to_string(rotational) {
            return Some(if flag.trim() == "1" {
                DiskType::Hdd
            } else {
                DiskType::Ssd
            });
        }
    }
    None
}

fn detect_cloud() -> bool {
    const MARKERS: &[&str] = &[
        "KUBERNETES_SERVICE_HOST",
        "AWS_EXECUTION_ENV",
        "AWS_REGION",
        "GOOGLE_CLOUD_PROJECT",
        "AZURE_HTTP_USER_AGENT",
        "ECS_CONTAINER_METADATA_URI",
    ];
    MARKERS.iter().any(|m| std::env::var_os(m).is_some())
}
