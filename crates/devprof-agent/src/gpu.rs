use std::process::Command;
use tracing::{debug, warn};

/// One NVIDIA device as reported by nvidia-smi
#[derive(Debug, Clone, PartialEq)]
pub struct GpuDevice {
    pub name: String,
    pub driver_version: String,
    /// Free memory in MiB
    pub memory_free_mib: f32,
    /// Total memory in MiB
    pub memory_total_mib: f32,
}

/// Detect NVIDIA GPUs using nvidia-smi
///
/// An empty list means no CUDA device is usable, including when nvidia-smi
/// is not installed.
pub fn detect_gpus() -> Vec<GpuDevice> {
    match query_nvidia_smi() {
        Ok(gpus) => {
            for gpu in &gpus {
                debug!(name = %gpu.name, memory_total_mib = gpu.memory_total_mib, "detected GPU");
            }
            gpus
        }
        Err(e) => {
            debug!(error = %e, "no NVIDIA GPU detected");
            Vec::new()
        }
    }
}

/// Maximum CUDA version supported by the driver, from the nvidia-smi banner
pub fn cuda_version() -> Option<String> {
    let output = Command::new("nvidia-smi").output().ok()?;
    let banner = String::from_utf8(output.stdout).ok()?;
    parse_cuda_version(&banner)
}

fn query_nvidia_smi() -> anyhow::Result<Vec<GpuDevice>> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=name,driver_version,memory.free,memory.total",
            "--format=csv,noheader,nounits",
        ])
        .output()?;

    if !output.status.success() {
        anyhow::bail!("nvidia-smi exited with {}", output.status);
    }

    Ok(parse_query_output(&String::from_utf8(output.stdout)?))
}

/// Parse `name, driver, free, total` CSV rows, skipping malformed lines
pub fn parse_query_output(stdout: &str) -> Vec<GpuDevice> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let [name, driver, free, total] = fields[..] else {
                warn!(line, "unexpected nvidia-smi output");
                return None;
            };
            Some(GpuDevice {
                name: name.to_string(),
                driver_version: driver.to_string(),
                memory_free_mib: free.parse().unwrap_or(0.0),
                memory_total_mib: total.parse().unwrap_or(0.0),
            })
        })
        .collect()
}

/// Parse the CUDA version from nvidia-smi header output (e.g., "CUDA Version: 12.4")
fn parse_cuda_version(banner: &str) -> Option<String> {
    banner
        .lines()
        .find(|line| line.contains("CUDA Version"))
        .and_then(|line| line.split("CUDA Version:").nth(1))
        .and_then(|s| s.split_whitespace().next())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_row_per_gpu() {
        let out = "NVIDIA GeForce RTX 4090, 550.54.14, 23800, 24564\n\
                   NVIDIA A100-SXM4-80GB, 550.54.14, 81000, 81920\n";
        let gpus = parse_query_output(out);
        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].name, "NVIDIA GeForce RTX 4090");
        assert_eq!(gpus[0].driver_version, "550.54.14");
        assert_eq!(gpus[0].memory_free_mib, 23800.0);
        assert_eq!(gpus[1].memory_total_mib, 81920.0);
    }

    #[test]
    fn unparseable_memory_is_zero() {
        let gpus = parse_query_output("Tesla T4, 535.0, [N/A], 15360\n");
        assert_eq!(gpus[0].memory_free_mib, 0.0);
        assert_eq!(gpus[0].memory_total_mib, 15360.0);
    }

    #[test]
    fn skips_malformed_rows() {
        assert!(parse_query_output("garbage\n\n").is_empty());
    }

    #[test]
    fn reads_cuda_version_from_banner() {
        let banner = concat!(
            "| NVIDIA-SMI 550.54.14   Driver Version: 550.54.14   ",
            "CUDA Version: 12.4     |\n"
        );
        assert_eq!(parse_cuda_version(banner).as_deref(), Some("12.4"));
        assert_eq!(parse_cuda_version("no header here"), None);
    }
}
