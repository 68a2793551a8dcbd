use serde::{Deserialize, Serialize};

use super::{GpuProps, GpuSupport, ModelFlops, ModelParams, PerFormat};

/// Disk bandwidth in GB/s
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskProps {
    pub read_seq_bw: f32,
    pub read_rnd_bw: f32,
    pub write_seq_bw: f32,
    pub write_rnd_bw: f32,
}

/// CPU description and measured throughput
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuProps {
    pub name: String,
    pub description: String,
    /// Logical cores
    pub cores: u32,
    /// Throughput per weight format in GFLOPS
    pub flops: PerFormat<f32>,
}

/// Memory totals in GiB and CPU-side RAM read bandwidth in GB/s
///
/// `available <= total` is expected but never enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_physical: f32,
    pub available_physical: f32,
    pub total_swap: f32,
    pub available_swap: f32,
    pub cpu_read_ram_bw: f32,
}

/// Everything one participant reports about itself, keyed by `rank`
///
/// Numeric fields default to zero, which stands for both "not measured" and
/// "measured as zero". Strings default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub rank: u32,
    pub device_name: String,
    pub disk: DiskProps,
    pub cpu_props: CpuProps,
    pub memory: MemoryInfo,
    pub gpu_support: GpuSupport,
    pub gpu_props: GpuProps,
    pub model_flops: ModelFlops,
    pub model_params: ModelParams,
}

impl DeviceRecord {
    /// Empty record for the given rank
    pub fn new(rank: u32) -> Self {
        Self {
            rank,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NumericFormat;

    #[test]
    fn fresh_record_is_zeroed() {
        let record = DeviceRecord::new(7);
        assert_eq!(record.rank, 7);
        assert_eq!(record.device_name, "");
        assert_eq!(record.cpu_props.name, "");
        assert_eq!(record.cpu_props.description, "");
        assert_eq!(record.gpu_props.name, "");
        assert_eq!(record.gpu_props.description, "");
        assert_eq!(record.cpu_props.cores, 0);
        assert_eq!(record.disk, DiskProps::default());
        assert_eq!(record.memory, MemoryInfo::default());
        assert_eq!(record.gpu_support.to_array(), [false; GpuSupport::COUNT]);
        for format in NumericFormat::ALL {
            assert_eq!(record.cpu_props.flops.get(format), 0.0);
            assert_eq!(record.gpu_props.metal.flops.get(format), 0.0);
            assert_eq!(record.gpu_props.cuda.flops.get(format), 0.0);
            assert_eq!(record.model_flops.layer.get(format), 0);
            assert_eq!(record.model_params.input.get(format), 0);
        }
        assert_eq!(record.model_flops.inp_embd_ms, 0.0);
    }

    #[test]
    fn flags_are_independent() {
        for bit in 0..GpuSupport::COUNT {
            let mut flags = [false; GpuSupport::COUNT];
            flags[bit] = true;
            let support = GpuSupport::from_array(flags);
            let set: Vec<_> = support
                .to_array()
                .iter()
                .enumerate()
                .filter(|(_, on)| **on)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(set, vec![bit]);
        }
    }

    #[test]
    fn serializes_to_json() {
        let mut record = DeviceRecord::new(1);
        record.device_name = "node-b".to_string();
        record.gpu_support.cuda = true;
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["device_name"], "node-b");
        assert_eq!(json["gpu_support"]["cuda"], true);
        assert_eq!(json["cpu_props"]["flops"]["q80"], 0.0);
    }
}
