use devprof_common::types::{
    BackendPerf, CpuProps, DeviceRecord, DiskProps, GpuProps, GpuSupport, MemoryInfo, ModelFlops,
    ModelParams, NumericFormat, PerFormat,
};
use devprof_common::{decode, encode};

fn format_index(format: NumericFormat) -> usize {
    NumericFormat::ALL.iter().position(|f| *f == format).unwrap()
}

/// Distinct non-zero float per call site, offset by `base`
fn floats(base: f32) -> PerFormat<f32> {
    PerFormat::from_fn(|format| base + format_index(format) as f32 * 0.25)
}

fn ints(base: i64) -> PerFormat<i64> {
    PerFormat::from_fn(|format| base * 10 + format_index(format) as i64)
}

fn populated() -> DeviceRecord {
    DeviceRecord {
        rank: 42,
        device_name: "node-b.cluster.local".to_string(),
        disk: DiskProps {
            read_seq_bw: 3.25,
            read_rnd_bw: 0.75,
            write_seq_bw: 2.5,
            write_rnd_bw: 0.125,
        },
        cpu_props: CpuProps {
            name: "x86_64".to_string(),
            description: "AMD Ryzen 9 7950X 16-Core Processor".to_string(),
            cores: 32,
            flops: floats(100.0),
        },
        memory: MemoryInfo {
            total_physical: 62.5,
            available_physical: 48.25,
            total_swap: 8.0,
            available_swap: 7.5,
            cpu_read_ram_bw: 41.75,
        },
        gpu_support: GpuSupport::from_array([true, false, true, false, true, false, true]),
        gpu_props: GpuProps {
            name: "NVIDIA GeForce RTX 4090".to_string(),
            description: "driver 550.54, CUDA 12.4".to_string(),
            memory_free: 22.5,
            memory_total: 23.99,
            metal: BackendPerf {
                read_vram_bw: 400.0,
                flops: floats(200.0),
            },
            cuda: BackendPerf {
                read_vram_bw: 900.5,
                flops: floats(300.0),
            },
        },
        model_flops: ModelFlops {
            inp_embd_ms: 1.5,
            output: ints(1),
            layer: ints(2),
        },
        model_params: ModelParams {
            input: ints(3),
            output: ints(4),
            layer: ints(-5),
        },
    }
}

#[test]
fn full_record_round_trip() {
    let record = populated();
    let buf = encode(&record);
    let decoded = decode(&buf).unwrap();

    assert_eq!(decoded, record);
    assert_eq!(decoded.gpu_support.to_array(), [true, false, true, false, true, false, true]);
    assert_eq!(decoded.model_params.layer.q80, -46);
    assert_eq!(
        decoded.cpu_props.flops.q4k.to_bits(),
        record.cpu_props.flops.q4k.to_bits()
    );
}

#[test]
fn decoded_strings_do_not_alias_the_buffer() {
    let record = populated();
    let mut buf = encode(&record);
    let decoded = decode(&buf).unwrap();

    let range = buf.as_ptr_range();
    for s in [
        &decoded.device_name,
        &decoded.cpu_props.name,
        &decoded.cpu_props.description,
        &decoded.gpu_props.name,
        &decoded.gpu_props.description,
    ] {
        assert!(!range.contains(&s.as_ptr()));
    }

    // the record stays intact once the buffer is scribbled over and dropped
    buf.fill(0);
    drop(buf);
    assert_eq!(decoded.device_name, "node-b.cluster.local");
}

#[test]
fn encoding_is_deterministic() {
    let record = populated();
    assert_eq!(encode(&record), encode(&record.clone()));
}

#[test]
fn every_field_changes_the_encoding() {
    let base = encode(&populated());

    let mut variants = Vec::new();
    let mut r = populated();
    r.rank += 1;
    variants.push(r);
    let mut r = populated();
    r.gpu_props.description.push('!');
    variants.push(r);
    let mut r = populated();
    r.memory.available_swap = 0.0;
    variants.push(r);
    let mut r = populated();
    r.gpu_support.sycl = false;
    variants.push(r);
    let mut r = populated();
    r.model_flops.inp_embd_ms = 0.0;
    variants.push(r);
    let mut r = populated();
    r.gpu_props.cuda.flops.f16 += 1.0;
    variants.push(r);

    for variant in variants {
        assert_ne!(encode(&variant), base);
        assert_eq!(decode(&encode(&variant)).unwrap(), variant);
    }
}
