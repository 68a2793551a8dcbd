//! Binary wire format for [`DeviceRecord`].
//!
//! Records cross process and host boundaries as a single owned byte buffer.
//! Every field has a fixed width and is little-endian, so hosts with a
//! different word size or struct padding still agree on the layout.
//!
//! # Format
//!
//! ```text
//! HEADER (16 bytes):
//!   magic: b"DPRF" (4B), version: u16, reserved: u16, body_len: u64
//!
//! BODY:
//!   rank: u32
//!   device_name, cpu_name, cpu_description, gpu_name, gpu_description:
//!     len: u64 (including the NUL), bytes: [u8; len - 1], 0x00
//!   disk.read_seq_bw: f32
//!   cpu_cores: u32
//!   memory: 5 x f32
//!   gpu_support: 7 x u8 (0 or 1)
//!   gpu memory_free, memory_total: 2 x f32
//!   disk read_rnd, write_seq, write_rnd: 3 x f32
//!   cpu flops: 5 x f32
//!   metal, cuda: (read_vram_bw: f32, flops: 5 x f32) each
//!   model_flops: inp_embd_ms: f32, output: 5 x i64, layer: 5 x i64
//!   model_params: input, output, layer: 15 x i64
//!
//! TRAILER (4 bytes):
//!   checksum: u32, FNV-1a over header and body
//! ```
//!
//! Per-format groups are always written in [`NumericFormat::ALL`] order.

use thiserror::Error;

use crate::types::{
    BackendPerf, CpuProps, DeviceRecord, DiskProps, GpuProps, GpuSupport, MemoryInfo,
    ModelFlops, ModelParams, NumericFormat, PerFormat,
};

/// Header magic bytes.
const MAGIC: [u8; 4] = *b"DPRF";

/// Layout version written by [`encode`] and the only one [`decode`] accepts.
pub const VERSION: u16 = 1;

const HEADER_LEN: usize = 16;
const TRAILER_LEN: usize = 4;

/// Bytes of the body that do not depend on string contents.
const FIXED_BODY_LEN: usize = 4 // rank
    + 5 * 8 // string length prefixes
    + 4 // disk.read_seq_bw
    + 4 // cpu_cores
    + 5 * 4 // memory
    + GpuSupport::COUNT
    + 2 * 4 // gpu memory
    + 3 * 4 // remaining disk fields
    + 5 * 4 // cpu flops
    + 2 * (4 + 5 * 4) // metal, cuda
    + 4 + 10 * 8 // model_flops
    + 15 * 8; // model_params

/// Reasons a buffer was rejected by [`decode`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("buffer truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("bad magic bytes")]
    BadMagic,

    #[error("unsupported wire version {0} (expected {VERSION})")]
    UnsupportedVersion(u16),

    #[error("declared body length {declared} does not match actual {actual}")]
    LengthMismatch { declared: u64, actual: u64 },

    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("string field `{0}` is not NUL-terminated")]
    MissingTerminator(&'static str),

    #[error("string field `{0}` is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("flag `{field}` has invalid value {value}")]
    InvalidBool { field: &'static str, value: u8 },

    #[error("{0} unexpected bytes after the last field")]
    TrailingBytes(usize),
}

/// Exact size of `encode(record)`
pub fn encoded_len(record: &DeviceRecord) -> usize {
    let strings: usize = string_fields(record).iter().map(|s| s.len() + 1).sum();
    HEADER_LEN + FIXED_BODY_LEN + strings + TRAILER_LEN
}

/// Encode a record into a freshly allocated buffer owned by the caller.
pub fn encode(record: &DeviceRecord) -> Vec<u8> {
    let mut w = Writer::with_capacity(encoded_len(record));

    w.bytes(&MAGIC);
    w.u16(VERSION);
    w.u16(0); // reserved
    w.u64(0); // body_len, patched below

    w.u32(record.rank);
    for s in string_fields(record) {
        w.string(s);
    }
    w.f32(record.disk.read_seq_bw);
    w.u32(record.cpu_props.cores);

    let mem = &record.memory;
    for v in [
        mem.total_physical,
        mem.available_physical,
        mem.total_swap,
        mem.available_swap,
        mem.cpu_read_ram_bw,
    ] {
        w.f32(v);
    }
    for flag in record.gpu_support.to_array() {
        w.bool(flag);
    }
    w.f32(record.gpu_props.memory_free);
    w.f32(record.gpu_props.memory_total);

    w.f32(record.disk.read_rnd_bw);
    w.f32(record.disk.write_seq_bw);
    w.f32(record.disk.write_rnd_bw);
    w.per_format_f32(&record.cpu_props.flops);
    for backend in [&record.gpu_props.metal, &record.gpu_props.cuda] {
        w.f32(backend.read_vram_bw);
        w.per_format_f32(&backend.flops);
    }

    w.f32(record.model_flops.inp_embd_ms);
    w.per_format_i64(&record.model_flops.output);
    w.per_format_i64(&record.model_flops.layer);
    w.per_format_i64(&record.model_params.input);
    w.per_format_i64(&record.model_params.output);
    w.per_format_i64(&record.model_params.layer);

    let mut buf = w.into_inner();
    let body_len = (buf.len() - HEADER_LEN) as u64;
    buf[8..HEADER_LEN].copy_from_slice(&body_len.to_le_bytes());
    let checksum = fnv1a_checksum(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

/// Decode a buffer produced by [`encode`] into a new record.
///
/// The framing, checksum and every length prefix are validated before
/// anything is read, and strings are copied out of `buf`.
pub fn decode(buf: &[u8]) -> Result<DeviceRecord, CodecError> {
    if buf.len() < HEADER_LEN + TRAILER_LEN {
        return Err(CodecError::Truncated {
            needed: HEADER_LEN + TRAILER_LEN,
            remaining: buf.len(),
        });
    }

    let (payload, trailer) = buf.split_at(buf.len() - TRAILER_LEN);
    let mut header = Reader::new(&payload[..HEADER_LEN]);
    if header.take(MAGIC.len())? != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = header.u16()?;
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let _reserved = header.u16()?;
    let declared = header.u64()?;
    let actual = (payload.len() - HEADER_LEN) as u64;
    if declared != actual {
        return Err(CodecError::LengthMismatch { declared, actual });
    }

    let expected = Reader::new(trailer).u32()?;
    let computed = fnv1a_checksum(payload);
    if expected != computed {
        return Err(CodecError::ChecksumMismatch {
            expected,
            actual: computed,
        });
    }

    let mut r = Reader::new(&payload[HEADER_LEN..]);
    let rank = r.u32()?;
    let device_name = r.string("device_name")?;
    let cpu_name = r.string("cpu_name")?;
    let cpu_description = r.string("cpu_description")?;
    let gpu_name = r.string("gpu_name")?;
    let gpu_description = r.string("gpu_description")?;
    let read_seq_bw = r.f32()?;
    let cores = r.u32()?;

    let memory = MemoryInfo {
        total_physical: r.f32()?,
        available_physical: r.f32()?,
        total_swap: r.f32()?,
        available_swap: r.f32()?,
        cpu_read_ram_bw: r.f32()?,
    };

    let mut flags = [false; GpuSupport::COUNT];
    for (flag, name) in flags.iter_mut().zip(GpuSupport::NAMES) {
        *flag = r.bool(name)?;
    }
    let gpu_support = GpuSupport::from_array(flags);

    let memory_free = r.f32()?;
    let memory_total = r.f32()?;

    let disk = DiskProps {
        read_seq_bw,
        read_rnd_bw: r.f32()?,
        write_seq_bw: r.f32()?,
        write_rnd_bw: r.f32()?,
    };
    let cpu_flops = r.per_format_f32()?;
    let metal = BackendPerf {
        read_vram_bw: r.f32()?,
        flops: r.per_format_f32()?,
    };
    let cuda = BackendPerf {
        read_vram_bw: r.f32()?,
        flops: r.per_format_f32()?,
    };

    let model_flops = ModelFlops {
        inp_embd_ms: r.f32()?,
        output: r.per_format_i64()?,
        layer: r.per_format_i64()?,
    };
    let model_params = ModelParams {
        input: r.per_format_i64()?,
        output: r.per_format_i64()?,
        layer: r.per_format_i64()?,
    };

    if r.remaining() > 0 {
        return Err(CodecError::TrailingBytes(r.remaining()));
    }

    Ok(DeviceRecord {
        rank,
        device_name,
        disk,
        cpu_props: CpuProps {
            name: cpu_name,
            description: cpu_description,
            cores,
            flops: cpu_flops,
        },
        memory,
        gpu_support,
        gpu_props: GpuProps {
            name: gpu_name,
            description: gpu_description,
            memory_free,
            memory_total,
            metal,
            cuda,
        },
        model_flops,
        model_params,
    })
}

fn string_fields(record: &DeviceRecord) -> [&str; 5] {
    [
        &record.device_name,
        &record.cpu_props.name,
        &record.cpu_props.description,
        &record.gpu_props.name,
        &record.gpu_props.description,
    ]
}

fn fnv1a_checksum(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.bytes(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_le_bytes());
    }

    fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    fn string(&mut self, s: &str) {
        self.u64(s.len() as u64 + 1);
        self.bytes(s.as_bytes());
        self.buf.push(0);
    }

    fn per_format_f32(&mut self, values: &PerFormat<f32>) {
        for (_, v) in values.iter() {
            self.f32(v);
        }
    }

    fn per_format_i64(&mut self, values: &PerFormat<i64>) {
        for (_, v) in values.iter() {
            self.i64(v);
        }
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn bool(&mut self, field: &'static str) -> Result<bool, CodecError> {
        match self.array::<1>()?[0] {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(CodecError::InvalidBool { field, value }),
        }
    }

    fn string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len = self.u64()?;
        let len = usize::try_from(len).map_err(|_| CodecError::Truncated {
            needed: usize::MAX,
            remaining: self.remaining(),
        })?;
        let bytes = self.take(len)?;
        let Some((&0, text)) = bytes.split_last() else {
            return Err(CodecError::MissingTerminator(field));
        };
        std::str::from_utf8(text)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8(field))
    }

    fn per_format_f32(&mut self) -> Result<PerFormat<f32>, CodecError> {
        let mut values = PerFormat::default();
        for format in NumericFormat::ALL {
            values.set(format, self.f32()?);
        }
        Ok(values)
    }

    fn per_format_i64(&mut self) -> Result<PerFormat<i64>, CodecError> {
        let mut values = PerFormat::default();
        for format in NumericFormat::ALL {
            values.set(format, self.i64()?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wrap a hand-built body in a valid header and trailer
    fn frame(body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&(body.len() as u64).to_le_bytes());
        buf.extend_from_slice(body);
        let checksum = fnv1a_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    fn body_of(buf: &[u8]) -> &[u8] {
        &buf[HEADER_LEN..buf.len() - TRAILER_LEN]
    }

    #[test]
    fn minimal_record_round_trip() {
        let mut record = DeviceRecord::new(3);
        record.device_name = "node-a".to_string();

        let decoded = decode(&encode(&record)).unwrap();
        assert_eq!(decoded.rank, 3);
        assert_eq!(decoded.device_name, "node-a");
        assert_eq!(
            decoded,
            DeviceRecord {
                rank: 3,
                device_name: "node-a".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn encoded_len_is_exact() {
        let mut record = DeviceRecord::new(0);
        assert_eq!(encode(&record).len(), encoded_len(&record));
        record.cpu_props.description = "x".repeat(1000);
        record.gpu_props.name = "ünïcode".to_string();
        assert_eq!(encode(&record).len(), encoded_len(&record));
    }

    #[test]
    fn strings_are_nul_terminated_with_inclusive_length() {
        let mut record = DeviceRecord::new(9);
        record.device_name = "ab".to_string();
        let buf = encode(&record);
        let body = body_of(&buf);
        assert_eq!(&body[..4], &9u32.to_le_bytes());
        assert_eq!(&body[4..12], &3u64.to_le_bytes());
        assert_eq!(&body[12..15], b"ab\0");
        // empty cpu_name still carries its terminator
        assert_eq!(&body[15..23], &1u64.to_le_bytes());
        assert_eq!(body[23], 0);
    }

    #[test]
    fn rejects_short_buffer() {
        assert_eq!(
            decode(&[0u8; 10]),
            Err(CodecError::Truncated {
                needed: HEADER_LEN + TRAILER_LEN,
                remaining: 10
            })
        );
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut buf = encode(&DeviceRecord::new(1));
        buf[0] = b'X';
        assert_eq!(decode(&buf), Err(CodecError::BadMagic));

        let mut buf = encode(&DeviceRecord::new(1));
        buf[4..6].copy_from_slice(&7u16.to_le_bytes());
        assert_eq!(decode(&buf), Err(CodecError::UnsupportedVersion(7)));
    }

    #[test]
    fn rejects_cut_off_buffer() {
        let buf = encode(&DeviceRecord::new(1));
        let cut = &buf[..buf.len() - 9];
        assert!(matches!(
            decode(cut),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn rejects_flipped_byte() {
        let mut record = DeviceRecord::new(1);
        record.memory.total_physical = 31.5;
        let mut buf = encode(&record);
        buf[HEADER_LEN + 1] ^= 0x40;
        assert!(matches!(
            decode(&buf),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn rejects_oversized_length_prefix() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&1_000u64.to_le_bytes());
        body.extend_from_slice(b"short\0");
        assert_eq!(
            decode(&frame(&body)),
            Err(CodecError::Truncated {
                needed: 1_000,
                remaining: 6
            })
        );
    }

    #[test]
    fn rejects_huge_length_prefix() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            decode(&frame(&body)),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&3u64.to_le_bytes());
        body.extend_from_slice(b"abc");
        assert_eq!(
            decode(&frame(&body)),
            Err(CodecError::MissingTerminator("device_name"))
        );

        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&0u64.to_le_bytes());
        assert_eq!(
            decode(&frame(&body)),
            Err(CodecError::MissingTerminator("device_name"))
        );
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&3u64.to_le_bytes());
        body.extend_from_slice(&[0xff, 0xfe, 0]);
        assert_eq!(
            decode(&frame(&body)),
            Err(CodecError::InvalidUtf8("device_name"))
        );
    }

    #[test]
    fn rejects_non_boolean_flag() {
        let buf = encode(&DeviceRecord::new(1));
        let mut body = body_of(&buf).to_vec();
        // rank + five empty strings + read_seq_bw + cores + memory block
        let flags_at = 4 + 5 * 9 + 4 + 4 + 5 * 4;
        body[flags_at + 1] = 2;
        assert_eq!(
            decode(&frame(&body)),
            Err(CodecError::InvalidBool {
                field: "cuda",
                value: 2
            })
        );
    }

    #[test]
    fn rejects_trailing_bytes() {
        let buf = encode(&DeviceRecord::new(1));
        let mut body = body_of(&buf).to_vec();
        body.extend_from_slice(&[0, 0, 0]);
        assert_eq!(decode(&frame(&body)), Err(CodecError::TrailingBytes(3)));
    }

    #[test]
    fn all_flag_combinations_round_trip() {
        for bits in 0u8..(1 << GpuSupport::COUNT) {
            let mut flags = [false; GpuSupport::COUNT];
            for (i, flag) in flags.iter_mut().enumerate() {
                *flag = bits & (1 << i) != 0;
            }
            let mut record = DeviceRecord::new(bits as u32);
            record.gpu_support = GpuSupport::from_array(flags);
            let decoded = decode(&encode(&record)).unwrap();
            assert_eq!(decoded.gpu_support, record.gpu_support, "bits={bits:07b}");
        }
    }

    #[test]
    fn preserves_float_bits() {
        let mut record = DeviceRecord::new(2);
        record.memory.cpu_read_ram_bw = f32::from_bits(0x7fc0_1234);
        record.disk.write_rnd_bw = -0.0;
        record.cpu_props.flops.q6k = f32::MIN_POSITIVE / 2.0;
        let decoded = decode(&encode(&record)).unwrap();
        assert_eq!(decoded.memory.cpu_read_ram_bw.to_bits(), 0x7fc0_1234);
        assert_eq!(decoded.disk.write_rnd_bw.to_bits(), (-0.0f32).to_bits());
        assert_eq!(
            decoded.cpu_props.flops.q6k.to_bits(),
            record.cpu_props.flops.q6k.to_bits()
        );
    }
}
