pub mod format;
pub mod gpu;
pub mod model;
pub mod record;

pub use format::{NumericFormat, PerFormat};
pub use gpu::{BackendPerf, GpuProps, GpuSupport};
pub use model::{ModelFlops, ModelParams};
pub use record::{CpuProps, DeviceRecord, DiskProps, MemoryInfo};
