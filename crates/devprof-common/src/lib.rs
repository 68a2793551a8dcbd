pub mod codec;
pub mod config;
pub mod logging;
pub mod table;
pub mod types;

pub use codec::{CodecError, decode, encode};
pub use types::DeviceRecord;
