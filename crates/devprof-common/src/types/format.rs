use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight format of a benchmarked or costed operation.
///
/// Activations are always F32, so every measured pair is `<format> x f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericFormat {
    F32,
    F16,
    Q4K,
    Q6K,
    Q80,
}

impl NumericFormat {
    /// All formats, in wire order.
    pub const ALL: [NumericFormat; 5] = [
        NumericFormat::F32,
        NumericFormat::F16,
        NumericFormat::Q4K,
        NumericFormat::Q6K,
        NumericFormat::Q80,
    ];

    /// Elements per quantization block (1 for unquantized formats)
    pub const fn block_size(self) -> usize {
        match self {
            Self::F32 | Self::F16 => 1,
            Self::Q80 => 32,
            Self::Q4K | Self::Q6K => 256,
        }
    }

    /// Short label used in tables and log fields
    pub const fn label(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::Q4K => "q4k",
            Self::Q6K => "q6k",
            Self::Q80 => "q80",
        }
    }
}

impl fmt::Display for NumericFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per [`NumericFormat`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerFormat<T> {
    pub f32: T,
    pub f16: T,
    pub q4k: T,
    pub q6k: T,
    pub q80: T,
}

impl<T: Copy> PerFormat<T> {
    pub fn get(&self, format: NumericFormat) -> T {
        match format {
            NumericFormat::F32 => self.f32,
            NumericFormat::F16 => self.f16,
            NumericFormat::Q4K => self.q4k,
            NumericFormat::Q6K => self.q6k,
            NumericFormat::Q80 => self.q80,
        }
    }

    pub fn set(&mut self, format: NumericFormat, value: T) {
        let slot = match format {
            NumericFormat::F32 => &mut self.f32,
            NumericFormat::F16 => &mut self.f16,
            NumericFormat::Q4K => &mut self.q4k,
            NumericFormat::Q6K => &mut self.q6k,
            NumericFormat::Q80 => &mut self.q80,
        };
        *slot = value;
    }

    /// Build from a function of the format
    pub fn from_fn(mut f: impl FnMut(NumericFormat) -> T) -> Self {
        Self {
            f32: f(NumericFormat::F32),
            f16: f(NumericFormat::F16),
            q4k: f(NumericFormat::Q4K),
            q6k: f(NumericFormat::Q6K),
            q80: f(NumericFormat::Q80),
        }
    }

    /// Values paired with their format, in wire order
    pub fn iter(&self) -> impl Iterator<Item = (NumericFormat, T)> + '_ {
        NumericFormat::ALL.into_iter().map(|format| (format, self.get(format)))
    }
}
