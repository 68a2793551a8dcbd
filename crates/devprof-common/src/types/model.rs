use serde::{Deserialize, Serialize};

use super::PerFormat;

/// Per-model compute cost, used downstream to weigh layer placement
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelFlops {
    /// Time to look up the input embeddings, in milliseconds
    pub inp_embd_ms: f32,
    pub output: PerFormat<i64>,
    pub layer: PerFormat<i64>,
}

/// Per-model parameter counts split by weight format
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub input: PerFormat<i64>,
    pub output: PerFormat<i64>,
    pub layer: PerFormat<i64>,
}
