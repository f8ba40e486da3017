use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Upper bound on tensors in one descriptor, as enforced by the engine.
pub const MAX_TENSORS: usize = 16;

/// Upper bound on the rank of a single tensor.
pub const MAX_RANK: usize = 16;

/// Raw platform window handle handed to a video output element.
pub type WindowHandle = usize;

/// Element kinds the bridge knows how to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Source,
    Sink,
    Switch,
    Valve,
    /// A video output that accepts a platform window (resolved through the
    /// generic element handle).
    VideoSink,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Sink => "sink",
            Self::Switch => "switch",
            Self::Valve => "valve",
            Self::VideoSink => "video sink",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a switch element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchKind {
    /// N inputs, one selected output.
    InputSelector,
    /// One input, routed to the selected output.
    OutputSelector,
}

/// Lifecycle state of a whole pipeline.
///
/// The integer codes are what the foreign state-changed entry point receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Unknown,
    Null,
    Ready,
    Paused,
    Playing,
}

impl PipelineState {
    pub fn as_code(&self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Null => 1,
            Self::Ready => 2,
            Self::Paused => 3,
            Self::Playing => 4,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Null,
            2 => Self::Ready,
            3 => Self::Paused,
            4 => Self::Playing,
            _ => Self::Unknown,
        }
    }
}

/// Non-success status reported by an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    InvalidParameter,
    NotSupported,
    OutOfMemory,
    TryAgain,
    StreamsPipe,
    Other(i32),
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParameter => f.write_str("invalid parameter"),
            Self::NotSupported => f.write_str("not supported"),
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::TryAgain => f.write_str("try again"),
            Self::StreamsPipe => f.write_str("streams pipe error"),
            Self::Other(code) => write!(f, "status {}", code),
        }
    }
}

// ---------------------------------------------------------------------------
// Tensor descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorType {
    Int32,
    Uint32,
    Int16,
    Uint16,
    Int8,
    Uint8,
    Float64,
    Float32,
    Int64,
    Uint64,
    Float16,
}

impl TensorType {
    /// Size in bytes of one element.
    pub fn element_size(&self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 | Self::Float16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Uint64 | Self::Float64 => 8,
        }
    }
}

/// Shape and element type of one tensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorInfo {
    /// Optional tensor name; ignored by structural equality.
    pub name: Option<String>,
    pub tensor_type: TensorType,
    /// Dimensions, innermost first.
    pub dimension: Vec<u32>,
}

impl TensorInfo {
    pub fn new(tensor_type: TensorType, dimension: impl Into<Vec<u32>>) -> Self {
        Self {
            name: None,
            tensor_type,
            dimension: dimension.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn rank(&self) -> usize {
        self.dimension.len()
    }

    /// Dimensions with trailing unit dimensions stripped, so `[3, 4]` and
    /// `[3, 4, 1, 1]` describe the same shape.
    pub fn normalized_dimension(&self) -> &[u32] {
        let mut end = self.dimension.len();
        while end > 1 && self.dimension[end - 1] == 1 {
            end -= 1;
        }
        &self.dimension[..end]
    }

    /// Number of elements, or `None` if it does not fit in `usize`.
    pub fn element_count(&self) -> Option<usize> {
        self.dimension
            .iter()
            .try_fold(1usize, |count, &d| count.checked_mul(d as usize))
    }

    /// Size of one buffer in bytes, or `None` if it does not fit in `usize`.
    pub fn byte_size(&self) -> Option<usize> {
        self.element_count()?
            .checked_mul(self.tensor_type.element_size())
    }

    fn is_valid(&self, max_rank: usize) -> bool {
        !self.dimension.is_empty()
            && self.dimension.len() <= max_rank
            && self.dimension.iter().all(|&d| d > 0)
            && self.byte_size().is_some()
    }
}

impl PartialEq for TensorInfo {
    fn eq(&self, other: &Self) -> bool {
        self.tensor_type == other.tensor_type
            && self.normalized_dimension() == other.normalized_dimension()
    }
}

impl Eq for TensorInfo {}

/// Ordered descriptor of every tensor carried by one buffer.
///
/// Equality is structural: tensor count, then per tensor the element type
/// and the normalized shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorsInfo {
    pub tensors: Vec<TensorInfo>,
}

impl TensorsInfo {
    pub fn new(tensors: Vec<TensorInfo>) -> Self {
        Self { tensors }
    }

    pub fn single(tensor_type: TensorType, dimension: impl Into<Vec<u32>>) -> Self {
        Self::new(vec![TensorInfo::new(tensor_type, dimension)])
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TensorInfo> {
        self.tensors.iter()
    }

    /// Check count, rank and non-zero dimensions against the given limits.
    pub fn validate(&self, max_tensors: usize, max_rank: usize) -> Result<()> {
        if self.tensors.is_empty() || self.tensors.len() > max_tensors {
            return Err(BridgeError::InvalidArgument(format!(
                "descriptor holds {} tensors, expected 1..={}",
                self.tensors.len(),
                max_tensors
            )));
        }
        if let Some((index, _)) = self
            .tensors
            .iter()
            .enumerate()
            .find(|(_, t)| !t.is_valid(max_rank))
        {
            return Err(BridgeError::InvalidArgument(format!(
                "tensor {} has an invalid shape (rank 1..={}, no zero or oversized dimensions)",
                index, max_rank
            )));
        }
        Ok(())
    }
}

/// One raw byte buffer per tensor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TensorsData {
    pub buffers: Vec<Vec<u8>>,
}

impl TensorsData {
    pub fn new(buffers: Vec<Vec<u8>>) -> Self {
        Self { buffers }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Check that the buffers match the descriptor in count and byte size.
    pub fn validate(&self, info: &TensorsInfo) -> Result<()> {
        if self.buffers.len() != info.len() {
            return Err(BridgeError::Conversion(format!(
                "data holds {} tensors but the descriptor has {}",
                self.buffers.len(),
                info.len()
            )));
        }
        for (index, (buffer, tensor)) in self.buffers.iter().zip(info.iter()).enumerate() {
            let expected = tensor.byte_size().ok_or_else(|| {
                BridgeError::Conversion(format!("tensor {} size overflows", index))
            })?;
            if buffer.len() != expected {
                return Err(BridgeError::Conversion(format!(
                    "tensor {} holds {} bytes, expected {}",
                    index,
                    buffer.len(),
                    expected
                )));
            }
        }
        Ok(())
    }
}
