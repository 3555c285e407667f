//! Tunables shared by the arena and the instrumentation layers.

/// Size of the length header written in front of every arena allocation.
pub const HEADER_SIZE: usize = core::mem::size_of::<u64>();

/// Default size of a freshly grown arena segment.
pub const DEFAULT_SEGMENT_SIZE: usize = 64 * 1024;

/// Initial and growth size of the two per-thread scratch arenas.
pub const SCRATCH_SEGMENT_SIZE: usize = 1024 * 1024;

/// Alignment of every segment buffer.
pub const SEGMENT_ALIGN: usize = 16;

/// Byte written into fresh blocks handed out by the leak detector.
pub const POISON_BYTE: u8 = 0xCD;

/// Number of bytes shown per entry in a leak report hex dump.
pub const HEX_DUMP_LIMIT: usize = 64;

/// Rounds `value` up to a multiple of `align` (a power of two).
pub const fn align_up(value: usize, align: usize) -> usize {
    if align == 0 {
        value
    } else {
        (value + (align - 1)) & !(align - 1)
    }
}

/// Sizing of a [`LinearAllocator`](crate::alloc::LinearAllocator).
///
/// Deserializable so hosts can keep arena sizing next to the rest of their
/// settings:
///
/// ```
/// use allocstack::alloc::LinearConfig;
///
/// let config: LinearConfig = serde_json::from_str(r#"{ "initial_size": 4096 }"#).unwrap();
/// assert_eq!(config.initial_size, 4096);
/// assert_eq!(config.segment_size, allocstack::alloc::DEFAULT_SEGMENT_SIZE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LinearConfig {
    /// Capacity of the first segment.
    pub initial_size: usize,
    /// Capacity of each grown segment (oversized requests get a larger one).
    pub segment_size: usize,
}

impl LinearConfig {
    /// A config whose first and grown segments share one size.
    pub const fn uniform(size: usize) -> Self {
        Self {
            initial_size: size,
            segment_size: size,
        }
    }
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self::uniform(DEFAULT_SEGMENT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 16), 16);
        assert_eq!(align_up(5, 0), 5);
    }

    #[test]
    fn test_config_json() {
        let config = LinearConfig {
            initial_size: 128,
            segment_size: 256,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: LinearConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let defaulted: LinearConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(defaulted, LinearConfig::default());
    }
}
