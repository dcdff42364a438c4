pub mod audio;
pub mod codec;
pub mod pitch;
pub mod scratch;

pub use codec::{FfmpegCodecAdapter, FfmpegCodecConfig};
pub use pitch::{PhaseVocoderConfig, PhaseVocoderShifter};
pub use scratch::{FsScratchStorage, InMemoryScratchStorage};
