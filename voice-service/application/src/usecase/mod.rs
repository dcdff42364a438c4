mod convert_voice;

pub use convert_voice::{ConvertVoiceUseCase, ConvertVoiceUseCaseImpl, PipelineSettings};
