mod convert_voice;

pub use convert_voice::ConvertVoiceRequest;
