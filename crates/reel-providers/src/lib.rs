//! Generation service clients for ScriptReel.
//!
//! Each external capability sits behind a trait so the worker pipeline can
//! be exercised with fakes:
//! - [`ScriptWriter`]: OpenRouter chat completions ([`LlmClient`])
//! - [`SpeechSynthesizer`]: ElevenLabs ([`TtsClient`]) or OpenAI ([`OpenAiTts`])
//! - [`ImageGenerator`]: OpenAI-compatible image API ([`ImageClient`])
//! - [`VideoGenerator`]: task-based clip API ([`VideoClient`])

pub mod error;
pub mod http;
pub mod image;
pub mod llm;
pub mod metrics;
pub mod traits;
pub mod tts;
pub mod video;

pub use error::{ProviderError, ProviderResult};
pub use http::HttpSettings;
pub use image::{ImageClient, ImageConfig};
pub use llm::{strip_code_fences, LlmClient, LlmConfig};
pub use traits::{GeneratedMedia, ImageGenerator, ScriptWriter, SpeechSynthesizer, VideoGenerator};
pub use tts::{speech_from_env, OpenAiTts, OpenAiTtsConfig, TtsClient, TtsConfig, TtsProvider};
pub use video::{TaskState, TaskStatus, VideoClient, VideoConfig};
