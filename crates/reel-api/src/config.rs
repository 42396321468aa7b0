//! API configuration.

use std::time::Duration;

use reel_models::VoiceInfo;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second per client IP
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Bearer token required on `/api` routes when set
    pub api_token: Option<String>,
    /// Voices offered by the UI; empty accepts any voice id
    pub voices: Vec<VoiceInfo>,
    /// Lifetime of presigned video URLs
    pub presign_ttl: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            request_timeout: Duration::from_secs(30),
            max_body_size: 256 * 1024,
            environment: "development".to_string(),
            api_token: None,
            voices: default_voices(),
            presign_ttl: Duration::from_secs(3600),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let num = |name: &str| -> Option<u64> { std::env::var(name).ok().and_then(|s| s.parse().ok()) };

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: num("API_PORT").map(|p| p as u16).unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: num("RATE_LIMIT_RPS")
                .map(|n| n as u32)
                .unwrap_or(defaults.rate_limit_rps),
            rate_limit_burst: num("RATE_LIMIT_BURST")
                .map(|n| n as u32)
                .unwrap_or(defaults.rate_limit_burst),
            request_timeout: num("REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: num("MAX_BODY_SIZE")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            api_token: std::env::var("API_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            voices: std::env::var("VOICES")
                .map(|s| parse_voices(&s))
                .unwrap_or(defaults.voices),
            presign_ttl: num("PRESIGN_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.presign_ttl),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Whether `voice` may be used for a new job.
    pub fn accepts_voice(&self, voice: &str) -> bool {
        self.voices.is_empty() || self.voices.iter().any(|v| v.id == voice.trim())
    }
}

/// Parse `id:Name,id2:Name2`. A bare id is its own display name.
pub fn parse_voices(raw: &str) -> Vec<VoiceInfo> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((id, name)) => VoiceInfo {
                id: id.trim().to_string(),
                name: name.trim().to_string(),
            },
            None => VoiceInfo {
                id: entry.to_string(),
                name: entry.to_string(),
            },
        })
        .collect()
}

fn default_voices() -> Vec<VoiceInfo> {
    parse_voices(
        "21m00Tcm4TlvDq8ikWAM:Rachel,pNInz6obpgDQGcFmaJgB:Adam,\
         EXAVITQu4vr4xnSDxMaL:Bella,TxGEqnHWrfWFTfGW9XjX:Josh",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voices() {
        let voices = parse_voices(" a:Alice , b ,, c: Carl ");
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].name, "Alice");
        assert_eq!(voices[1].name, "b");
        assert_eq!(voices[2].id, "c");
    }

    #[test]
    fn test_accepts_voice() {
        let mut config = ApiConfig::default();
        assert!(config.accepts_voice("pNInz6obpgDQGcFmaJgB"));
        assert!(!config.accepts_voice("unknown"));

        config.voices.clear();
        assert!(config.accepts_voice("anything"));
    }
}
