//! Voice and background music mixing.

use serde::{Deserialize, Serialize};

/// Linear gains applied before mixing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixGains {
    pub voice: f64,
    pub music: f64,
}

impl Default for MixGains {
    fn default() -> Self {
        Self {
            voice: 1.0,
            music: 0.15,
        }
    }
}

/// Output label of [`amix_filter`].
pub const MIX_OUTPUT_LABEL: &str = "[aout]";

/// Filter graph mixing input 0's audio (voice) with input 1 (music).
///
/// The music input is expected to be looped; `duration=first` ends the mix
/// with the narration. `normalize=0` keeps the gains as given instead of
/// letting amix divide by the input count.
pub fn amix_filter(gains: MixGains) -> String {
    format!(
        "[0:a]volume={:.3}[voice];[1:a]volume={:.3}[music];\
         [voice][music]amix=inputs=2:duration=first:dropout_transition=2:normalize=0{}",
        gains.voice, gains.music, MIX_OUTPUT_LABEL
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amix_filter() {
        let filter = amix_filter(MixGains {
            voice: 1.0,
            music: 0.2,
        });
        assert_eq!(
            filter,
            "[0:a]volume=1.000[voice];[1:a]volume=0.200[music];\
             [voice][music]amix=inputs=2:duration=first:dropout_transition=2:normalize=0[aout]"
        );
    }
}
