//! Effect identifiers accepted at the API boundary.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the fixed voice effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectSpec {
    /// Ring modulation, distortion and a high-pass.
    Alien,
    /// Sped-up playback with heavy compression.
    Cartoon,
    /// Slowed, wobbling playback through a synthetic reverb.
    Ghost,
}

impl EffectSpec {
    pub const ALL: [EffectSpec; 3] = [EffectSpec::Alien, EffectSpec::Cartoon, EffectSpec::Ghost];

    pub fn as_str(self) -> &'static str {
        match self {
            EffectSpec::Alien => "alien",
            EffectSpec::Cartoon => "cartoon",
            EffectSpec::Ghost => "ghost",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            EffectSpec::Alien => "ring-modulated, distorted and thinned",
            EffectSpec::Cartoon => "sped up and squashed",
            EffectSpec::Ghost => "slowed, wavering and reverberant",
        }
    }

    /// Download name, e.g. `voice-ghost-effect.wav`.
    pub fn file_name(self) -> String {
        format!("voice-{}-effect.wav", self.as_str())
    }
}

impl Display for EffectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectSpec {
    type Err = UnknownEffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        EffectSpec::ALL
            .into_iter()
            .find(|effect| effect.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownEffectError(s.to_string()))
    }
}

/// An effect name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEffectError(pub String);

impl UnknownEffectError {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for UnknownEffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = EffectSpec::ALL.iter().map(|e| e.as_str()).collect();
        write!(
            f,
            "unknown effect '{}' (expected one of: {})",
            self.0,
            names.join(", ")
        )
    }
}

impl std::error::Error for UnknownEffectError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        assert_eq!("alien".parse::<EffectSpec>(), Ok(EffectSpec::Alien));
        assert_eq!("Cartoon".parse::<EffectSpec>(), Ok(EffectSpec::Cartoon));
        assert_eq!(" GHOST \n".parse::<EffectSpec>(), Ok(EffectSpec::Ghost));
    }

    #[test]
    fn rejects_unknown_names() {
        let err = "robot".parse::<EffectSpec>().unwrap_err();
        assert_eq!(err.name(), "robot");
        assert!(err.to_string().contains("unknown effect 'robot'"));
        assert!("".parse::<EffectSpec>().is_err());
    }

    #[test]
    fn file_names_follow_download_pattern() {
        assert_eq!(EffectSpec::Alien.file_name(), "voice-alien-effect.wav");
        assert_eq!(EffectSpec::Ghost.file_name(), "voice-ghost-effect.wav");
    }

    #[test]
    fn serializes_as_lowercase_identifier() {
        let json = serde_json::to_string(&EffectSpec::Cartoon).unwrap();
        assert_eq!(json, "\"cartoon\"");
        let parsed: EffectSpec = serde_json::from_str("\"ghost\"").unwrap();
        assert_eq!(parsed, EffectSpec::Ghost);
    }
}
