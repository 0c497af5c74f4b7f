//! Session configuration.

use serde::{Deserialize, Serialize};

use story_model::WalkerConfig;

use super::AttributionPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Who owns text emitted while crossing a knot boundary.
    pub policy: AttributionPolicy,

    /// Consult the interpreter's native knot guess when the path does not
    /// resolve structurally.
    pub trust_native_guess: bool,

    /// Settings for the bundled reference interpreter.
    pub walker: WalkerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: AttributionPolicy::LandingKnot,
            trust_native_guess: true,
            walker: WalkerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parse from TOML; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn with_policy(mut self, policy: AttributionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_native_guess(mut self, trust: bool) -> Self {
        self.trust_native_guess = trust;
        self
    }
}
