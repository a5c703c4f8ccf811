//! Scheme configuration

use serde::{Deserialize, Serialize};
use shroud_core::curve::constants;
use shroud_core::{CommitmentKind, CurveParameters, LinearGroup};

use crate::error::{Result, VssError};

/// Configuration of one replica's confidentiality scheme
///
/// Passed by reference into every component that needs it; there is no
/// process-wide instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemeConfig {
    /// Commitment family used for client sharings and `Random` rounds
    pub vss: CommitmentKind,

    /// Subgroup parameters for linear commitments
    pub linear: LinearGroup,

    /// Curve that is current at startup
    pub curve: String,

    /// Curves registered on top of the built-in ones
    pub extra_curves: Vec<CurveParameters>,

    /// Log entries a participant has to get its proposal ordered
    pub proposal_window: u32,

    /// Log entries a complaint stays open, and the grace period before an
    /// observed proposal counts as settled
    pub gap_window: u32,
}

impl Default for SchemeConfig {
    fn default() -> Self {
        Self {
            vss: CommitmentKind::Linear,
            linear: LinearGroup::rfc3526_2048(),
            curve: constants::SECP256R1.to_string(),
            extra_curves: Vec::new(),
            proposal_window: 32,
            gap_window: 16,
        }
    }
}

impl SchemeConfig {
    /// Small group and short windows, for local clusters and tests
    pub fn simulation(vss: CommitmentKind) -> Self {
        Self {
            vss,
            linear: LinearGroup::insecure_256(),
            proposal_window: 12,
            gap_window: 4,
            ..Self::default()
        }
    }

    pub fn with_curve(mut self, curve: &str) -> Self {
        self.curve = curve.to_string();
        self
    }

    /// Cheap consistency checks; group and curve validation happen when the
    /// scheme is built
    pub fn validate(&self) -> Result<()> {
        if self.gap_window == 0 {
            return Err(VssError::Configuration("gap_window must be positive".into()));
        }
        if self.proposal_window == 0 {
            return Err(VssError::Configuration(
                "proposal_window must be positive".into(),
            ));
        }
        if self.curve.is_empty() {
            return Err(VssError::Configuration("no current curve configured".into()));
        }
        Ok(())
    }

    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shroud.json");

        let mut config = SchemeConfig::simulation(CommitmentKind::EllipticCurve)
            .with_curve(constants::SECP256K1);
        config.extra_curves.push(constants::bls12_381());
        config.save(&path).unwrap();

        let loaded = SchemeConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "vss": "constant", "gap_window": 3 }"#).unwrap();

        let loaded = SchemeConfig::load(&path).unwrap();
        assert_eq!(loaded.vss, CommitmentKind::Constant);
        assert_eq!(loaded.gap_window, 3);
        assert_eq!(loaded.curve, constants::SECP256R1);
        assert_eq!(loaded.linear, LinearGroup::rfc3526_2048());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = SchemeConfig {
            gap_window: 0,
            ..SchemeConfig::default()
        };
        assert!(matches!(config.validate(), Err(VssError::Configuration(_))));
    }
}
