//! Which checks the audit runs
use std::env;

pub const ENV_TX_SIGNATURES: &str = "AUDIT_TX_SIG";
pub const ENV_BLIND_SIGNATURES: &str = "AUDIT_BLIND_SIG";
pub const ENV_PROOFS: &str = "AUDIT_ZKP";
pub const ENV_DEBUG: &str = "AUDIT_DEBUG";

/// Toggles of the individual verifiers. A disabled check treats every item it would have
/// examined as valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationConfig {
    pub verify_tx_signatures: bool,
    pub verify_blind_signatures: bool,
    pub verify_proofs: bool,
    /// Log the per-question sums of the published results
    pub debug: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        return Self {
            verify_tx_signatures: true,
            verify_blind_signatures: true,
            verify_proofs: true,
            debug: false,
        };
    }
}

impl ValidationConfig {
    /// Defaults overridden by `AUDIT_TX_SIG`, `AUDIT_BLIND_SIG`, `AUDIT_ZKP` and `AUDIT_DEBUG`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok());
        return config;
    }

    /// Apply every override `lookup` knows about. Values that are not a recognised boolean
    /// leave the setting alone.
    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        let settings: [(&str, &mut bool); 4] = [
            (ENV_TX_SIGNATURES, &mut self.verify_tx_signatures),
            (ENV_BLIND_SIGNATURES, &mut self.verify_blind_signatures),
            (ENV_PROOFS, &mut self.verify_proofs),
            (ENV_DEBUG, &mut self.debug),
        ];
        for (key, setting) in settings {
            if let Some(value) = lookup(key).as_deref().and_then(parse_flag) {
                *setting = value;
            }
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_runs_every_check() {
        let config = ValidationConfig::default();
        assert!(config.verify_tx_signatures);
        assert!(config.verify_blind_signatures);
        assert!(config.verify_proofs);
        assert!(!config.debug);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_TX_SIGNATURES, "false"),
            (ENV_PROOFS, "garbage"),
            (ENV_DEBUG, "1"),
        ]
        .into_iter()
        .collect();
        let mut config = ValidationConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(
            config,
            ValidationConfig {
                verify_tx_signatures: false,
                verify_blind_signatures: true,
                verify_proofs: true,
                debug: true,
            }
        );
    }
}
