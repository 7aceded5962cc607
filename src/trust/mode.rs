//! Trust modes for outbound node connections.

use std::fmt;
use std::str::FromStr;

use super::error::TrustError;

/// Closed set of transport trust policies, fixed for the lifetime of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustMode {
    /// CA chain validation only.
    Ca,
    /// Trust-on-first-use only.
    Tofu,
    /// CA chain validation, falling back to TOFU.
    CaOrTofu,
    /// Static whitelist only.
    Whitelist,
    /// CA chain validation, falling back to the static whitelist.
    CaOrWhitelist,
    /// Accept every certificate. Development only.
    Insecure,
}

impl TrustMode {
    /// Whether this mode attempts CA chain validation first.
    pub fn uses_ca(self) -> bool {
        matches!(self, Self::Ca | Self::CaOrTofu | Self::CaOrWhitelist)
    }

    /// Whether this mode records and compares first-use fingerprints.
    pub fn uses_tofu(self) -> bool {
        matches!(self, Self::Tofu | Self::CaOrTofu)
    }

    /// Whether this mode compares against a static whitelist, with no write-back.
    pub fn uses_whitelist(self) -> bool {
        matches!(self, Self::Whitelist | Self::CaOrWhitelist)
    }

    /// Configuration identifier for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ca => "ca",
            Self::Tofu => "tofu",
            Self::CaOrTofu => "ca-or-tofu",
            Self::Whitelist => "whitelist",
            Self::CaOrWhitelist => "ca-or-whitelist",
            Self::Insecure => "insecure",
        }
    }
}

impl fmt::Display for TrustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustMode {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ca" => Ok(Self::Ca),
            "tofu" => Ok(Self::Tofu),
            "ca-or-tofu" => Ok(Self::CaOrTofu),
            "whitelist" => Ok(Self::Whitelist),
            "ca-or-whitelist" => Ok(Self::CaOrWhitelist),
            "insecure" => Ok(Self::Insecure),
            other => Err(TrustError::Configuration(format!(
                "unrecognized trust mode {other:?} (expected ca, tofu, ca-or-tofu, whitelist, ca-or-whitelist or insecure)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_mode() {
        for mode in [
            TrustMode::Ca,
            TrustMode::Tofu,
            TrustMode::CaOrTofu,
            TrustMode::Whitelist,
            TrustMode::CaOrWhitelist,
            TrustMode::Insecure,
        ] {
            assert_eq!(mode.as_str().parse::<TrustMode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_fails_fast() {
        let err = "tofu-or-ca".parse::<TrustMode>().unwrap_err();
        assert!(matches!(err, TrustError::Configuration(_)));
        assert!(err.to_string().contains("tofu-or-ca"));
    }

    #[test]
    fn path_selectors() {
        assert!(TrustMode::CaOrTofu.uses_ca());
        assert!(TrustMode::CaOrTofu.uses_tofu());
        assert!(!TrustMode::CaOrTofu.uses_whitelist());
        assert!(!TrustMode::Tofu.uses_ca());
        assert!(TrustMode::CaOrWhitelist.uses_whitelist());
        assert!(!TrustMode::Insecure.uses_ca());
    }
}
