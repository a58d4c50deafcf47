//! Release version comparison.

use std::cmp::Ordering;

use semver::Version;

/// Direction a deployed tier has to move to reach the desired release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionDelta {
    Upgrade,
    Same,
    Downgrade,
    Unknown,
}

impl std::fmt::Display for VersionDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upgrade => write!(f, "upgrade"),
            Self::Same => write!(f, "same"),
            Self::Downgrade => write!(f, "downgrade"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Parse a release version, tolerating a leading `v`.
fn parse_release(version: &str) -> Option<Version> {
    let trimmed = version.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed)).ok()
}

/// Classify how `deployed` has to change to become `desired`.
pub fn classify(deployed: &str, desired: &str) -> VersionDelta {
    if deployed == desired && !deployed.is_empty() {
        return VersionDelta::Same;
    }

    let (Some(from), Some(to)) = (parse_release(deployed), parse_release(desired)) else {
        return VersionDelta::Unknown;
    };

    // Build metadata does not take part in ordering.
    match from.cmp_precedence(&to) {
        Ordering::Less => VersionDelta::Upgrade,
        Ordering::Equal => VersionDelta::Same,
        Ordering::Greater => VersionDelta::Downgrade,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_same() {
        assert_eq!(classify("4.11.0", "4.11.0"), VersionDelta::Same);
        assert_eq!(classify("4.11.0+abc", "4.11.0+def"), VersionDelta::Same);
    }

    #[test]
    fn test_classify_upgrade_and_downgrade() {
        assert_eq!(classify("4.10.0", "4.11.0"), VersionDelta::Upgrade);
        assert_eq!(classify("4.10.9", "4.10.10"), VersionDelta::Upgrade);
        assert_eq!(classify("4.11.0", "4.10.0"), VersionDelta::Downgrade);
        assert_eq!(classify("v5.0.0", "4.99.99"), VersionDelta::Downgrade);
    }

    #[test]
    fn test_classify_prerelease_orders_before_release() {
        assert_eq!(
            classify("4.11.0-0.nightly-2022-05-11-054135", "4.11.0"),
            VersionDelta::Upgrade
        );
        assert_eq!(
            classify("4.11.0", "4.11.0-rc.1"),
            VersionDelta::Downgrade
        );
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify("", "4.11.0"), VersionDelta::Unknown);
        assert_eq!(classify("", ""), VersionDelta::Unknown);
        assert_eq!(classify("4.11", "4.11.0"), VersionDelta::Unknown);
        assert_eq!(classify("4.10.0", "latest"), VersionDelta::Unknown);
    }
}
