//! Target environments used to re-evaluate conditional auto-loads

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for unknown framework or platform names
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("unknown framework '{0}' (expected 'arduino' or 'esp-idf')")]
    UnknownFramework(String),

    #[error("unknown platform '{0}' (expected 'esp32' or 'esp8266')")]
    UnknownPlatform(String),
}

/// Build framework of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Framework {
    #[serde(rename = "arduino")]
    Arduino,
    #[serde(rename = "esp-idf")]
    EspIdf,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Arduino => "arduino",
            Framework::EspIdf => "esp-idf",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arduino" => Ok(Framework::Arduino),
            "esp-idf" | "esp_idf" => Ok(Framework::EspIdf),
            other => Err(TargetError::UnknownFramework(other.to_string())),
        }
    }
}

/// Hardware platform of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "esp32")]
    Esp32,
    #[serde(rename = "esp8266")]
    Esp8266,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Esp32 => "esp32",
            Platform::Esp8266 => "esp8266",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "esp32" => Ok(Platform::Esp32),
            "esp8266" => Ok(Platform::Esp8266),
            other => Err(TargetError::UnknownPlatform(other.to_string())),
        }
    }
}

/// A (framework, platform) pair passed explicitly to every auto-load resolver
///
/// Either part may be unset; the all-unset environment is the "no target"
/// context used when nothing about the build is known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TargetEnvironment {
    #[serde(default)]
    pub framework: Option<Framework>,
    #[serde(default)]
    pub platform: Option<Platform>,
}

impl TargetEnvironment {
    pub const NO_TARGET: TargetEnvironment = TargetEnvironment {
        framework: None,
        platform: None,
    };

    pub const fn with_framework(framework: Framework) -> Self {
        Self {
            framework: Some(framework),
            platform: None,
        }
    }

    pub const fn with_platform(platform: Platform) -> Self {
        Self {
            framework: None,
            platform: Some(platform),
        }
    }

    pub fn is_no_target(&self) -> bool {
        self.framework.is_none() && self.platform.is_none()
    }
}

impl fmt::Display for TargetEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.platform, self.framework) {
            (None, None) => f.write_str("no-target"),
            (Some(platform), None) => write!(f, "{platform}"),
            (None, Some(framework)) => write!(f, "{framework}"),
            (Some(platform), Some(framework)) => write!(f, "{platform}/{framework}"),
        }
    }
}

/// The environments every auto-load is evaluated under when building the
/// dependency graph, so the graph holds the union of all possible outcomes.
pub const CANONICAL_ENVIRONMENTS: [TargetEnvironment; 5] = [
    TargetEnvironment::NO_TARGET,
    TargetEnvironment::with_framework(Framework::Arduino),
    TargetEnvironment::with_framework(Framework::EspIdf),
    TargetEnvironment::with_platform(Platform::Esp32),
    TargetEnvironment::with_platform(Platform::Esp8266),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_environments_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for env in CANONICAL_ENVIRONMENTS {
            assert!(seen.insert(env), "duplicate environment {env}");
        }
        assert!(CANONICAL_ENVIRONMENTS[0].is_no_target());
    }

    #[test]
    fn test_framework_parse() {
        assert_eq!("arduino".parse::<Framework>(), Ok(Framework::Arduino));
        assert_eq!("esp-idf".parse::<Framework>(), Ok(Framework::EspIdf));
        assert!(matches!(
            "zephyr".parse::<Framework>(),
            Err(TargetError::UnknownFramework(_))
        ));
    }

    #[test]
    fn test_serde_names() {
        let env = TargetEnvironment {
            framework: Some(Framework::EspIdf),
            platform: Some(Platform::Esp8266),
        };
        let json = serde_json::to_value(env).unwrap();
        assert_eq!(json["framework"], "esp-idf");
        assert_eq!(json["platform"], "esp8266");
    }

    #[test]
    fn test_display() {
        assert_eq!(TargetEnvironment::NO_TARGET.to_string(), "no-target");
        assert_eq!(
            TargetEnvironment::with_platform(Platform::Esp32).to_string(),
            "esp32"
        );
    }
}
