//! Library coordinates

use crate::error::{KilnError, KilnResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `group:artifact:version` identity of a library
///
/// Ordering is by group, then artifact, then version (string order).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl Coordinate {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
        }
    }

    /// The conventional jar name, `<artifact>-<version>.jar`
    pub fn default_file_name(&self) -> String {
        format!("{}-{}.jar", self.artifact, self.version)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

impl FromStr for Coordinate {
    type Err = KilnError;

    fn from_str(s: &str) -> KilnResult<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [group, artifact, version]
                if !group.is_empty() && !artifact.is_empty() && !version.is_empty() =>
            {
                Ok(Self::new(*group, *artifact, *version))
            }
            _ => Err(KilnError::config(format!(
                "invalid coordinate `{}`, expected group:artifact:version",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Coordinate {
    type Error = KilnError;

    fn try_from(value: String) -> KilnResult<Self> {
        value.parse()
    }
}

impl From<Coordinate> for String {
    fn from(coord: Coordinate) -> Self {
        coord.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let coord: Coordinate = "org.scala-lang:scala-library:2.13.12".parse().unwrap();
        assert_eq!(coord.group, "org.scala-lang");
        assert_eq!(coord.artifact, "scala-library");
        assert_eq!(coord.version, "2.13.12");
        assert_eq!(coord.to_string(), "org.scala-lang:scala-library:2.13.12");
        assert_eq!(coord.default_file_name(), "scala-library-2.13.12.jar");
    }

    #[test]
    fn rejects_malformed() {
        assert!("junit:junit".parse::<Coordinate>().is_err());
        assert!("a:b:c:d".parse::<Coordinate>().is_err());
        assert!("a::1".parse::<Coordinate>().is_err());
    }

    #[test]
    fn orders_by_group_artifact_version() {
        let mut coords = vec![
            Coordinate::new("org.b", "x", "1"),
            Coordinate::new("org.a", "y", "1"),
            Coordinate::new("org.a", "x", "2"),
            Coordinate::new("org.a", "x", "1"),
        ];
        coords.sort();
        let rendered: Vec<String> = coords.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["org.a:x:1", "org.a:x:2", "org.a:y:1", "org.b:x:1"]);
    }

    #[test]
    fn serde_as_string() {
        let coord = Coordinate::new("junit", "junit", "4.13.2");
        let json = serde_json::to_value(&coord).unwrap();
        assert_eq!(json, "junit:junit:4.13.2");
        let back: Coordinate = serde_json::from_value(json).unwrap();
        assert_eq!(back, coord);
    }
}
