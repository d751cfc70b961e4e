use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// How a motif should be rendered in a generated scene.
///
/// `Template` motifs sit on a mostly white border and are placed as-is inside
/// a frame; `Stretched` motifs fill their canvas edge to edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotifDisplayMode {
    Template,
    #[default]
    Stretched,
}

impl fmt::Display for MotifDisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotifDisplayMode::Template => write!(f, "template"),
            MotifDisplayMode::Stretched => write!(f, "stretched"),
        }
    }
}

impl FromStr for MotifDisplayMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "template" => Ok(MotifDisplayMode::Template),
            "stretched" => Ok(MotifDisplayMode::Stretched),
            other => Err(DomainError::parse(format!("Unknown display mode: {other}"))),
        }
    }
}
