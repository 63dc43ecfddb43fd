// ── Structure domain types ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use super::Entity;

/// Occupancy state of a structure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AwayState {
    Home,
    Away,
    AutoAway,
}

impl AwayState {
    pub fn is_away(self) -> bool {
        matches!(self, Self::Away | Self::AutoAway)
    }

    /// The state a single "toggle away" action asks for.
    pub fn toggled(self) -> Self {
        if self.is_away() { Self::Home } else { Self::Away }
    }
}

/// Latest known state of one structure (home).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub structure_id: String,
    pub name: String,
    pub away: AwayState,
    pub thermostat_ids: Vec<String>,
    pub revision: Option<u64>,
}

impl Entity for StructureSnapshot {
    fn key(&self) -> &str {
        &self.structure_id
    }

    fn revision(&self) -> Option<u64> {
        self.revision
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::str::FromStr;

    use super::*;

    pub(crate) fn structure(id: &str, away: AwayState) -> StructureSnapshot {
        StructureSnapshot {
            structure_id: id.to_owned(),
            name: "Home".into(),
            away,
            thermostat_ids: vec!["t-1".into()],
            revision: None,
        }
    }

    #[test]
    fn toggle_away() {
        assert_eq!(AwayState::Home.toggled(), AwayState::Away);
        assert_eq!(AwayState::Away.toggled(), AwayState::Home);
        assert_eq!(AwayState::AutoAway.toggled(), AwayState::Home);
    }

    #[test]
    fn parse_auto_away() {
        assert_eq!(AwayState::from_str("auto-away").unwrap(), AwayState::AutoAway);
        assert_eq!(AwayState::AutoAway.as_ref(), "auto-away");
    }
}
