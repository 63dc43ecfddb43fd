// Wire shapes exchanged with the upstream API.
//
// Kept deliberately close to the JSON; `hearth-core` converts these into
// validated domain types.

use serde::{Deserialize, Serialize};

/// Response body of `POST /oauth2/access_token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// One thermostat as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThermostatRecord {
    pub device_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub structure_id: Option<String>,
    /// `"heat"`, `"cool"`, `"heat-cool"` or `"off"`.
    pub hvac_mode: String,
    pub ambient_temperature_f: i32,
    pub target_temperature_f: i32,
    pub target_temperature_low_f: i32,
    pub target_temperature_high_f: i32,
    /// Monotonic per-entity revision, when the server tracks one.
    #[serde(default)]
    pub revision: Option<u64>,
}

/// One structure (home) as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub structure_id: String,
    #[serde(default)]
    pub name: String,
    /// `"home"`, `"away"` or `"auto-away"`.
    pub away: String,
    #[serde(default)]
    pub thermostats: Vec<String>,
    #[serde(default)]
    pub revision: Option<u64>,
}

/// Full state set, as pushed on feed connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(default)]
    pub thermostats: Vec<ThermostatRecord>,
    #[serde(default)]
    pub structures: Vec<StructureRecord>,
}

/// Body of `PUT /thermostats/{id}`: only the mutated fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThermostatPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature_f: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature_low_f: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature_high_f: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hvac_mode: Option<String>,
}

impl ThermostatPatch {
    pub fn is_empty(&self) -> bool {
        self.target_temperature_f.is_none()
            && self.target_temperature_low_f.is_none()
            && self.target_temperature_high_f.is_none()
            && self.hvac_mode.is_none()
    }
}

/// Body of `PUT /structures/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructurePatch {
    pub away: String,
}
