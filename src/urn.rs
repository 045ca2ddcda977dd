//! Sensor and station identity mapping.
//!
//! Raw identities look like `urn:ioos:sensor:<authority>:<site>:<variable>`.
//! The authority and site tokens are rewritten through two alias tables and the
//! result is lower-cased, giving the canonical sensor identity. The station
//! identity is `urn:ioos:station:<authority>:<uid>`.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Minimum number of `:` separated tokens in a raw identity.
pub const MIN_TOKENS: usize = 5;

const AUTHORITY: usize = 3;
const SITE: usize = 4;

/// Authority and station alias tables, passed to every mapping call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityMaps {
    /// raw authority token → canonical authority token
    #[serde(default)]
    pub authority_map: HashMap<String, String>,
    /// `authority:site` → `canonical-authority:uid`
    #[serde(default)]
    pub station_map: HashMap<String, String>,
}

impl IdentityMaps {
    pub fn new(authority_map: HashMap<String, String>, station_map: HashMap<String, String>) -> Self {
        Self { authority_map, station_map }
    }
}

/// Result of mapping one raw identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedIdentity {
    pub sensor_urn: String,
    pub station_urn: String,
    /// Last token of the raw identity, case preserved
    pub variable: String,
}

/// Rewrite `raw_urn` into its canonical sensor and station identities.
pub fn map_identity(raw_urn: &str, maps: &IdentityMaps) -> Result<MappedIdentity> {
    let tokens: Vec<&str> = raw_urn.split(':').collect();
    if tokens.len() < MIN_TOKENS {
        return Err(Error::MalformedIdentifier { urn: raw_urn.to_string(), expected: MIN_TOKENS });
    }

    let authority = lookup(&maps.authority_map, tokens[AUTHORITY])
        .map(String::as_str)
        .unwrap_or(tokens[AUTHORITY]);

    let auth_station = format!("{authority}:{}", tokens[SITE]);
    let remapped = lookup(&maps.station_map, &auth_station).unwrap_or(&auth_station);
    // first token is the authority, last the uid; a value without ':' only renames the uid
    let (authority, uid) = match remapped.split_once(':') {
        Some((auth, rest)) => (auth, rest.rsplit(':').next().unwrap_or(rest)),
        None => (authority, remapped.as_str()),
    };

    let variable = tokens[tokens.len() - 1];

    let mut sensor: Vec<&str> = tokens[..AUTHORITY].to_vec();
    sensor.extend([authority, uid, variable]);

    let mut station: Vec<&str> = tokens[..2].to_vec();
    station.extend(["station", authority, uid]);

    Ok(MappedIdentity {
        sensor_urn: sensor.join(":").to_lowercase(),
        station_urn: station.join(":").to_lowercase(),
        variable: variable.to_string(),
    })
}

/// Exact key first, then its lower-cased form, so canonical (lower-cased)
/// output maps the same way as the raw input did.
fn lookup<'a>(table: &'a HashMap<String, String>, key: &str) -> Option<&'a String> {
    table.get(key).or_else(|| table.get(&key.to_lowercase()))
}

/// A canonical sensor identity as used for sensor directory names,
/// `scheme:version:sensor:authority:uid:variable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorUrn {
    urn: String,
}

impl SensorUrn {
    /// Parse a directory basename; `None` unless the third token is `sensor`
    /// and at least [`MIN_TOKENS`] tokens are present.
    pub fn parse(name: &str) -> Option<Self> {
        let tokens: Vec<&str> = name.split(':').collect();
        if tokens.len() < MIN_TOKENS || tokens[2] != "sensor" {
            return None;
        }
        Some(Self { urn: name.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.urn
    }

    /// Name of the data variable, the last token.
    pub fn variable(&self) -> &str {
        self.urn.rsplit(':').next().unwrap_or_default()
    }

    /// The hosting station: `sensor` becomes `station` and the variable is dropped.
    pub fn station_urn(&self) -> String {
        let tokens: Vec<&str> = self.urn.split(':').collect();
        let mut station: Vec<&str> = tokens[..tokens.len() - 1].to_vec();
        station[2] = "station";
        station.join(":")
    }
}

impl std::fmt::Display for SensorUrn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.urn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn maps(auth: &[(&str, &str)], station: &[(&str, &str)]) -> IdentityMaps {
        let owned = |pairs: &[(&str, &str)]| {
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>()
        };
        IdentityMaps::new(owned(auth), owned(station))
    }

    #[test]
    fn test_unmapped_identity_is_lowercased() {
        let m = map_identity("urn:ioos:sensor:WMO:41001:Sea_Water_Temperature", &IdentityMaps::default()).unwrap();
        assert_eq!(m.sensor_urn, "urn:ioos:sensor:wmo:41001:sea_water_temperature");
        assert_eq!(m.station_urn, "urn:ioos:station:wmo:41001");
        assert_eq!(m.variable, "Sea_Water_Temperature");
    }

    #[test]
    fn test_authority_alias() {
        let m = map_identity("urn:ioos:sensor:old:abc:salinity", &maps(&[("old", "new")], &[])).unwrap();
        assert_eq!(m.sensor_urn, "urn:ioos:sensor:new:abc:salinity");
        assert_eq!(m.station_urn, "urn:ioos:station:new:abc");
    }

    #[test]
    fn test_station_alias_uses_mapped_authority() {
        let m = map_identity(
            "urn:ioos:sensor:old:abc:salinity",
            &maps(&[("old", "new")], &[("new:abc", "wmo:41001")]),
        )
        .unwrap();
        assert_eq!(m.sensor_urn, "urn:ioos:sensor:wmo:41001:salinity");
        assert_eq!(m.station_urn, "urn:ioos:station:wmo:41001");
    }

    #[test]
    fn test_too_few_tokens() {
        let err = map_identity("urn:ioos:sensor:wmo", &IdentityMaps::default()).unwrap_err();
        assert!(matches!(err, Error::MalformedIdentifier { expected: 5, .. }));
    }

    #[test]
    fn test_five_tokens_reuses_site_as_variable() {
        let m = map_identity("urn:ioos:sensor:wmo:temp", &IdentityMaps::default()).unwrap();
        assert_eq!(m.sensor_urn, "urn:ioos:sensor:wmo:temp:temp");
    }

    #[test]
    fn test_sensor_urn_parse() {
        let s = SensorUrn::parse("urn:ioos:sensor:wmo:41001:sea_water_temperature").unwrap();
        assert_eq!(s.variable(), "sea_water_temperature");
        assert_eq!(s.station_urn(), "urn:ioos:station:wmo:41001");
        assert!(SensorUrn::parse("urn:ioos:station:wmo:41001").is_none());
        assert!(SensorUrn::parse("2014").is_none());
    }

    #[test]
    fn test_remapped_identity_maps_to_itself() {
        let tables = maps(&[("old", "new")], &[("new:abc", "wmo:41001")]);
        let once = map_identity("urn:ioos:sensor:old:abc:x", &tables).unwrap();
        assert_eq!(once.sensor_urn, "urn:ioos:sensor:wmo:41001:x");
        let twice = map_identity(&once.sensor_urn, &tables).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_upper_case_tokens_use_lower_case_keys() {
        let tables = maps(&[("legacy", "wmo")], &[("wmo:old", "wmo:41001")]);
        let m = map_identity("urn:ioos:sensor:LEGACY:OLD:temp", &tables).unwrap();
        assert_eq!(m.sensor_urn, "urn:ioos:sensor:wmo:41001:temp");
    }

    #[test]
    fn test_station_value_with_extra_tokens() {
        let m = map_identity("urn:ioos:sensor:wmo:abc:temp", &maps(&[], &[("wmo:abc", "ndbc:extra:41001")])).unwrap();
        assert_eq!(m.station_urn, "urn:ioos:station:ndbc:41001");
        assert_eq!(m.sensor_urn, "urn:ioos:sensor:ndbc:41001:temp");
    }

    #[test]
    fn test_station_value_without_authority_renames_uid() {
        let m = map_identity("urn:ioos:sensor:wmo:abc:temp", &maps(&[], &[("wmo:abc", "41001")])).unwrap();
        assert_eq!(m.station_urn, "urn:ioos:station:wmo:41001");
    }

    fn authority() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("legacy".to_string()),
            Just("LEGACY".to_string()),
            Just("wmo".to_string()),
            Just("WMO".to_string()),
            "[a-zA-Z]{1,6}",
        ]
    }

    fn site() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("old".to_string()),
            Just("OLD".to_string()),
            "[a-zA-Z0-9]{1,6}",
        ]
    }

    proptest! {
        #[test]
        fn prop_mapping_is_idempotent(
            auth in authority(),
            site in site(),
            var in "[a-zA-Z_]{1,12}",
        ) {
            let tables = maps(&[("legacy", "wmo")], &[("wmo:old", "wmo:41001")]);
            let raw = format!("urn:ioos:sensor:{auth}:{site}:{var}");
            let once = map_identity(&raw, &tables).unwrap();
            let twice = map_identity(&once.sensor_urn, &tables).unwrap();
            prop_assert_eq!(&once.sensor_urn, &twice.sensor_urn);
            prop_assert_eq!(&once.station_urn, &twice.station_urn);
        }
    }
}
