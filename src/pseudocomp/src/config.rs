// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::{Deserialize, Serialize};

use crate::common::{Error, ErrorCode, ErrorKind, Result};
use crate::names::DEFAULT_PREFIX;
use crate::token::is_plain_identifier;
use crate::units::UnitDef;

/// Settings for building connection nodes.  Every field is optional
/// when loading from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Prefix for synthetic node identifiers, which are `<prefix><n>`.
    pub name_prefix: String,
    /// Units available in addition to the built-in table.
    pub units: Vec<UnitDef>,
    /// How many ulps away from 1 (or 0) a conversion scale (or offset)
    /// can be and still be treated as the identity.
    pub float_ulps: i64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_PREFIX.to_owned(),
            units: vec![],
            float_ulps: 4,
        }
    }
}

impl ConnectConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: ConnectConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // node names end up inside edge endpoints like `<name>.in0`
        if !is_plain_identifier(&format!("{}0", self.name_prefix)) {
            return Err(bad_config(format!(
                "name_prefix '{}' doesn't produce valid identifiers",
                self.name_prefix
            )));
        }
        if self.float_ulps < 0 {
            return Err(bad_config(format!(
                "float_ulps must not be negative, not {}",
                self.float_ulps
            )));
        }
        Ok(())
    }
}

fn bad_config(details: String) -> Error {
    Error::new(ErrorKind::Config, ErrorCode::BadConfig, Some(details))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectConfig::default();
        assert_eq!("_pseudo_", config.name_prefix);
        assert!(config.units.is_empty());
        assert_eq!(4, config.float_ulps);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json() {
        let config = ConnectConfig::from_json(
            r#"{
                "name_prefix": "conn_",
                "units": [{"name": "USD"}, {"name": "kUSD", "factor": 1000, "definition": "USD"}]
            }"#,
        )
        .unwrap();
        assert_eq!("conn_", config.name_prefix);
        assert_eq!(4, config.float_ulps);
        assert_eq!(2, config.units.len());
        assert_eq!(Some("USD".to_owned()), config.units[1].definition);

        assert_eq!(ConnectConfig::default(), ConnectConfig::from_json("{}").unwrap());
    }

    #[test]
    fn test_bad_config() {
        for text in [
            "{",
            r#"{"float_ulps": "lots"}"#,
            r#"{"float_ulps": -1}"#,
            r#"{"name_prefix": "a b"}"#,
            r#"{"name_prefix": ""}"#,
        ] {
            let err = ConnectConfig::from_json(text).unwrap_err();
            assert_eq!(ErrorCode::BadConfig, err.code, "{text}");
            assert_eq!(ErrorKind::Config, err.kind);
        }
    }
}
