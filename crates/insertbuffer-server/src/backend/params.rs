//! Backend connection parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::BackendError;

/// Key naming the database every statement must target.
pub const DATABASE_KEY: &str = "db";

/// Whitespace-separated `key=value` pairs, e.g. `db=shop path=/var/lib/shop.db`.
///
/// The `db` key is mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    values: BTreeMap<String, String>,
}

impl ConnectionParams {
    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The configured database name.
    pub fn database(&self) -> &str {
        self.get(DATABASE_KEY).unwrap_or_default()
    }

    /// Iterates over all pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromStr for ConnectionParams {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut values = BTreeMap::new();
        for pair in s.split_whitespace() {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| BackendError::InvalidParameter(pair.to_string()))?;
            if key.is_empty() {
                return Err(BackendError::InvalidParameter(pair.to_string()));
            }
            values.insert(key.to_string(), value.to_string());
        }

        if !values.contains_key(DATABASE_KEY) {
            return Err(BackendError::MissingDatabase);
        }

        Ok(Self { values })
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}
