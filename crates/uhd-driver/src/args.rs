//! Device-selection argument strings (`type=b200,serial=30F1A2`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgsError {
    #[error("missing '=' in argument '{0}'")]
    MissingValue(String),
    #[error("empty key in argument '{0}'")]
    EmptyKey(String),
}

/// Ordered `key=value` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceArgs {
    pairs: BTreeMap<String, String>,
}

impl DeviceArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// True when every pair in `self` is present with the same value in `other`.
    pub fn is_subset_of(&self, other: &DeviceArgs) -> bool {
        self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl FromStr for DeviceArgs {
    type Err = ArgsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut args = DeviceArgs::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ArgsError::MissingValue(part.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ArgsError::EmptyKey(part.to_string()));
            }
            args.insert(key, value.trim());
        }
        Ok(args)
    }
}

impl fmt::Display for DeviceArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_print() {
        let args: DeviceArgs = " type = b200 , serial=30F1A2,".parse().unwrap();
        assert_eq!(args.get("type"), Some("b200"));
        assert_eq!(args.get("serial"), Some("30F1A2"));
        assert_eq!(args.to_string(), "serial=30F1A2,type=b200");
        assert!("".parse::<DeviceArgs>().unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "type".parse::<DeviceArgs>(),
            Err(ArgsError::MissingValue("type".into()))
        );
        assert_eq!(
            "=b200".parse::<DeviceArgs>(),
            Err(ArgsError::EmptyKey("=b200".into()))
        );
    }

    #[test]
    fn test_subset() {
        let filter = DeviceArgs::new().with("type", "b200");
        let dev = DeviceArgs::new().with("type", "b200").with("serial", "1");
        assert!(filter.is_subset_of(&dev));
        assert!(!dev.is_subset_of(&filter));
        assert!(DeviceArgs::new().is_subset_of(&filter));
    }
}
