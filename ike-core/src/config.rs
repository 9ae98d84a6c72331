//! Configuration for the lease engine: named pool ranges and the
//! `unique_ids` policy flag (§10.3). This is ambient scaffolding the
//! distilled spec treats as API parameters; a real daemon reads these
//! from a file the way the host project's own config loader does.

use std::{net::IpAddr, path::Path};

use anyhow::{Context, Result};
use ike_addresspool::AddrRange;
use serde::Deserialize;

/// One named pool's textual range, as it would appear in a config file:
///
/// ```yaml
/// unique_ids: true
/// pools:
///   - name: road-warriors
///     start: 10.0.0.1
///     end: 10.0.0.254
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub start: String,
    pub end: String,
}

impl PoolConfig {
    /// Parses [`start`](Self::start)/[`end`](Self::end) into an
    /// [`AddrRange`], the same textual address forms §6 specifies for the
    /// identity grammar's IP literals.
    pub fn range(&self) -> Result<AddrRange> {
        let start: IpAddr = self
            .start
            .parse()
            .with_context(|| format!("pool {:?}: invalid start address {:?}", self.name, self.start))?;
        let end: IpAddr = self
            .end
            .parse()
            .with_context(|| format!("pool {:?}: invalid end address {:?}", self.name, self.end))?;
        AddrRange::new(start, end)
            .with_context(|| format!("pool {:?}: invalid range {}-{}", self.name, self.start, self.end))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The daemon-wide reusability flag consulted by
    /// [`crate::policy::is_reusable`].
    #[serde(default)]
    pub unique_ids: bool,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

impl Config {
    /// Loads a pool configuration from `path`, dispatching on extension
    /// the way the host project's own config loader picks between YAML
    /// and JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading ike-core config at {}", path.display()))?;
        Self::parse(&text, path.extension().and_then(|e| e.to_str()) == Some("json"))
    }

    fn parse(text: &str, as_json: bool) -> Result<Self> {
        if as_json {
            serde_json::from_str(text).context("parsing ike-core config as JSON")
        } else {
            serde_yaml::from_str(text).context("parsing ike-core config as YAML")
        }
    }

    pub fn find_pool(&self, name: &str) -> Option<&PoolConfig> {
        self.pools.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_config() {
        let yaml = r#"
unique_ids: true
pools:
  - name: road-warriors
    start: 10.0.0.1
    end: 10.0.0.254
"#;
        let cfg = Config::parse(yaml, false).expect("parses");
        assert!(cfg.unique_ids);
        let pool = cfg.find_pool("road-warriors").expect("pool present");
        let range = pool.range().expect("valid range");
        assert_eq!(range.size(), 254);
    }

    #[test]
    fn parses_json_config() {
        let json = r#"{"unique_ids": false, "pools": [{"name": "p", "start": "10.0.0.1", "end": "10.0.0.4"}]}"#;
        let cfg = Config::parse(json, true).expect("parses");
        assert!(!cfg.unique_ids);
        assert_eq!(cfg.find_pool("p").unwrap().range().unwrap().size(), 4);
    }

    #[test]
    fn missing_pool_is_none() {
        let cfg = Config::parse("pools: []", false).unwrap();
        assert!(cfg.find_pool("nope").is_none());
    }

    #[test]
    fn rejects_invalid_range() {
        let yaml = r#"
pools:
  - name: backwards
    start: 10.0.0.4
    end: 10.0.0.1
"#;
        let cfg = Config::parse(yaml, false).unwrap();
        assert!(cfg.find_pool("backwards").unwrap().range().is_err());
    }
}
