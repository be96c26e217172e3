//! A ready-made options record for executors.
//!
//! The loader never reads options; it forwards whatever the executor declares
//! as [`Executor::Options`](crate::Executor::Options). Executors that follow the
//! usual store-and-network model can use [`QueryOptions`] for that.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where an execution may read its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Use cached data if complete, otherwise fetch.
    #[default]
    StoreOrNetwork,
    /// Use cached data and also fetch to refresh it.
    StoreAndNetwork,
    /// Always fetch, ignoring cached data.
    NetworkOnly,
    /// Never fetch; use only what the store already has.
    StoreOnly,
}

impl FetchPolicy {
    /// Returns true if this policy may read the store.
    pub fn reads_store(self) -> bool {
        !matches!(self, FetchPolicy::NetworkOnly)
    }

    /// Returns true if this policy may hit the network.
    pub fn reads_network(self) -> bool {
        !matches!(self, FetchPolicy::StoreOnly)
    }
}

/// Network-layer cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCacheConfig {
    /// Bypass any response cache of the network layer.
    pub force: bool,
    /// Re-fetch on this interval while the query is retained.
    #[serde(with = "duration_millis")]
    pub poll_interval: Option<Duration>,
}

/// Common per-query options.
///
/// # Example
///
/// ```
/// use query_loader::{FetchPolicy, QueryOptions};
///
/// let options: QueryOptions =
///     serde_json::from_str(r#"{ "fetch_policy": "network-only", "fetch_key": "7" }"#).unwrap();
/// assert_eq!(options.fetch_policy, FetchPolicy::NetworkOnly);
/// assert!(!options.skip);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Where data may be read from.
    pub fetch_policy: FetchPolicy,
    /// Changing this forces a refetch even when the request is unchanged.
    pub fetch_key: Option<String>,
    /// Network-layer cache configuration.
    pub network_cache: NetworkCacheConfig,
    /// Do not execute at all.
    pub skip: bool,
}

impl QueryOptions {
    /// Options with the given fetch policy and everything else default.
    pub fn with_fetch_policy(fetch_policy: FetchPolicy) -> Self {
        Self {
            fetch_policy,
            ..Self::default()
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => {
                let millis =
                    u64::try_from(d.as_millis()).map_err(<S::Error as ser::Error>::custom)?;
                s.serialize_some(&millis)
            }
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_store_or_network() {
        let options = QueryOptions::default();
        assert_eq!(options.fetch_policy, FetchPolicy::StoreOrNetwork);
        assert!(options.fetch_policy.reads_store());
        assert!(options.fetch_policy.reads_network());
    }

    #[test]
    fn test_policy_reads() {
        assert!(!FetchPolicy::NetworkOnly.reads_store());
        assert!(!FetchPolicy::StoreOnly.reads_network());
        assert!(FetchPolicy::StoreAndNetwork.reads_store());
    }

    #[test]
    fn test_options_roundtrip_through_json() {
        let options = QueryOptions {
            fetch_policy: FetchPolicy::StoreAndNetwork,
            fetch_key: Some("refresh-1".into()),
            network_cache: NetworkCacheConfig {
                force: true,
                poll_interval: Some(Duration::from_secs(5)),
            },
            skip: false,
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["fetch_policy"], "store-and-network");
        assert_eq!(json["network_cache"]["poll_interval"], 5000);
        let back: QueryOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, options);
    }

    #[test]
    fn test_poll_interval_overflowing_millis_is_rejected() {
        let options = QueryOptions {
            network_cache: NetworkCacheConfig {
                force: false,
                poll_interval: Some(Duration::MAX),
            },
            ..QueryOptions::default()
        };
        let err = serde_json::to_value(&options).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
