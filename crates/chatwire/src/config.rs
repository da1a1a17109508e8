//! Driver configuration.
//!
//! Values come from, in order of precedence: explicit arguments to driver
//! calls, then [`DriverConfig`] (built by hand, deserialized, or read from
//! the environment with [`DriverConfig::from_env`]), then the defaults
//! below.
//!
//! | field | env var | default |
//! |---|---|---|
//! | `host` | `CHATWIRE_URL` | `localhost:3000` |
//! | `use_ssl` | `CHATWIRE_USE_SSL` | `false` |
//! | `timeout` | `CHATWIRE_CONNECT_TIMEOUT_MS` | 20 s |
//! | `username` | `CHATWIRE_USER` | none |
//! | `password` | `CHATWIRE_PASSWORD` | none |
//! | `ldap` | `CHATWIRE_AUTH=ldap` | `false` |
//! | `rooms` | `CHATWIRE_ROOM` (comma separated) | none |
//! | `all_public` | `LISTEN_ON_ALL_PUBLIC` | `false` |
//! | `dm` | `RESPOND_TO_DM` | `false` |
//! | `livechat` | `RESPOND_TO_LIVECHAT` | `false` |
//! | `edited` | `RESPOND_TO_EDITED` | `false` |
//! | `room_cache` | `ROOM_CACHE_SIZE`, `ROOM_CACHE_MAX_AGE` (ms) | 10, 300 s |
//! | `dm_cache` | `DM_ROOM_CACHE_SIZE`, `DM_ROOM_CACHE_MAX_AGE` (ms) | 10, 100 s |

use std::str::FromStr;
use std::time::Duration;

use chatwire_cache::CacheConfig;
use chatwire_protocol::Credentials;
use chatwire_session::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOST, SessionConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FilterPolicy;

// ---------------------------------------------------------------------------
// DriverConfig
// ---------------------------------------------------------------------------

/// Everything the driver needs to know up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Server address. A scheme is allowed and stripped before use.
    pub host: String,
    pub use_ssl: bool,

    /// Connect timeout.
    pub timeout: Duration,

    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Log in through the server's LDAP handler instead of the local one.
    pub ldap: bool,
    pub ldap_options: Value,

    /// Rooms joined automatically when responding starts.
    pub rooms: Vec<String>,

    /// Deliver messages from every public room, joined or not.
    pub all_public: bool,
    /// Deliver direct messages.
    pub dm: bool,
    /// Deliver live-chat messages.
    pub livechat: bool,
    /// Deliver edits of earlier messages.
    pub edited: bool,

    /// Cache settings for room id/name lookups.
    pub room_cache: CacheConfig,
    /// Cache settings for direct-message room lookups.
    pub dm_cache: CacheConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            use_ssl: false,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            username: None,
            password: None,
            ldap: false,
            ldap_options: Value::Object(Default::default()),
            rooms: Vec::new(),
            all_public: false,
            dm: false,
            livechat: false,
            edited: false,
            room_cache: CacheConfig::new(10, Duration::from_secs(300)),
            dm_cache: CacheConfig::new(10, Duration::from_secs(100)),
        }
    }
}

impl DriverConfig {
    /// Reads the process environment over the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// Empty values count as unset. Values that don't parse are logged and
    /// the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(host) = get("CHATWIRE_URL") {
            config.host = host;
        }
        parse_into(&get, "CHATWIRE_USE_SSL", parse_bool, &mut config.use_ssl);
        if let Some(ms) = parse_var::<u64>(&get, "CHATWIRE_CONNECT_TIMEOUT_MS") {
            config.timeout = Duration::from_millis(ms);
        }

        config.username = get("CHATWIRE_USER");
        config.password = get("CHATWIRE_PASSWORD");
        config.ldap = get("CHATWIRE_AUTH").is_some_and(|auth| auth.eq_ignore_ascii_case("ldap"));

        if let Some(rooms) = get("CHATWIRE_ROOM") {
            config.rooms = split_list(&rooms);
        }
        parse_into(&get, "LISTEN_ON_ALL_PUBLIC", parse_bool, &mut config.all_public);
        parse_into(&get, "RESPOND_TO_DM", parse_bool, &mut config.dm);
        parse_into(&get, "RESPOND_TO_LIVECHAT", parse_bool, &mut config.livechat);
        parse_into(&get, "RESPOND_TO_EDITED", parse_bool, &mut config.edited);

        read_cache(&get, "ROOM_CACHE_SIZE", "ROOM_CACHE_MAX_AGE", &mut config.room_cache);
        read_cache(&get, "DM_ROOM_CACHE_SIZE", "DM_ROOM_CACHE_MAX_AGE", &mut config.dm_cache);

        config
    }

    /// The configured login, if both username and password are present.
    pub fn credentials(&self) -> Option<Credentials> {
        let username = self.username.clone()?;
        let password = self.password.clone()?;
        Some(if self.ldap {
            Credentials::Ldap {
                username,
                password,
                options: self.ldap_options.clone(),
            }
        } else {
            Credentials::Password { username, password }
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.host.clone(),
            use_ssl: self.use_ssl,
            timeout: self.timeout,
            credentials: self.credentials(),
        }
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy {
            dm: self.dm,
            livechat: self.livechat,
            edited: self.edited,
            all_public: self.all_public,
        }
    }
}

// ---------------------------------------------------------------------------
// Env parsing
// ---------------------------------------------------------------------------

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_var<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = get(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

fn parse_into<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: fn(&str) -> Option<T>,
    target: &mut T,
) {
    let Some(raw) = get(key) else { return };
    match parse(&raw) {
        Some(value) => *target = value,
        None => tracing::warn!(key, value = %raw, "ignoring unparseable setting"),
    }
}

fn read_cache(
    get: &impl Fn(&str) -> Option<String>,
    size_key: &str,
    age_key: &str,
    target: &mut CacheConfig,
) {
    if let Some(size) = parse_var::<usize>(get, size_key) {
        target.max_entries = size;
    }
    if let Some(ms) = parse_var::<u64>(get, age_key) {
        target.max_age = Duration::from_millis(ms);
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> DriverConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DriverConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_driver_config_default() {
        let config = DriverConfig::default();
        assert_eq!(config.host, "localhost:3000");
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.room_cache, CacheConfig::new(10, Duration::from_secs(300)));
        assert_eq!(config.dm_cache, CacheConfig::new(10, Duration::from_secs(100)));
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_from_lookup_reads_every_variable() {
        let config = from_vars(&[
            ("CHATWIRE_URL", "https://chat.example.com"),
            ("CHATWIRE_USE_SSL", "true"),
            ("CHATWIRE_CONNECT_TIMEOUT_MS", "5000"),
            ("CHATWIRE_USER", "bot"),
            ("CHATWIRE_PASSWORD", "pass"),
            ("CHATWIRE_ROOM", "general, random,,"),
            ("LISTEN_ON_ALL_PUBLIC", "1"),
            ("RESPOND_TO_DM", "yes"),
            ("RESPOND_TO_LIVECHAT", "true"),
            ("RESPOND_TO_EDITED", "on"),
            ("ROOM_CACHE_SIZE", "20"),
            ("ROOM_CACHE_MAX_AGE", "1000"),
            ("DM_ROOM_CACHE_SIZE", "5"),
            ("DM_ROOM_CACHE_MAX_AGE", "2000"),
        ]);

        assert_eq!(config.host, "https://chat.example.com");
        assert!(config.use_ssl);
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(config.rooms, vec!["general", "random"]);
        assert!(config.all_public && config.dm && config.livechat && config.edited);
        assert_eq!(config.room_cache, CacheConfig::new(20, Duration::from_millis(1000)));
        assert_eq!(config.dm_cache, CacheConfig::new(5, Duration::from_millis(2000)));
        assert_eq!(config.credentials(), Some(Credentials::password("bot", "pass")));
    }

    #[test]
    fn test_from_lookup_bad_values_keep_defaults() {
        let config = from_vars(&[
            ("CHATWIRE_USE_SSL", "maybe"),
            ("CHATWIRE_CONNECT_TIMEOUT_MS", "soon"),
            ("ROOM_CACHE_SIZE", "-3"),
        ]);

        assert!(!config.use_ssl);
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.room_cache.max_entries, 10);
    }

    #[test]
    fn test_credentials_ldap_mode() {
        let config = from_vars(&[
            ("CHATWIRE_USER", "bot"),
            ("CHATWIRE_PASSWORD", "pass"),
            ("CHATWIRE_AUTH", "LDAP"),
        ]);

        let credentials = config.credentials().expect("credentials should be set");
        assert!(credentials.is_ldap());
        assert_eq!(credentials.login_params()["ldapPass"], json!("pass"));
    }

    #[test]
    fn test_credentials_missing_password_is_none() {
        let config = from_vars(&[("CHATWIRE_USER", "bot")]);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_deserialize_partial_json_fills_defaults() {
        let config: DriverConfig =
            serde_json::from_value(json!({ "host": "chat.local", "dm": true, "rooms": ["a"] }))
                .unwrap();

        assert_eq!(config.host, "chat.local");
        assert!(config.dm);
        assert_eq!(config.rooms, vec!["a"]);
        assert_eq!(config.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_session_config_carries_credentials() {
        let config = DriverConfig {
            username: Some("bot".into()),
            password: Some("pass".into()),
            ..DriverConfig::default()
        };

        let session = config.session_config();
        assert_eq!(session.host, "localhost:3000");
        assert_eq!(session.credentials, Some(Credentials::password("bot", "pass")));
    }
}
