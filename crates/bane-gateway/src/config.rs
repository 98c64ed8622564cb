// config.rs — Gateway configuration.
//
// BaneConfig is read from `.bane/config.toml`. Every field has a default, so
// an empty file (or no file) yields a working in-memory setup. Secrets can be
// supplied through the environment instead of the file; the environment wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use bane_audit::{AuditSink, BaneStore, InMemoryStore, JsonlStore};
use bane_entitlements::{PolicyConstraints, SnapshotKeyring, SnapshotSigner};
use bane_policy::{BaneEngine, HmacRequestVerifier, NonceCache, FOG_V1};

use crate::error::GatewayError;

/// Key id for an org-less snapshot key supplied by the environment.
pub const ENV_SNAPSHOT_KID: &str = "BANE_SNAPSHOT_KID";
/// HMAC secret paired with [`ENV_SNAPSHOT_KID`].
pub const ENV_SNAPSHOT_SECRET: &str = "BANE_SNAPSHOT_HMAC_SECRET";
/// Overrides `request_signing_secret`.
pub const ENV_REQUEST_SIGNING_SECRET: &str = "BANE_REQUEST_SIGNING_SECRET";

/// Upper bound for `nonce_ttl_secs` (one day).
pub const MAX_NONCE_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Jsonl,
}

/// Where decisions, events, and incidents are persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Directory for the JSONL files. Ignored for `memory`.
    pub dir: PathBuf,
    /// Hand records to a writer thread instead of writing inline. On by
    /// default so a slow store never holds up a decision.
    pub background: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            dir: PathBuf::from(".bane/store"),
            background: true,
        }
    }
}

/// One HMAC key for snapshot signing and verification.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotKeyConfig {
    /// Org the key belongs to. A key without an org applies to every org.
    #[serde(default)]
    pub org_id: Option<String>,
    pub kid: String,
    pub secret: String,
}

impl std::fmt::Debug for SnapshotKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotKeyConfig")
            .field("org_id", &self.org_id)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BaneConfig {
    pub profile_id: String,
    pub nonce_capacity: usize,
    pub nonce_ttl_secs: i64,
    pub store: StoreConfig,
    /// Capability the HTTP guard requires on every request.
    pub http_required_capability: Option<String>,
    pub operator_capability: String,
    /// Enables payload signature verification on every request.
    pub request_signing_secret: Option<String>,
    pub snapshot_keys: Vec<SnapshotKeyConfig>,
    pub max_offline_seconds: i64,
}

impl std::fmt::Debug for BaneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaneConfig")
            .field("profile_id", &self.profile_id)
            .field("nonce_capacity", &self.nonce_capacity)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("store", &self.store)
            .field("http_required_capability", &self.http_required_capability)
            .field("operator_capability", &self.operator_capability)
            .field(
                "request_signing_secret",
                &self.request_signing_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("snapshot_keys", &self.snapshot_keys)
            .field("max_offline_seconds", &self.max_offline_seconds)
            .finish()
    }
}

impl Default for BaneConfig {
    fn default() -> Self {
        Self {
            profile_id: FOG_V1.to_string(),
            nonce_capacity: bane_policy::nonce::DEFAULT_NONCE_CAPACITY,
            nonce_ttl_secs: bane_policy::nonce::default_nonce_ttl().num_seconds(),
            store: StoreConfig::default(),
            http_required_capability: Some("bane:invoke".to_string()),
            operator_capability: "bane:operator".to_string(),
            request_signing_secret: None,
            snapshot_keys: Vec::new(),
            max_offline_seconds: bane_entitlements::DEFAULT_MAX_OFFLINE_SECONDS,
        }
    }
}

impl BaneConfig {
    /// Standard layout under `<root>/.bane/`, persisting to JSONL.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let bane_dir = project_root.as_ref().join(".bane");
        Self {
            store: StoreConfig {
                kind: StoreKind::Jsonl,
                dir: bane_dir.join("store"),
                background: true,
            },
            ..Self::default()
        }
    }

    /// `<root>/.bane/config.toml`.
    pub fn config_path(project_root: impl AsRef<Path>) -> PathBuf {
        project_root.as_ref().join(".bane").join("config.toml")
    }

    /// Parse `path` as TOML. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path).map_err(|source| GatewayError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| GatewayError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists, else start from `for_project(root)`.
    /// A file that exists but does not parse is still an error.
    pub fn load_for_project(project_root: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = Self::config_path(&project_root);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::for_project(project_root))
        }
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`. An env snapshot key applies to every
    /// org and takes precedence over org-less keys from the file.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());
        if let Some(secret) = non_empty(ENV_REQUEST_SIGNING_SECRET) {
            self.request_signing_secret = Some(secret);
        }
        if let (Some(kid), Some(secret)) = (non_empty(ENV_SNAPSHOT_KID), non_empty(ENV_SNAPSHOT_SECRET)) {
            self.snapshot_keys.retain(|k| k.org_id.is_some());
            self.snapshot_keys.insert(
                0,
                SnapshotKeyConfig {
                    org_id: None,
                    kid,
                    secret,
                },
            );
        }
        self
    }

    /// The replay window, validated to 1 second .. [`MAX_NONCE_TTL_SECS`].
    pub fn nonce_ttl(&self) -> Result<Duration, GatewayError> {
        if !(1..=MAX_NONCE_TTL_SECS).contains(&self.nonce_ttl_secs) {
            return Err(GatewayError::InvalidSetting {
                field: "nonce_ttl_secs",
                reason: format!("must be between 1 and {}", MAX_NONCE_TTL_SECS),
            });
        }
        Duration::try_seconds(self.nonce_ttl_secs).ok_or_else(|| GatewayError::InvalidSetting {
            field: "nonce_ttl_secs",
            reason: "out of range".to_string(),
        })
    }

    /// Default offline constraints with this config's offline window.
    pub fn policy_constraints(&self) -> PolicyConstraints {
        PolicyConstraints {
            max_offline_seconds: self.max_offline_seconds,
            ..PolicyConstraints::default()
        }
    }

    /// Open the configured store. JSONL creates its directory if needed.
    pub fn build_store(&self) -> Result<Arc<dyn BaneStore>, GatewayError> {
        Ok(match self.store.kind {
            StoreKind::Memory => Arc::new(InMemoryStore::new()),
            StoreKind::Jsonl => Arc::new(JsonlStore::open(&self.store.dir)?),
        })
    }

    /// A background or inline sink over `store`, per `store.background`.
    pub fn build_sink(&self, store: Arc<dyn BaneStore>) -> AuditSink {
        if self.store.background {
            AuditSink::background(store)
        } else {
            AuditSink::inline(store)
        }
    }

    /// An engine wired to `sink` with this config's profile, nonce cache,
    /// and request verifier.
    pub fn build_engine(&self, sink: AuditSink) -> Result<BaneEngine, GatewayError> {
        if self.nonce_capacity == 0 {
            return Err(GatewayError::InvalidSetting {
                field: "nonce_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        let nonce_ttl = self.nonce_ttl()?;
        let mut engine = BaneEngine::new(&self.profile_id)?
            .with_sink(sink)
            .with_nonce_cache(NonceCache::new(self.nonce_capacity, nonce_ttl));
        if let Some(secret) = &self.request_signing_secret {
            engine = engine.with_verifier(Arc::new(HmacRequestVerifier::new(secret.as_bytes())?));
        }
        Ok(engine)
    }

    fn key_for_org(&self, org_id: &str) -> Option<&SnapshotKeyConfig> {
        self.snapshot_keys
            .iter()
            .find(|k| k.org_id.as_deref() == Some(org_id))
            .or_else(|| self.snapshot_keys.iter().find(|k| k.org_id.is_none()))
    }

    /// The signer for `org_id`: its own key, else an org-less key.
    pub fn signer_for(&self, org_id: &str) -> Result<SnapshotSigner, GatewayError> {
        let key = self
            .key_for_org(org_id)
            .ok_or_else(|| GatewayError::InvalidSetting {
                field: "snapshot_keys",
                reason: format!("no snapshot signing key for org '{}'", org_id),
            })?;
        Ok(SnapshotSigner::new(&key.kid, key.secret.as_bytes())?)
    }

    /// Every configured key for `org_id`, org-less keys included.
    pub fn keyring_for(&self, org_id: &str) -> Result<SnapshotKeyring, GatewayError> {
        let mut keyring = SnapshotKeyring::new();
        for key in &self.snapshot_keys {
            match key.org_id.as_deref() {
                Some(org) if org != org_id => continue,
                _ => keyring.insert(org_id, &key.kid, key.secret.as_bytes())?,
            }
        }
        Ok(keyring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn empty_file_is_the_default() {
        let config: BaneConfig = toml::from_str("").unwrap();
        assert_eq!(config, BaneConfig::default());
        assert_eq!(config.profile_id, "bane_fog_v1");
        assert_eq!(config.nonce_capacity, 10_000);
        assert_eq!(config.nonce_ttl_secs, 600);
        assert_eq!(config.max_offline_seconds, 21_600);
        assert!(config.store.background);
    }

    #[test]
    fn for_project_uses_dot_bane() {
        let config = BaneConfig::for_project("/work/site");
        assert_eq!(config.store.kind, StoreKind::Jsonl);
        assert_eq!(config.store.dir, PathBuf::from("/work/site/.bane/store"));
        assert_eq!(
            BaneConfig::config_path("/work/site"),
            PathBuf::from("/work/site/.bane/config.toml")
        );
    }

    #[test]
    fn parses_a_full_file() {
        let config: BaneConfig = toml::from_str(
            r#"
            profile_id = "bane_fog_v1"
            nonce_capacity = 50
            operator_capability = "ops:root"

            [store]
            kind = "jsonl"
            dir = "/var/lib/bane"
            background = false

            [[snapshot_keys]]
            org_id = "org-1"
            kid = "k1"
            secret = "s1"
            "#,
        )
        .unwrap();
        assert_eq!(config.nonce_capacity, 50);
        assert_eq!(config.store.kind, StoreKind::Jsonl);
        assert!(!config.store.background);
        assert_eq!(config.snapshot_keys[0].kid, "k1");
        assert_eq!(config.operator_capability, "ops:root");
        assert_eq!(config.http_required_capability.as_deref(), Some("bane:invoke"));
    }

    #[test]
    fn load_for_project_falls_back_without_a_file() {
        let dir = tempdir().unwrap();
        let config = BaneConfig::load_for_project(dir.path()).unwrap();
        assert_eq!(config.store.dir, dir.path().join(".bane/store"));

        std::fs::create_dir_all(dir.path().join(".bane")).unwrap();
        std::fs::write(BaneConfig::config_path(dir.path()), "nonce_capacity = \"lots\"").unwrap();
        assert!(matches!(
            BaneConfig::load_for_project(dir.path()),
            Err(GatewayError::ConfigParse { .. })
        ));
    }

    #[test]
    fn environment_overrides_file_secrets() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_SNAPSHOT_KID, "env-kid"),
            (ENV_SNAPSHOT_SECRET, "env-secret"),
            (ENV_REQUEST_SIGNING_SECRET, "req-secret"),
        ]);
        let mut config = BaneConfig::default();
        config.snapshot_keys.push(SnapshotKeyConfig {
            org_id: None,
            kid: "file-kid".into(),
            secret: "file-secret".into(),
        });
        let config = config.with_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.request_signing_secret.as_deref(), Some("req-secret"));
        assert_eq!(config.snapshot_keys.len(), 1);
        assert_eq!(config.signer_for("any-org").unwrap().kid(), "env-kid");
    }

    #[test]
    fn org_keys_take_precedence_for_signing() {
        let mut config = BaneConfig::default();
        config.snapshot_keys = vec![
            SnapshotKeyConfig {
                org_id: None,
                kid: "shared".into(),
                secret: "a".into(),
            },
            SnapshotKeyConfig {
                org_id: Some("org-1".into()),
                kid: "own".into(),
                secret: "b".into(),
            },
        ];
        assert_eq!(config.signer_for("org-1").unwrap().kid(), "own");
        assert_eq!(config.signer_for("org-2").unwrap().kid(), "shared");
        assert!(config.keyring_for("org-1").is_ok());
    }

    #[test]
    fn missing_signing_key_is_an_error() {
        assert!(matches!(
            BaneConfig::default().signer_for("org-1"),
            Err(GatewayError::InvalidSetting { field: "snapshot_keys", .. })
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut config = BaneConfig::default();
        config.request_signing_secret = Some("hunter2".into());
        config.snapshot_keys.push(SnapshotKeyConfig {
            org_id: None,
            kid: "k".into(),
            secret: "hunter3".into(),
        });
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("hunter3"));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = BaneConfig::default();
        config.nonce_capacity = 0;
        assert!(matches!(
            config.build_engine(AuditSink::disabled()),
            Err(GatewayError::InvalidSetting { field: "nonce_capacity", .. })
        ));
    }

    #[test]
    fn nonce_ttl_must_be_in_range() {
        for secs in [0, -1, MAX_NONCE_TTL_SECS + 1, i64::MAX] {
            let mut config = BaneConfig::default();
            config.nonce_ttl_secs = secs;
            assert!(matches!(
                config.build_engine(AuditSink::disabled()),
                Err(GatewayError::InvalidSetting { field: "nonce_ttl_secs", .. })
            ));
        }
        let mut config = BaneConfig::default();
        config.nonce_ttl_secs = MAX_NONCE_TTL_SECS;
        assert_eq!(config.nonce_ttl().unwrap(), Duration::hours(24));
    }
}
