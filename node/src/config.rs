//! # Node Configuration and Data Directory
//!
//! ```text
//! <data-dir>/
//!   config.json          NodeConfig (core switches + key settings)
//!   keys/<pubkey>.key    hex private keys, one per managed key
//!   db/                  sled database
//!   outbox/<recipient>/  payloads waiting for delivery
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use privy_core::config::CoreConfig;
use privy_core::crypto::{KeyPair, PublicKey};
use privy_core::enclave::Keyring;

const CONFIG_FILE: &str = "config.json";
const KEY_EXTENSION: &str = "key";

/// Settings persisted in `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(flatten)]
    pub core: CoreConfig,

    /// Hex public key used when a request names no sender.
    #[serde(default)]
    pub default_key: Option<String>,

    /// Keys that receive a copy of every outgoing transaction.
    #[serde(default)]
    pub forwarding_keys: Vec<String>,
}

/// Paths inside a node's data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("db")
    }

    pub fn outbox_dir(&self) -> PathBuf {
        self.root.join("outbox")
    }

    pub fn is_initialized(&self) -> bool {
        self.config_path().exists()
    }

    pub fn load_config(&self) -> Result<NodeConfig> {
        let path = self.config_path();
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {} (run `privy-node init`)", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("malformed config {}", path.display()))
    }

    pub fn save_config(&self, config: &NodeConfig) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create data directory: {}", self.root.display()))?;
        let path = self.config_path();
        let json = serde_json::to_string_pretty(config)?;
        std::fs::write(&path, json).with_context(|| format!("failed to write config {}", path.display()))
    }

    /// Persist a private key as `keys/<public-hex>.key`.
    pub fn write_key(&self, pair: &KeyPair) -> Result<PathBuf> {
        let keys_dir = self.keys_dir();
        std::fs::create_dir_all(&keys_dir)
            .with_context(|| format!("failed to create key directory: {}", keys_dir.display()))?;

        let key_path = keys_dir.join(format!("{}.{KEY_EXTENSION}", pair.public_key().to_hex()));
        std::fs::write(&key_path, pair.private_key_hex())
            .with_context(|| format!("failed to write key to {}", key_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(key_path)
    }

    /// Every key under `keys/`, with the configured default and forwarding keys.
    pub fn load_keyring(&self, config: &NodeConfig) -> Result<Keyring> {
        let keys_dir = self.keys_dir();
        let mut pairs = Vec::new();
        for entry in std::fs::read_dir(&keys_dir)
            .with_context(|| format!("failed to list keys in {}", keys_dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(KEY_EXTENSION) {
                continue;
            }
            let hex_key = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read key {}", path.display()))?;
            let pair = KeyPair::from_hex(hex_key.trim())
                .with_context(|| format!("invalid private key in {}", path.display()))?;
            pairs.push(pair);
        }

        let default_key = match &config.default_key {
            Some(encoded) => PublicKey::parse(encoded).context("invalid default key in config")?,
            None => match pairs.first() {
                Some(pair) => pair.public_key(),
                None => bail!("no keys found in {}", keys_dir.display()),
            },
        };

        let Some(index) = pairs.iter().position(|pair| pair.public_key() == default_key) else {
            bail!("default key {} has no private key in {}", default_key, keys_dir.display());
        };
        let mut keyring = Keyring::new(pairs.swap_remove(index));
        for pair in pairs {
            keyring = keyring.with_key(pair);
        }

        for encoded in &config.forwarding_keys {
            let key = PublicKey::parse(encoded)
                .with_context(|| format!("invalid forwarding key {encoded}"))?;
            keyring = keyring.with_forwarding_key(key);
        }

        Ok(keyring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use privy_core::config::DigestAlgorithm;

    #[test]
    fn config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = DataDir::new(dir.path());
        assert!(!data_dir.is_initialized());

        let config = NodeConfig {
            core: CoreConfig {
                enhanced_privacy: true,
                digest: DigestAlgorithm::Sha512_256,
            },
            default_key: Some(KeyPair::generate().public_key().to_hex()),
            forwarding_keys: vec![KeyPair::generate().public_key().to_base64()],
        };
        data_dir.save_config(&config).unwrap();

        assert!(data_dir.is_initialized());
        assert_eq!(data_dir.load_config().unwrap(), config);
    }

    #[test]
    fn core_settings_are_flattened() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"enhancedPrivacy": true, "forwardingKeys": []}"#).unwrap();
        assert!(config.core.enhanced_privacy);
        assert!(config.default_key.is_none());
    }

    #[test]
    fn keyring_loads_default_extra_and_forwarding_keys() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = DataDir::new(dir.path());
        let (default, extra) = (KeyPair::generate(), KeyPair::generate());
        let forward = KeyPair::generate().public_key();
        data_dir.write_key(&default).unwrap();
        data_dir.write_key(&extra).unwrap();

        let config = NodeConfig {
            default_key: Some(default.public_key().to_hex()),
            forwarding_keys: vec![forward.to_hex()],
            ..Default::default()
        };
        let keyring = data_dir.load_keyring(&config).unwrap();

        assert_eq!(keyring.default_public_key(), default.public_key());
        assert!(keyring.contains(&extra.public_key()));
        assert_eq!(keyring.forwarding_keys().into_iter().collect::<Vec<_>>(), vec![forward]);
    }

    #[test]
    fn default_key_without_private_half_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = DataDir::new(dir.path());
        data_dir.write_key(&KeyPair::generate()).unwrap();

        let config = NodeConfig {
            default_key: Some(KeyPair::generate().public_key().to_hex()),
            ..Default::default()
        };
        assert!(data_dir.load_keyring(&config).is_err());
    }
}
