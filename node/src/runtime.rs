//! Wiring a `TransactionManager` from a data directory.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use privy_core::config::{CoreConfig, DigestAlgorithm};
use privy_core::crypto::{digest_for, KeyPair, PayloadDigest, PublicKey};
use privy_core::enclave::{Enclave, LocalEnclave};
use privy_core::privacy::PrivacyHelper;
use privy_core::storage::SledStore;
use privy_core::transaction::{FanOutPublisher, OwnMessageResender, TransactionManager};

use crate::config::{DataDir, NodeConfig};
use crate::outbox::OutboxPublisher;

/// Create a data directory with a config and a fresh default key.
pub fn initialize(
    data_dir: &DataDir,
    enhanced_privacy: bool,
    digest: DigestAlgorithm,
    forwarding_keys: &[String],
) -> Result<PublicKey> {
    if data_dir.is_initialized() {
        bail!("{} is already initialized", data_dir.root().display());
    }
    for encoded in forwarding_keys {
        PublicKey::parse(encoded).with_context(|| format!("invalid forwarding key {encoded}"))?;
    }

    let pair = KeyPair::generate();
    let key_path = data_dir.write_key(&pair)?;
    let public_key = pair.public_key();

    data_dir.save_config(&NodeConfig {
        core: CoreConfig {
            enhanced_privacy,
            digest,
        },
        default_key: Some(public_key.to_hex()),
        forwarding_keys: forwarding_keys.to_vec(),
    })?;

    info!(
        public_key = %public_key,
        key_path = %key_path.display(),
        "default key generated"
    );
    Ok(public_key)
}

/// Everything a command needs, opened from one data directory.
pub struct Runtime {
    pub config: NodeConfig,
    pub manager: TransactionManager,
    pub enclave: Arc<LocalEnclave>,
    pub store: Arc<SledStore>,
}

impl Runtime {
    pub fn open(data_dir: &DataDir) -> Result<Self> {
        let config = data_dir.load_config()?;
        let enclave = Arc::new(LocalEnclave::new(data_dir.load_keyring(&config)?));

        let db_path = data_dir.db_path();
        let store = Arc::new(
            SledStore::open(&db_path)
                .with_context(|| format!("failed to open database at {}", db_path.display()))?,
        );

        let digest: Arc<dyn PayloadDigest> = Arc::from(digest_for(config.core.digest));
        let publisher = FanOutPublisher::new(OutboxPublisher::new(data_dir.outbox_dir(), Arc::clone(&digest)));
        let resend = OwnMessageResender::new(store.clone(), enclave.clone(), Arc::clone(&digest));
        let privacy_helper = PrivacyHelper::new(store.clone(), config.core.enhanced_privacy);

        let manager = TransactionManager::new(
            enclave.clone(),
            store.clone(),
            store.clone(),
            Arc::new(publisher),
            Arc::new(resend),
            privacy_helper,
            digest,
        );

        info!(
            data_dir = %data_dir.root().display(),
            keys = enclave.public_keys().len(),
            enhanced_privacy = config.core.enhanced_privacy,
            digest = %config.core.digest,
            "node opened"
        );

        Ok(Self {
            config,
            manager,
            enclave,
            store,
        })
    }

    /// Flush the database before the process exits.
    pub fn close(self) -> Result<()> {
        self.store.flush().context("failed to flush database")
    }
}
