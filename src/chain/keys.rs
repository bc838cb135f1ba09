//! Filesystem-backed signing keys.
//!
//! One raw-byte key file per wallet under a single directory, named
//! `<wallet_id>.key`. This is the bundled provider for standalone
//! deployments; custodial setups implement [`KeyProvider`] against
//! their own storage and never touch this module.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::KeyProvider;
use crate::error::{Result, WardenError};

pub struct FileKeyProvider {
    dir: PathBuf,
}

impl FileKeyProvider {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn key_path(&self, wallet_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.key", wallet_id))
    }
}

#[async_trait]
impl KeyProvider for FileKeyProvider {
    async fn signing_key(&self, wallet_id: Uuid) -> Result<Zeroizing<Vec<u8>>> {
        let path = self.key_path(wallet_id);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WardenError::Key(format!(
                    "no signing key for wallet {}",
                    wallet_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.is_empty() {
            return Err(WardenError::Key(format!(
                "signing key file for wallet {} is empty",
                wallet_id
            )));
        }

        debug!(wallet_id = %wallet_id, "Loaded signing key");
        Ok(Zeroizing::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_key_bytes() {
        let dir = std::env::temp_dir().join(format!("warden-keys-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let wallet_id = Uuid::new_v4();
        let key_bytes = vec![7u8; 32];
        tokio::fs::write(dir.join(format!("{}.key", wallet_id)), &key_bytes)
            .await
            .unwrap();

        let provider = FileKeyProvider::new(&dir);
        let loaded = provider.signing_key(wallet_id).await.unwrap();
        assert_eq!(&*loaded, &key_bytes);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_key_is_key_error() {
        let provider = FileKeyProvider::new("/nonexistent/warden-keys");
        let err = provider.signing_key(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, WardenError::Key(_)));
    }

    #[tokio::test]
    async fn test_empty_key_file_rejected() {
        let dir = std::env::temp_dir().join(format!("warden-keys-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let wallet_id = Uuid::new_v4();
        tokio::fs::write(dir.join(format!("{}.key", wallet_id)), b"")
            .await
            .unwrap();

        let provider = FileKeyProvider::new(&dir);
        let err = provider.signing_key(wallet_id).await.unwrap_err();
        assert!(matches!(err, WardenError::Key(_)));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
