//! Node configuration.

use std::path::PathBuf;

use tribes_crypto::MAX_RECIPIENTS;

/// Settings for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Directory holding node state
    pub data_dir: PathBuf,
    /// Key store file name inside `data_dir`
    pub keystore_file: String,
    /// Ask the host log to re-index when add-member introduces new authors
    pub rebuild_on_new_members: bool,
    /// Recipient limit per message, never above the envelope slot limit
    pub max_recipients: usize,
}

impl NodeConfig {
    /// Path of the key store database.
    pub fn keystore_path(&self) -> PathBuf {
        self.data_dir.join(&self.keystore_file)
    }

    /// Recipient limit actually applied.
    pub fn effective_max_recipients(&self) -> usize {
        self.max_recipients.clamp(1, MAX_RECIPIENTS)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".tribes"),
            keystore_file: "keystore.redb".to_string(),
            rebuild_on_new_members: true,
            max_recipients: MAX_RECIPIENTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystore_path_joins_dir_and_file() {
        let config = NodeConfig { data_dir: PathBuf::from("/tmp/node"), ..Default::default() };
        assert_eq!(config.keystore_path(), PathBuf::from("/tmp/node/keystore.redb"));
    }

    #[test]
    fn recipient_limit_cannot_exceed_slots() {
        let config = NodeConfig { max_recipients: 100, ..Default::default() };
        assert_eq!(config.effective_max_recipients(), MAX_RECIPIENTS);

        let config = NodeConfig { max_recipients: 0, ..Default::default() };
        assert_eq!(config.effective_max_recipients(), 1);
    }
}
