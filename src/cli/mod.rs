//! Operator command line support.
//!
//! A workspace directory holds everything the `stablecoin` binary needs
//! between invocations: the protocol configuration, the operator key and the
//! latest state snapshot.

pub mod output;

pub use output::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::config::ProtocolConfig;
use crate::error::{Error, Result};
use crate::protocol::Protocol;
use crate::utils::crypto::{KeyPair, PublicKey};

const CONFIG_FILE: &str = "config.json";
const KEY_FILE: &str = "key.json";
const STATE_FILE: &str = "state.bin";

// ═══════════════════════════════════════════════════════════════════════════════
// KEY FILE
// ═══════════════════════════════════════════════════════════════════════════════

/// Operator key as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    /// Compressed public key (hex)
    pub public_key: String,
    /// Secret key (hex)
    pub private_key: String,
    /// RFC 3339 creation time
    pub created_at: String,
}

impl KeyFile {
    /// Describe a key pair
    pub fn from_keypair(keypair: &KeyPair) -> Self {
        Self {
            public_key: keypair.public_key().to_hex(),
            private_key: keypair.private_key().to_hex(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild the key pair
    pub fn keypair(&self) -> Result<KeyPair> {
        KeyPair::from_hex(&self.private_key)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WORKSPACE
// ═══════════════════════════════════════════════════════════════════════════════

/// On-disk operator workspace
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Workspace rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration file path
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Key file path
    pub fn key_path(&self) -> PathBuf {
        self.root.join(KEY_FILE)
    }

    /// State snapshot path
    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Whether a state snapshot exists
    pub fn is_initialized(&self) -> bool {
        self.state_path().exists()
    }

    /// Create the workspace with a fresh admin key and genesis state
    pub fn init(&self, config: ProtocolConfig, force: bool) -> Result<KeyFile> {
        if self.is_initialized() && !force {
            return Err(Error::Storage(format!(
                "workspace {} already initialized",
                self.root.display()
            )));
        }
        std::fs::create_dir_all(&self.root).map_err(|e| Error::Storage(e.to_string()))?;

        let keypair = KeyPair::generate();
        let protocol = Protocol::new(config.clone(), *keypair.public_key())?;
        let key_file = KeyFile::from_keypair(&keypair);

        write_file(&self.config_path(), config.to_json()?.as_bytes())?;
        let key_json = serde_json::to_string_pretty(&key_file).map_err(|e| Error::Serialization(e.to_string()))?;
        write_file(&self.key_path(), key_json.as_bytes())?;
        protocol.save_snapshot(self.state_path())?;

        info!(root = %self.root.display(), admin = %keypair.public_key(), "workspace initialized");
        Ok(key_file)
    }

    /// Read the configuration file
    pub fn load_config(&self) -> Result<ProtocolConfig> {
        ProtocolConfig::from_json(&read_to_string(&self.config_path())?)
    }

    /// Read the operator key
    pub fn load_key(&self) -> Result<KeyFile> {
        serde_json::from_str(&read_to_string(&self.key_path())?).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Operator public key
    pub fn operator(&self) -> Result<PublicKey> {
        Ok(*self.load_key()?.keypair()?.public_key())
    }

    /// Load the latest state
    pub fn load_protocol(&self) -> Result<Protocol> {
        Protocol::load_snapshot(self.state_path())
    }

    /// Persist the state
    pub fn save_protocol(&self, protocol: &Protocol) -> Result<()> {
        protocol.save_snapshot(self.state_path())
    }
}

/// Parse a decimal string such as `2000.5` into native units of `decimals`
pub fn parse_amount(input: &str, decimals: u8) -> Result<u128> {
    let invalid = |reason: &str| Error::InvalidParameter {
        name: "amount".into(),
        reason: format!("{:?}: {}", input, reason),
    };
    let (whole, fraction) = input.trim().split_once('.').unwrap_or((input.trim(), ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("empty"));
    }
    if fraction.len() > decimals as usize {
        return Err(invalid("too many decimal places"));
    }
    let digits = format!("{}{:0<width$}", whole, fraction, width = decimals as usize);
    digits.parse::<u128>().map_err(|e| invalid(&e.to_string()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))
}

fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());

        let key = workspace.init(ProtocolConfig::default(), false).unwrap();
        assert!(workspace.is_initialized());
        assert_eq!(workspace.operator().unwrap().to_hex(), key.public_key);

        let protocol = workspace.load_protocol().unwrap();
        assert!(protocol.has_role(crate::core::access::Role::Admin, &workspace.operator().unwrap()));
        assert_eq!(workspace.load_config().unwrap(), ProtocolConfig::default());
    }

    #[test]
    fn test_parse_amount() {
        use crate::utils::constants::WAD;

        assert_eq!(parse_amount("2000", 18).unwrap(), 2000 * WAD);
        assert_eq!(parse_amount("1.5", 6).unwrap(), 1_500_000);
        assert_eq!(parse_amount(".25", 2).unwrap(), 25);
        assert!(parse_amount("1.234", 2).is_err());
        assert!(parse_amount("abc", 18).is_err());
        assert!(parse_amount("", 18).is_err());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());

        workspace.init(ProtocolConfig::default(), false).unwrap();
        assert!(matches!(
            workspace.init(ProtocolConfig::default(), false),
            Err(Error::Storage(_))
        ));
        assert!(workspace.init(ProtocolConfig::default(), true).is_ok());
    }
}
