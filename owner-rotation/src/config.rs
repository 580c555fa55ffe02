//! Process configuration.
//!
//! Built once at startup and passed into the pipeline; nothing here is global.

use std::{fmt, fs, path::Path, str::FromStr, time::Duration};

use alloy_primitives::{address, Address};
use secrecy::SecretString;
use serde::Deserialize;

use crate::{
    address::parse_address,
    signer::{AgentSigner, TxSigner},
};

pub const DEFAULT_RPC_URL: &str = "https://rpc.gnosischain.com";
pub const DEFAULT_SAFE: Address = address!("f3939FE058981eF1AC0CD5C316E6270F5C65F591");
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors while loading configuration or key material.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown execution strategy {0:?} (expected safe-exec or direct-call)")]
    UnknownStrategy(String),
    #[error("invalid rpc url {url}: {reason}")]
    InvalidRpcUrl { url: String, reason: String },
    #[error("invalid address in configuration: {0}")]
    InvalidAddress(String),
    #[error("failed reading key file {path}: {source}")]
    KeyFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed parsing key file {path}: {source}")]
    KeyFileParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("key file declares address {declared} but the key controls {derived}")]
    AddressMismatch { declared: Address, derived: Address },
}

/// How the owner swap reaches the Safe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// `execTransaction` carrying a signature over the SafeTx hash; wallet nonce in the hash.
    #[default]
    SafeExec,
    /// Plain transaction calling `swapOwner` on the Safe; account nonce in the transaction.
    DirectCall,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::SafeExec => f.write_str("safe-exec"),
            ExecutionStrategy::DirectCall => f.write_str("direct-call"),
        }
    }
}

impl FromStr for ExecutionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe-exec" | "safe_exec" | "safe" => Ok(ExecutionStrategy::SafeExec),
            "direct-call" | "direct_call" | "direct" => Ok(ExecutionStrategy::DirectCall),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Settings the pipeline itself needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub safe: Address,
    pub strategy: ExecutionStrategy,
    /// Gas limit of the broadcast transaction.
    pub gas_limit: u64,
}

impl PipelineConfig {
    pub fn new(safe: Address) -> Self {
        Self {
            safe,
            strategy: ExecutionStrategy::default(),
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

/// Full process configuration.
#[derive(Clone, Debug)]
pub struct RotationConfig {
    pub rpc_url: String,
    pub rpc_timeout: Duration,
    pub pipeline: PipelineConfig,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            pipeline: PipelineConfig::new(DEFAULT_SAFE),
        }
    }
}

impl RotationConfig {
    pub fn with_safe(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.pipeline.safe =
            parse_address(raw).map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        Ok(self)
    }
}

/// On-disk key file: `{ "private_key": "0x..", "address": "0x.." }`.
#[derive(Deserialize)]
struct KeyFile {
    private_key: String,
    #[serde(default)]
    address: Option<String>,
}

/// Load the agent key from a JSON key file, checking the declared address if present.
pub fn load_key_file(path: &Path) -> Result<AgentSigner, ConfigError> {
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::KeyFileRead {
        path: display.clone(),
        source,
    })?;
    let file: KeyFile = serde_json::from_str(&raw).map_err(|source| ConfigError::KeyFileParse {
        path: display,
        source,
    })?;

    let secret = SecretString::from(file.private_key);
    let signer = AgentSigner::from_hex(&secret)?;
    if let Some(declared) = file.address {
        let declared =
            parse_address(&declared).map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        if declared != signer.address() {
            return Err(ConfigError::AddressMismatch {
                declared,
                derived: signer.address(),
            });
        }
    }
    Ok(signer)
}
