//! Resolution of network names into connection profiles.
//!
//! Resolving a profile never touches the network. The connection is only
//! materialized by [`NetworkProfile::connect`].

use {
    crate::chain::AlloyChain,
    alloy::{
        network::EthereumWallet,
        providers::Provider,
        signers::local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English},
    },
    anyhow::{Context, Result},
    contracts::networks,
    ethrpc::AlloyProvider,
    std::{
        fmt::{self, Debug, Display, Formatter},
        str::FromStr,
    },
    url::Url,
};

pub const PRIVATE_KEY_VAR: &str = "PRIVATE_KEY";
pub const PROJECT_ID_VAR: &str = "INFURA_PROJECT_ID";

const DEVELOPMENT_URL: &str = "http://127.0.0.1:7545";
const SEPOLIA_GAS_LIMIT: u64 = 6_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    /// Local development chain (Ganache) with unlocked accounts.
    Development,
    /// Sepolia testnet reached through Infura.
    Sepolia,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Development, Network::Sepolia];

    pub fn name(&self) -> &'static str {
        match self {
            Network::Development => "development",
            Network::Sepolia => "sepolia",
        }
    }

    /// Fixed network id, `None` for networks that accept any chain.
    pub fn network_id(&self) -> Option<u64> {
        match self {
            Network::Development => None,
            Network::Sepolia => Some(networks::SEPOLIA),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|network| network.name() == s)
            .ok_or_else(|| ConfigurationError::UnknownNetwork(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown network {0:?}, expected one of: development, sepolia")]
    UnknownNetwork(String),
    #[error("network {network} requires {variable} to be set")]
    MissingCredential {
        network: Network,
        variable: &'static str,
    },
    #[error("{variable} is neither a private key nor a mnemonic: {reason}")]
    InvalidCredential {
        variable: &'static str,
        reason: String,
    },
    #[error("{0:?} is not a valid project id")]
    InvalidProjectId(String),
    #[error("node reports chain {actual}, but network {network} expects chain {expected}")]
    ChainMismatch {
        network: Network,
        expected: u64,
        actual: u64,
    },
}

/// Chain ids a profile may connect to. Development chains pick their own
/// id, so any is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainId {
    Any,
    Exact(u64),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasPolicy {
    /// Gas limit attached to every deployment transaction. Estimated by the
    /// node when unset.
    pub limit: Option<u64>,
}

/// Key used to sign transactions locally.
#[derive(Clone)]
pub struct Credential(PrivateKeySigner);

impl Credential {
    /// Accepts a hex encoded private key or a BIP-39 mnemonic, in which case
    /// the first account of the default derivation path is used.
    pub fn parse(secret: &str) -> Result<Self, ConfigurationError> {
        let secret = secret.trim();
        let invalid = |reason: String| ConfigurationError::InvalidCredential {
            variable: PRIVATE_KEY_VAR,
            reason,
        };
        let signer = if secret.split_whitespace().nth(1).is_some() {
            MnemonicBuilder::<English>::default()
                .phrase(secret)
                .index(0)
                .and_then(|builder| builder.build())
                .map_err(|err| invalid(err.to_string()))?
        } else {
            secret
                .parse::<PrivateKeySigner>()
                .map_err(|err| invalid(err.to_string()))?
        };
        Ok(Self(signer))
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.0
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential")
            .field(&self.0.address())
            .finish()
    }
}

#[derive(Clone)]
pub enum Connection {
    /// Transactions are sent from an account unlocked on the node.
    Unlocked { url: Url },
    /// Transactions are signed locally before they are sent.
    Signed { url: Url, credential: Credential },
}

impl Connection {
    pub fn url(&self) -> &Url {
        match self {
            Connection::Unlocked { url } | Connection::Signed { url, .. } => url,
        }
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Unlocked { url } => f
                .debug_struct("Unlocked")
                .field("url", &ethrpc::redacted(url))
                .finish(),
            Connection::Signed { url, credential } => f
                .debug_struct("Signed")
                .field("url", &ethrpc::redacted(url))
                .field("credential", credential)
                .finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NetworkProfile {
    pub network: Network,
    pub connection: Connection,
    pub chain_id: ChainId,
    pub gas: GasPolicy,
}

/// Secrets needed by remote networks, usually read from the environment.
#[derive(Clone, Default)]
pub struct Credentials {
    pub private_key: Option<String>,
    pub infura_project_id: Option<String>,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "SECRET");
        f.debug_struct("Credentials")
            .field("private_key", &redact(&self.private_key))
            .field("infura_project_id", &redact(&self.infura_project_id))
            .finish()
    }
}

/// Returns the non-blank value of a credential or which variable is missing.
fn required<'a>(
    network: Network,
    value: &'a Option<String>,
    variable: &'static str,
) -> Result<&'a str, ConfigurationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigurationError::MissingCredential { network, variable })
}

pub fn resolve(network: &str, credentials: &Credentials) -> Result<NetworkProfile, ConfigurationError> {
    match network.parse::<Network>()? {
        Network::Development => Ok(NetworkProfile {
            network: Network::Development,
            connection: Connection::Unlocked {
                url: Url::parse(DEVELOPMENT_URL).expect("valid development url"),
            },
            chain_id: ChainId::Any,
            gas: GasPolicy::default(),
        }),
        Network::Sepolia => {
            let network = Network::Sepolia;
            let private_key = required(network, &credentials.private_key, PRIVATE_KEY_VAR)?;
            let project_id = required(network, &credentials.infura_project_id, PROJECT_ID_VAR)?;
            if !project_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(ConfigurationError::InvalidProjectId(project_id.to_string()));
            }
            let url = Url::parse(&format!("https://sepolia.infura.io/v3/{project_id}"))
                .map_err(|_| ConfigurationError::InvalidProjectId(project_id.to_string()))?;
            Ok(NetworkProfile {
                network,
                connection: Connection::Signed {
                    url,
                    credential: Credential::parse(private_key)?,
                },
                chain_id: ChainId::Exact(networks::SEPOLIA),
                gas: GasPolicy {
                    limit: Some(SEPOLIA_GAS_LIMIT),
                },
            })
        }
    }
}

impl NetworkProfile {
    /// Builds the provider and checks that the node serves an accepted chain.
    pub async fn connect(&self) -> Result<AlloyChain> {
        let label = self.network.name();
        let provider = match &self.connection {
            Connection::Unlocked { url } => ethrpc::provider(url, label),
            Connection::Signed { url, credential } => ethrpc::provider_with_wallet(
                url,
                label,
                EthereumWallet::new(credential.signer().clone()),
            ),
        };
        self.attach(provider).await
    }

    /// Checks the chain `provider` is connected to and picks the account
    /// deployments are sent from.
    pub async fn attach(&self, provider: AlloyProvider) -> Result<AlloyChain> {
        let chain_id = provider
            .get_chain_id()
            .await
            .with_context(|| format!("failed to reach node of network {}", self.network))?;
        match self.chain_id {
            ChainId::Exact(expected) if expected != chain_id => {
                return Err(ConfigurationError::ChainMismatch {
                    network: self.network,
                    expected,
                    actual: chain_id,
                }
                .into());
            }
            _ => (),
        }
        // Artifacts key deployments by the node's network version, which
        // differs from the chain id on development chains.
        let network_id = provider
            .get_net_version()
            .await
            .context("failed to fetch network version")?;

        let from = match &self.connection {
            Connection::Signed { credential, .. } => credential.signer().address(),
            Connection::Unlocked { url } => provider
                .get_accounts()
                .await
                .context("failed to fetch unlocked accounts")?
                .first()
                .copied()
                .with_context(|| {
                    format!("node at {} has no unlocked accounts", ethrpc::redacted(url))
                })?,
        };

        tracing::info!(network = %self.network, chain_id, network_id, %from, "connected");
        Ok(AlloyChain::new(provider, network_id, from, self.gas.limit))
    }
}
