//! Persistence of contract artifacts and their deployments.
//!
//! The orchestrator only talks to [`DeploymentStore`] so runs can be tested
//! against [`InMemoryStore`] while the binary uses [`ArtifactDirectory`].

use {
    crate::artifact::{ContractArtifact, DeployedInstance},
    anyhow::{Context, Result},
    std::{
        collections::HashMap,
        path::{Path, PathBuf},
        sync::Mutex,
    },
};

#[async_trait::async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Loads the compiled artifact of `contract`.
    async fn artifact(&self, contract: &str) -> Result<ContractArtifact>;

    /// Returns the last recorded deployment of `contract` on `network_id`.
    async fn lookup(&self, network_id: u64, contract: &str) -> Result<Option<DeployedInstance>>;

    /// Persists a confirmed deployment, replacing any earlier record for the
    /// same network.
    async fn record(&self, instance: &DeployedInstance) -> Result<()>;
}

/// The build directory of the compiler toolchain, one `<Contract>.json` file
/// per contract.
#[derive(Debug, Clone)]
pub struct ArtifactDirectory {
    root: PathBuf,
}

impl ArtifactDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, contract: &str) -> PathBuf {
        self.root.join(format!("{contract}.json"))
    }

    async fn read(path: &Path) -> Result<ContractArtifact> {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read artifact {}", path.display()))?;
        serde_json::from_slice(&content)
            .with_context(|| format!("malformed artifact {}", path.display()))
    }

    /// Loads every artifact in the directory, sorted by contract name.
    pub async fn list(&self) -> Result<Vec<ContractArtifact>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("failed to open {}", self.root.display()))?;
        let mut artifacts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                artifacts.push(Self::read(&path).await?);
            }
        }
        artifacts.sort_by(|a, b| a.contract_name.cmp(&b.contract_name));
        Ok(artifacts)
    }
}

#[async_trait::async_trait]
impl DeploymentStore for ArtifactDirectory {
    async fn artifact(&self, contract: &str) -> Result<ContractArtifact> {
        Self::read(&self.path(contract)).await
    }

    async fn lookup(&self, network_id: u64, contract: &str) -> Result<Option<DeployedInstance>> {
        let path = self.path(contract);
        if !tokio::fs::try_exists(&path).await? {
            tracing::debug!(contract, path = %path.display(), "no artifact");
            return Ok(None);
        }
        Ok(Self::read(&path).await?.deployment(network_id))
    }

    async fn record(&self, instance: &DeployedInstance) -> Result<()> {
        let path = self.path(&instance.contract);
        let mut artifact = Self::read(&path).await?;
        artifact.record(instance);

        // Artifacts are replaced with a rename, never truncated in place.
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(&artifact)?;
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        tracing::debug!(
            contract = %instance.contract,
            network_id = instance.network_id,
            address = %instance.address,
            "recorded deployment"
        );
        Ok(())
    }
}

/// Keeps artifacts in memory. Used in tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    artifacts: Mutex<HashMap<String, ContractArtifact>>,
}

impl InMemoryStore {
    pub fn new(artifacts: impl IntoIterator<Item = ContractArtifact>) -> Self {
        Self {
            artifacts: Mutex::new(
                artifacts
                    .into_iter()
                    .map(|artifact| (artifact.contract_name.clone(), artifact))
                    .collect(),
            ),
        }
    }
}

#[async_trait::async_trait]
impl DeploymentStore for InMemoryStore {
    async fn artifact(&self, contract: &str) -> Result<ContractArtifact> {
        self.artifacts
            .lock()
            .unwrap()
            .get(contract)
            .cloned()
            .with_context(|| format!("no artifact for {contract}"))
    }

    async fn lookup(&self, network_id: u64, contract: &str) -> Result<Option<DeployedInstance>> {
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .get(contract)
            .and_then(|artifact| artifact.deployment(network_id)))
    }

    async fn record(&self, instance: &DeployedInstance) -> Result<()> {
        self.artifacts
            .lock()
            .unwrap()
            .get_mut(&instance.contract)
            .with_context(|| format!("no artifact for {}", instance.contract))?
            .record(instance);
        Ok(())
    }
}
