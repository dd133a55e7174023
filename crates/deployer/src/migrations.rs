//! Numbered deployment plans, executed in ascending order.

use {
    crate::orchestrator::{self, Argument, Deployments, Orchestrator, Plan},
    std::fmt::{self, Display, Formatter},
    tracing::Instrument,
};

pub const EVIDENCE_REGISTRY: &str = "EvidenceRegistry";
pub const CPT_STORE: &str = "CPTStore";
pub const ORACLE_CONTROLLER: &str = "OracleController";

#[derive(Clone, Copy, Debug)]
pub struct Migration {
    pub number: u32,
    pub name: &'static str,
    pub plan: fn() -> Plan,
}

impl Display for Migration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.number, self.name)
    }
}

/// Every migration of the project.
pub fn all() -> Vec<Migration> {
    vec![Migration {
        number: 2,
        name: "deploy_oracle_stack",
        plan: oracle_stack,
    }]
}

/// Deploys the evidence registry and an oracle controller wired to it and to
/// the already deployed CPT store.
pub fn oracle_stack() -> Plan {
    Plan::new()
        .deploy(EVIDENCE_REGISTRY, vec![])
        .lookup(CPT_STORE)
        .deploy(
            ORACLE_CONTROLLER,
            vec![
                Argument::address_of(CPT_STORE),
                Argument::address_of(EVIDENCE_REGISTRY),
            ],
        )
}

#[derive(Debug, thiserror::Error)]
#[error("migration {migration} failed")]
pub struct MigrationError {
    pub migration: String,
    #[source]
    pub source: orchestrator::Error,
}

/// Runs `migrations` by ascending number. Stops at the first failure, later
/// migrations are not attempted.
pub async fn run(
    orchestrator: &Orchestrator<'_>,
    mut migrations: Vec<Migration>,
) -> Result<Deployments, MigrationError> {
    migrations.sort_by_key(|migration| migration.number);

    let mut deployments = Deployments::new();
    for migration in migrations {
        tracing::info!(%migration, network_id = orchestrator.network_id(), "running migration");
        let deployed = orchestrator
            .run(&(migration.plan)())
            .instrument(tracing::info_span!("migration", %migration))
            .await
            .map_err(|source| MigrationError {
                migration: migration.to_string(),
                source,
            })?;
        deployments.extend(deployed);
    }
    Ok(deployments)
}
