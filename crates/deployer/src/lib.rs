pub mod arguments;
pub mod chain;
pub mod migrations;
pub mod orchestrator;
pub mod profile;

use {
    anyhow::Result,
    arguments::{Arguments, Command},
    contracts::{ArtifactDirectory, ContractArtifact},
    orchestrator::Orchestrator,
    profile::Network,
    std::{collections::BTreeMap, fmt::Write as _},
};

pub async fn run(args: Arguments) -> Result<()> {
    let store = ArtifactDirectory::new(&args.artifacts_dir);
    match args.command() {
        Command::Migrate => migrate(&args, &store).await,
        Command::Networks => {
            let artifacts = store.list().await?;
            print!("{}", format_networks(&artifacts));
            Ok(())
        }
    }
}

async fn migrate(args: &Arguments, store: &ArtifactDirectory) -> Result<()> {
    let profile = profile::resolve(&args.network, &args.credentials())?;
    let chain = profile.connect().await?;
    let orchestrator = Orchestrator::new(&chain, store);

    let deployments = migrations::run(&orchestrator, migrations::all()).await?;
    for (contract, instance) in &deployments {
        tracing::info!(
            %contract,
            address = %instance.address,
            network_id = instance.network_id,
            "deployment"
        );
    }
    Ok(())
}

/// Renders the recorded deployments of all artifacts grouped by network id.
pub fn format_networks(artifacts: &[ContractArtifact]) -> String {
    let mut by_network = BTreeMap::<u64, Vec<_>>::new();
    for artifact in artifacts {
        for (network_id, deployment) in &artifact.networks {
            by_network
                .entry(*network_id)
                .or_default()
                .push((&artifact.contract_name, deployment.address));
        }
    }

    if by_network.is_empty() {
        return "No deployments found.\n".to_string();
    }

    let mut output = String::new();
    for (network_id, contracts) in by_network {
        let label = match Network::ALL
            .into_iter()
            .find(|network| network.network_id() == Some(network_id))
        {
            Some(network) => format!("{network} ({network_id})"),
            None => network_id.to_string(),
        };
        writeln!(output, "Network: {label}").ok();
        for (contract, address) in contracts {
            writeln!(output, "  {contract}: {address}").ok();
        }
        output.push('\n');
    }
    output
}
