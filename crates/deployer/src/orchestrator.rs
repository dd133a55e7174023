//! Executes deployment plans step by step.
//!
//! Every step either deploys a contract or resolves one that an earlier run
//! (or another project) already deployed. Deploy steps first check the store
//! for an existing instance on the current network and reuse it, so running
//! the same plan twice performs no transactions the second time.

use {
    crate::chain::Chain,
    alloy::dyn_abi::DynSolValue,
    anyhow::Context as _,
    contracts::{DeployedInstance, DeploymentStore},
    indexmap::IndexMap,
    std::collections::HashSet,
};

/// Deployed instances by contract name, in the order the steps produced them.
pub type Deployments = IndexMap<String, DeployedInstance>;

/// A constructor argument of a deploy step.
#[derive(Clone, Debug, PartialEq)]
pub enum Argument {
    /// Address of the contract produced by an earlier step.
    AddressOf(String),
    Value(DynSolValue),
}

impl Argument {
    pub fn address_of(contract: impl Into<String>) -> Self {
        Self::AddressOf(contract.into())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    Deploy {
        contract: String,
        args: Vec<Argument>,
    },
    /// Requires the contract to already be deployed on the network.
    Lookup { contract: String },
}

impl Step {
    pub fn contract(&self) -> &str {
        match self {
            Step::Deploy { contract, .. } | Step::Lookup { contract } => contract,
        }
    }
}

/// An ordered list of steps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(mut self, contract: impl Into<String>, args: Vec<Argument>) -> Self {
        self.steps.push(Step::Deploy {
            contract: contract.into(),
            args,
        });
        self
    }

    pub fn lookup(mut self, contract: impl Into<String>) -> Self {
        self.steps.push(Step::Lookup {
            contract: contract.into(),
        });
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Checks that every address reference points to an earlier step and that
    /// no contract is handled twice.
    pub fn validate(&self) -> Result<(), Error> {
        let mut produced = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if let Step::Deploy { contract, args } = step {
                let unresolved = args.iter().find_map(|arg| match arg {
                    Argument::AddressOf(dependency) if !produced.contains(dependency.as_str()) => {
                        Some(dependency)
                    }
                    _ => None,
                });
                if let Some(dependency) = unresolved {
                    return Err(Error::UnresolvedDependency {
                        index,
                        contract: contract.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
            if !produced.insert(step.contract()) {
                return Err(Error::DuplicateStep {
                    index,
                    contract: step.contract().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("step {index} ({contract}) references {dependency}, which no earlier step produces")]
    UnresolvedDependency {
        index: usize,
        contract: String,
        dependency: String,
    },
    #[error("step {index} handles {contract} a second time")]
    DuplicateStep { index: usize, contract: String },
    #[error("step {index} requires {contract} to be deployed on network {network_id}")]
    NotDeployed {
        index: usize,
        contract: String,
        network_id: u64,
    },
    #[error("step {index} failed to deploy {contract}")]
    Deployment {
        index: usize,
        contract: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    /// Zero based position of the failing step in its plan.
    pub fn index(&self) -> usize {
        match self {
            Error::UnresolvedDependency { index, .. }
            | Error::DuplicateStep { index, .. }
            | Error::NotDeployed { index, .. }
            | Error::Deployment { index, .. } => *index,
        }
    }

    pub fn contract(&self) -> &str {
        match self {
            Error::UnresolvedDependency { contract, .. }
            | Error::DuplicateStep { contract, .. }
            | Error::NotDeployed { contract, .. }
            | Error::Deployment { contract, .. } => contract,
        }
    }
}

pub struct Orchestrator<'a> {
    chain: &'a dyn Chain,
    store: &'a dyn DeploymentStore,
}

impl<'a> Orchestrator<'a> {
    pub fn new(chain: &'a dyn Chain, store: &'a dyn DeploymentStore) -> Self {
        Self { chain, store }
    }

    pub fn network_id(&self) -> u64 {
        self.chain.network_id()
    }

    /// Runs the steps of `plan` in order and returns the instance each step
    /// produced. Stops at the first failing step, deployments of earlier steps
    /// stay recorded.
    pub async fn run(&self, plan: &Plan) -> Result<Deployments, Error> {
        plan.validate()?;

        let mut deployments = Deployments::new();
        for (index, step) in plan.steps().iter().enumerate() {
            let instance = match step {
                Step::Lookup { contract } => self.lookup(index, contract).await?,
                Step::Deploy { contract, args } => {
                    self.deploy(index, contract, args, &deployments).await?
                }
            };
            deployments.insert(instance.contract.clone(), instance);
        }
        Ok(deployments)
    }

    async fn lookup(&self, index: usize, contract: &str) -> Result<DeployedInstance, Error> {
        let network_id = self.chain.network_id();
        let instance = self
            .existing(contract)
            .await
            .map_err(|source| Error::Deployment {
                index,
                contract: contract.to_string(),
                source,
            })?
            .ok_or_else(|| Error::NotDeployed {
                index,
                contract: contract.to_string(),
                network_id,
            })?;
        tracing::info!(contract, address = %instance.address, "using deployed contract");
        Ok(instance)
    }

    async fn deploy(
        &self,
        index: usize,
        contract: &str,
        args: &[Argument],
        deployments: &Deployments,
    ) -> Result<DeployedInstance, Error> {
        let failed = |source: anyhow::Error| Error::Deployment {
            index,
            contract: contract.to_string(),
            source,
        };

        if let Some(instance) = self.existing(contract).await.map_err(failed)? {
            tracing::info!(contract, address = %instance.address, "reusing deployed contract");
            return Ok(instance);
        }

        let args = args
            .iter()
            .map(|arg| match arg {
                Argument::AddressOf(dependency) => deployments
                    .get(dependency)
                    .map(|instance| DynSolValue::Address(instance.address))
                    .ok_or_else(|| Error::UnresolvedDependency {
                        index,
                        contract: contract.to_string(),
                        dependency: dependency.clone(),
                    }),
                Argument::Value(value) => Ok(value.clone()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(contract, "deploying");
        let instance = self.create(contract, &args).await.map_err(failed)?;
        tracing::info!(
            contract,
            address = %instance.address,
            transaction_hash = ?instance.transaction_hash,
            "deployed"
        );
        Ok(instance)
    }

    /// Returns the recorded instance of `contract` if the chain still has code
    /// at its address.
    async fn existing(&self, contract: &str) -> anyhow::Result<Option<DeployedInstance>> {
        let network_id = self.chain.network_id();
        let Some(instance) = self.store.lookup(network_id, contract).await? else {
            return Ok(None);
        };
        if !self.chain.has_code(instance.address).await? {
            tracing::warn!(
                contract,
                network_id,
                address = %instance.address,
                "ignoring recorded deployment without code"
            );
            return Ok(None);
        }
        Ok(Some(instance))
    }

    async fn create(
        &self,
        contract: &str,
        args: &[DynSolValue],
    ) -> anyhow::Result<DeployedInstance> {
        let artifact = self.store.artifact(contract).await?;
        let constructor_args = artifact.encode_constructor_args(args)?;
        let creation_code = artifact.creation_code(&constructor_args)?;
        let receipt = self.chain.deploy(creation_code).await?;

        let instance = DeployedInstance {
            network_id: self.chain.network_id(),
            contract: contract.to_string(),
            address: receipt.address,
            constructor_args,
            transaction_hash: Some(receipt.transaction_hash),
        };
        self.store
            .record(&instance)
            .await
            .with_context(|| format!("{contract} deployed at {} but not recorded", instance.address))?;
        Ok(instance)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        crate::chain::{MockChain, Receipt},
        alloy::{
            json_abi::JsonAbi,
            primitives::{Address, B256, Bytes, U256},
        },
        contracts::{ContractArtifact, InMemoryStore},
        mockall::predicate::eq,
        serde_json::json,
        std::sync::{
            Arc,
            atomic::{AtomicU8, Ordering},
        },
    };

    pub const NETWORK: u64 = 5777;

    fn artifact(name: &str, constructor: &[&str]) -> ContractArtifact {
        let inputs: Vec<_> = constructor
            .iter()
            .map(|ty| json!({ "name": "", "type": ty, "internalType": ty }))
            .collect();
        let abi: JsonAbi = if constructor.is_empty() {
            JsonAbi::default()
        } else {
            serde_json::from_value(json!([{
                "type": "constructor",
                "inputs": inputs,
                "stateMutability": "nonpayable"
            }]))
            .unwrap()
        };
        ContractArtifact::new(name, abi, Bytes::from_static(&[0x60, 0x80]))
    }

    /// Store holding artifacts of the oracle stack, optionally with a
    /// deployment of `CPTStore`.
    pub fn oracle_store(cpt_store: Option<Address>) -> InMemoryStore {
        let mut cpt = artifact("CPTStore", &[]);
        if let Some(address) = cpt_store {
            cpt.record(&deployed("CPTStore", address));
        }
        InMemoryStore::new([
            artifact("EvidenceRegistry", &[]),
            cpt,
            artifact("OracleController", &["address", "address"]),
        ])
    }

    pub fn deployed(contract: &str, address: Address) -> DeployedInstance {
        DeployedInstance {
            network_id: NETWORK,
            contract: contract.to_string(),
            address,
            constructor_args: Bytes::new(),
            transaction_hash: None,
        }
    }

    /// Chain on which every address has code and deployments receive
    /// consecutive addresses starting at `0x..01`. Records every creation code
    /// it receives.
    pub fn chain(created: Arc<std::sync::Mutex<Vec<Bytes>>>) -> MockChain {
        let next = AtomicU8::new(1);
        let mut chain = MockChain::new();
        chain.expect_network_id().return_const(NETWORK);
        chain.expect_has_code().returning(|_| Ok(true));
        chain.expect_deploy().returning(move |code| {
            created.lock().unwrap().push(code);
            let n = next.fetch_add(1, Ordering::SeqCst);
            Ok(Receipt {
                address: Address::with_last_byte(n),
                transaction_hash: B256::with_last_byte(n),
            })
        });
        chain
    }

    fn oracle_plan() -> Plan {
        Plan::new()
            .deploy("EvidenceRegistry", vec![])
            .lookup("CPTStore")
            .deploy(
                "OracleController",
                vec![
                    Argument::address_of("CPTStore"),
                    Argument::address_of("EvidenceRegistry"),
                ],
            )
    }

    fn oracle_controller_code(cpt_store: Address, registry: Address) -> Bytes {
        let mut code = vec![0x60, 0x80];
        code.extend_from_slice(cpt_store.into_word().as_slice());
        code.extend_from_slice(registry.into_word().as_slice());
        code.into()
    }

    pub const CPT_STORE_ADDRESS: Address = Address::repeat_byte(0xcc);

    #[tokio::test]
    async fn deploys_fresh_network_in_order() {
        observe::tracing::initialize_reentrant("deployer=debug");
        let created = Arc::default();
        let chain = chain(Arc::clone(&created));
        let store = oracle_store(Some(CPT_STORE_ADDRESS));

        let deployments = Orchestrator::new(&chain, &store)
            .run(&oracle_plan())
            .await
            .unwrap();

        let registry = Address::with_last_byte(1);
        let controller = Address::with_last_byte(2);
        assert_eq!(
            deployments.keys().collect::<Vec<_>>(),
            ["EvidenceRegistry", "CPTStore", "OracleController"]
        );
        assert_eq!(deployments["EvidenceRegistry"].address, registry);
        assert_eq!(deployments["CPTStore"].address, CPT_STORE_ADDRESS);
        assert_eq!(deployments["OracleController"].address, controller);
        assert_eq!(
            *created.lock().unwrap(),
            [
                Bytes::from_static(&[0x60, 0x80]),
                oracle_controller_code(CPT_STORE_ADDRESS, registry),
            ]
        );

        let recorded = store
            .lookup(NETWORK, "OracleController")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recorded, deployments["OracleController"]);
        assert_eq!(recorded.transaction_hash, Some(B256::with_last_byte(2)));
        assert_eq!(
            store
                .lookup(NETWORK, "EvidenceRegistry")
                .await
                .unwrap()
                .unwrap()
                .address,
            registry
        );
    }

    #[tokio::test]
    async fn reuses_deployed_contracts() {
        let registry = Address::repeat_byte(0xee);
        let created = Arc::default();
        let chain = chain(Arc::clone(&created));
        let store = oracle_store(Some(CPT_STORE_ADDRESS));
        store
            .record(&deployed("EvidenceRegistry", registry))
            .await
            .unwrap();

        let deployments = Orchestrator::new(&chain, &store)
            .run(&oracle_plan())
            .await
            .unwrap();

        assert_eq!(deployments["EvidenceRegistry"].address, registry);
        assert_eq!(
            deployments["OracleController"].address,
            Address::with_last_byte(1)
        );
        assert_eq!(
            *created.lock().unwrap(),
            [oracle_controller_code(CPT_STORE_ADDRESS, registry)]
        );
    }

    #[tokio::test]
    async fn second_run_sends_no_transactions() {
        let created = Arc::default();
        let chain = chain(Arc::clone(&created));
        let store = oracle_store(Some(CPT_STORE_ADDRESS));
        let orchestrator = Orchestrator::new(&chain, &store);

        let first = orchestrator.run(&oracle_plan()).await.unwrap();
        assert_eq!(created.lock().unwrap().len(), 2);

        let second = orchestrator.run(&oracle_plan()).await.unwrap();
        assert_eq!(created.lock().unwrap().len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_prerequisite_stops_before_dependent_step() {
        let created = Arc::default();
        let chain = chain(Arc::clone(&created));
        let store = oracle_store(None);

        let err = Orchestrator::new(&chain, &store)
            .run(&oracle_plan())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::NotDeployed {
                index: 1,
                network_id: NETWORK,
                ..
            }
        ));
        assert_eq!(err.contract(), "CPTStore");
        assert_eq!(created.lock().unwrap().len(), 1);
        assert_eq!(
            store
                .lookup(NETWORK, "EvidenceRegistry")
                .await
                .unwrap()
                .unwrap()
                .address,
            Address::with_last_byte(1)
        );
        assert!(
            store
                .lookup(NETWORK, "OracleController")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn misordered_plan_touches_nothing() {
        // No expectations: any chain call panics.
        let chain = MockChain::new();
        let store = oracle_store(Some(CPT_STORE_ADDRESS));
        let plan = Plan::new()
            .deploy(
                "OracleController",
                vec![
                    Argument::address_of("CPTStore"),
                    Argument::address_of("EvidenceRegistry"),
                ],
            )
            .deploy("EvidenceRegistry", vec![])
            .lookup("CPTStore");

        let err = Orchestrator::new(&chain, &store)
            .run(&plan)
            .await
            .unwrap_err();

        match err {
            Error::UnresolvedDependency {
                index,
                contract,
                dependency,
            } => {
                assert_eq!(index, 0);
                assert_eq!(contract, "OracleController");
                assert_eq!(dependency, "CPTStore");
            }
            err => panic!("unexpected error {err:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_steps() {
        let plan = Plan::new()
            .deploy("EvidenceRegistry", vec![])
            .lookup("EvidenceRegistry");

        let err = plan.validate().unwrap_err();
        assert!(matches!(err, Error::DuplicateStep { index: 1, .. }));
        assert_eq!(err.contract(), "EvidenceRegistry");
    }

    #[test]
    fn self_reference_is_unresolved() {
        let plan = Plan::new().deploy(
            "OracleController",
            vec![Argument::address_of("OracleController")],
        );
        assert!(matches!(
            plan.validate(),
            Err(Error::UnresolvedDependency { index: 0, .. })
        ));
    }

    #[tokio::test]
    async fn failed_deployment_reports_step() {
        let mut chain = MockChain::new();
        chain.expect_network_id().return_const(NETWORK);
        chain.expect_has_code().returning(|_| Ok(true));
        chain
            .expect_deploy()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("insufficient funds")));
        let store = oracle_store(Some(CPT_STORE_ADDRESS));

        let err = Orchestrator::new(&chain, &store)
            .run(&oracle_plan())
            .await
            .unwrap_err();

        assert_eq!(err.index(), 0);
        assert_eq!(err.contract(), "EvidenceRegistry");
        let Error::Deployment { source, .. } = err else {
            panic!("expected deployment error");
        };
        assert_eq!(source.to_string(), "insufficient funds");
        assert!(
            store
                .lookup(NETWORK, "EvidenceRegistry")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn lookup_rejects_records_without_code() {
        let mut chain = MockChain::new();
        chain.expect_network_id().return_const(NETWORK);
        chain
            .expect_has_code()
            .with(eq(CPT_STORE_ADDRESS))
            .times(1)
            .returning(|_| Ok(false));
        chain.expect_deploy().never();
        let store = oracle_store(Some(CPT_STORE_ADDRESS));

        let err = Orchestrator::new(&chain, &store)
            .run(&Plan::new().lookup("CPTStore"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::NotDeployed {
                index: 0,
                network_id: NETWORK,
                ..
            }
        ));
        assert_eq!(err.contract(), "CPTStore");
    }

    #[tokio::test]
    async fn redeploys_records_without_code() {
        let stale = Address::repeat_byte(0x57);
        let mut chain = MockChain::new();
        chain.expect_network_id().return_const(NETWORK);
        chain
            .expect_has_code()
            .with(eq(stale))
            .times(1)
            .returning(|_| Ok(false));
        chain
            .expect_deploy()
            .times(1)
            .returning(|_| {
                Ok(Receipt {
                    address: Address::with_last_byte(9),
                    transaction_hash: B256::ZERO,
                })
            });
        let store = oracle_store(None);
        store
            .record(&deployed("EvidenceRegistry", stale))
            .await
            .unwrap();

        let deployments = Orchestrator::new(&chain, &store)
            .run(&Plan::new().deploy("EvidenceRegistry", vec![]))
            .await
            .unwrap();

        assert_eq!(
            deployments["EvidenceRegistry"].address,
            Address::with_last_byte(9)
        );
    }

    #[tokio::test]
    async fn passes_literal_arguments() {
        let created = Arc::default();
        let chain = chain(Arc::clone(&created));
        let store = InMemoryStore::new([artifact("Counter", &["uint256"])]);

        Orchestrator::new(&chain, &store)
            .run(&Plan::new().deploy(
                "Counter",
                vec![Argument::Value(DynSolValue::Uint(U256::from(7), 256))],
            ))
            .await
            .unwrap();

        let mut expected = vec![0x60, 0x80];
        expected.extend_from_slice(&U256::from(7).to_be_bytes::<32>());
        assert_eq!(*created.lock().unwrap(), [Bytes::from(expected)]);
    }
}
