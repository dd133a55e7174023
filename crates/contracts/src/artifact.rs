use {
    alloy::{
        dyn_abi::{DynSolValue, JsonAbiExt},
        json_abi::JsonAbi,
        primitives::{Address, B256, Bytes},
    },
    anyhow::{Context, Result, bail},
    chrono::{SecondsFormat, Utc},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    std::collections::BTreeMap,
};

/// A compiled contract as written to the build directory by the compiler
/// toolchain.
///
/// Only the fields needed for deploying are modelled, everything else is kept
/// in `extra` so that writing the artifact back does not lose information.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    pub abi: JsonAbi,
    #[serde(default)]
    pub bytecode: Bytes,
    /// Last known deployment per network id.
    #[serde(default)]
    pub networks: BTreeMap<u64, NetworkDeployment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeployment {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    /// ABI encoded constructor arguments the contract was created with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor_args: Option<Bytes>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A confirmed deployment of a contract on a specific network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployedInstance {
    pub network_id: u64,
    pub contract: String,
    pub address: Address,
    pub constructor_args: Bytes,
    pub transaction_hash: Option<B256>,
}

impl ContractArtifact {
    pub fn new(contract_name: impl Into<String>, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self {
            contract_name: contract_name.into(),
            abi,
            bytecode,
            ..Default::default()
        }
    }

    /// Returns the deployment recorded for `network_id`, if any.
    pub fn deployment(&self, network_id: u64) -> Option<DeployedInstance> {
        self.networks
            .get(&network_id)
            .map(|deployment| DeployedInstance {
                network_id,
                contract: self.contract_name.clone(),
                address: deployment.address,
                constructor_args: deployment.constructor_args.clone().unwrap_or_default(),
                transaction_hash: deployment.transaction_hash,
            })
    }

    /// Replaces the deployment entry of the instance's network.
    pub fn record(&mut self, instance: &DeployedInstance) {
        self.networks.insert(
            instance.network_id,
            NetworkDeployment {
                address: instance.address,
                transaction_hash: instance.transaction_hash,
                constructor_args: Some(instance.constructor_args.clone()),
                extra: [
                    ("events".to_string(), Value::Object(Default::default())),
                    ("links".to_string(), Value::Object(Default::default())),
                ]
                .into_iter()
                .collect(),
            },
        );
        self.extra.insert(
            "updatedAt".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }

    /// ABI encodes the constructor arguments of this contract.
    pub fn encode_constructor_args(&self, args: &[DynSolValue]) -> Result<Bytes> {
        match self.abi.constructor() {
            Some(constructor) => {
                let encoded = constructor.abi_encode_input(args).with_context(|| {
                    format!("invalid constructor arguments for {}", self.contract_name)
                })?;
                Ok(encoded.into())
            }
            None if args.is_empty() => Ok(Bytes::new()),
            None => bail!(
                "{} has no constructor but {} arguments were given",
                self.contract_name,
                args.len()
            ),
        }
    }

    /// Builds the payload of a contract creation transaction: the bytecode
    /// followed by the encoded constructor arguments.
    pub fn creation_code(&self, encoded_args: &Bytes) -> Result<Bytes> {
        if self.bytecode.is_empty() {
            bail!(
                "{} has no bytecode, it is either abstract or an interface",
                self.contract_name
            );
        }
        Ok([self.bytecode.as_ref(), encoded_args.as_ref()].concat().into())
    }
}
