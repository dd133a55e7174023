pub mod instrumentation;

use {
    alloy::{
        network::EthereumWallet,
        providers::{DynProvider, Provider, ProviderBuilder},
        rpc::client::{ClientBuilder, RpcClient},
    },
    instrumentation::InstrumentationLayer,
    url::Url,
};

pub type AlloyProvider = DynProvider;

fn client(url: &Url, label: &str) -> RpcClient {
    ClientBuilder::default()
        .layer(InstrumentationLayer::new(label, url))
        .http(url.clone())
}

/// Origin of `url` without path or query, which may carry an API key.
pub fn redacted(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Creates a provider that sends transactions from accounts unlocked on the
/// node. No request is made until the provider is first used.
pub fn provider(url: &Url, label: &str) -> AlloyProvider {
    ProviderBuilder::new()
        .connect_client(client(url, label))
        .erased()
}

/// Creates a provider that signs transactions locally with `wallet` before
/// submitting them.
pub fn provider_with_wallet(url: &Url, label: &str, wallet: EthereumWallet) -> AlloyProvider {
    ProviderBuilder::new()
        .wallet(wallet)
        .connect_client(client(url, label))
        .erased()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provider_connects_lazily() {
        // Nothing listens on port 1, so only an actual request can fail.
        let provider = provider(&"http://127.0.0.1:1".parse().unwrap(), "test");
        assert!(provider.get_chain_id().await.is_err());
    }

    #[test]
    fn redacts_api_keys() {
        let url = "https://sepolia.infura.io/v3/0123abcd?key=secret".parse().unwrap();
        assert_eq!(redacted(&url), "https://sepolia.infura.io");

        let url = "http://127.0.0.1:7545".parse().unwrap();
        assert_eq!(redacted(&url), "http://127.0.0.1:7545");
    }

    #[tokio::test]
    async fn transport_errors_hide_api_keys() {
        let url = "http://127.0.0.1:1/v3/0123abcd".parse().unwrap();
        let err = provider(&url, "test").get_chain_id().await.unwrap_err();

        let message = format!("{err:?} {err}");
        assert!(!message.contains("0123abcd"), "{message}");
    }
}
