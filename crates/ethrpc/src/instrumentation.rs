//! Transport layer that logs every RPC request going through a provider,
//! tagged with the provider's label.
//!
//! Transport errors are rewritten so they never contain the endpoint's path,
//! which for hosted nodes holds the API key.
use {
    alloy::{
        rpc::json_rpc::{RequestPacket, ResponsePacket},
        transports::{RpcError, TransportError, TransportErrorKind},
    },
    std::{
        error::Error,
        fmt::Debug,
        future::Future,
        pin::Pin,
        task::{Context, Poll},
        time::Instant,
    },
    tower::{Layer, Service},
    url::Url,
};

#[derive(Debug, Clone)]
pub struct InstrumentationLayer {
    label: String,
    endpoint: Endpoint,
}

impl InstrumentationLayer {
    pub fn new(label: impl Into<String>, url: &Url) -> Self {
        Self {
            label: label.into(),
            endpoint: Endpoint {
                url: url.to_string(),
                redacted: crate::redacted(url),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    redacted: String,
}

impl Endpoint {
    /// Replaces the full endpoint url in the messages of custom transport
    /// errors (e.g. failed connections) with its redacted form.
    fn redact(&self, err: TransportError) -> TransportError {
        match err {
            RpcError::Transport(TransportErrorKind::Custom(inner)) => {
                let mut message = inner.to_string();
                let mut source = inner.source();
                while let Some(err) = source {
                    message = format!("{message}: {err}");
                    source = err.source();
                }
                TransportErrorKind::custom_str(
                    &message
                        .replace(&self.url, &self.redacted)
                        .replace(self.url.trim_end_matches('/'), &self.redacted),
                )
            }
            err => err,
        }
    }
}

impl<S> Layer<S> for InstrumentationLayer {
    type Service = InstrumentedTransport<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentedTransport {
            inner,
            label: self.label.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstrumentedTransport<S> {
    inner: S,
    label: String,
    endpoint: Endpoint,
}

impl<S> Service<RequestPacket> for InstrumentedTransport<S>
where
    S: Service<RequestPacket, Response = ResponsePacket, Error = TransportError>,
    S::Future: Send + 'static,
    S::Response: Send + 'static + Debug,
{
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: RequestPacket) -> Self::Future {
        let methods: Vec<String> = req
            .requests_mut()
            .iter_mut()
            .map(|r| r.method().to_string())
            .collect();
        tracing::trace!(label = %self.label, ?methods, "executing request");

        let label = self.label.clone();
        let endpoint = self.endpoint.clone();
        let start = Instant::now();
        let fut = self.inner.call(req);
        Box::pin(async move {
            let res = fut.await.map_err(|err| endpoint.redact(err));
            match &res {
                Ok(_) => tracing::debug!(%label, ?methods, elapsed = ?start.elapsed(), "request completed"),
                Err(err) => tracing::debug!(%label, ?methods, ?err, "request failed"),
            }
            res
        })
    }
}
