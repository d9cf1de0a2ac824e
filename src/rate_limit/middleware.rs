use crate::error::AdmissionError;
use crate::rate_limit::AdmissionGate;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that admits requests through a shared [`AdmissionGate`].
#[derive(Clone, Debug)]
pub struct AdmissionLayer {
    gate: Arc<AdmissionGate>,
    cost: f64,
}

impl AdmissionLayer {
    /// Create a layer charging one token per request.
    pub fn new(gate: Arc<AdmissionGate>) -> Self {
        Self { gate, cost: 1.0 }
    }

    /// Charge `cost` tokens per request instead of one.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService { inner: service, gate: self.gate.clone(), cost: self.cost }
    }
}

/// Middleware service that consults the gate once per request.
///
/// The admission decision is made synchronously in `call`, before the inner future is
/// created. Tokens spent on an admitted request are never refunded, even when the inner
/// service fails.
#[derive(Clone, Debug)]
pub struct AdmissionService<S> {
    inner: S,
    gate: Arc<AdmissionGate>,
    cost: f64,
}

impl<S> AdmissionService<S> {
    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    /// Borrow the protected service.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, Req> Service<Req> for AdmissionService<S>
where
    S: Service<Req> + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    Req: 'static,
{
    type Response = S::Response;
    type Error = AdmissionError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let cost = self.cost;
        if !self.gate.try_consume(cost) {
            tracing::warn!(
                cost,
                available = self.gate.available(),
                "admission gate: rate limit exceeded"
            );
            return Box::pin(async move { Err(AdmissionError::Rejected { cost }) });
        }

        let fut = self.inner.call(req);
        Box::pin(async move { fut.await.map_err(AdmissionError::Inner) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::{ServiceBuilder, ServiceExt};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    fn frozen_gate(capacity: f64) -> (Arc<AdmissionGate>, ManualClock) {
        let clock = ManualClock::new();
        let gate = AdmissionGate::new(capacity, 1.0).unwrap().with_clock(clock.clone());
        (Arc::new(gate), clock)
    }

    #[tokio::test]
    async fn admitted_requests_reach_inner_service() {
        let (gate, _) = frozen_gate(2.0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let svc = ServiceBuilder::new().layer(AdmissionLayer::new(gate)).service_fn(
            move |req: u32| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(req * 2)
                }
            },
        );

        assert_eq!(svc.clone().oneshot(21).await.unwrap(), 42);
        assert_eq!(svc.clone().oneshot(1).await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_requests_never_reach_inner_service() {
        let (gate, _) = frozen_gate(1.0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let svc = ServiceBuilder::new().layer(AdmissionLayer::new(gate)).service_fn(
            move |_req: ()| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(())
                }
            },
        );

        assert!(svc.clone().oneshot(()).await.is_ok());
        let err = svc.clone().oneshot(()).await.unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inner_failure_does_not_refund_tokens() {
        let (gate, _) = frozen_gate(2.0);
        let svc = ServiceBuilder::new().layer(AdmissionLayer::new(gate.clone())).service_fn(
            |_req: ()| async { Err::<(), _>(TestError("model unavailable".into())) },
        );

        let err = svc.clone().oneshot(()).await.unwrap_err();
        assert_eq!(err.as_inner(), Some(&TestError("model unavailable".into())));
        assert!((gate.available() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn custom_cost_is_charged_per_request() {
        let (gate, clock) = frozen_gate(5.0);
        let svc = ServiceBuilder::new()
            .layer(AdmissionLayer::new(gate.clone()).with_cost(2.0))
            .service_fn(|_req: ()| async { Ok::<_, TestError>(()) });

        assert!(svc.clone().oneshot(()).await.is_ok());
        assert!(svc.clone().oneshot(()).await.is_ok());
        match svc.clone().oneshot(()).await {
            Err(AdmissionError::Rejected { cost }) => assert_eq!(cost, 2.0),
            other => panic!("expected rejection, got {:?}", other.map(|_| ())),
        }

        clock.advance(Duration::from_secs(1));
        assert!(svc.clone().oneshot(()).await.is_ok());
    }
}
