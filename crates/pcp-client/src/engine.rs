//! Forwarding engine

use std::sync::Arc;
use std::time::Instant;

use pcp_core::{ForwardRequest, ForwardResult, RequestEcho, ResultRecorder};
use tracing::{debug, info, instrument, warn};

use crate::error::{ResolveError, TransportError};
use crate::handle::{ClientHandle, ClientLease};
use crate::request::{Attempt, Target};
use crate::transport::AttemptResponse;

/// Endpoint affected by the spurious-400 firmware quirk
pub const DIAL_ENDPOINT: &str = "/api/v1/callctrl/dial";

const QUIRK_STATUS: u16 = 400;

/// Forwards requests to the phone and records every result.
#[derive(Clone)]
pub struct Forwarder {
    clients: Arc<ClientHandle>,
    recorder: Arc<dyn ResultRecorder>,
}

/// An attempt together with the response it got
struct Outcome {
    attempt: Attempt,
    response: AttemptResponse,
    elapsed_ms: u64,
}

impl Forwarder {
    pub fn new(clients: Arc<ClientHandle>, recorder: Arc<dyn ResultRecorder>) -> Self {
        Self { clients, recorder }
    }

    pub fn clients(&self) -> &Arc<ClientHandle> {
        &self.clients
    }

    /// Forward `request` and return its result.
    ///
    /// Never fails: validation and transport failures are reported in the
    /// result itself. The result is recorded before it is returned.
    #[instrument(skip(self, request), fields(method = %request.method(), url = %request.display_url()))]
    pub async fn forward(&self, request: &ForwardRequest) -> ForwardResult {
        let result = self.run(request).await;
        debug!(ok = result.ok, status = result.status, reason = %result.reason, "Forward finished");
        self.recorder.record(&result);
        result
    }

    async fn run(&self, request: &ForwardRequest) -> ForwardResult {
        let target = match Target::resolve(request) {
            Ok(target) => target,
            Err(ResolveError::HttpsRequired) => {
                warn!(base_url = %request.base_url(), "Rejected relative path against non-HTTPS base URL");
                return ForwardResult::https_required(request);
            }
            Err(err @ ResolveError::InvalidUrl(_)) => {
                return ForwardResult::exception(
                    RequestEcho::unsent(request.display_url(), request),
                    0,
                    err.to_string(),
                );
            }
        };

        let started = Instant::now();
        let attempt = match Attempt::build(target.url.clone(), request) {
            Ok(attempt) => attempt,
            Err(err) => {
                return ForwardResult::exception(
                    RequestEcho::unsent(target.url.as_str(), request),
                    elapsed_ms(started),
                    err.describe(),
                );
            }
        };

        // One lease for every attempt of this forward
        let lease = self.clients.current();
        let response = match lease.send(&attempt).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err.describe(), "Request failed");
                return ForwardResult::exception(
                    attempt.echo(request),
                    elapsed_ms(started),
                    err.describe(),
                );
            }
        };

        let mut outcome = Outcome {
            attempt,
            response,
            elapsed_ms: elapsed_ms(started),
        };
        if outcome.response.status == QUIRK_STATUS && request.path.contains(DIAL_ENDPOINT) {
            outcome = self.escalate(&lease, &target, request, outcome, started).await;
        }

        ForwardResult::completed(
            outcome.response.status,
            outcome.response.reason.clone(),
            outcome.elapsed_ms,
            outcome.attempt.echo(request),
            outcome.response.echo(),
        )
    }

    /// Retry a dial request that got the spurious 400.
    ///
    /// Variant A repeats the request. Variant B sends it over plain HTTP and
    /// runs only when A also got 400 and the base URL is HTTPS. A failed
    /// retry ends escalation with the original outcome.
    async fn escalate(
        &self,
        lease: &ClientLease,
        target: &Target,
        request: &ForwardRequest,
        original: Outcome,
        started: Instant,
    ) -> Outcome {
        info!("Dial returned 400, retrying");
        let variant_a = match retry(lease, Attempt::build(target.url.clone(), request), started).await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err.describe(), "Dial retry failed, keeping original response");
                return original;
            }
        };
        if variant_a.response.status != QUIRK_STATUS || !target.base_is_https() {
            return variant_a;
        }

        info!("Dial retry returned 400, retrying over plain HTTP");
        let downgraded = target
            .downgraded(request)
            .map_err(TransportError::from)
            .and_then(|url| Attempt::build(url, request));
        match retry(lease, downgraded, started).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err.describe(), "Plain HTTP dial retry failed, keeping original response");
                original
            }
        }
    }
}

async fn retry(
    lease: &ClientLease,
    attempt: Result<Attempt, TransportError>,
    started: Instant,
) -> Result<Outcome, TransportError> {
    let attempt = attempt?;
    let response = lease.send(&attempt).await?;
    Ok(Outcome {
        attempt,
        response,
        elapsed_ms: elapsed_ms(started),
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("clients", &self.clients)
            .finish_non_exhaustive()
    }
}
