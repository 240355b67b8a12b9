//! Fans a payload out to the committee and assembles the quorum certificate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sov_da_interface::{tree, DaError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{DasBackend, RpcBackendClient};
use crate::bls::{aggregate_signatures, BlsPublicKey, BlsSignature};
use crate::certificate::{
    signable_fields, DataAvailabilityCertificate, CURRENT_CERTIFICATE_VERSION,
};
use crate::config::AggregatorConfig;
use crate::keyset::Keyset;
use crate::metrics::{AGGREGATOR_BACKEND_FAILURES, AGGREGATOR_STORES, AGGREGATOR_STORE_DURATION};
use crate::protocol::BackendStoreResult;

#[derive(Clone)]
struct ServiceDetails {
    backend: Arc<dyn DasBackend>,
    pub_key: BlsPublicKey,
    signer_mask: u64,
}

/// Stores payloads on every committee member and aggregates their signatures.
#[derive(Clone)]
pub struct Aggregator {
    services: Vec<ServiceDetails>,
    keyset: Keyset,
    keyset_hash: [u8; 32],
    request_timeout: Duration,
    max_message_size: usize,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("backends", &self.services.len())
            .field("assumed_honest", &self.keyset.assumed_honest)
            .field("keyset_hash", &hex::encode(self.keyset_hash))
            .finish()
    }
}

impl Aggregator {
    /// Builds an aggregator over `backends`, given in the same order as `config.backends`.
    pub fn new(
        config: &AggregatorConfig,
        backends: Vec<Arc<dyn DasBackend>>,
    ) -> Result<Self, DaError> {
        if backends.len() != config.backends.len() {
            return Err(DaError::Internal(format!(
                "{} backends supplied for {} configured",
                backends.len(),
                config.backends.len()
            )));
        }
        let keyset = config.keyset()?;
        let services = config
            .backends
            .iter()
            .zip(backends)
            .map(|(cfg, backend)| {
                Ok(ServiceDetails {
                    backend,
                    pub_key: cfg.public_key()?,
                    signer_mask: 1 << cfg.signer_index,
                })
            })
            .collect::<Result<Vec<_>, DaError>>()?;
        Ok(Self {
            keyset_hash: keyset.hash(),
            keyset,
            services,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_message_size: config.max_message_size,
        })
    }

    /// Connects to every configured backend over JSON-RPC.
    pub fn from_config(config: &AggregatorConfig) -> anyhow::Result<Self> {
        let backends = config
            .backends
            .iter()
            .map(|backend| {
                RpcBackendClient::new(backend, config)
                    .map(|client| Arc::new(client) as Arc<dyn DasBackend>)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self::new(config, backends)?)
    }

    /// The committee keyset.
    pub fn keyset(&self) -> &Keyset {
        &self.keyset
    }

    /// Hash of the committee keyset, as written into certificates.
    pub fn keyset_hash(&self) -> [u8; 32] {
        self.keyset_hash
    }

    /// The largest payload the aggregator stores.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Stores `message` on the committee until `timeout`.
    ///
    /// Returns as soon as `assumed_honest` members returned valid signatures, or fails with
    /// [`DaError::QuorumNotReached`] once that became impossible. Requests still in flight at
    /// that point are cancelled.
    pub async fn store(
        &self,
        message: &[u8],
        timeout: u64,
        cancel: &CancellationToken,
    ) -> Result<DataAvailabilityCertificate, DaError> {
        let started = Instant::now();
        let result = self.fan_out(message, timeout, cancel).await;
        AGGREGATOR_STORE_DURATION.observe(started.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "ok",
            Err(DaError::QuorumNotReached { .. }) => "quorum_not_reached",
            Err(DaError::Cancelled) => "cancelled",
            Err(_) => "error",
        };
        AGGREGATOR_STORES.with_label_values(&[outcome]).inc();
        result
    }

    async fn fan_out(
        &self,
        message: &[u8],
        timeout: u64,
        cancel: &CancellationToken,
    ) -> Result<DataAvailabilityCertificate, DaError> {
        let data_hash = tree::hash(message);
        let message: Arc<[u8]> = message.into();
        let in_flight = cancel.child_token();

        let mut requests = JoinSet::new();
        for (idx, service) in self.services.iter().enumerate() {
            let backend = service.backend.clone();
            let message = message.clone();
            let in_flight = in_flight.clone();
            let request_timeout = self.request_timeout;
            requests.spawn(async move {
                let res = match tokio::time::timeout(
                    request_timeout,
                    backend.store(&message, timeout, &in_flight),
                )
                .await
                {
                    Ok(res) => res,
                    Err(_) => Err(DaError::TimeoutExceeded(format!(
                        "backend did not answer within {request_timeout:?}"
                    ))),
                };
                (idx, res)
            });
        }

        let required = self.keyset.assumed_honest as usize;
        let allowed_failures = self.services.len() - required;
        let mut sigs: Vec<BlsSignature> = Vec::with_capacity(required);
        let mut signers_mask = 0u64;
        let mut failures = 0usize;

        while sigs.len() < required && failures <= allowed_failures {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    in_flight.cancel();
                    return Err(DaError::Cancelled);
                }
                joined = requests.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            let (idx, res) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Backend store task failed");
                    failures += 1;
                    continue;
                }
            };
            let service = &self.services[idx];
            if matches!(res, Err(DaError::Cancelled)) {
                debug!(backend = service.backend.name(), "Backend store cancelled");
                continue;
            }
            match res.and_then(|ack| check_ack(&ack, &data_hash, timeout, &service.pub_key)) {
                Ok(sig) => {
                    debug!(backend = service.backend.name(), "Collected signature");
                    sigs.push(sig);
                    signers_mask |= service.signer_mask;
                }
                Err(e) => {
                    warn!(backend = service.backend.name(), error = %e, "Backend store failed");
                    AGGREGATOR_BACKEND_FAILURES
                        .with_label_values(&[&service.backend.name()])
                        .inc();
                    failures += 1;
                }
            }
        }
        // stragglers are not waited for
        in_flight.cancel();
        requests.abort_all();

        if cancel.is_cancelled() {
            return Err(DaError::Cancelled);
        }
        if sigs.len() < required {
            return Err(DaError::QuorumNotReached {
                required,
                collected: sigs.len(),
                backends: self.services.len(),
            });
        }
        if failures > 0 && failures == allowed_failures {
            warn!(
                failures,
                required,
                backends = self.services.len(),
                "Quorum reached with no failures to spare"
            );
        }

        let cert = DataAvailabilityCertificate {
            keyset_hash: self.keyset_hash,
            data_hash,
            timeout,
            signers_mask,
            sig: aggregate_signatures(&sigs)?,
            version: CURRENT_CERTIFICATE_VERSION,
        };
        self.keyset
            .verify_signature(cert.signers_mask, &cert.signable_fields(), &cert.sig)?;
        info!(
            data_hash = hex::encode(data_hash),
            signers = signers_mask.count_ones(),
            "Stored payload on committee"
        );
        Ok(cert)
    }
}

fn check_ack(
    ack: &BackendStoreResult,
    data_hash: &[u8; 32],
    timeout: u64,
    pub_key: &BlsPublicKey,
) -> Result<BlsSignature, DaError> {
    if ack.data_hash.0 != *data_hash {
        return Err(DaError::VerificationFailed(format!(
            "backend acknowledged hash {} instead of {}",
            hex::encode(ack.data_hash.0),
            hex::encode(data_hash)
        )));
    }
    if ack.timeout != timeout || ack.version != CURRENT_CERTIFICATE_VERSION {
        return Err(DaError::VerificationFailed(format!(
            "backend signed timeout {} version {}",
            ack.timeout, ack.version
        )));
    }
    let sig = BlsSignature::from_bytes(&ack.sig.0)?;
    if !sig.verify(&signable_fields(data_hash, timeout, ack.version), pub_key) {
        return Err(DaError::VerificationFailed(
            "backend signature does not verify".to_string(),
        ));
    }
    Ok(sig)
}
