use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use warden_core::constants::{KMS_INITIAL_BACKOFF_MS, KMS_MAX_ATTEMPTS};

use crate::error::SigningError;

/// Client certificate material for mTLS against the KMS/signing-proxy
/// endpoint. Plain TLS is used when this is absent (spec §4.1).
#[derive(Clone, Debug)]
pub struct ClientTlsConfig {
    pub client_cert_pem: Vec<u8>,
    pub client_key_pem: Vec<u8>,
    pub ca_cert_pem: Option<Vec<u8>>,
}

#[derive(Serialize)]
struct SignRequest<'a> {
    payload_b64: &'a str,
}

#[derive(Deserialize)]
struct SignResponse {
    signature_b64: String,
    signer_id: String,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    payload_b64: &'a str,
    signature_b64: &'a str,
    signer_id: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    verified: bool,
}

/// HTTP client for the external KMS/HSM signing proxy (spec §4.1). Retries
/// up to `KMS_MAX_ATTEMPTS` total attempts with an initial backoff that
/// doubles, only for 5xx responses, network errors, or connection resets.
pub struct KmsClient {
    endpoint: String,
    http: reqwest::Client,
}

impl KmsClient {
    pub fn new(endpoint: impl Into<String>, tls: Option<ClientTlsConfig>) -> Result<Self, SigningError> {
        let mut builder = reqwest::Client::builder();

        if let Some(tls) = tls {
            let mut identity_pem = tls.client_cert_pem.clone();
            identity_pem.extend_from_slice(&tls.client_key_pem);
            let identity = reqwest::Identity::from_pem(&identity_pem)
                .map_err(|e| SigningError::TlsIdentity(e.to_string()))?;
            builder = builder.identity(identity);

            if let Some(ca) = tls.ca_cert_pem {
                let cert = reqwest::Certificate::from_pem(&ca)
                    .map_err(|e| SigningError::TlsIdentity(e.to_string()))?;
                builder = builder.add_root_certificate(cert);
            }
        }

        let http = builder
            .build()
            .map_err(|e| SigningError::TlsIdentity(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }

    pub async fn sign(&self, payload: &[u8]) -> Result<(String, String), SigningError> {
        use base64::Engine;
        let payload_b64 = base64::engine::general_purpose::STANDARD.encode(payload);
        let url = format!("{}/sign", self.endpoint.trim_end_matches('/'));

        let resp: SignResponse = self
            .post_with_retry(&url, &SignRequest {
                payload_b64: &payload_b64,
            })
            .await?;

        Ok((resp.signature_b64, resp.signer_id))
    }

    pub async fn verify(
        &self,
        payload: &[u8],
        signature_b64: &str,
        signer_id: &str,
    ) -> Result<bool, SigningError> {
        use base64::Engine;
        let payload_b64 = base64::engine::general_purpose::STANDARD.encode(payload);
        let url = format!("{}/verify", self.endpoint.trim_end_matches('/'));

        let resp: VerifyResponse = self
            .post_with_retry(&url, &VerifyRequest {
                payload_b64: &payload_b64,
                signature_b64,
                signer_id,
            })
            .await?;

        Ok(resp.verified)
    }

    async fn post_with_retry<Req: Serialize + ?Sized, Resp: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &Req,
    ) -> Result<Resp, SigningError> {
        let mut backoff = Duration::from_millis(KMS_INITIAL_BACKOFF_MS);
        let mut last_err: Option<String> = None;

        for attempt in 1..=KMS_MAX_ATTEMPTS {
            match self.http.post(url).json(body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Resp>()
                        .await
                        .map_err(|e| SigningError::KmsRequestFailed(e.to_string()));
                }
                Ok(resp) if resp.status().is_server_error() => {
                    last_err = Some(format!("HTTP {}", resp.status()));
                }
                Ok(resp) => {
                    // Non-retryable 4xx: fail immediately.
                    return Err(SigningError::KmsRequestFailed(format!(
                        "HTTP {}",
                        resp.status()
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                }
            }

            if attempt < KMS_MAX_ATTEMPTS {
                warn!(attempt, url, "KMS request failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(SigningError::KmsRequestFailed(
            last_err.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }

    /// Cheap reachability probe used at startup when `REQUIRE_KMS=true`
    /// (spec §4.1 fail-fast requirement). Any successful connection (even a
    /// non-2xx status) counts as "reachable".
    pub async fn health_check(&self) -> Result<(), SigningError> {
        let url = format!("{}/sign", self.endpoint.trim_end_matches('/'));
        self.http
            .head(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| SigningError::KmsRequestFailed(e.to_string()))
    }
}
