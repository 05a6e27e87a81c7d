//! Environment contract (spec §6): every knob warden-node reads at
//! startup, with clap's `env` attribute so each field can come from either
//! a CLI flag or the matching environment variable.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use warden_core::constants::{
    DEFAULT_REQUIRED_APPROVALS, IDEMPOTENCY_DEFAULT_BODY_LIMIT_BYTES,
    IDEMPOTENCY_DEFAULT_EXPIRY_HOURS,
};
use warden_core::types::ApproverId;
use warden_crypto::{ClientTlsConfig, KmsClient, SigningError, SigningService};

#[derive(Parser, Debug)]
#[command(
    name = "warden-node",
    version,
    about = "Warden trust-and-governance core — signing, audit, policy, upgrade, and ledger"
)]
struct Args {
    /// Directory for the persistent state database (sled).
    #[arg(long, env = "DATABASE_URL", default_value = "./data/warden")]
    data_dir: PathBuf,

    /// JSON-RPC listen address.
    #[arg(long, env = "WARDEN_RPC_ADDR", default_value = "127.0.0.1:8787")]
    rpc_addr: SocketAddr,

    /// Remote KMS/signing-proxy endpoint. Unset means "use the local
    /// ephemeral fallback" unless `require_kms` is set.
    #[arg(long, env = "KMS_ENDPOINT")]
    kms_endpoint: Option<String>,

    /// KID to present for the KMS-backed signer. Required when
    /// `kms_endpoint` is set.
    #[arg(long, env = "SIGNER_KID")]
    signer_kid: Option<String>,

    /// Refuse the ephemeral local signer fallback; an unreachable or
    /// unconfigured KMS is then a fatal startup error (spec §4.1).
    #[arg(long, env = "REQUIRE_KMS", default_value_t = false)]
    require_kms: bool,

    /// Client cert (PEM) for mTLS against the KMS endpoint.
    #[arg(long, env = "KMS_CLIENT_CERT")]
    kms_client_cert: Option<PathBuf>,

    /// Client key (PEM) for mTLS against the KMS endpoint.
    #[arg(long, env = "KMS_CLIENT_KEY")]
    kms_client_key: Option<PathBuf>,

    /// CA bundle (PEM) for the KMS endpoint, for non-system-trust deployments.
    #[arg(long, env = "KMS_CA_CERT")]
    kms_ca_cert: Option<PathBuf>,

    /// Comma-separated approver pool for the N-of-M upgrade workflow.
    #[arg(long, env = "UPGRADE_APPROVER_IDS", value_delimiter = ',')]
    upgrade_approver_ids: Vec<String>,

    /// N in the N-of-M quorum.
    #[arg(long, env = "UPGRADE_REQUIRED_APPROVALS", default_value_t = DEFAULT_REQUIRED_APPROVALS)]
    upgrade_required_approvals: u32,

    /// Max stored idempotent response body size, in bytes.
    #[arg(long, env = "IDEMPOTENCY_RESPONSE_BODY_LIMIT", default_value_t = IDEMPOTENCY_DEFAULT_BODY_LIMIT_BYTES)]
    idempotency_response_body_limit: usize,

    /// Idempotency record expiry, in hours.
    #[arg(long, env = "IDEMPOTENCY_EXPIRY_HOURS", default_value_t = IDEMPOTENCY_DEFAULT_EXPIRY_HOURS)]
    idempotency_expiry_hours: i64,

    /// 32-byte hex seed for the ephemeral local Ed25519 signer. A random
    /// one is generated (and logged once) if unset — fine for a single
    /// dev process, useless across restarts or multiple nodes.
    #[arg(long, env = "WARDEN_LOCAL_SIGNER_SEED")]
    local_signer_seed: Option<String>,
}

/// Resolved startup configuration, ready for `main` to build services from.
pub struct Config {
    pub data_dir: PathBuf,
    pub rpc_addr: SocketAddr,
    pub approver_ids: Vec<ApproverId>,
    pub required_approvals: u32,
    pub idempotency_body_limit_bytes: usize,
    pub idempotency_expiry_hours: i64,
    pub require_kms: bool,
    kms_endpoint: Option<String>,
    signer_kid: Option<String>,
    tls: Option<ClientTlsConfig>,
    local_seed: [u8; 32],
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let args = Args::parse();

        let approver_ids = if args.upgrade_approver_ids.is_empty() {
            warden_upgrade::ApproverPool::default_pool()
                .members()
                .to_vec()
        } else {
            args.upgrade_approver_ids.into_iter().map(ApproverId::from).collect()
        };

        let tls = match (&args.kms_client_cert, &args.kms_client_key) {
            (Some(cert), Some(key)) => Some(ClientTlsConfig {
                client_cert_pem: std::fs::read(cert)?,
                client_key_pem: std::fs::read(key)?,
                ca_cert_pem: args.kms_ca_cert.map(std::fs::read).transpose()?,
            }),
            _ => None,
        };

        let local_seed = match args.local_signer_seed {
            Some(hex_seed) => {
                let bytes = hex::decode(hex_seed.trim())?;
                let mut seed = [0u8; 32];
                if bytes.len() != 32 {
                    anyhow::bail!("WARDEN_LOCAL_SIGNER_SEED must decode to exactly 32 bytes");
                }
                seed.copy_from_slice(&bytes);
                seed
            }
            None => {
                tracing::warn!(
                    "no WARDEN_LOCAL_SIGNER_SEED set — generating an ephemeral seed for this process only"
                );
                rand::random()
            }
        };

        Ok(Self {
            data_dir: args.data_dir,
            rpc_addr: args.rpc_addr,
            approver_ids,
            required_approvals: args.upgrade_required_approvals,
            idempotency_body_limit_bytes: args.idempotency_response_body_limit,
            idempotency_expiry_hours: args.idempotency_expiry_hours,
            require_kms: args.require_kms,
            kms_endpoint: args.kms_endpoint,
            signer_kid: args.signer_kid,
            tls,
            local_seed,
        })
    }

    /// Probe the configured KMS endpoint once at startup. Only meaningful
    /// when `REQUIRE_KMS=true`; an unconfigured endpoint is itself a
    /// failure in that mode (spec §4.1).
    pub async fn health_check_kms(&self) -> Result<(), SigningError> {
        match &self.kms_endpoint {
            Some(endpoint) => {
                let client = KmsClient::new(endpoint.clone(), self.tls.clone())?;
                client.health_check().await
            }
            None => Err(SigningError::FallbackNotPermitted),
        }
    }

    /// Build the Signing Service per spec §4.1: prefer a configured KMS
    /// endpoint, otherwise fall back to the local ephemeral signer unless
    /// `REQUIRE_KMS=true`, in which case the absence of a reachable
    /// endpoint is a fail-fast startup error.
    pub fn build_signing_service(&self) -> Result<SigningService, SigningError> {
        match &self.kms_endpoint {
            Some(endpoint) => {
                let client = KmsClient::new(endpoint.clone(), self.tls.clone())?;
                let kid = self
                    .signer_kid
                    .clone()
                    .unwrap_or_else(|| "kms-default".to_string());
                Ok(SigningService::kms(client, kid))
            }
            None => SigningService::local(self.local_seed, self.require_kms),
        }
    }
}
