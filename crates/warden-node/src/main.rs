//! warden-node — the Warden trust-and-governance core binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the state database
//!   2. Build the Signing Service (KMS-backed or ephemeral local fallback)
//!      and seed the signer registry from persisted + self-registered keys
//!   3. Wire the five components (audit, idempotency, policy, upgrade,
//!      ledger/proof) on top of the store and signer
//!   4. Start the JSON-RPC server

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use warden_audit::AuditChain;
use warden_crypto::SignerRegistry;
use warden_idempotency::{IdempotencyConfig, IdempotencyStore};
use warden_ledger::{LedgerCore, ProofGenerator};
use warden_rpc::server::RpcServerState;
use warden_rpc::RpcServer;
use warden_sentinel::PolicyEngine;
use warden_store::StateDb;
use warden_upgrade::{ApproverPool, UpgradeWorkflow};

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warden=debug".parse().unwrap()),
        )
        .init();

    let config = Config::load().context("loading configuration")?;
    info!("warden-node starting");

    // Fail-fast KMS reachability check (spec §4.1: REQUIRE_KMS=true must
    // refuse to start rather than silently fall back to a local signer).
    if config.require_kms {
        config
            .health_check_kms()
            .await
            .context("REQUIRE_KMS=true but the configured KMS endpoint is unreachable")?;
    }

    // ── State database ──────────────────────────────────────────────────────
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let store = Arc::new(StateDb::open(&config.data_dir).context("opening state database")?);

    // ── Signing service + signer registry ───────────────────────────────────
    let signer_registry = Arc::new(SignerRegistry::from_records(
        store.iter_signers().context("loading signer registry")?,
    ));
    let signing_service = Arc::new(
        config
            .build_signing_service()
            .context("constructing signing service")?,
    );
    signing_service.register_self(&signer_registry);
    if let warden_crypto::SigningService::Local { .. } = signing_service.as_ref() {
        if let Some(record) = signer_registry.get(signing_service.kid()) {
            store.put_signer(&record).context("persisting local signer record")?;
        }
    }
    info!(kid = %signing_service.kid(), "signing service ready");

    // ── Core components ──────────────────────────────────────────────────────
    let audit = Arc::new(AuditChain::new(Arc::clone(&store), Arc::clone(&signing_service)));
    let policy_engine = Arc::new(PolicyEngine::new(Arc::clone(&store), Arc::clone(&audit)));
    let ledger = Arc::new(LedgerCore::new(Arc::clone(&store), Arc::clone(&audit)));
    let proofs = Arc::new(ProofGenerator::new(Arc::clone(&store), Arc::clone(&signing_service)));
    let idempotency = Arc::new(IdempotencyStore::new(
        Arc::clone(&store),
        IdempotencyConfig {
            expiry_hours: config.idempotency_expiry_hours,
            body_limit_bytes: config.idempotency_body_limit_bytes,
        },
    ));
    let approver_pool = ApproverPool::new(config.approver_ids.clone(), config.required_approvals);
    let upgrade_workflow = Arc::new(UpgradeWorkflow::new(
        Arc::clone(&store),
        Arc::clone(&audit),
        Arc::clone(&signer_registry),
        Arc::clone(&signing_service),
        Arc::clone(&policy_engine),
        approver_pool,
    ));

    // ── Background housekeeping ─────────────────────────────────────────────
    // Neither the emergency-ratification sweep nor idempotency eviction is
    // on any request's critical path; both run as periodic sweeps, the way
    // the teacher's main loop folds difficulty adjustment in alongside
    // request handling rather than as a separate cron.
    let sweep_upgrade_workflow = Arc::clone(&upgrade_workflow);
    let sweep_idempotency = Arc::clone(&idempotency);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            match sweep_upgrade_workflow.sweep_emergency_ratifications().await {
                Ok(touched) if !touched.is_empty() => {
                    info!(count = touched.len(), "emergency ratification sweep transitioned upgrades")
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "emergency ratification sweep failed"),
            }
            match sweep_idempotency.evict_expired() {
                Ok(n) if n > 0 => info!(count = n, "evicted expired idempotency records"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "idempotency eviction sweep failed"),
            }
        }
    });

    // ── RPC server ────────────────────────────────────────────────────────────
    let state = Arc::new(RpcServerState {
        audit,
        policy_engine,
        upgrade_workflow,
        ledger,
        proofs,
        idempotency,
        signer_registry,
    });
    let handle = RpcServer::new(state)
        .start(config.rpc_addr)
        .await
        .context("starting RPC server")?;

    info!(addr = %config.rpc_addr, "warden-node ready");
    handle.stopped().await;
    Ok(())
}
