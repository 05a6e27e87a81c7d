//! End-to-end smoke test for warden-node.
//!
//! Starts a real node process against a fresh data directory (with the
//! default approver pool pre-seeded into the signer registry so upgrade
//! approvals can verify), then drives the seed scenarios from spec.md §8
//! over JSON-RPC: a balanced journal post, an idempotency conflict, a
//! proof round-trip, policy activation gating, and a 3-of-5 upgrade apply.
//!
//! Run with:
//!   cargo test -p warden-node --test smoke

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use base64::Engine;
use chrono::Utc;
use serde_json::json;

use warden_core::signer::{SignerAlgorithm, SignerRecord};
use warden_core::types::ApproverId;
use warden_crypto::keypair::Ed25519KeyPair;
use warden_crypto::SignerRegistry;
use warden_store::StateDb;

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn rpc_call(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let body = json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1});
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        panic!("RPC error from {method}: {err}");
    }
    json["result"].clone()
}

async fn rpc_call_expect_err(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let body = json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1});
    let resp = client.post(url).json(&body).send().await.unwrap();
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    json["error"].clone()
}

async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let body = json!({"jsonrpc": "2.0", "method": "warden_policyList", "params": [{}], "id": 1});
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

/// Seed the approver pool's public keys into the signer registry table
/// before the node starts, the way an operator would provision the
/// default 3-of-5 pool out of band (there is no RPC endpoint for this —
/// registering a signer is a deployment concern, not a request-path one).
fn seed_approver_keys(data_dir: &std::path::Path) -> Vec<(ApproverId, Ed25519KeyPair)> {
    let store = StateDb::open(data_dir).expect("open state db for seeding");
    let pool = warden_upgrade::ApproverPool::default_pool();
    let mut keys = Vec::new();
    for member in pool.members() {
        let mut seed = [0u8; 32];
        seed[0] = member.0.as_bytes()[member.0.len() - 1];
        let kp = Ed25519KeyPair::from_seed(seed);
        store
            .put_signer(&SignerRecord {
                kid: member.0.clone(),
                algorithm: SignerAlgorithm::Ed25519,
                public_key: kp.public_key_bytes().to_vec(),
                deployed_at: Utc::now(),
                description: "seeded approver key for smoke test".to_string(),
            })
            .unwrap();
        keys.push((member.clone(), kp));
    }
    // Registry is redundant here (node reloads from the store at startup)
    // but exercises the same constructor path the production code uses.
    let _ = SignerRegistry::from_records(store.iter_signers().unwrap());
    keys
}

#[tokio::test]
async fn smoke_ledger_policy_and_upgrade() {
    let data_dir = std::env::temp_dir().join(format!("warden_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();
    let state_dir = data_dir.join("state");
    std::fs::create_dir_all(&state_dir).unwrap();

    let approver_keys = seed_approver_keys(&state_dir);

    let rpc_port = free_port();
    let rpc_url = format!("http://127.0.0.1:{rpc_port}");

    let node_bin = env!("CARGO_BIN_EXE_warden-node");
    let child = Command::new(node_bin)
        .args([
            "--data-dir",
            state_dir.to_str().unwrap(),
            "--rpc-addr",
            &format!("127.0.0.1:{rpc_port}"),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn warden-node");

    let _guard = NodeGuard { child, data_dir };

    let http = reqwest::Client::new();
    assert!(
        wait_for_rpc(&http, &rpc_url, Duration::from_secs(20)).await,
        "warden-node did not become ready within 20 seconds"
    );

    // ── Scenario 1: balanced journal post ──────────────────────────────────
    let post_result = rpc_call(
        &http,
        &rpc_url,
        "warden_ledgerPost",
        json!([
            "test-001",
            {
                "journal_id": "jrn-1",
                "entries": [
                    {"account_id": "cash", "side": "debit", "amount_cents": 19999, "currency": "USD"},
                    {"account_id": "revenue", "side": "credit", "amount_cents": 19999, "currency": "USD"}
                ]
            }
        ]),
    )
    .await;
    assert_eq!(post_result["ok"], json!(true));
    assert_eq!(post_result["journal_id"], json!("jrn-1"));

    // ── Scenario 2: idempotency conflict on replay with a different body ───
    let conflict_err = rpc_call_expect_err(
        &http,
        &rpc_url,
        "warden_ledgerPost",
        json!([
            "test-001",
            {
                "journal_id": "jrn-1",
                "entries": [
                    {"account_id": "cash", "side": "debit", "amount_cents": 20000, "currency": "USD"},
                    {"account_id": "revenue", "side": "credit", "amount_cents": 20000, "currency": "USD"}
                ]
            }
        ]),
    )
    .await;
    assert_eq!(conflict_err["data"]["code"], json!("IDEMPOTENCY_CONFLICT"));

    // Same key, identical body: replays the first response verbatim.
    let replay = rpc_call(
        &http,
        &rpc_url,
        "warden_ledgerPost",
        json!([
            "test-001",
            {
                "journal_id": "jrn-1",
                "entries": [
                    {"account_id": "cash", "side": "debit", "amount_cents": 19999, "currency": "USD"},
                    {"account_id": "revenue", "side": "credit", "amount_cents": 19999, "currency": "USD"}
                ]
            }
        ]),
    )
    .await;
    assert_eq!(replay, post_result);

    // An unbalanced journal under a fresh key fails with LEDGER_IMBALANCE.
    let imbalance_err = rpc_call_expect_err(
        &http,
        &rpc_url,
        "warden_ledgerPost",
        json!([
            "test-002",
            {
                "journal_id": "jrn-2",
                "entries": [
                    {"account_id": "cash", "side": "debit", "amount_cents": 500, "currency": "USD"},
                    {"account_id": "revenue", "side": "credit", "amount_cents": 400, "currency": "USD"}
                ]
            }
        ]),
    )
    .await;
    assert_eq!(imbalance_err["data"]["code"], json!("LEDGER_IMBALANCE"));

    // ── Scenario 3: proof round-trip ────────────────────────────────────────
    let gen_result = rpc_call(
        &http,
        &rpc_url,
        "warden_proofsGenerate",
        json!([
            "proof-001",
            {"from_ts": "2000-01-01T00:00:00Z", "to_ts": "2100-01-01T00:00:00Z"}
        ]),
    )
    .await;
    assert_eq!(gen_result["ok"], json!(true));
    let proof_id = gen_result["proof_id"].as_str().unwrap().to_string();

    let fetch_result = rpc_call(
        &http,
        &rpc_url,
        "warden_proofsFetch",
        json!([proof_id]),
    )
    .await;
    assert_eq!(fetch_result["ok"], json!(true));
    assert!(fetch_result["proof"]["journal_ids"]
        .as_array()
        .unwrap()
        .iter()
        .any(|j| j == "jrn-1"));

    // Regenerating over the same range is deterministic: same hash.
    let gen_again = rpc_call(
        &http,
        &rpc_url,
        "warden_proofsGenerate",
        json!([
            "proof-002",
            {"from_ts": "2000-01-01T00:00:00Z", "to_ts": "2100-01-01T00:00:00Z"}
        ]),
    )
    .await;
    let proof_id_2 = gen_again["proof_id"].as_str().unwrap().to_string();
    let fetch_again = rpc_call(&http, &rpc_url, "warden_proofsFetch", json!([proof_id_2])).await;
    assert_eq!(fetch_result["proof"]["hash"], fetch_again["proof"]["hash"]);

    // ── Scenario 4: CRITICAL policy activation requires an applied upgrade ──
    let policy = rpc_call(
        &http,
        &rpc_url,
        "warden_policyCreate",
        json!([
            "create-001",
            {
                "name": "p-crit",
                "severity": "CRITICAL",
                "rule": {"op": "eq", "path": "actor.id", "value": "sanctioned"},
                "creator": "alice"
            }
        ]),
    )
    .await;
    let policy_id = policy["id"].as_str().unwrap().to_string();

    rpc_call(
        &http,
        &rpc_url,
        "warden_policyPatchState",
        json!(["patch-001", policy_id, {"state": "simulating", "actor": "alice"}]),
    )
    .await;
    rpc_call(
        &http,
        &rpc_url,
        "warden_policyPatchState",
        json!(["patch-002", policy_id, {"state": "canary", "actor": "alice"}]),
    )
    .await;

    let activation_err = rpc_call_expect_err(
        &http,
        &rpc_url,
        "warden_policyPatchState",
        json!(["patch-003", policy_id, {"state": "active", "actor": "alice"}]),
    )
    .await;
    assert_eq!(activation_err["data"]["code"], json!("UPGRADE_REQUIRED"));

    // ── Scenario 5: 3-of-5 upgrade apply activates the policy ───────────────
    let upgrade = rpc_call(
        &http,
        &rpc_url,
        "warden_upgradeCreate",
        json!([
            "upgrade-001",
            {
                "type": "policy_activation",
                "target": {"policy_id": policy_id, "version": policy["version"]},
                "rationale": "activate critical KYC policy",
                "impact": "blocks sanctioned actors",
                "proposed_by": "alice"
            }
        ]),
    )
    .await;
    let upgrade_id = upgrade["id"].as_str().unwrap().to_string();
    let manifest_hash = upgrade["manifest_hash"].as_str().unwrap();

    for (i, (approver, keypair)) in approver_keys.iter().take(2).enumerate() {
        let sig = keypair.sign(manifest_hash.as_bytes());
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(sig);
        rpc_call(
            &http,
            &rpc_url,
            "warden_upgradeApprove",
            json!([
                format!("approve-{i}"),
                upgrade_id,
                {"approver_id": approver.0, "signature": sig_b64}
            ]),
        )
        .await;
    }

    let quorum_err = rpc_call_expect_err(
        &http,
        &rpc_url,
        "warden_upgradeApply",
        json!(["apply-001", upgrade_id, false, "alice", []]),
    )
    .await;
    assert_eq!(quorum_err["data"]["code"], json!("QUORUM_NOT_REACHED"));

    let (approver, keypair) = &approver_keys[2];
    let sig = keypair.sign(manifest_hash.as_bytes());
    let sig_b64 = base64::engine::general_purpose::STANDARD.encode(sig);
    rpc_call(
        &http,
        &rpc_url,
        "warden_upgradeApprove",
        json!(["approve-2", upgrade_id, {"approver_id": approver.0, "signature": sig_b64}]),
    )
    .await;

    let applied = rpc_call(
        &http,
        &rpc_url,
        "warden_upgradeApply",
        json!(["apply-002", upgrade_id, false, "alice", []]),
    )
    .await;
    assert_eq!(applied["state"], json!("applied"));

    let final_policy = rpc_call(&http, &rpc_url, "warden_policyGet", json!([policy_id])).await;
    assert_eq!(final_policy["state"], json!("active"));

    // ── Audit chain verification over the shards touched above ──────────────
    let verify = rpc_call(
        &http,
        &rpc_url,
        "warden_auditVerifyRange",
        json!([{"shard": "ledger", "from": 0, "to": 100}]),
    )
    .await;
    assert_eq!(verify["ok"], json!(true));
}
