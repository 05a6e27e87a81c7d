use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Amount, JournalId, ProofId, Side, Timestamp};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerLine {
    pub account_id: String,
    pub side: Side,
    pub amount: Amount,
    pub currency: String,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// Optional FX context attached to a journal. When present, every line's
/// native-currency amount is translated to `base_currency` at `rate` before
/// the balance assertion (spec §4.5 step 1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FxContext {
    pub base_currency: String,
    /// Scaled rate: `amount_in_base = amount * rate_numerator / rate_denominator`.
    pub rate_numerator: i128,
    pub rate_denominator: i128,
    pub rate_timestamp: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Journal {
    pub journal_id: JournalId,
    pub entries: Vec<LedgerLine>,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub fx: Option<FxContext>,
    /// Set for compensating journals; references the journal being reversed.
    #[serde(default)]
    pub compensates: Option<JournalId>,
    pub posted_at: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProofRange {
    pub from_ts: Timestamp,
    pub to_ts: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerProof {
    pub proof_id: ProofId,
    pub range: ProofRange,
    pub hash: String,
    pub signer_kid: String,
    pub signature: String,
    pub ts: Timestamp,
    /// Journal ids included, in the canonical order used to build `hash`.
    pub journal_ids: Vec<JournalId>,
}
