use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use warden_audit::AuditChain;
use warden_core::audit::ChainShard;
use warden_core::error::WardenError;
use warden_core::ledger::{FxContext, Journal, LedgerLine};
use warden_core::types::{JournalId, Side};
use warden_store::StateDb;

use crate::error::LedgerError;

/// Translate one line's amount into the journal's base accounting currency
/// when an `FxContext` is present (spec §4.5 step 1). Lines already in the
/// base currency pass through unchanged.
fn translated_amount(line: &LedgerLine, fx: &FxContext) -> i128 {
    if line.currency == fx.base_currency {
        return line.amount as i128;
    }
    (line.amount as i128 * fx.rate_numerator) / fx.rate_denominator
}

/// Assert `Σ debits == Σ credits` per currency bucket (or, when FX is
/// present, in the single base-currency bucket after translation) — spec
/// §4.5 step 2.
fn assert_balanced(entries: &[LedgerLine], fx: Option<&FxContext>) -> Result<(), WardenError> {
    if entries.is_empty() {
        return Err(WardenError::EmptyJournal("<unknown>".to_string()));
    }
    for line in entries {
        if line.amount <= 0 {
            return Err(WardenError::ZeroAmount);
        }
    }

    let mut buckets: BTreeMap<String, (i128, i128)> = BTreeMap::new();
    for line in entries {
        let (currency, amount) = match fx {
            Some(fx) => (fx.base_currency.clone(), translated_amount(line, fx)),
            None => (line.currency.clone(), line.amount as i128),
        };
        let entry = buckets.entry(currency).or_insert((0, 0));
        match line.side {
            Side::Debit => entry.0 += amount,
            Side::Credit => entry.1 += amount,
        }
    }

    for (currency, (debits, credits)) in buckets {
        if debits != credits {
            return Err(WardenError::LedgerImbalance { currency, debits, credits });
        }
    }
    Ok(())
}

/// The double-entry journal posting and correction half of the Ledger &
/// Proof Core (spec §4.5). Proof generation lives in `crate::proof`.
pub struct LedgerCore {
    store: Arc<StateDb>,
    audit: Arc<AuditChain>,
}

impl LedgerCore {
    pub fn new(store: Arc<StateDb>, audit: Arc<AuditChain>) -> Self {
        Self { store, audit }
    }

    /// `POST /ledger/post` (spec §4.5). Callers are expected to wrap this
    /// in the idempotency layer (`warden-idempotency`) at the RPC
    /// boundary — this function itself only refuses to post the exact
    /// same `journal_id` twice, which is a content invariant, not a retry
    /// mechanism.
    pub async fn post_journal(
        &self,
        journal_id: JournalId,
        entries: Vec<LedgerLine>,
        context: Option<serde_json::Value>,
        fx: Option<FxContext>,
    ) -> Result<Journal, LedgerError> {
        if self.store.journal_exists(&journal_id) {
            return Err(WardenError::DuplicateJournal(journal_id.0).into());
        }
        if entries.is_empty() {
            return Err(WardenError::EmptyJournal(journal_id.0).into());
        }
        assert_balanced(&entries, fx.as_ref()).map_err(|e| match e {
            WardenError::EmptyJournal(_) => WardenError::EmptyJournal(journal_id.0.clone()),
            other => other,
        })?;

        let journal = Journal {
            journal_id: journal_id.clone(),
            entries,
            context,
            fx,
            compensates: None,
            posted_at: Utc::now(),
        };

        // Hash and sign the audit event before touching storage, then
        // commit the journal row and the audit row together in one sled
        // transaction (spec §4.5 step 3 / §5): either both land or
        // neither does, so a signing or storage failure can never leave a
        // visible journal with no audit row.
        let payload = serde_json::to_value(&journal).map_err(LedgerError::Canonicalize)?;
        let prepared = self
            .audit
            .prepare_append(ChainShard::Ledger, "ledger.post", payload)
            .await?;
        self.store
            .commit_journal_with_audit(&journal, ChainShard::Ledger, prepared.seq, &prepared.event)?;

        info!(journal_id = %journal.journal_id, "journal posted");
        Ok(journal)
    }

    /// Build and post the compensating journal for `original_id` (spec
    /// §4.5 "Corrections"): every entry's side is inverted, never mutating
    /// the original, and `compensates` points back at it.
    pub async fn compensate(
        &self,
        new_journal_id: JournalId,
        original_id: &JournalId,
        reason: impl Into<String>,
    ) -> Result<Journal, LedgerError> {
        let original = self
            .store
            .get_journal(original_id)?
            .ok_or_else(|| WardenError::JournalNotFound(original_id.0.clone()))?;

        if self.store.journal_exists(&new_journal_id) {
            return Err(WardenError::DuplicateJournal(new_journal_id.0).into());
        }

        let inverted: Vec<LedgerLine> = original
            .entries
            .iter()
            .map(|line| LedgerLine {
                account_id: line.account_id.clone(),
                side: match line.side {
                    Side::Debit => Side::Credit,
                    Side::Credit => Side::Debit,
                },
                amount: line.amount,
                currency: line.currency.clone(),
                meta: line.meta.clone(),
            })
            .collect();

        assert_balanced(&inverted, original.fx.as_ref())?;

        let journal = Journal {
            journal_id: new_journal_id.clone(),
            entries: inverted,
            context: Some(json!({"reason": reason.into(), "original_journal_id": original_id.0})),
            fx: original.fx.clone(),
            compensates: Some(original_id.clone()),
            posted_at: Utc::now(),
        };

        let payload = serde_json::to_value(&journal).map_err(LedgerError::Canonicalize)?;
        let prepared = self
            .audit
            .prepare_append(ChainShard::Ledger, "ledger.post", payload)
            .await?;
        self.store
            .commit_journal_with_audit(&journal, ChainShard::Ledger, prepared.seq, &prepared.event)?;

        info!(
            journal_id = %journal.journal_id,
            original_journal_id = %original_id,
            "compensating journal posted"
        );
        Ok(journal)
    }

    pub fn get_journal(&self, id: &JournalId) -> Result<Option<Journal>, LedgerError> {
        Ok(self.store.get_journal(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_crypto::SigningService;

    fn fixture() -> LedgerCore {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateDb::open(dir.path()).unwrap());
        let signer = Arc::new(SigningService::local([1u8; 32], false).unwrap());
        let audit = Arc::new(AuditChain::new(store.clone(), signer));
        LedgerCore::new(store, audit)
    }

    fn line(account: &str, side: Side, amount: i64) -> LedgerLine {
        LedgerLine {
            account_id: account.to_string(),
            side,
            amount,
            currency: "USD".to_string(),
            meta: None,
        }
    }

    #[tokio::test]
    async fn balanced_journal_posts() {
        let ledger = fixture();
        let journal = ledger
            .post_journal(
                JournalId::from("jrn-1"),
                vec![line("cash", Side::Debit, 19999), line("revenue", Side::Credit, 19999)],
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(journal.journal_id, JournalId::from("jrn-1"));
        assert!(ledger.get_journal(&JournalId::from("jrn-1")).unwrap().is_some());
    }

    #[tokio::test]
    async fn imbalanced_journal_rejected() {
        let ledger = fixture();
        let err = ledger
            .post_journal(
                JournalId::from("jrn-2"),
                vec![line("cash", Side::Debit, 100), line("revenue", Side::Credit, 50)],
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(WardenError::from(err), WardenError::LedgerImbalance { .. }));
    }

    #[tokio::test]
    async fn two_currencies_without_fx_rejected() {
        let ledger = fixture();
        let mut credit = line("revenue", Side::Credit, 100);
        credit.currency = "EUR".to_string();
        let err = ledger
            .post_journal(
                JournalId::from("jrn-3"),
                vec![line("cash", Side::Debit, 100), credit],
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(WardenError::from(err), WardenError::LedgerImbalance { .. }));
    }

    #[tokio::test]
    async fn duplicate_journal_id_rejected() {
        let ledger = fixture();
        let entries = vec![line("cash", Side::Debit, 100), line("revenue", Side::Credit, 100)];
        ledger
            .post_journal(JournalId::from("jrn-4"), entries.clone(), None, None)
            .await
            .unwrap();
        let err = ledger
            .post_journal(JournalId::from("jrn-4"), entries, None, None)
            .await
            .unwrap_err();
        assert!(matches!(WardenError::from(err), WardenError::DuplicateJournal(_)));
    }

    #[tokio::test]
    async fn compensation_inverts_sides_and_references_original() {
        let ledger = fixture();
        ledger
            .post_journal(
                JournalId::from("jrn-5"),
                vec![line("cash", Side::Debit, 500), line("revenue", Side::Credit, 500)],
                None,
                None,
            )
            .await
            .unwrap();

        let correction = ledger
            .compensate(JournalId::from("jrn-5-reversal"), &JournalId::from("jrn-5"), "duplicate charge")
            .await
            .unwrap();

        assert_eq!(correction.compensates, Some(JournalId::from("jrn-5")));
        assert_eq!(correction.entries[0].side, Side::Credit);
        assert_eq!(correction.entries[1].side, Side::Debit);
    }

    #[tokio::test]
    async fn single_debit_multiple_credits_balances() {
        let ledger = fixture();
        let journal = ledger
            .post_journal(
                JournalId::from("jrn-6"),
                vec![
                    line("cash", Side::Debit, 300),
                    line("revenue-a", Side::Credit, 100),
                    line("revenue-b", Side::Credit, 200),
                ],
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(journal.entries.len(), 3);
    }

    #[tokio::test]
    async fn fx_translation_balances_in_base_currency() {
        let ledger = fixture();
        let fx = FxContext {
            base_currency: "USD".to_string(),
            rate_numerator: 11,
            rate_denominator: 10,
            rate_timestamp: Utc::now(),
        };
        let mut debit = line("cash", Side::Debit, 110);
        debit.currency = "USD".to_string();
        let mut credit = line("revenue", Side::Credit, 100);
        credit.currency = "EUR".to_string();

        let journal = ledger
            .post_journal(JournalId::from("jrn-7"), vec![debit, credit], None, Some(fx))
            .await
            .unwrap();
        assert!(journal.fx.is_some());
    }
}
