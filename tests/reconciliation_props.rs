mod common;

use gdc_ledger::application::locks::JobLocks;
use gdc_ledger::application::tax_sweep::{TaxSweep, seed_default_brackets};
use gdc_ledger::domain::money::Amount;
use gdc_ledger::domain::transaction::TransactionKind;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Credit { user: u64, cents: i64 },
    Debit { user: u64, cents: i64 },
    Transfer { from: u64, to: u64, cents: i64 },
    Sweep,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..4, 1i64..500_000).prop_map(|(user, cents)| Op::Credit { user, cents }),
        (1u64..4, 1i64..500_000).prop_map(|(user, cents)| Op::Debit { user, cents }),
        (1u64..4, 1u64..4, 1i64..50_000).prop_map(|(from, to, cents)| Op::Transfer { from, to, cents }),
        Just(Op::Sweep),
    ]
}

fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: whatever mix of postings succeeds or is rejected, every
    /// balance equals the sum of its transactions and none is negative.
    #[test]
    fn balances_always_match_their_transactions(ops in prop::collection::vec(op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let ledger = common::in_memory_ledger();
            let jobs = Arc::new(JobLocks::new());
            seed_default_brackets(ledger.store()).await.unwrap();
            let mut accounts = Vec::new();
            for user in 1..4 {
                accounts.push(ledger.open_account(user, false).await.unwrap().id);
            }
            let account = |user: u64| accounts[(user - 1) as usize];
            let sweep = TaxSweep::new(ledger.clone(), jobs);

            for op in ops {
                // Rejections are expected; only the invariants matter.
                let _ = match op {
                    Op::Credit { user, cents } => ledger
                        .apply(
                            account(user),
                            Amount::new(money(cents)).unwrap(),
                            TransactionKind::AdminDeposit,
                            "credit",
                        )
                        .await
                        .map(|_| ()),
                    Op::Debit { user, cents } => ledger
                        .debit(account(user), money(cents), TransactionKind::TaxPayment, "debit")
                        .await
                        .map(|_| ()),
                    Op::Transfer { from, to, cents } => ledger
                        .transfer(
                            account(from),
                            account(to),
                            money(cents),
                            TransactionKind::MarketplacePurchase,
                            TransactionKind::MarketplaceSale,
                            "sale",
                        )
                        .await
                        .map(|_| ()),
                    Op::Sweep => sweep.run_weekly_sweep().await.map(|_| ()),
                };
            }

            for result in ledger.reconcile_all().await.unwrap() {
                assert!(result.is_balanced(), "{result:?}");
                assert!(result.balance >= Decimal::ZERO, "{result:?}");
            }
        });
    }
}
