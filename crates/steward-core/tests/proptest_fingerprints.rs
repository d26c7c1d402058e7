// crates/steward-core/tests/proptest_fingerprints.rs
// ============================================================================
// Module: Fingerprint Property Tests
// Description: Property tests for hash determinism and order insensitivity.
// ============================================================================
//! ## Overview
//! Property-checks that the active-signal fingerprint is permutation
//! invariant, that dedupe keys are deterministic and input-sensitive, and
//! that budget consumption never exceeds the cap under arbitrary request
//! sequences.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use proptest::prelude::*;
use steward_core::AccountId;
use steward_core::HashAlgorithm;
use steward_core::HashDigest;
use steward_core::SignalId;
use steward_core::SignalType;
use steward_core::TenantId;
use steward_core::active_signals_hash;
use steward_core::derive_dedupe_key;
use steward_core::derive_signal_id;
use steward_core::interfaces::BudgetConsume;
use steward_core::interfaces::BudgetScope;
use steward_core::interfaces::BudgetStore;
use steward_core::runtime::InMemoryBudgetStore;

proptest! {
    /// The active-signal fingerprint ignores input order.
    #[test]
    fn prop_active_signals_hash_is_permutation_invariant(
        mut ids in proptest::collection::vec("[a-z0-9]{4,16}", 0..20),
    ) {
        let forward: Vec<SignalId> = ids.iter().map(SignalId::new).collect();
        ids.reverse();
        let reversed: Vec<SignalId> = ids.iter().map(SignalId::new).collect();
        prop_assert_eq!(
            active_signals_hash(&forward).unwrap(),
            active_signals_hash(&reversed).unwrap()
        );
    }

    /// Dedupe keys are deterministic and change with any input component.
    #[test]
    fn prop_dedupe_key_is_deterministic_and_sensitive(
        account in "[a-z0-9]{4,12}",
        window in "[a-z0-9-]{1,16}",
        digest in "[0-9a-f]{64}",
    ) {
        let account_id = AccountId::new(account.as_str());
        let evidence = HashDigest {
            algorithm: HashAlgorithm::Sha256,
            value: digest,
        };
        let first = derive_dedupe_key(
            &account_id,
            SignalType::UsageTrendChange,
            &window,
            &evidence,
        )
        .unwrap();
        let second = derive_dedupe_key(
            &account_id,
            SignalType::UsageTrendChange,
            &window,
            &evidence,
        )
        .unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(derive_signal_id(&first), derive_signal_id(&second));

        let other_type = derive_dedupe_key(
            &account_id,
            SignalType::SupportRiskEmerging,
            &window,
            &evidence,
        )
        .unwrap();
        prop_assert_ne!(&first, &other_type);
    }

    /// Budget consumption never exceeds the configured cap.
    #[test]
    fn prop_budget_never_exceeds_cap(
        cap in 1_u32..50,
        requests in proptest::collection::vec(1_u32..10, 1..40),
    ) {
        let budgets = InMemoryBudgetStore::new();
        let tenant = TenantId::new("tenant-prop");
        let mut consumed = 0_u32;
        for units in requests {
            match budgets
                .consume(BudgetScope::Pull, &tenant, 0, units, cap, None)
                .unwrap()
            {
                BudgetConsume::Consumed { .. } => consumed += units,
                BudgetConsume::Exceeded => {}
            }
        }
        prop_assert!(consumed <= cap);
        prop_assert_eq!(budgets.consumed(BudgetScope::Pull, &tenant, 0).unwrap(), consumed);
    }
}
