//! Property-based tests for the access flag algebra.
//!
//! Uses proptest to generate change strings, flag sets and restrict masks
//! and checks that:
//! 1. Parsed changes never add and remove the same flag
//! 2. Nothing outside the deployment's flag universe is ever produced
//! 3. A guarded change only touches flags inside the caller's mask

mod common;

use common::TestServices;
use proptest::prelude::*;
use slircd_services::acl::{AclFlags, AclTarget, FlagPolicy};

// =============================================================================
// STRATEGIES
// =============================================================================

/// Change strings over the flag letters and operators.
fn change_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[+\\-=*vVotsriRfhHAFqabe]{0,16}").expect("valid regex")
}

fn flags_strategy() -> impl Strategy<Value = AclFlags> {
    any::<u32>().prop_map(AclFlags::from_bits_truncate)
}

fn policy_strategy() -> impl Strategy<Value = FlagPolicy> {
    (any::<bool>(), any::<bool>(), any::<bool>())
        .prop_map(|(owner, protect, halfops)| FlagPolicy::new(owner, protect, halfops))
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn bitmasks_are_disjoint_and_supported(policy in policy_strategy(), letters in change_strategy()) {
        let delta = policy.make_bitmasks(&letters);
        prop_assert!((delta.added & delta.removed).is_empty());
        prop_assert!(policy.all().contains(delta.added));
        prop_assert!(policy.all().contains(delta.removed));
    }

    #[test]
    fn applied_change_stays_in_universe(
        policy in policy_strategy(),
        letters in change_strategy(),
        base in flags_strategy(),
    ) {
        let result = policy.flags_to_bitmask(&letters, base);
        prop_assert!(policy.all().contains(result));
    }

    #[test]
    fn grantable_flags_never_exceed_holder(
        policy in policy_strategy(),
        theirs in flags_strategy(),
        limitflags in any::<bool>(),
    ) {
        let allowed = policy.allow_flags(theirs, limitflags);
        prop_assert!((theirs.with_auto() | AclFlags::AKICK).contains(allowed));
        if !theirs.contains(AclFlags::REMOVE) {
            prop_assert!(!allowed.contains(AclFlags::AKICK));
        }
    }

    #[test]
    fn guarded_modify_respects_restrict(
        level in flags_strategy(),
        add in flags_strategy(),
        remove in flags_strategy(),
        restrict in flags_strategy(),
    ) {
        let mut t = TestServices::new();
        let alice = t.account("alice");
        let bob = t.account("bob");
        t.matrix.channel_register("#foo", &alice).expect("register");
        let id = t
            .matrix
            .acl_add("#foo", AclTarget::Entity(bob), level, None)
            .expect("entry");
        let before = t.matrix.acl_entry(id).map(|e| e.level).expect("entry");

        match t.matrix.acl_modify(id, add, remove, restrict, None) {
            Ok(delta) => {
                let after = t.matrix.acl_entry(id).map(|e| e.level).expect("entry");
                prop_assert_eq!(after, (before | delta.added) - delta.removed);
                if !delta.is_empty() {
                    prop_assert!(restrict.contains(before | after));
                }
                prop_assert!(add.contains(delta.added));
                prop_assert!(remove.contains(delta.removed));
            }
            Err(_) => {
                let after = t.matrix.acl_entry(id).map(|e| e.level).expect("entry");
                prop_assert_eq!(after, before);
            }
        }
    }
}
