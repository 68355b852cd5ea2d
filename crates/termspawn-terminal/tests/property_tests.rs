//! Property-based tests for spawn token allocation.
//!
//! Uses proptest to drive random register/resolve sequences and check the
//! correlator's bookkeeping against a simple model.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use termspawn_core::SpawnToken;
use termspawn_terminal::Correlator;

#[derive(Debug, Clone)]
enum Op {
    Register,
    /// Resolve the n-th (mod len) outstanding token
    Resolve(usize),
    /// Resolve a token that may never have been issued
    Stray(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Register),
        2 => any::<usize>().prop_map(Op::Resolve),
        1 => (0u32..64).prop_map(Op::Stray),
    ]
}

proptest! {
    /// Outstanding tokens are never zero and never shared.
    #[test]
    fn tokens_are_nonzero_and_distinct(count in 1usize..200) {
        let correlator = Correlator::new();
        let mut seen = BTreeSet::new();
        for _ in 0..count {
            let token = correlator.register("p", |_, _| {}).unwrap();
            prop_assert!(!token.is_none());
            prop_assert!(seen.insert(token));
        }
        prop_assert_eq!(correlator.pending_count(), count);
    }

    /// Every completion runs at most once and the pending set matches a model.
    #[test]
    fn random_register_resolve_sequences(ops in prop::collection::vec(op(), 1..200)) {
        let correlator = Correlator::with_max_token(32);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut outstanding: Vec<SpawnToken> = Vec::new();
        let mut resolved = 0usize;

        for op in ops {
            match op {
                Op::Register => {
                    let f = Arc::clone(&fired);
                    match correlator.register("p", move |_, _| {
                        f.fetch_add(1, Ordering::SeqCst);
                    }) {
                        Ok(token) => {
                            prop_assert!(token.raw() >= 1 && token.raw() <= 32);
                            prop_assert!(!outstanding.contains(&token));
                            outstanding.push(token);
                        }
                        Err(_) => prop_assert_eq!(outstanding.len(), 32),
                    }
                }
                Op::Resolve(n) => {
                    if outstanding.is_empty() {
                        continue;
                    }
                    let token = outstanding.remove(n % outstanding.len());
                    prop_assert!(correlator.resolve(token, Some(1), None));
                    prop_assert!(!correlator.resolve(token, Some(1), None));
                    resolved += 1;
                }
                Op::Stray(raw) => {
                    let token = SpawnToken::from_raw(raw);
                    let expected = outstanding.contains(&token);
                    prop_assert_eq!(correlator.resolve(token, None, None), expected);
                    if expected {
                        outstanding.retain(|t| *t != token);
                        resolved += 1;
                    }
                }
            }
            prop_assert_eq!(correlator.pending_count(), outstanding.len());
        }

        prop_assert_eq!(fired.load(Ordering::SeqCst), resolved);
    }

    /// A freshly freed token is the lowest free one, so it is reused next.
    #[test]
    fn lowest_free_token_is_reused(count in 2u32..50, free in 0u32..50) {
        let correlator = Correlator::new();
        let tokens: Vec<SpawnToken> = (0..count)
            .map(|_| correlator.register("p", |_, _| {}).unwrap())
            .collect();
        let victim = tokens[(free % count) as usize];
        prop_assert!(correlator.resolve(victim, None, None));

        let next = correlator.register("p", |_, _| {}).unwrap();
        prop_assert_eq!(next, victim);
    }
}
