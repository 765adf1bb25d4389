//! Property tests for merge monotonicity and hash determinism.

use hncp_core::{NodeIdentifier, Tlv, TlvSet};
use hncp_store::{HashEngine, MemoryStore, NodeStore};
use proptest::prelude::*;

fn id(n: u8) -> NodeIdentifier {
    NodeIdentifier::derive(&[n])
}

fn data(update: u32, tag: u8) -> TlvSet {
    [Tlv::new(9000, &[tag, (update & 0xff) as u8]).unwrap()]
        .into_iter()
        .collect()
}

fn arb_upserts() -> impl Strategy<Value = Vec<(u8, u32)>> {
    proptest::collection::vec((1u8..6, 0u32..20), 0..40)
}

/// A sequence of upserts together with a permutation of it.
fn arb_permuted_upserts() -> impl Strategy<Value = (Vec<(u8, u32)>, Vec<(u8, u32)>)> {
    arb_upserts().prop_flat_map(|ops| (Just(ops.clone()), Just(ops).prop_shuffle()))
}

proptest! {
    #[test]
    fn update_number_never_decreases(ops in arb_upserts()) {
        let mut store = MemoryStore::new(id(0), 0);
        for (node, update) in ops {
            let before = store.get(&id(node)).map(|n| n.update_number());
            store.upsert(id(node), update, 0, data(update, node)).unwrap();
            let after = store.get(&id(node)).map(|n| n.update_number()).unwrap();
            if let Some(before) = before {
                prop_assert!(after >= before);
            }
        }
    }

    #[test]
    fn network_hash_independent_of_order((ops, shuffled) in arb_permuted_upserts()) {
        // The final state depends only on the maximum update per node, so any
        // permutation of the same operations must produce the same hash.
        let mut a = MemoryStore::new(id(0), 0);
        let mut b = MemoryStore::new(id(0), 0);
        for (node, update) in &ops {
            a.upsert(id(*node), *update, 0, data(*update, *node)).unwrap();
        }
        for (node, update) in &shuffled {
            b.upsert(id(*node), *update, 1234, data(*update, *node)).unwrap();
        }

        prop_assert_eq!(
            HashEngine::new().network_hash(&mut a),
            HashEngine::new().network_hash(&mut b)
        );
    }
}
