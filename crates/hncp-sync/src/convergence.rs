//! Convergence verification across engines.
//!
//! Equal network hashes mean every engine holds the same nodes at the same
//! update numbers with the same data. Origination times are advisory and are
//! compared separately, within a tolerance.

use std::collections::BTreeMap;

use hncp_core::{Digest, NodeIdentifier};
use hncp_store::NodeStore;

use crate::protocol::SyncEngine;

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// All engines agree.
    Converged { network_hash: Digest },
    /// Network hashes differ (may need more time).
    NotConverged { reason: String },
    /// Hashes agree but a node's origination time differs too much between
    /// two engines.
    SkewExceeded { node: NodeIdentifier, skew: i64 },
}

impl ConvergenceResult {
    /// Check if the engines have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged { .. })
    }
}

/// Check a set of engines for convergence.
///
/// `tolerance_ms` bounds how far apart two engines may place the same node's
/// origination time. An empty set is trivially not converged.
pub fn check_convergence<'a, S, I>(engines: I, tolerance_ms: i64) -> ConvergenceResult
where
    S: NodeStore + 'a,
    I: IntoIterator<Item = &'a mut SyncEngine<S>>,
{
    let mut expected: Option<(NodeIdentifier, Digest)> = None;
    let mut origination: BTreeMap<NodeIdentifier, (i64, i64)> = BTreeMap::new();

    for engine in engines {
        let hash = engine.network_hash();
        match expected {
            None => expected = Some((engine.own_id(), hash)),
            Some((first, first_hash)) if first_hash != hash => {
                return ConvergenceResult::NotConverged {
                    reason: format!(
                        "network hash mismatch: {first}={first_hash}, {}={hash}",
                        engine.own_id()
                    ),
                };
            }
            Some(_) => {}
        }

        for node in engine.store().nodes() {
            let at = node.origination_time();
            origination
                .entry(*node.identifier())
                .and_modify(|(lo, hi)| {
                    *lo = (*lo).min(at);
                    *hi = (*hi).max(at);
                })
                .or_insert((at, at));
        }
    }

    let Some((_, network_hash)) = expected else {
        return ConvergenceResult::NotConverged {
            reason: "no engines".into(),
        };
    };

    for (node, (lo, hi)) in origination {
        let skew = hi - lo;
        if skew > tolerance_ms {
            return ConvergenceResult::SkewExceeded { node, skew };
        }
    }

    ConvergenceResult::Converged { network_hash }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SyncConfig;
    use hncp_core::Tlv;

    fn engine(name: &str) -> SyncEngine {
        SyncEngine::new(
            NodeIdentifier::derive(name.as_bytes()),
            SyncConfig::default().with_rng_seed(3),
            0,
        )
    }

    #[test]
    fn test_empty_not_converged() {
        let mut engines: Vec<SyncEngine> = Vec::new();
        assert!(!check_convergence(engines.iter_mut(), 5_000).is_converged());
    }

    #[test]
    fn test_single_engine_converged() {
        let mut engines = vec![engine("a")];
        let hash = engines[0].network_hash();
        assert_eq!(
            check_convergence(engines.iter_mut(), 5_000),
            ConvergenceResult::Converged { network_hash: hash }
        );
    }

    #[test]
    fn test_isolated_engines_differ() {
        let mut engines = vec![engine("a"), engine("b")];
        let result = check_convergence(engines.iter_mut(), 5_000);
        assert!(matches!(result, ConvergenceResult::NotConverged { .. }));
    }

    #[test]
    fn test_local_change_breaks_convergence() {
        let mut a = engine("a");
        let before = a.network_hash();
        a.publish(Tlv::new(9000, b"v").unwrap(), 10);
        assert_ne!(a.network_hash(), before);
    }
}
