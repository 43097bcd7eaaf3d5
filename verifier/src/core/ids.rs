//! Deterministic step-id minting.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::workflow::Workflow;

/// Tracks ids in use and hands out fresh ones.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    taken: BTreeSet<String>,
}

impl IdAllocator {
    pub fn from_workflow(workflow: &Workflow) -> Self {
        Self {
            taken: workflow
                .all_steps()
                .map(|(_, step)| step.id.clone())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    pub fn is_taken(&self, id: &str) -> bool {
        self.taken.contains(id)
    }

    /// Reserve `candidate`, appending `-2`, `-3`, ... until unused.
    pub fn claim(&mut self, candidate: &str) -> String {
        let mut id = candidate.to_string();
        let mut suffix = 2u32;
        while self.taken.contains(&id) {
            id = format!("{candidate}-{suffix}");
            suffix += 1;
        }
        self.taken.insert(id.clone());
        id
    }

    /// Mint and reserve an id derived from what produced the step.
    pub fn mint(&mut self, rule: &str, source_id: &str, text: &str) -> String {
        let candidate = mint_id(rule, source_id, text);
        self.claim(&candidate)
    }
}

/// `step-` plus 12 hex chars of SHA-256 over the three inputs.
pub fn mint_id(rule: &str, source_id: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [rule, source_id, text] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    format!("step-{}", &digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_stable_and_shaped() {
        let first = mint_id("ui_state", "step-prompt", "Runner Name");
        let second = mint_id("ui_state", "step-prompt", "Runner Name");
        assert_eq!(first, second);
        assert!(first.starts_with("step-"));
        assert_eq!(first.len(), "step-".len() + 12);
        assert_ne!(first, mint_id("ui_state", "step-prompt", "Runner Url"));
    }

    #[test]
    fn claim_suffixes_collisions() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.claim("step-gate"), "step-gate");
        assert_eq!(ids.claim("step-gate"), "step-gate-2");
        assert_eq!(ids.claim("step-gate"), "step-gate-3");
        assert!(ids.is_taken("step-gate-2"));
    }
}
