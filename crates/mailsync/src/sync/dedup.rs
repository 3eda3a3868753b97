//! Dedup probe against local storage
//!
//! One batched existence query decides which candidate IDs still need a
//! full fetch. The probe is all-or-nothing: a storage error aborts the
//! whole sync pass, because a partial answer would risk duplicate fetches
//! or silently skipped messages.

use anyhow::{Context, Result};
use std::collections::HashSet;

use crate::models::MessageId;
use crate::storage::MessageStore;

/// Result of a dedup probe
#[derive(Debug)]
pub struct DedupOutcome {
    /// Candidates already present locally
    pub existing: HashSet<MessageId>,
    /// Candidates to fetch, in the candidate (oldest-first) order
    pub missing: Vec<MessageId>,
}

/// Probe local storage for the candidate set
pub fn probe_existing(
    store: &dyn MessageStore,
    user_id: &str,
    mailbox: &str,
    candidates: &[MessageId],
) -> Result<DedupOutcome> {
    let existing = store
        .existing_message_ids(user_id, mailbox, candidates)
        .context("Dedup probe failed")?;

    let missing = candidates
        .iter()
        .filter(|id| !existing.contains(id))
        .cloned()
        .collect();

    Ok(DedupOutcome { existing, missing })
}
