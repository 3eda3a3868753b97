//! Full-message fetch and idempotent store
//!
//! Per-message failures are isolated: a bad message is counted and logged,
//! never allowed to abort the rest of the batch. Correctness of concurrent
//! or repeated passes rests on the store's upsert conflict key, not on any
//! application-level locking.

use crate::gmail::{MailProvider, normalize_message};
use crate::models::{Connection, MessageId};
use crate::storage::MessageStore;

/// Counters from one fetch-and-store batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Messages successfully fetched and normalized
    pub fetched: usize,
    /// Successful upsert writes
    pub upserted: usize,
    /// Messages that failed to fetch, normalize, or store
    pub errors: usize,
}

/// Fetch each missing message and upsert it keyed on
/// (user_id, mailbox, message_id)
pub fn fetch_and_store(
    provider: &dyn MailProvider,
    access_token: &str,
    store: &dyn MessageStore,
    connection: &Connection,
    missing: &[MessageId],
) -> FetchOutcome {
    let mut outcome = FetchOutcome::default();

    for id in missing {
        let gmail_msg = match provider.get_message(access_token, id) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Failed to fetch message {}: {:#}", id.as_str(), e);
                outcome.errors += 1;
                continue;
            }
        };

        let record = match normalize_message(gmail_msg, &connection.user_id, &connection.mailbox)
        {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Failed to normalize message {}: {:#}", id.as_str(), e);
                outcome.errors += 1;
                continue;
            }
        };

        outcome.fetched += 1;

        match store.upsert_message(record) {
            Ok(()) => outcome.upserted += 1,
            Err(e) => {
                log::warn!("Failed to store message {}: {:#}", id.as_str(), e);
                outcome.errors += 1;
            }
        }
    }

    outcome
}
