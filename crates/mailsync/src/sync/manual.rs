//! Manual sync pass
//!
//! The user-triggered, paginated pass over a date window:
//! validate → refresh-if-needed → window → dedup probe → fetch/store →
//! update last-sync time → re-query stored rows for the response page.

use anyhow::Context;
use chrono::{NaiveDate, Utc};

use super::{SyncEngine, dedup, fetch, window};
use crate::error::SyncError;
use crate::models::{ConnectionId, MessageRecord};
use crate::storage::SortOrder;

/// Inbound manual-sync request
#[derive(Debug, Clone)]
pub struct ManualSyncRequest {
    pub connection_id: ConnectionId,
    /// Requesting user; the connection must be owned by them
    pub user_id: String,
    pub date_from: NaiveDate,
    /// Inclusive upper bound
    pub date_to: NaiveDate,
    /// OR'd sender filter; empty means all senders
    pub senders: Vec<String>,
    /// 1-based page; defaults to 1 when 0 is not meaningful
    pub page: usize,
    /// Defaults to the configured page size when absent; capped at 100
    pub page_size: Option<usize>,
    pub sort: SortOrder,
}

impl ManualSyncRequest {
    pub fn new(
        connection_id: ConnectionId,
        user_id: impl Into<String>,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Self {
        Self {
            connection_id,
            user_id: user_id.into(),
            date_from,
            date_to,
            senders: Vec::new(),
            page: 1,
            page_size: None,
            sort: SortOrder::Desc,
        }
    }

    pub fn senders(mut self, senders: Vec<String>) -> Self {
        self.senders = senders;
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

/// Counters for one manual pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPassStats {
    /// Candidate ids probed against local storage
    pub probed: usize,
    /// Messages fetched and normalized
    pub fetched: usize,
    /// Successful upsert writes
    pub upserts: usize,
}

/// Response for one manual pass
#[derive(Debug)]
pub struct ManualSyncResponse {
    /// Stored rows for the requested page, in the requested sort order
    pub items: Vec<MessageRecord>,
    /// Present when the remote window has further pages
    pub next_page_token: Option<String>,
    pub stats: SyncPassStats,
}

impl SyncEngine {
    /// Run one manual sync pass
    pub fn manual_sync(
        &self,
        request: ManualSyncRequest,
    ) -> Result<ManualSyncResponse, SyncError> {
        let page_size = self.validate(&request)?;

        let mut connection = self
            .connections()
            .get_connection_for_user(request.connection_id, &request.user_id)?
            .ok_or(SyncError::ConnectionNotFound(request.connection_id))?;

        if !connection.is_active() {
            // Already reset; nothing to refresh, the user must reconnect
            return Err(SyncError::ReauthRequired(connection.id));
        }

        let access_token = self.refresher().ensure_fresh(&mut connection)?;

        let window_query = window::WindowQuery {
            date_from: request.date_from,
            date_to: request.date_to,
            senders: request.senders.clone(),
            page: request.page,
            page_size,
        };
        let page = window::list_window(
            self.provider(),
            &access_token,
            &window_query,
            self.settings().list_max_results,
        )?;

        // A probe failure aborts the pass: dedup correctness depends on a
        // complete answer
        let probe = dedup::probe_existing(
            self.messages(),
            &connection.user_id,
            &connection.mailbox,
            &page.ids,
        )?;

        let outcome = fetch::fetch_and_store(
            self.provider(),
            &access_token,
            self.messages(),
            &connection,
            &probe.missing,
        );

        connection.last_sync_at = Some(Utc::now());
        self.connections()
            .update_connection(&connection)
            .context("Failed to record sync time")?;

        log::info!(
            "Manual sync for connection {}: page {} listed {} probed {} fetched {} upserts {} errors {}",
            connection.id,
            request.page,
            page.total_listed,
            page.ids.len(),
            outcome.fetched,
            outcome.upserted,
            outcome.errors
        );

        // Re-query stored rows so the response reflects what is actually
        // persisted, including rows from earlier passes
        let from = request
            .date_from
            .and_hms_opt(0, 0, 0)
            .context("Invalid date_from")?
            .and_utc();
        // Exclusive next-midnight bound keeps date_to inclusive down to the
        // sub-second tail, mirroring the window query's before: shift
        let to = request
            .date_to
            .succ_opt()
            .context("Invalid date_to")?
            .and_hms_opt(0, 0, 0)
            .context("Invalid date_to")?
            .and_utc();

        let items = self.messages().list_messages(
            &connection.user_id,
            &connection.mailbox,
            from,
            to,
            request.sort,
            page_size,
            (request.page - 1) * page_size,
        )?;

        Ok(ManualSyncResponse {
            items,
            next_page_token: page.next_page_token,
            stats: SyncPassStats {
                probed: page.ids.len(),
                fetched: outcome.fetched,
                upserts: outcome.upserted,
            },
        })
    }

    /// Validate the request and resolve the effective page size
    fn validate(&self, request: &ManualSyncRequest) -> Result<usize, SyncError> {
        if request.user_id.is_empty() {
            return Err(SyncError::InvalidRequest("user_id is required".to_string()));
        }

        if request.page == 0 {
            return Err(SyncError::InvalidRequest(
                "page must be 1 or greater".to_string(),
            ));
        }

        if request.date_from > request.date_to {
            return Err(SyncError::InvalidRequest(
                "date_from must not be after date_to".to_string(),
            ));
        }

        let max = self.settings().max_page_size;
        let page_size = request.page_size.unwrap_or(self.settings().default_page_size);
        if page_size == 0 || page_size > max {
            return Err(SyncError::InvalidRequest(format!(
                "page_size must be between 1 and {}",
                max
            )));
        }

        Ok(page_size)
    }
}
