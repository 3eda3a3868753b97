//! Sync window computation
//!
//! Computes the page of remote message IDs due for one sync pass. Each call
//! re-fetches the remote listing; pagination is only guaranteed within a
//! single listing snapshot, not across calls if new mail arrives between
//! them. The provider returns newest-first, so the listing is reversed to
//! oldest-first for stable forward pagination.

use anyhow::Result;
use chrono::NaiveDate;

use crate::gmail::MailProvider;
use crate::models::MessageId;

/// Parameters for one window computation
#[derive(Debug, Clone)]
pub struct WindowQuery {
    pub date_from: NaiveDate,
    /// Inclusive upper bound
    pub date_to: NaiveDate,
    /// OR'd sender filter; empty means all senders
    pub senders: Vec<String>,
    /// 1-based page index
    pub page: usize,
    pub page_size: usize,
}

/// One page of a remote-listing snapshot, oldest-first
#[derive(Debug, Clone)]
pub struct WindowPage {
    pub ids: Vec<MessageId>,
    /// Size of the full listing snapshot this page was sliced from
    pub total_listed: usize,
    pub has_more: bool,
    /// Opaque token for the next page; present only when `has_more`
    pub next_page_token: Option<String>,
}

/// Build the provider query combining date bounds and the sender filter.
///
/// Gmail's `before:` is exclusive at day granularity, so the bound is
/// shifted one day to make `date_to` inclusive.
pub fn build_query(query: &WindowQuery) -> String {
    let before = query
        .date_to
        .succ_opt()
        .unwrap_or(query.date_to);

    let mut q = format!(
        "after:{} before:{}",
        query.date_from.format("%Y/%m/%d"),
        before.format("%Y/%m/%d"),
    );

    if !query.senders.is_empty() {
        q.push_str(&format!(" from:({})", query.senders.join(" OR ")));
    }

    q
}

/// List the remote snapshot once and slice out the requested page
pub fn list_window(
    provider: &dyn MailProvider,
    access_token: &str,
    query: &WindowQuery,
    max_results: usize,
) -> Result<WindowPage> {
    let q = build_query(query);
    let mut refs = provider.list_message_ids(access_token, &q, max_results)?;

    // Provider order is newest-first; reverse for stable forward pagination
    refs.reverse();

    let total = refs.len();
    let start = (query.page.saturating_sub(1)) * query.page_size;
    let end = (start + query.page_size).min(total);

    let ids = if start < total {
        refs[start..end]
            .iter()
            .map(|r| MessageId::new(&r.id))
            .collect()
    } else {
        Vec::new()
    };

    let has_more = end < total;
    Ok(WindowPage {
        ids,
        total_listed: total,
        has_more,
        next_page_token: has_more.then(|| (query.page + 1).to_string()),
    })
}
