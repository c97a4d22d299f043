use market_shared::errors::AppResult;
use market_shared::store::{IsValue, Relation, Select, Store};
use market_shared::types::models::Listing;
use market_shared::types::pagination::SortDirection;

/// Every whitespace-separated query word appears in the content,
/// ignoring case. An empty query matches everything.
pub fn matches(content: &str, query: &str) -> bool {
    let content = content.to_lowercase();
    query
        .split_whitespace()
        .all(|word| content.contains(&word.to_lowercase()))
}

/// Top-level listings matching `query`, newest first.
pub async fn search_listings<S: Store>(store: &S, query: &str) -> AppResult<Vec<Listing>> {
    let select = Select::from(Relation::Posts)
        .with_author()
        .is("parent", IsValue::Null)
        .order("created_at", SortDirection::Desc);

    let listings: Vec<Listing> = store.fetch(select).await?;
    let hits: Vec<Listing> = listings.into_iter().filter(|l| matches(&l.content, query)).collect();
    tracing::debug!(query, hits = hits.len(), "search");
    Ok(hits)
}
