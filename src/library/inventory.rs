use std::collections::HashSet;

use tracing::debug;

use super::error::LibraryError;
use super::types::MediaItemsPage;
use crate::auth::endpoints::Endpoints;
use crate::auth::{ApiRequest, AuthClient};

/// Largest page the listing endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

/// The set of filenames present in the remote library at the start of a run.
#[derive(Debug, Default, Clone)]
pub struct RemoteInventory {
    filenames: HashSet<String>,
    item_count: usize,
}

impl RemoteInventory {
    pub fn contains(&self, filename: &str) -> bool {
        self.filenames.contains(filename)
    }

    /// Record a filename registered during this run (e.g. a reconciled orphan).
    pub fn insert(&mut self, filename: impl Into<String>) -> bool {
        self.filenames.insert(filename.into())
    }

    /// Number of distinct filenames.
    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    /// Number of items returned by the listing, duplicates included.
    pub fn item_count(&self) -> usize {
        self.item_count
    }
}

impl FromIterator<String> for RemoteInventory {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut inventory = Self::default();
        for name in iter {
            inventory.item_count += 1;
            inventory.filenames.insert(name);
        }
        inventory
    }
}

/// Page through the whole library listing.
///
/// Any failed page aborts the load; a partial inventory would cause
/// re-uploads of items that already exist.
pub async fn load_all(
    client: &AuthClient,
    endpoints: &Endpoints,
    page_size: u32,
) -> Result<RemoteInventory, LibraryError> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut inventory = RemoteInventory::default();
    let mut page_token: Option<String> = None;
    let mut page = 0usize;

    loop {
        page += 1;
        let mut request =
            ApiRequest::get(&endpoints.media_items).query("pageSize", page_size.to_string());
        if let Some(token) = &page_token {
            request = request.query("pageToken", token.clone());
        }

        let response = client
            .request(&request)
            .await
            .map_err(|source| LibraryError::InventoryLoad { page, source })?;
        let listing: MediaItemsPage = response
            .json()
            .map_err(|source| LibraryError::MalformedPage { page, source })?;

        debug!(page, items = listing.media_items.len(), "Fetched library page");
        for item in listing.media_items {
            inventory.item_count += 1;
            inventory.filenames.insert(item.filename);
        }

        match listing.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{test_auth_client, CountingRefresher, ScriptedTransport};

    fn page_json(names: &[&str], next: Option<&str>) -> String {
        let items: Vec<_> = names
            .iter()
            .map(|n| serde_json::json!({"id": format!("id-{n}"), "filename": n}))
            .collect();
        let mut body = serde_json::json!({ "mediaItems": items });
        if let Some(next) = next {
            body["nextPageToken"] = serde_json::json!(next);
        }
        body.to_string()
    }

    #[tokio::test]
    async fn test_collects_every_page() {
        let transport = ScriptedTransport::new();
        transport.on("GET", "/mediaItems", 200, &page_json(&["a.jpg", "b.jpg"], Some("p2")));
        transport.on("GET", "/mediaItems", 200, &page_json(&["c.jpg", "d.jpg"], Some("p3")));
        transport.on("GET", "/mediaItems", 200, &page_json(&["e.jpg"], None));
        let refresher = CountingRefresher::new();
        let (client, _store, _dir) = test_auth_client(&transport, &refresher).await;

        let inventory = load_all(&client, &Endpoints::default(), 2).await.unwrap();

        assert_eq!(inventory.len(), 5);
        assert_eq!(inventory.item_count(), 5);
        for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"] {
            assert!(inventory.contains(name), "missing {name}");
        }

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].query_value("pageToken"), None);
        assert_eq!(calls[0].query_value("pageSize"), Some("2"));
        assert_eq!(calls[1].query_value("pageToken"), Some("p2"));
        assert_eq!(calls[2].query_value("pageToken"), Some("p3"));
    }

    #[tokio::test]
    async fn test_empty_library_omits_media_items() {
        let transport = ScriptedTransport::new();
        transport.on("GET", "/mediaItems", 200, "{}");
        let refresher = CountingRefresher::new();
        let (client, _store, _dir) = test_auth_client(&transport, &refresher).await;

        let inventory = load_all(&client, &Endpoints::default(), 100).await.unwrap();
        assert_eq!(inventory.len(), 0);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_next_page_token_terminates() {
        let transport = ScriptedTransport::new();
        transport.on("GET", "/mediaItems", 200, &page_json(&["a.jpg"], Some("")));
        let refresher = CountingRefresher::new();
        let (client, _store, _dir) = test_auth_client(&transport, &refresher).await;

        let inventory = load_all(&client, &Endpoints::default(), 100).await.unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_names_collapse_but_are_counted() {
        let transport = ScriptedTransport::new();
        transport.on("GET", "/mediaItems", 200, &page_json(&["a.jpg"], Some("p2")));
        transport.on("GET", "/mediaItems", 200, &page_json(&["a.jpg"], None));
        let refresher = CountingRefresher::new();
        let (client, _store, _dir) = test_auth_client(&transport, &refresher).await;

        let inventory = load_all(&client, &Endpoints::default(), 100).await.unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.item_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_page_aborts_load() {
        let transport = ScriptedTransport::new();
        transport.on("GET", "/mediaItems", 200, &page_json(&["a.jpg"], Some("p2")));
        transport.on("GET", "/mediaItems", 500, "backend error");
        let refresher = CountingRefresher::new();
        let (client, _store, _dir) = test_auth_client(&transport, &refresher).await;

        let err = load_all(&client, &Endpoints::default(), 100)
            .await
            .unwrap_err();
        match err {
            LibraryError::InventoryLoad { page, source } => {
                assert_eq!(page, 2);
                assert_eq!(source.status(), Some(500));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_page_401_refreshes_and_continues() {
        let transport = ScriptedTransport::new();
        transport.reject_token("initial-access");
        transport.on("GET", "/mediaItems", 200, &page_json(&["a.jpg"], None));
        let refresher = CountingRefresher::new();
        let (client, _store, _dir) = test_auth_client(&transport, &refresher).await;

        let inventory = load_all(&client, &Endpoints::default(), 100).await.unwrap();
        assert!(inventory.contains("a.jpg"));
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_page_is_reported() {
        let transport = ScriptedTransport::new();
        transport.on("GET", "/mediaItems", 200, "not json");
        let refresher = CountingRefresher::new();
        let (client, _store, _dir) = test_auth_client(&transport, &refresher).await;

        let err = load_all(&client, &Endpoints::default(), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, LibraryError::MalformedPage { page: 1, .. }));
    }

    #[test]
    fn test_from_iter_counts_items() {
        let inv: RemoteInventory = ["a".to_string(), "a".to_string(), "b".to_string()]
            .into_iter()
            .collect();
        assert_eq!(inv.len(), 2);
        assert_eq!(inv.item_count(), 3);
    }
}
