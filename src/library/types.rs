use serde::{Deserialize, Serialize};

/// A remote library item. Only the filename is consumed; the provider sends
/// more fields (id, mimeType, mediaMetadata, ...) which are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    pub filename: String,
}

/// One page of `GET /v1/mediaItems`.
///
/// An empty library omits `mediaItems` entirely.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemsPage {
    #[serde(default)]
    pub media_items: Vec<MediaItem>,
    pub next_page_token: Option<String>,
}

/// Body of `POST /v1/mediaItems:batchCreate`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateRequest {
    pub new_media_items: Vec<NewMediaItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMediaItem {
    pub simple_media_item: SimpleMediaItem,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleMediaItem {
    pub file_name: String,
    pub upload_token: String,
}

impl BatchCreateRequest {
    pub fn single(file_name: &str, upload_token: &str) -> Self {
        Self {
            new_media_items: vec![NewMediaItem {
                simple_media_item: SimpleMediaItem {
                    file_name: file_name.to_string(),
                    upload_token: upload_token.to_string(),
                },
            }],
        }
    }
}

/// Response of `mediaItems:batchCreate`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateResponse {
    #[serde(default)]
    pub new_media_item_results: Vec<NewMediaItemResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMediaItemResult {
    pub upload_token: Option<String>,
    pub status: Option<ItemStatus>,
}

/// `google.rpc.Status`; a missing or zero code means success.
#[derive(Debug, Deserialize)]
pub struct ItemStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}
