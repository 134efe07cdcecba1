//! URL constants for Google's OAuth and Photos Library services.

pub const DEFAULT_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const PHOTOS_LIBRARY_SCOPE: &str = "https://www.googleapis.com/auth/photoslibrary";
pub const DEFAULT_API_BASE: &str = "https://photoslibrary.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub media_items: String,
    pub uploads: String,
    pub batch_create: String,
}

impl Endpoints {
    /// Build the library endpoints under the given API base
    /// (e.g. `https://photoslibrary.googleapis.com/v1`).
    pub fn for_base(api_base: &str) -> Self {
        let base = api_base.trim_end_matches('/');
        Self {
            media_items: format!("{base}/mediaItems"),
            uploads: format!("{base}/uploads"),
            batch_create: format!("{base}/mediaItems:batchCreate"),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::for_base(DEFAULT_API_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let ep = Endpoints::default();
        assert_eq!(
            ep.media_items,
            "https://photoslibrary.googleapis.com/v1/mediaItems"
        );
        assert_eq!(ep.uploads, "https://photoslibrary.googleapis.com/v1/uploads");
        assert_eq!(
            ep.batch_create,
            "https://photoslibrary.googleapis.com/v1/mediaItems:batchCreate"
        );
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let ep = Endpoints::for_base("http://localhost:9000/v1/");
        assert_eq!(ep.uploads, "http://localhost:9000/v1/uploads");
    }
}
