use serde_json::{Value, json};

use super::CatalogClient;
use crate::common::errors::ResolveError;

const SEARCH_URL: &str = "https://www.youtube.com/youtubei/v1/search?prettyPrint=false";
const WEB_CLIENT_VERSION: &str = "2.20240726.00.00";

impl CatalogClient {
    /// Video ids of the first search results for `query`.
    pub async fn youtube_results(&self, query: &str) -> Result<Vec<String>, ResolveError> {
        let body = json!({
            "context": {
                "client": {
                    "clientName": "WEB",
                    "clientVersion": WEB_CLIENT_VERSION,
                    "hl": "en",
                    "gl": "US"
                }
            },
            "query": query
        });

        let res = self
            .http
            .post(SEARCH_URL)
            .header("X-YouTube-Client-Name", "1")
            .header("X-YouTube-Client-Version", WEB_CLIENT_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }

        let response: Value = res.json().await?;
        Ok(parse_search_results(&response, self.search_limit))
    }
}

/// Up to `limit` `videoRenderer` ids from the first result section. Shelves,
/// ads and channel cards are skipped.
pub fn parse_search_results(response: &Value, limit: usize) -> Vec<String> {
    response
        .pointer(
            "/contents/twoColumnSearchResultsRenderer/primaryContents/sectionListRenderer/contents/0/itemSectionRenderer/contents",
        )
        .and_then(|c| c.as_array())
        .into_iter()
        .flatten()
        .filter_map(|item| item.pointer("/videoRenderer/videoId").and_then(|v| v.as_str()))
        .take(limit)
        .map(str::to_string)
        .collect()
}
