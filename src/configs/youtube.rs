use serde::{Deserialize, Serialize};

/// InnerTube client identity used for `player` requests.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YouTubeConfig {
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            client_id: default_client_id(),
            client_version: default_client_version(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_client_name() -> String {
    "ANDROID_VR".to_string()
}

fn default_client_id() -> String {
    "28".to_string()
}

fn default_client_version() -> String {
    "1.60.19".to_string()
}

fn default_user_agent() -> String {
    "com.google.android.apps.youtube.vr.oculus/1.60.19 (Linux; U; Android 12L; eureka-user Build/SQ3A.220605.009.A1) gzip".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Song / release lookups against iTunes, MusicBrainz and YouTube search.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            user_agent: default_catalog_user_agent(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_catalog_user_agent() -> String {
    concat!("ytstream/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_search_limit() -> usize {
    5
}
