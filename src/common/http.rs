use std::time::Duration;

use reqwest::{Client, Error};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

pub struct HttpClient;

impl HttpClient {
    pub fn default_user_agent() -> String {
        DEFAULT_USER_AGENT.to_string()
    }

    /// Client used for metadata lookups (short requests with a hard timeout).
    pub fn new(user_agent: Option<&str>, timeout: Duration) -> Result<Client, Error> {
        Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .timeout(timeout)
            .build()
    }

    /// Client used for media downloads. Only the connect phase is bounded:
    /// a paced chunk body can legitimately take longer than any fixed timeout.
    pub fn new_media(user_agent: Option<&str>) -> Result<Client, Error> {
        Client::builder()
            .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
            .connect_timeout(Duration::from_secs(10))
            .build()
    }
}
