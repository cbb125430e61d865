use crate::error::Result;
use async_trait::async_trait;

/// The only way the pipeline reaches the network.
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// Issue one GET. Transport failures are errors; any HTTP status is a response.
    async fn get(&self, url: &str) -> Result<HttpGetResult>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl HttpGetResult {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}
