use reqwest::{Client, Response, Url};
use serde::Serialize;
use spindle_core::InvalidationSink;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Serialize)]
struct RevalidateRequest<'a> {
    path: &'a str,
}

/// Posts `{"path": ...}` to a revalidation endpoint of the frontend.
///
/// Requests run on their own task so handlers never wait for them.
#[derive(Clone, Debug)]
pub struct HttpInvalidator {
    client: Client,
    url: Url,
}

impl HttpInvalidator {
    pub fn new(url: Url) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self { client, url })
    }
}

impl InvalidationSink for HttpInvalidator {
    fn invalidate(&self, path: &str) {
        let request = self
            .client
            .post(self.url.clone())
            .json(&RevalidateRequest { path });
        let path = path.to_owned();

        tokio::spawn(async move {
            match request.send().await.and_then(Response::error_for_status) {
                Ok(_) => debug!(%path, "Sent revalidation"),
                Err(err) => warn!(%path, %err, "Revalidation failed"),
            }
        });
    }
}
