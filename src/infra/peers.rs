//! HTTP transport between cache peers.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::cache::{CacheError, CacheKey, HashRing, PeerGetter, codec};

/// Path prefix of the peer endpoint served by every node.
pub const PEER_ROUTE_PREFIX: &str = "/_vellum";

const PEER_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches cache entries from another node over `GET {base}/_vellum/{group}/{key}`.
#[derive(Clone, Debug)]
pub struct HttpPeer {
    client: Client,
    base: String,
}

impl HttpPeer {
    pub fn new(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }

    fn user_agent() -> &'static str {
        concat!("vellum/", env!("CARGO_PKG_VERSION"))
    }

    fn endpoint(&self, group: &str, key: &CacheKey) -> Result<String, CacheError> {
        let encoded =
            codec::encode_key(key).map_err(|err| CacheError::peer(&self.base, err.to_string()))?;
        Ok(format!("{}{PEER_ROUTE_PREFIX}/{group}/{encoded}", self.base))
    }
}

#[async_trait]
impl PeerGetter for HttpPeer {
    fn url(&self) -> &str {
        &self.base
    }

    async fn get(&self, group: &str, key: &CacheKey) -> Result<Bytes, CacheError> {
        let url = self.endpoint(group, key)?;
        debug!(
            target = "vellum::peers",
            peer = %self.base,
            group,
            key = %key,
            "Fetching from peer"
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| CacheError::peer(&self.base, err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CacheError::not_found(key.discriminator.as_str()));
        }
        if !status.is_success() {
            return Err(CacheError::peer(&self.base, format!("status {status}")));
        }

        response
            .bytes()
            .await
            .map_err(|err| CacheError::peer(&self.base, err.to_string()))
    }
}

/// Builds the hash ring for this node and its configured peers.
pub fn build_ring(self_url: &str, peer_urls: &[String]) -> Result<HashRing, reqwest::Error> {
    let client = Client::builder()
        .user_agent(HttpPeer::user_agent())
        .timeout(PEER_TIMEOUT)
        .build()?;
    let peers = peer_urls
        .iter()
        .map(|url| Arc::new(HttpPeer::new(client.clone(), url.as_str())) as Arc<dyn PeerGetter>)
        .collect();
    Ok(HashRing::new(self_url, peers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResourceKind;

    #[test]
    fn endpoint_embeds_group_and_encoded_key() {
        let peer = HttpPeer::new(Client::new(), "http://10.0.0.2:8080");
        let key = CacheKey::new(ResourceKind::Page, "blog/post1.html", 3, 42);
        let url = peer.endpoint("page", &key).unwrap();

        let prefix = "http://10.0.0.2:8080/_vellum/page/";
        assert!(url.starts_with(prefix), "{url}");
        let decoded = codec::decode_key(&url[prefix.len()..]).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn ring_excludes_self_from_peers() {
        let ring = build_ring(
            "http://a:8080",
            &["http://a:8080".to_string(), "http://b:8080".to_string()],
        )
        .unwrap();
        assert_eq!(ring.node_count(), 2);
    }
}
