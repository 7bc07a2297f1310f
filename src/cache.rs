use std::collections::HashMap;

use log::{debug, error};

use crate::{apis::ApiClient, types::VisitNote};

#[derive(Debug, Default, Clone, PartialEq)]
/// Function signatures obtained externally during this session.
///
/// A selector is looked up at most once, whether or not the lookup succeeded.
pub struct SignatureCache {
    /// Maps selectors to text signatures.
    ///
    /// "0xabcd1234" -> "withdraw(uint256)"
    pub signatures: HashMap<String, (VisitNote, String)>,
}

impl SignatureCache {
    /// Attempt to look up a selector if not in cache.
    pub async fn try_sig(&mut self, selector: &str, client: &ApiClient) -> Option<String> {
        let key = selector.to_lowercase();
        match self.signatures.get(&key) {
            Some((VisitNote::PriorSuccess, value)) => {
                debug!("Using cached signature: {} {}", key, value);
                return Some(value.to_owned());
            }
            Some((VisitNote::PriorFailure, _)) => {
                debug!("(skipping) Prior failure for signature: {}", key);
                return None;
            }
            _ => {}
        }

        let text = match client.function_signature(&key).await {
            Ok(t) => t,
            Err(e) => {
                error!("Couldn't get text for signature: {} ({})", &key, e);
                self.record_failure(&key);
                return None;
            }
        };

        match text {
            Some(t) => {
                self.signatures
                    .insert(key, (VisitNote::PriorSuccess, t.to_owned()));
                Some(t)
            }
            None => {
                debug!("No text found for signature: {}", &key);
                self.record_failure(&key);
                None
            }
        }
    }

    fn record_failure(&mut self, key: &str) {
        self.signatures
            .insert(key.to_owned(), (VisitNote::PriorFailure, String::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Config;

    fn offline_client() -> ApiClient {
        // Nothing listens on the discard port, so a lookup that escapes the cache fails.
        let config = Config::from_lookup(|key| match key {
            "FOURBYTE_API_URL" => Some("http://127.0.0.1:9/api/v1/signatures/".to_string()),
            _ => None,
        })
        .unwrap();
        ApiClient::new(config)
    }

    #[tokio::test]
    async fn cached_success_is_reused() {
        let mut cache = SignatureCache::default();
        cache.signatures.insert(
            "0x12345678".to_string(),
            (VisitNote::PriorSuccess, "foo(uint256)".to_string()),
        );
        let sig = cache.try_sig("0x12345678", &offline_client()).await;
        assert_eq!(sig.as_deref(), Some("foo(uint256)"));
    }

    #[tokio::test]
    async fn failures_are_remembered() {
        let mut cache = SignatureCache::default();
        let client = offline_client();
        assert_eq!(cache.try_sig("0xABCDEF01", &client).await, None);
        assert_eq!(
            cache.signatures.get("0xabcdef01").map(|(note, _)| note),
            Some(&VisitNote::PriorFailure)
        );
        assert_eq!(cache.try_sig("0xabcdef01", &client).await, None);
        assert_eq!(cache.signatures.len(), 1);
    }
}
