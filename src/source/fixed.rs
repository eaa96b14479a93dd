use async_trait::async_trait;
use tracing::debug;

use super::{Endpoint, EndpointSource, SourceError};

/// Endpoint source over a static list that is already in preference order
#[derive(Debug, Clone)]
pub struct FixedSource {
    endpoints: Vec<Endpoint>,
}

impl FixedSource {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

#[async_trait]
impl EndpointSource for FixedSource {
    async fn setup(&self) -> Result<(), SourceError> {
        debug!(count = self.endpoints.len(), "Fixed endpoint source ready");
        Ok(())
    }

    async fn teardown(&self) -> Result<(), SourceError> {
        debug!("Fixed endpoint source released");
        Ok(())
    }

    async fn ranked_endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        if self.endpoints.is_empty() {
            return Err(SourceError::NoEndpoints);
        }
        Ok(self.endpoints.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(count: u16) -> Vec<Endpoint> {
        (0..count)
            .map(|i| Endpoint::new(format!("hq-{}.example.com", i + 1), 7709))
            .collect()
    }

    #[tokio::test]
    async fn test_ranked_keeps_order() {
        let source = FixedSource::new(endpoints(3));
        let ranked = source.ranked_endpoints().await.unwrap();
        assert_eq!(ranked, endpoints(3));
    }

    #[tokio::test]
    async fn test_top_n_truncates() {
        let source = FixedSource::new(endpoints(5));
        let top = source.top_n(2).await.unwrap();
        assert_eq!(top, endpoints(2));

        let all = source.top_n(10).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let source = FixedSource::new(vec![]);
        assert!(matches!(
            source.ranked_endpoints().await,
            Err(SourceError::NoEndpoints)
        ));
    }
}
