//! Feature listing fetched over the REST API.
//!
//! The realtime channels only announce that a feature changed; the listing
//! itself is pulled from `GET /api/projects/{project}/features` and fed to the
//! effect dispatcher.

use autocoder_rs_sync::effects::{DONE, IN_PROGRESS, PENDING};
use autocoder_rs_sync::{Endpoint, EntitySnapshot};
use log::debug;
use reqwest::Url;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeatureSummary {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Features grouped by status.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FeatureListing {
    #[serde(default)]
    pub pending: Vec<FeatureSummary>,
    #[serde(default)]
    pub in_progress: Vec<FeatureSummary>,
    #[serde(default)]
    pub done: Vec<FeatureSummary>,
}

impl FeatureListing {
    pub fn to_snapshot(&self) -> EntitySnapshot {
        let ids = |features: &[FeatureSummary]| features.iter().map(|f| f.id).collect::<Vec<_>>();
        EntitySnapshot::new()
            .with_bucket(PENDING, ids(self.pending.as_slice()))
            .with_bucket(IN_PROGRESS, ids(self.in_progress.as_slice()))
            .with_bucket(DONE, ids(self.done.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.pending.len() + self.in_progress.len() + self.done.len()
    }
}

pub fn features_url(endpoint: &Endpoint, project: &str) -> Url {
    endpoint.http_url(["api", "projects", project, "features"])
}

pub async fn fetch_features(
    http: &reqwest::Client,
    endpoint: &Endpoint,
    project: &str,
) -> reqwest::Result<FeatureListing> {
    let url = features_url(endpoint, project);
    debug!("fetching features (url={})", url);
    http.get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<FeatureListing>()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn listing_maps_to_status_buckets() {
        let listing: FeatureListing = serde_json::from_str(
            r#"{
                "pending": [{"id": 3, "name": "Search", "category": "ui"}],
                "in_progress": [{"id": 2, "name": "Cart"}],
                "done": [{"id": 1}]
            }"#,
        )
        .expect("listing");
        assert_eq!(listing.total(), 3);

        let snapshot = listing.to_snapshot();
        assert!(snapshot.contains(PENDING, 3));
        assert!(snapshot.contains(IN_PROGRESS, 2));
        assert!(snapshot.contains(DONE, 1));
        assert!(!snapshot.is_all_complete());
    }

    #[test]
    fn missing_buckets_default_to_empty() {
        let listing: FeatureListing = serde_json::from_str(r#"{"done": [{"id": 5}]}"#).expect("listing");
        assert!(listing.to_snapshot().is_all_complete());
    }

    #[test]
    fn project_names_are_escaped_in_url() {
        let endpoint = Endpoint::new("localhost:8888", false).expect("endpoint");
        assert_eq!(
            features_url(&endpoint, "my shop").as_str(),
            "http://localhost:8888/api/projects/my%20shop/features"
        );
    }
}
