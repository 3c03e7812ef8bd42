/// Object Store Module
///
/// Listing of objects under a prefix and the "latest file wins" selection the
/// load driver applies to them.
pub mod s3;

pub use s3::S3ObjectStore;

use chrono::{DateTime, Utc};
use std::future::Future;

/// Key and modification time of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

pub trait ObjectStore {
    fn list_objects(&self, bucket: &str, prefix: &str) -> impl Future<Output = anyhow::Result<Vec<ObjectSummary>>> + Send;
}

/// Most recently modified object. On equal timestamps the first listed object wins.
pub fn latest_object(objects: &[ObjectSummary]) -> Option<&ObjectSummary> {
    objects.iter().fold(None, |latest: Option<&ObjectSummary>, object| match latest {
        Some(current) if current.last_modified >= object.last_modified => Some(current),
        _ => Some(object),
    })
}
