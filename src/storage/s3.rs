use super::{ObjectStore, ObjectSummary};
use anyhow::{Context, Result};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use chrono::DateTime;
use tracing::info;

/// S3 listing client
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Creates a new S3 client using the default AWS credential chain
    pub async fn new() -> Self {
        let sdk_config = crate::aws::load_sdk_config().await;
        Self { client: Client::new(&sdk_config) }
    }
}

impl ObjectStore for S3ObjectStore {
    /// Lists every object under the prefix, following continuation tokens
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>> {
        info!("Listing objects in s3://{}/{}", bucket, prefix);

        let mut pages = self.client.list_objects_v2().bucket(bucket).prefix(prefix).into_paginator().send();
        let mut objects = Vec::new();

        while let Some(page) = pages.next().await {
            let page = page
                .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
                .with_context(|| format!("Failed to list objects in s3://{}/{}", bucket, prefix))?;

            for object in page.contents() {
                let (Some(key), Some(modified)) = (object.key(), object.last_modified()) else {
                    continue;
                };
                let Some(last_modified) = DateTime::from_timestamp(modified.secs(), modified.subsec_nanos()) else {
                    continue;
                };
                objects.push(ObjectSummary { key: key.to_string(), last_modified });
            }
        }

        info!("Found {} objects", objects.len());
        Ok(objects)
    }
}
