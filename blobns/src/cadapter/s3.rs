//! S3 adapter: maps the blob store contract onto aws-sdk-s3.
//!
//! `ListObjectsV2` returns objects and common prefixes in two separate
//! arrays; they are merged back into one lexicographically ordered page so
//! the listing contract holds. Common prefixes become `is_directory` items.

use crate::cadapter::client::{
    BlobItem, BlobProperty, BlobStore, ListPage, ListRequest, Metadata, StoreError,
};
use crate::vfs::config::S3Config;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::DateTime;
use aws_sdk_s3::types::MetadataDirective;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Characters left verbatim in a `x-amz-copy-source` value.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    pub async fn new(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();
        Self {
            client: Client::from_conf(conf),
        }
    }

    fn to_system_time(dt: Option<&DateTime>) -> Option<SystemTime> {
        let dt = dt?;
        let secs = u64::try_from(dt.secs()).ok()?;
        Some(UNIX_EPOCH + Duration::new(secs, dt.subsec_nanos()))
    }

    fn store_error<E>(err: SdkError<E, HttpResponse>, what: &str) -> StoreError {
        let code = err
            .raw_response()
            .map(|resp| i32::from(resp.status().as_u16()))
            .unwrap_or(StoreError::DISPATCH_FAILURE);
        StoreError::new(code, format!("{what}: {err}"))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn list_blobs(&self, request: ListRequest<'_>) -> Result<ListPage, StoreError> {
        let mut req = self
            .client
            .list_objects_v2()
            .bucket(request.container)
            .prefix(request.prefix);
        if !request.delimiter.is_empty() {
            req = req.delimiter(request.delimiter);
        }
        if !request.marker.is_empty() {
            req = req.continuation_token(request.marker);
        }
        if let Some(max) = request.max_results {
            req = req.max_keys(i32::try_from(max).unwrap_or(i32::MAX));
        }
        let out = req
            .send()
            .await
            .map_err(|e| Self::store_error(e, "list_objects_v2"))?;

        let mut items: Vec<BlobItem> = out
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?;
                Some(BlobItem {
                    name: key.to_string(),
                    size: obj.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                    last_modified: Self::to_system_time(obj.last_modified()),
                    metadata: Vec::new(),
                    is_directory: false,
                })
            })
            .chain(
                out.common_prefixes()
                    .iter()
                    .filter_map(|p| p.prefix().map(BlobItem::prefix)),
            )
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));

        let next_marker = if out.is_truncated().unwrap_or(false) {
            out.next_continuation_token().unwrap_or_default().to_string()
        } else {
            String::new()
        };
        debug!(
            prefix = request.prefix,
            count = items.len(),
            next_marker = %next_marker,
            "s3 list page"
        );
        Ok(ListPage { items, next_marker })
    }

    async fn get_property(&self, container: &str, key: &str) -> Result<BlobProperty, StoreError> {
        let out = self
            .client
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::store_error(e, "head_object"))?;
        let mut metadata: Metadata = out
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        metadata.sort();
        Ok(BlobProperty {
            size: out
                .content_length()
                .and_then(|s| u64::try_from(s).ok())
                .unwrap_or(0),
            last_modified: Self::to_system_time(out.last_modified()),
            metadata,
            valid: true,
        })
    }

    async fn copy_blob(&self, container: &str, src: &str, dst: &str) -> Result<(), StoreError> {
        let source = format!(
            "{container}/{}",
            utf8_percent_encode(src, COPY_SOURCE)
        );
        self.client
            .copy_object()
            .bucket(container)
            .copy_source(source)
            .key(dst)
            .metadata_directive(MetadataDirective::Copy)
            .send()
            .await
            .map_err(|e| Self::store_error(e, "copy_object"))?;
        Ok(())
    }

    async fn delete_blob(&self, container: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::store_error(e, "delete_object"))?;
        Ok(())
    }
}
