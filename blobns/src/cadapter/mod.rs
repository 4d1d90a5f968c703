//! Remote store adapter (cAdapter)
//!
//! Submodules:
//! - `client`: the `BlobStore` contract and the listing/lookup data model
//! - `memory`: in-process store with an ordered key space
//! - `s3`: S3-compatible adapter on top of `aws-sdk-s3`
//!
//! Responsibilities summary:
//! - Provide async list/lookup/copy/delete of blob objects.
//! - Report failures as numeric store codes; translation to errno happens
//!   in `vfs::errno`.
pub mod client;
pub mod memory;
pub mod s3;

pub use client::{BlobItem, BlobProperty, BlobStore, ListPage, ListRequest, Metadata, StoreError};
