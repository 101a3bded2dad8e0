#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Publishing for shipwright
//!
//! Uploads release files to the download host over the configured
//! transfer tools, merges the release index, and soft-purges the CDN.
//! Every network-facing step degrades to a skip with an event when no
//! upload host is configured, so the index work also runs locally.

mod flow;
mod http;
mod purge;
mod upload;

pub use flow::{
    collect_uploads, hash_uploads, publish_release, PublishSummary, Upload, DESCRIPTOR_SUFFIX,
};
pub use http::HttpClient;
pub use purge::{release_purge_urls, CdnPurger};
pub use upload::Uploader;
