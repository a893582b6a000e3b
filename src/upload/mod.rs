mod client;
mod curl;
mod dispatcher;

pub use crate::config::UploadProtocol;
pub use client::{normalize_remote_dir, ConnectParams, UploadClient, UploadConnector};
pub use curl::CurlConnector;
pub use dispatcher::UploadDispatcher;
