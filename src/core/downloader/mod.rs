pub mod archive;
pub mod client;

pub use archive::extract_package;
pub use client::Downloader;
