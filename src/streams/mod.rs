//! Streaming the media blobs attached to some entries
//!
//! Downloads are fetched whole and then read through [`std::io::Read`]. Uploads are written
//! through [`std::io::Write`] and sent when finished, either in one request or, for resumable
//! uploads, in chunks.

mod download;
pub use download::DownloadStream;
mod upload;
pub use upload::{UploadStream, BOUNDARY, MAX_RESUMABLE_CHUNK_SIZE};
