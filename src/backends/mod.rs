//! Backend implementations and their shared plumbing.

pub mod aws;
pub mod cds;

use std::io;
use std::path::Path;

use futures_util::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Streams an HTTP response body into `dest`, returning the byte count.
pub(crate) async fn spool_response_to(
    response: reqwest::Response,
    dest: &Path,
) -> io::Result<u64> {
    let mut file = tokio::fs::File::create(dest).await?;
    let mut reader = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
    let copied = tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    Ok(copied)
}
