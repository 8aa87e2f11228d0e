//! Local file serving for renderers.
//!
//! Files are published under `/media/<sha256 of the path>[.<ext>]`. Renderers
//! seek by asking for `Range: bytes=START-`; any other form of range request is
//! answered with the whole file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;
use warp::http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use warp::hyper::Body;

/// DLNA.ORG_OP=01: byte seek supported, time seek not supported
const DLNA_CONTENT_FEATURES: &str =
    "DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS=01700000000000000000000000000000";
const DLNA_TRANSFER_MODE: &str = "Streaming";

/// URL path prefix for published files
pub const MEDIA_PREFIX: &str = "/media/";

/// A published file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    pub file: PathBuf,
    pub content_type: &'static str,
}

impl MediaEntry {
    pub fn new(file: PathBuf) -> Self {
        let content_type = content_type_for(&file);
        Self { file, content_type }
    }
}

/// Deterministic URL path for a file: `/media/<hex sha256>[.<ext>]`.
///
/// The hash covers the path string as given, so two spellings of the same
/// file get two URLs.
pub fn media_path_for(file: &Path) -> String {
    let digest = Sha256::digest(file.to_string_lossy().as_bytes());
    let mut path = format!("{}{}", MEDIA_PREFIX, hex::encode(digest));
    if let Some(ext) = file.extension().and_then(|e| e.to_str()) {
        path.push('.');
        path.push_str(ext);
    }
    path
}

/// MIME type by file extension, `application/octet-stream` when unknown.
pub fn content_type_for(file: &Path) -> &'static str {
    let ext = match file.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return "application/octet-stream",
    };
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "oga" => "audio/ogg",
        "wma" => "audio/x-ms-wma",
        "aif" | "aiff" => "audio/aiff",
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" | "m2ts" => "video/MP2T",
        "mpg" | "mpeg" => "video/mpeg",
        "webm" => "video/webm",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "srt" => "text/srt",
        _ => "application/octet-stream",
    }
}

/// `START` of a `bytes=START-` range. Suffix, bounded and multi ranges are
/// not supported and yield `None`.
pub fn parse_open_range(value: &str) -> Option<u64> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    let start = ranges.trim().strip_suffix('-')?;
    start.trim().parse().ok()
}

/// Ranged response plan for a file of `len` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RangePlan {
    Full,
    Partial { start: u64 },
    Unsatisfiable,
}

pub(crate) fn plan_range(headers: &HeaderMap, len: u64) -> RangePlan {
    let start = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_open_range);
    match start {
        None => RangePlan::Full,
        Some(start) if start >= len => RangePlan::Unsatisfiable,
        Some(start) => RangePlan::Partial { start },
    }
}

fn base_response(entry: &MediaEntry, status: StatusCode) -> warp::http::response::Builder {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, entry.content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "no-store")
        .header(header::CONNECTION, "keep-alive")
        .header("transfermode.dlna.org", DLNA_TRANSFER_MODE)
        .header("contentfeatures.dlna.org", DLNA_CONTENT_FEATURES)
}

/// Build the response for `entry`. The body, if any, is produced by
/// `wrap_body` so the caller can attach its own lifetime to the stream.
///
/// Errors are I/O failures opening or seeking the file; streaming errors
/// surface through the body stream itself.
pub(crate) async fn respond<W, S>(
    entry: &MediaEntry,
    method: &Method,
    headers: &HeaderMap,
    wrap_body: W,
) -> std::io::Result<Response<Body>>
where
    W: FnOnce(ReaderStream<tokio::fs::File>) -> S,
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
{
    let len = tokio::fs::metadata(&entry.file).await?.len();

    let (status, start) = match plan_range(headers, len) {
        RangePlan::Full => (StatusCode::OK, 0),
        RangePlan::Partial { start } => (StatusCode::PARTIAL_CONTENT, start),
        RangePlan::Unsatisfiable => {
            let response = base_response(entry, StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{len}"))
                .header(header::CONTENT_LENGTH, "0")
                .body(Body::empty());
            return response.map_err(http_error);
        }
    };

    let mut builder = base_response(entry, status)
        .header(header::CONTENT_LENGTH, HeaderValue::from(len - start));
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, len - 1, len),
        );
    }

    if method == Method::HEAD {
        return builder.body(Body::empty()).map_err(http_error);
    }

    let mut file = tokio::fs::File::open(&entry.file).await?;
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    let stream = wrap_body(ReaderStream::new(file));
    builder.body(Body::wrap_stream(stream)).map_err(http_error)
}

fn http_error(e: warp::http::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e)
}

/// Pass-through body wrapper that keeps `guard` alive until the stream is
/// finished or dropped, and calls `on_error` for each I/O error.
pub(crate) fn guarded_stream<S, G, F>(
    stream: S,
    guard: G,
    on_error: F,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    G: Send + 'static,
    F: Fn(&std::io::Error) + Send + Sync + 'static,
{
    let stream = stream.inspect_err(on_error).boxed();
    futures::stream::unfold((stream, guard), |(mut stream, guard)| async move {
        let item = stream.next().await?;
        Some((item, (stream, guard)))
    })
}
