use std::{
    collections::BTreeMap,
    fmt::{Debug, Formatter},
    path::PathBuf,
    pin::Pin,
};

use futures::TryStreamExt;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    StatusCode,
};
use reqwest_middleware::ClientWithMiddleware;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use url::Url;

use crate::{
    error::{IngestError, SourceError},
    metadata::{FetchMetadata, ETAG_KEY, FILE_KEY, URL_KEY},
};

/// Where the content of an ingest comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    /// Standard input.
    Stdin,

    /// A remote resource fetched with a `GET` request.
    Http(String),

    /// A file on the local filesystem.
    File(PathBuf),
}

impl SourceTarget {
    /// Interprets a command line argument. Anything that starts with `http`
    /// is a url, everything else a path.
    pub fn from_arg(arg: &str) -> Self {
        if arg.starts_with("http") {
            SourceTarget::Http(arg.to_owned())
        } else {
            SourceTarget::File(PathBuf::from(arg))
        }
    }
}

/// An opened source that is ready to be streamed into a dataset.
pub struct SourceDescriptor {
    /// The content.
    pub reader: Pin<Box<dyn AsyncRead + Send>>,

    /// The number of bytes the source announced, if known.
    pub content_length: Option<u64>,

    /// Entries to record in the metadata of the commit.
    pub metadata: BTreeMap<String, String>,
}

impl Debug for SourceDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("content_length", &self.content_length)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl SourceDescriptor {
    /// Wraps an arbitrary reader without any metadata.
    pub fn from_reader(
        reader: impl AsyncRead + Send + 'static,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            reader: Box::pin(reader),
            content_length,
            metadata: BTreeMap::new(),
        }
    }

    /// Standard input, with an unknown length.
    pub fn stdin() -> Self {
        Self::from_reader(tokio::io::stdin(), None)
    }
}

/// The result of [`resolve`].
#[derive(Debug)]
pub enum Resolution {
    /// The source is open.
    Ready(SourceDescriptor),

    /// The server reported that the resource did not change since the
    /// previous fetch.
    Unchanged,
}

/// Opens `target`. For urls the etag recorded in `previous` is sent along so
/// the server can report that nothing changed.
pub async fn resolve(
    target: &SourceTarget,
    previous: Option<&FetchMetadata>,
    client: &ClientWithMiddleware,
) -> Result<Resolution, IngestError> {
    match target {
        SourceTarget::Stdin => Ok(Resolution::Ready(SourceDescriptor::stdin())),
        SourceTarget::Http(url) => resolve_http(url, previous, client).await,
        SourceTarget::File(path) => Ok(Resolution::Ready(resolve_file(path.clone()).await?)),
    }
}

async fn resolve_http(
    url: &str,
    previous: Option<&FetchMetadata>,
    client: &ClientWithMiddleware,
) -> Result<Resolution, IngestError> {
    let parsed = Url::parse(url).map_err(|source| SourceError::InvalidUrl {
        url: url.to_owned(),
        source,
    })?;

    let mut headers = HeaderMap::default();
    if let Some(etag) = previous
        .and_then(|metadata| metadata.etag_for(url))
        .and_then(|etag| HeaderValue::from_str(etag).ok())
    {
        tracing::debug!("sending If-None-Match: {etag:?}");
        headers.insert(header::IF_NONE_MATCH, etag);
    }

    let response = client
        .get(parsed)
        .headers(headers)
        .send()
        .await
        .map_err(|source| SourceError::Request {
            url: url.to_owned(),
            source,
        })?;

    let status = response.status();
    if status == StatusCode::NOT_MODIFIED {
        tracing::debug!("server reported {status}, content is unchanged");
        return Ok(Resolution::Unchanged);
    }
    if status.is_client_error() || status.is_server_error() {
        return Err(IngestError::Fetch {
            url: url.to_owned(),
            status,
        });
    }

    let etag = response
        .headers()
        .get(header::ETAG)
        .and_then(|header| header.to_str().ok())
        .filter(|etag| !etag.is_empty())
        .map(ToOwned::to_owned);

    let mut metadata = BTreeMap::from([(URL_KEY.to_owned(), url.to_owned())]);
    if let Some(etag) = etag {
        metadata.insert(ETAG_KEY.to_owned(), etag);
    }

    let content_length = response.content_length();
    let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));

    Ok(Resolution::Ready(SourceDescriptor {
        reader: Box::pin(reader),
        content_length,
        metadata,
    }))
}

async fn resolve_file(path: PathBuf) -> Result<SourceDescriptor, SourceError> {
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|source| SourceError::Open {
            path: path.clone(),
            source,
        })?;
    let metadata = file.metadata().await.map_err(|source| SourceError::Stat {
        path: path.clone(),
        source,
    })?;

    Ok(SourceDescriptor {
        reader: Box::pin(file),
        content_length: Some(metadata.len()),
        metadata: BTreeMap::from([(FILE_KEY.to_owned(), path.to_string_lossy().into_owned())]),
    })
}
