//! The fixed upstream destination.

use std::str::FromStr;

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;
use url::Url;

/// Error parsing the upstream URL.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("unsupported upstream scheme {0:?}, only http is supported")]
    Scheme(String),
    #[error("upstream URL has no host")]
    MissingHost,
    #[error("upstream URL must not carry a path, query or fragment")]
    NotABase,
    #[error("invalid upstream authority: {0}")]
    Authority(#[from] axum::http::uri::InvalidUri),
}

/// Scheme and authority that every proxied request is rewritten to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    scheme: Scheme,
    authority: Authority,
}

impl UpstreamTarget {
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let url = Url::parse(raw)?;

        if url.scheme() != "http" {
            return Err(TargetError::Scheme(url.scheme().to_string()));
        }
        let host = url.host_str().ok_or(TargetError::MissingHost)?;
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(TargetError::NotABase);
        }

        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            scheme: Scheme::HTTP,
            authority: Authority::from_str(&authority)?,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Point `uri` at the upstream, keeping its path and query untouched.
    pub fn rewrite(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path_and_query = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?)
    }
}

impl std::fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_link_local_default() {
        let target = UpstreamTarget::parse("http://169.254.169.254").unwrap();
        assert_eq!(target.authority().as_str(), "169.254.169.254");
        assert_eq!(target.to_string(), "http://169.254.169.254");
    }

    #[test]
    fn keeps_explicit_port() {
        let target = UpstreamTarget::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(target.authority().as_str(), "127.0.0.1:8080");
    }

    #[test]
    fn rejects_unusable_urls() {
        assert!(matches!(
            UpstreamTarget::parse("https://169.254.169.254"),
            Err(TargetError::Scheme(_))
        ));
        assert!(matches!(
            UpstreamTarget::parse("http://169.254.169.254/computeMetadata"),
            Err(TargetError::NotABase)
        ));
        assert!(matches!(
            UpstreamTarget::parse("http://169.254.169.254/?a=b"),
            Err(TargetError::NotABase)
        ));
        assert!(matches!(UpstreamTarget::parse("not a url"), Err(TargetError::Url(_))));
    }

    #[test]
    fn rewrite_preserves_path_and_query() {
        let target = UpstreamTarget::parse("http://169.254.169.254").unwrap();
        let uri: Uri = "/computeMetadata/v1/instance/hostname?alt=text".parse().unwrap();

        let rewritten = target.rewrite(&uri).unwrap();
        assert_eq!(
            rewritten.to_string(),
            "http://169.254.169.254/computeMetadata/v1/instance/hostname?alt=text"
        );
    }

    #[test]
    fn rewrite_keeps_encoding() {
        let target = UpstreamTarget::parse("http://metadata.internal:80").unwrap();
        let uri: Uri = "http://client.example/a%2Fb?x=%20".parse().unwrap();

        let rewritten = target.rewrite(&uri).unwrap();
        assert_eq!(rewritten.scheme_str(), Some("http"));
        assert_eq!(rewritten.authority().unwrap().as_str(), "metadata.internal");
        assert_eq!(rewritten.path(), "/a%2Fb");
        assert_eq!(rewritten.query(), Some("x=%20"));
    }
}
