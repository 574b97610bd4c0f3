//! Streaming download URLs.
//!
//! Attachments like log files or deployment content are fetched outside the
//! regular envelope: a GET against the management endpoint with
//! `useStreamAsResponse` streams the raw content. Pure string building, no
//! network interaction.

use super::address_path;
use crate::error::UrlError;
use crate::model::ResourceAddress;

const STREAM_PARAMETER: &str = "useStreamAsResponse";

/// Builds a streaming download URL for an address.
pub fn download_url(
    endpoint: &str,
    address: &ResourceAddress,
    operation: &str,
    parameters: &[&str],
) -> Result<String, UrlError> {
    download_url_for_path(endpoint, &address_path(address), operation, parameters)
}

/// Builds a streaming download URL for a pre-joined path. Extra parameters
/// come as a flat key/value list; an odd number of entries is an argument
/// error, raised before any string is assembled.
pub fn download_url_for_path(
    endpoint: &str,
    path: &str,
    operation: &str,
    parameters: &[&str],
) -> Result<String, UrlError> {
    if parameters.len() % 2 != 0 {
        return Err(UrlError::UnevenParameters {
            count: parameters.len(),
        });
    }
    if let Err(source) = url::Url::parse(endpoint) {
        return Err(UrlError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        });
    }

    let endpoint = endpoint.trim_end_matches('/');
    let mut url = format!("{endpoint}{path}?operation={}", urlencoding::encode(operation));
    for pair in parameters.chunks(2) {
        url.push('&');
        url.push_str(&urlencoding::encode(pair[0]));
        url.push('=');
        url.push_str(&urlencoding::encode(pair[1]));
    }
    url.push('&');
    url.push_str(STREAM_PARAMETER);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "http://localhost:9990/management";

    #[test]
    fn plain_path_url() {
        let url = download_url_for_path(ENDPOINT, "/subsystem/foo", "read-content", &[]).unwrap();
        assert_eq!(
            url,
            "http://localhost:9990/management/subsystem/foo?operation=read-content&useStreamAsResponse"
        );
    }

    #[test]
    fn extra_parameters_are_appended_in_pairs() {
        let url = download_url_for_path(
            ENDPOINT,
            "/subsystem/logging",
            "read-log-file",
            &["name", "server.log", "lines", "100"],
        )
        .unwrap();
        assert_eq!(
            url,
            "http://localhost:9990/management/subsystem/logging?operation=read-log-file&name=server.log&lines=100&useStreamAsResponse"
        );
    }

    #[test]
    fn odd_parameter_count_is_rejected() {
        let error =
            download_url_for_path(ENDPOINT, "/subsystem/foo", "read-content", &["orphan"])
                .unwrap_err();
        assert!(matches!(error, UrlError::UnevenParameters { count: 1 }));
    }

    #[test]
    fn address_form_matches_the_dispatcher_serialization() {
        let address = ResourceAddress::parse("/deployment=my app.war").unwrap();
        let url = download_url(ENDPOINT, &address, "read-content", &[]).unwrap();
        assert_eq!(
            url,
            "http://localhost:9990/management/deployment/my%20app.war?operation=read-content&useStreamAsResponse"
        );
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let error = download_url_for_path("not a url", "/x/y", "read-content", &[]).unwrap_err();
        assert!(matches!(error, UrlError::InvalidEndpoint { .. }));
    }
}
