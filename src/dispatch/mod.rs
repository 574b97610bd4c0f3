//! Execution of management operations: transport selection and dispatch,
//! process-state detection, fixed-interval polling and download URLs.

mod dispatcher;
mod download;
mod poller;
mod process_state;

pub use self::dispatcher::{Dispatcher, Endpoints};
pub use self::download::{download_url, download_url_for_path};
pub use self::poller::{PollAttempt, Poller, POLL_INTERVAL};
pub use self::process_state::{
    DomainStrategy, NoopStrategy, ProcessState, ProcessStateStrategy, RequiredState, ServerState,
    StandaloneStrategy,
};

use crate::model::ResourceAddress;

/// Path-style address serialization (`/segment-name/segment-value/...`),
/// shared by the GET transport and the download URL builder so both stay
/// byte-for-byte consistent.
pub(crate) fn address_path(address: &ResourceAddress) -> String {
    let mut path = String::new();
    for (name, value) in address.segments() {
        path.push('/');
        path.push_str(&urlencoding::encode(name));
        path.push('/');
        path.push_str(&urlencoding::encode(value));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_path_encodes_segments() {
        let address = ResourceAddress::parse("/subsystem=logging/logger=my app").unwrap();
        assert_eq!(address_path(&address), "/subsystem/logging/logger/my%20app");
        assert_eq!(address_path(&ResourceAddress::root()), "");
    }
}

/// Canned HTTP responder for dispatcher and poller tests: serves the given
/// responses in order over one-shot connections, repeating the last one
/// when the list is exhausted.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::codec::{self, APPLICATION_DMR_ENCODED, APPLICATION_JSON};
    use crate::model::{keys, ModelNode};

    pub(crate) struct CannedResponse {
        status: u16,
        content_type: String,
        body: String,
    }

    impl CannedResponse {
        pub(crate) fn dmr(status: u16, body: String) -> Self {
            Self {
                status,
                content_type: APPLICATION_DMR_ENCODED.to_string(),
                body,
            }
        }

        pub(crate) fn json(status: u16, body: String) -> Self {
            Self {
                status,
                content_type: APPLICATION_JSON.to_string(),
                body,
            }
        }
    }

    /// Base64 text of a `{outcome: success, result: <node>}` envelope.
    pub(crate) fn success_body(result: ModelNode) -> String {
        let mut envelope = ModelNode::object();
        envelope.insert(keys::OUTCOME, keys::SUCCESS);
        envelope.insert(keys::RESULT, result);
        codec::to_base64(&envelope).unwrap()
    }

    /// Base64 text of a failed envelope.
    pub(crate) fn failed_body(description: &str) -> String {
        let mut envelope = ModelNode::object();
        envelope.insert(keys::OUTCOME, "failed");
        envelope.insert(keys::FAILURE_DESCRIPTION, description);
        codec::to_base64(&envelope).unwrap()
    }

    pub(crate) async fn canned_server(responses: Vec<CannedResponse>) -> String {
        let (endpoint, _) = counting_server(responses).await;
        endpoint
    }

    /// Like [`canned_server`], additionally exposing how many requests the
    /// server has answered.
    pub(crate) async fn counting_server(
        responses: Vec<CannedResponse>,
    ) -> (String, Arc<AtomicUsize>) {
        assert!(!responses.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let requests = Arc::clone(&counter);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let served = requests.fetch_add(1, Ordering::SeqCst);
                let response = &responses[served.min(responses.len() - 1)];
                respond(socket, response).await;
            }
        });

        (format!("http://{address}/management"), counter)
    }

    async fn respond(mut socket: TcpStream, response: &CannedResponse) {
        read_request(&mut socket).await;
        let payload = format!(
            "HTTP/1.1 {} Canned\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            response.status,
            response.content_type,
            response.body.len(),
            response.body
        );
        socket.write_all(payload.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    }

    /// Drains the full request (headers plus `Content-Length` body) so the
    /// client never sees the connection close mid-send.
    async fn read_request(socket: &mut TcpStream) {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 2048];
        let header_end = loop {
            let read = socket.read(&mut chunk).await.unwrap_or(0);
            if read == 0 {
                return;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if let Some(position) = find(&buffer, b"\r\n\r\n") {
                break position + 4;
            }
        };

        let head = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buffer.len() - header_end < content_length {
            let read = socket.read(&mut chunk).await.unwrap_or(0);
            if read == 0 {
                return;
            }
            buffer.extend_from_slice(&chunk[..read]);
        }
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }
}
