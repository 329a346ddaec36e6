use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Check whether a local forwarded port is currently accepting connections.
///
/// Informational only: refused, timed out and reset all collapse to `false`,
/// and no error escapes this boundary.
pub async fn probe(host: &str, port: u16) -> bool {
    let addr = format!("{host}:{port}");
    matches!(timeout(PROBE_TIMEOUT, TcpStream::connect(&addr)).await, Ok(Ok(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn open_port_reports_true() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn closed_port_reports_false_within_bound() {
        // Bind then drop to get a port that is known to be closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let started = Instant::now();
        assert!(!probe("127.0.0.1", port).await);
        assert!(started.elapsed() < PROBE_TIMEOUT + Duration::from_millis(500));
    }
}
