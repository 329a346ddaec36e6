//! Best-effort substring classification of SSH client output.
//!
//! Chunks arrive as the process writes them, not line-aligned, so matching is
//! per-chunk and tolerant of garbling. A missed match only delays a status
//! transition; the authoritative down signal is always process exit.

/// What a chunk of client output tells us about the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputClass {
    /// The client reported successful authentication to the gateway.
    Authenticated,
    /// A fatal network condition; carries the matched reason.
    Fatal(&'static str),
}

const AUTH_PATTERNS: &[&str] = &["Authenticated to"];

const FATAL_PATTERNS: &[(&str, &str)] = &[
    ("Connection refused", "connection refused"),
    ("Connection timed out", "connection timed out"),
    ("No route to host", "no route to host"),
    ("Host key verification failed", "host key verification failed"),
];

pub fn classify(chunk: &str) -> Option<OutputClass> {
    if AUTH_PATTERNS.iter().any(|p| chunk.contains(p)) {
        return Some(OutputClass::Authenticated);
    }
    FATAL_PATTERNS
        .iter()
        .find(|(pattern, _)| chunk.contains(pattern))
        .map(|&(_, reason)| OutputClass::Fatal(reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_authentication() {
        let chunk = "debug1: Authenticated to bastion.example.com ([10.1.1.1]:22) using \"publickey\"";
        assert_eq!(classify(chunk), Some(OutputClass::Authenticated));
    }

    #[test]
    fn detects_fatal_errors() {
        assert_eq!(
            classify("ssh: connect to host 10.1.1.1 port 22: Connection refused"),
            Some(OutputClass::Fatal("connection refused"))
        );
        assert_eq!(
            classify("ssh: connect to host 10.1.1.1 port 22: Connection timed out"),
            Some(OutputClass::Fatal("connection timed out"))
        );
        assert_eq!(
            classify("ssh: connect to host 10.1.1.1 port 22: No route to host"),
            Some(OutputClass::Fatal("no route to host"))
        );
        assert_eq!(
            classify("Host key verification failed."),
            Some(OutputClass::Fatal("host key verification failed"))
        );
    }

    #[test]
    fn ignores_unrelated_output() {
        assert_eq!(classify("debug1: Reading configuration data"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn matches_mid_chunk() {
        // Chunks are not line-aligned.
        let chunk = "something\npartial Authenticated to host mo";
        assert_eq!(classify(chunk), Some(OutputClass::Authenticated));
    }
}
