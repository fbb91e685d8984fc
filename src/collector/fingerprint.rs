use sha2::{Digest, Sha256};

/// Separator between fingerprint components
const SEPARATOR: &str = "|";

/// Compute the device fingerprint for a connection
///
/// SHA-256 over user-agent, accept-language, accept-encoding, accept and the
/// resolved IP, joined with `|`, as lowercase hex.
pub fn device_fingerprint(
    user_agent: &str,
    accept_language: &str,
    accept_encoding: &str,
    accept: &str,
    ip: &str,
) -> String {
    let material = [user_agent, accept_language, accept_encoding, accept, ip].join(SEPARATOR);

    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/121.0";

    #[test]
    fn test_deterministic() {
        let a = device_fingerprint(UA, "fr-FR", "gzip", "text/html", "41.202.10.1");
        let b = device_fingerprint(UA, "fr-FR", "gzip", "text/html", "41.202.10.1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_each_component_changes_digest() {
        let base = device_fingerprint(UA, "fr-FR", "gzip", "text/html", "41.202.10.1");
        let variants = [
            device_fingerprint("curl/8.4.0", "fr-FR", "gzip", "text/html", "41.202.10.1"),
            device_fingerprint(UA, "en-US", "gzip", "text/html", "41.202.10.1"),
            device_fingerprint(UA, "fr-FR", "br", "text/html", "41.202.10.1"),
            device_fingerprint(UA, "fr-FR", "gzip", "*/*", "41.202.10.1"),
            device_fingerprint(UA, "fr-FR", "gzip", "text/html", "41.202.10.2"),
        ];

        for variant in &variants {
            assert_ne!(&base, variant);
        }
    }

    #[test]
    fn test_known_digest() {
        // sha256("||||")
        assert_eq!(
            device_fingerprint("", "", "", "", ""),
            format!("{:x}", Sha256::digest(b"||||"))
        );
    }
}
