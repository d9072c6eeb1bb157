use std::sync::OnceLock;

use tracing::debug;

/// Install the aws-lc-rs rustls provider once per process.
///
/// reqwest is built without a bundled provider, so this must run before the
/// first `Client` is constructed.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}
