//! The embedded TPM vendor root certificate store.
//!
//! The `root-certs/tpm` directory of the crate is compiled in at build
//! time. The store is an immutable process-wide value constructed on first
//! access; if any embedded file fails to parse as a DER X.509 certificate,
//! the store as a whole is unavailable and every access reports the
//! failure. Certificates are tagged with the leading path segment of their
//! file inside the embedded directory, so a caller can select one vendor's
//! anchors when chain-validating a tpm trust path.

use std::sync::LazyLock;

use openssl::x509;

use crate::error::TpmRootStoreError;

include!(concat!(env!("OUT_DIR"), "/tpm_root_certs.rs"));

/// One embedded trust anchor.
#[derive(Debug, Clone)]
pub struct TpmRootCert {
    /// The leading path segment the certificate file lived under.
    pub tag: String,
    /// The parsed certificate.
    pub cert: x509::X509,
}

/// The set of embedded TPM vendor roots.
#[derive(Debug, Clone)]
pub struct TpmRootCertStore {
    certs: Vec<TpmRootCert>,
}

impl TpmRootCertStore {
    fn build(entries: &[(&str, &[u8])]) -> Result<Self, TpmRootStoreError> {
        let certs = entries
            .iter()
            .map(|(tag, der)| {
                x509::X509::from_der(der)
                    .map(|cert| TpmRootCert {
                        tag: (*tag).to_string(),
                        cert,
                    })
                    .map_err(|e| {
                        error!("unable to parse embedded root certificate {}: {}", tag, e);
                        TpmRootStoreError(format!("{tag}: {e}"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TpmRootCertStore { certs })
    }

    /// Every embedded certificate, in embedding order.
    pub fn certs(&self) -> &[TpmRootCert] {
        &self.certs
    }

    /// The certificates embedded under one leading path segment.
    pub fn certs_for_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a TpmRootCert> {
        self.certs.iter().filter(move |c| c.tag == tag)
    }

    /// Whether the store holds no certificates.
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// The number of embedded certificates.
    pub fn len(&self) -> usize {
        self.certs.len()
    }
}

static TPM_ROOT_CERT_STORE: LazyLock<Result<TpmRootCertStore, TpmRootStoreError>> =
    LazyLock::new(|| TpmRootCertStore::build(TPM_ROOT_CERT_FILES));

/// The process-wide TPM root certificate store.
///
/// Constructed once from the embedded `root-certs/tpm` directory; never
/// re-loaded or mutated.
pub fn tpm_root_certs() -> Result<&'static TpmRootCertStore, TpmRootStoreError> {
    TPM_ROOT_CERT_STORE.as_ref().map_err(|e| e.clone())
}
