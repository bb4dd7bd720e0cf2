//! Error types for attestation statement decoding and verification.
//!
//! Every invariant violation has its own kind; the first violation in any
//! ordered checklist aborts with that kind and nothing is recovered
//! internally. Decoding and verification errors are disjoint per format.

use thiserror::Error;

/// Failures while decoding an `android-key` attestation statement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AndroidKeyDecodeError {
    /// The CBOR map is missing a required key or a value has the wrong
    /// type. Carries the offending map.
    #[error("unexpected android-key attestation statement structure")]
    UnexpectedCborStructure(serde_cbor::Value),
    /// The `alg` value is not a recognised COSE signature algorithm.
    #[error("unknown COSE algorithm identifier {0}")]
    UnknownAlgorithmIdentifier(i32),
    /// A certificate in `x5c` failed to parse.
    #[error("unable to parse certificate: {0}")]
    Certificate(String),
    /// The credential certificate has no Android key attestation extension.
    #[error("certificate attestation extension is missing")]
    CertificateExtensionMissing,
    /// The Android key attestation extension is present but malformed.
    #[error("certificate attestation extension is invalid: {0}")]
    CertificateExtension(String),
    /// The subject public key of the credential certificate could not be
    /// converted. Carries the raw subject public key info bytes.
    #[error("unsupported certificate public key")]
    PublicKey(Vec<u8>),
}

/// Failures while verifying a decoded `android-key` attestation statement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AndroidKeyVerifyError {
    /// The credential public key does not match the subject public key of
    /// the credential certificate.
    #[error("credential public key does not match the attestation certificate")]
    CredentialKeyMismatch,
    /// The attestation challenge does not equal the client data hash.
    #[error("attestation challenge does not match the client data hash")]
    ClientDataHashMismatch,
    /// An authorization list carries the allApplications field.
    #[error("allApplications field present in an authorization list")]
    AllApplicationsFieldFound,
    /// The key origin is not KM_ORIGIN_GENERATED in the required list(s).
    #[error("key origin field is invalid")]
    OriginFieldInvalid,
    /// The key purpose is not exactly the singleton KM_PURPOSE_SIGN set in
    /// the required list(s).
    #[error("key purpose field is invalid")]
    PurposeFieldInvalid,
    /// The attestation signature did not verify.
    #[error("attestation signature verification failed: {0}")]
    VerificationFailure(String),
}

/// Failures while decoding a `tpm` attestation statement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TpmDecodeError {
    /// The CBOR map is missing a required key or a value has the wrong
    /// type. Carries the offending map.
    #[error("unexpected tpm attestation statement structure")]
    UnexpectedCborStructure(serde_cbor::Value),
    /// A certificate in `x5c` failed to parse.
    #[error("unable to parse certificate: {0}")]
    Certificate(String),
    /// The `alg` value is not a recognised COSE signature algorithm.
    #[error("unknown COSE algorithm identifier {0}")]
    UnknownAlgorithmIdentifier(i32),
    /// A TPM wire structure failed to parse at the given byte offset.
    #[error("tpm structure invalid at byte {0}: {1}")]
    Tpm(usize, String),
    /// The AIK certificate is missing a required extension.
    #[error("aik certificate extension is missing")]
    CertificateExtensionMissing,
    /// An AIK certificate extension is present but malformed.
    #[error("aik certificate extension is invalid: {0}")]
    CertificateExtension(String),
    /// The public key described by pubArea could not be reconstructed.
    #[error("unable to reconstruct the pubArea public key")]
    ExtractingPublicKey,
}

/// Failures while verifying a decoded `tpm` attestation statement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TpmVerifyError {
    /// The pubArea public key does not match the credential public key.
    #[error("pubArea public key does not match the credential public key")]
    CredentialKeyMismatch,
    /// certInfo.magic is not TPM_GENERATED_VALUE.
    #[error("certInfo magic {0:#010x} is not TPM_GENERATED_VALUE")]
    InvalidMagicNumber(u32),
    /// certInfo.type is not TPM_ST_ATTEST_CERTIFY.
    #[error("certInfo type {0:#06x} is not TPM_ST_ATTEST_CERTIFY")]
    InvalidType(u16),
    /// pubArea.nameAlg is not a supported name algorithm.
    #[error("pubArea name algorithm is not supported")]
    InvalidNameAlgorithm,
    /// certInfo.attested.name does not match the computed pubArea name.
    /// Carries (expected, received).
    #[error("certInfo attested name does not match the pubArea name")]
    InvalidName(Vec<u8>, Vec<u8>),
    /// The credential public key could not be reconstructed for comparison.
    #[error("credential public key is invalid")]
    InvalidPublicKey,
    /// The AIK certificate version field is wrong. Carries
    /// (expected, received).
    #[error("aik certificate version {1} is not {0}")]
    CertificateVersion(i32, i32),
    /// The attestation signature did not verify over certInfo.
    #[error("attestation signature verification failed")]
    VerificationFailure,
    /// The AIK certificate subject is not empty.
    #[error("aik certificate subject is not empty")]
    NonEmptySubjectField,
    /// The AIK certificate manufacturer is not a known TPM vendor.
    #[error("aik certificate manufacturer is not a known TPM vendor")]
    UnknownVendor,
    /// The AIK certificate extended key usage lacks the AIK purpose OID.
    #[error("aik certificate extended key usage lacks tcg-kp-AIKCertificate")]
    ExtKeyOidMissing,
    /// The AIK certificate basic constraints CA flag is set.
    #[error("aik certificate basic constraints CA is true")]
    BasicConstraintsTrue,
    /// The AAGUID extension does not match the authenticator data AAGUID.
    #[error("aik certificate aaguid does not match the authenticator data")]
    CertificateAaguidMismatch,
    /// An ASN.1 or certificate field could not be read.
    #[error("asn.1 error: {0}")]
    Asn1Error(String),
    /// The AIK certificate carries an AAGUID but the authenticator data has
    /// no attested credential data.
    #[error("authenticator data has no aaguid to compare against")]
    CredentialAaguidMissing,
    /// The signature algorithm has no hash this engine can compute.
    #[error("no hash function for the statement algorithm")]
    UnknownHashFunction,
    /// certInfo.extraData does not equal the computed attestation hash.
    /// Carries (calculated, received).
    #[error("certInfo extraData does not match the attested data hash")]
    HashMismatch(Vec<u8>, Vec<u8>),
}

/// Failures while parsing raw authenticator data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthenticatorDataError {
    /// The input ended before a fixed-size field at the given byte offset.
    #[error("authenticator data truncated at byte {0}")]
    Truncated(usize),
    /// The credential public key CBOR failed to parse.
    #[error("credential public key is invalid: {0}")]
    CredentialPublicKey(String),
    /// Bytes remained after the last declared field.
    #[error("trailing bytes after authenticator data")]
    TrailingBytes,
}

/// Failure constructing the embedded TPM root certificate store.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("tpm root certificate store unavailable: {0}")]
pub struct TpmRootStoreError(pub String);
