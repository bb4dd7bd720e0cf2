//! Verification engine for hardware-rooted WebAuthn attestation statements.
//!
//! Webauthn authenticators that keep the credential private key in
//! dedicated hardware prove it during registration with an attestation
//! statement: `android-key` statements bind the credential to a key in the
//! Android hardware keystore, `tpm` statements bind it to a key certified
//! by an Attestation Identity Key on a TPM. This library decodes those
//! statements (CBOR, X.509 vendor extensions, and the TPM 2.0 wire
//! structures they nest) and runs the full verification checklist of the
//! webauthn specification over them.
//!
//! The library is deliberately narrow: it decides whether a statement
//! cryptographically binds a credential to genuine hardware, and hands the
//! certificate trust path back. Running the registration ceremony around
//! it - origin and challenge validation, and chain validation of the
//! returned trust path - is the caller's job. Every operation is a pure
//! function of its inputs and may be called from any thread.

#![warn(unused_extern_crates)]
#![warn(missing_docs)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

pub mod android_key;
pub mod error;
pub mod proto;
pub mod tpm;

mod crypto;
mod internals;
mod root_certs;

pub use crate::android_key::AndroidKeyAttestationStatement;
pub use crate::crypto::compute_sha256;
pub use crate::internals::{
    TpmAlgId, TpmiEccCurve, TpmsAttest, TpmsCertifyInfo, TpmsClockInfo, TpmtPublic, TpmuPublicId,
    TpmuPublicParms, TPM_GENERATED_VALUE, TPM_ST_ATTEST_CERTIFY,
};
pub use crate::root_certs::{tpm_root_certs, TpmRootCert, TpmRootCertStore};
pub use crate::tpm::TpmAttestationStatement;
