//! Protocol level structures shared by the attestation formats: COSE
//! algorithm and key representations, authenticator data, verification
//! policy and results.

#![allow(non_camel_case_types)]

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::error::AuthenticatorDataError;

/// Representation of an AAGUID
/// <https://www.w3.org/TR/webauthn/#aaguid>
pub type Aaguid = [u8; 16];

/// The ID of a credential as issued by an authenticator.
pub type CredentialID = Vec<u8>;

/// A COSE signature algorithm identifier, indicating the signature and
/// hash type used with a key.
/// <https://www.iana.org/assignments/cose/cose.xhtml#algorithms>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum COSEAlgorithm {
    /// Identifies this key as ECDSA (recommended SECP256R1) with SHA256 hashing
    ES256 = -7,
    /// Identifies this key as ECDSA (recommended SECP384R1) with SHA384 hashing
    ES384 = -35,
    /// Identifies this key as ECDSA (recommended SECP521R1) with SHA512 hashing
    ES512 = -36,
    /// Identifies this key as RS256 aka RSASSA-PKCS1-v1_5 w/ SHA-256
    RS256 = -257,
    /// Identifies this key as RS384 aka RSASSA-PKCS1-v1_5 w/ SHA-384
    RS384 = -258,
    /// Identifies this key as RS512 aka RSASSA-PKCS1-v1_5 w/ SHA-512
    RS512 = -259,
    /// Identifies this key as RS1 aka RSASSA-PKCS1-v1_5 w/ SHA-1. This is
    /// insecure, and kept only because TPM attestation identity keys in the
    /// wild still produce it.
    INSECURE_RS1 = -65535,
}

impl TryFrom<i128> for COSEAlgorithm {
    type Error = ();

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            -7 => Ok(COSEAlgorithm::ES256),
            -35 => Ok(COSEAlgorithm::ES384),
            -36 => Ok(COSEAlgorithm::ES512),
            -257 => Ok(COSEAlgorithm::RS256),
            -258 => Ok(COSEAlgorithm::RS384),
            -259 => Ok(COSEAlgorithm::RS512),
            -65535 => Ok(COSEAlgorithm::INSECURE_RS1),
            _ => Err(()),
        }
    }
}

impl From<COSEAlgorithm> for i64 {
    fn from(c: COSEAlgorithm) -> Self {
        match c {
            COSEAlgorithm::ES256 => -7,
            COSEAlgorithm::ES384 => -35,
            COSEAlgorithm::ES512 => -36,
            COSEAlgorithm::RS256 => -257,
            COSEAlgorithm::RS384 => -258,
            COSEAlgorithm::RS512 => -259,
            COSEAlgorithm::INSECURE_RS1 => -65535,
        }
    }
}

/// An ECDSACurve identifier. You probably will never need to alter
/// or use this value, as it is set inside the Credential for you.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ECDSACurve {
    /// Identifies this curve as SECP256R1 (X9_62_PRIME256V1 in OpenSSL)
    SECP256R1 = 1,
    /// Identifies this curve as SECP384R1
    SECP384R1 = 2,
    /// Identifies this curve as SECP521R1
    SECP521R1 = 3,
}

impl TryFrom<i128> for ECDSACurve {
    type Error = ();

    fn try_from(u: i128) -> Result<Self, Self::Error> {
        match u {
            1 => Ok(ECDSACurve::SECP256R1),
            2 => Ok(ECDSACurve::SECP384R1),
            3 => Ok(ECDSACurve::SECP521R1),
            _ => Err(()),
        }
    }
}

impl ECDSACurve {
    /// The length in bytes of one coordinate on this curve.
    pub fn coordinate_size(&self) -> usize {
        match self {
            ECDSACurve::SECP256R1 => 32,
            ECDSACurve::SECP384R1 => 48,
            ECDSACurve::SECP521R1 => 66,
        }
    }
}

/// A COSE Elliptic Curve Public Key. This is generally the provided
/// credential that an authenticator registers, and is used to authenticate
/// the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct COSEEC2Key {
    /// The curve that this key references.
    pub curve: ECDSACurve,
    /// The key's public X coordinate.
    pub x: Vec<u8>,
    /// The key's public Y coordinate.
    pub y: Vec<u8>,
}

/// A COSE RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct COSERSAKey {
    /// An RSA modulus
    pub n: Vec<u8>,
    /// An RSA exponent
    pub e: [u8; 3],
}

/// The type of key contained within a COSE value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum COSEKeyType {
    /// Identifies this as an Elliptic Curve EC2 key
    EC_EC2(COSEEC2Key),
    /// Identifies this as an RSA key
    RSA(COSERSAKey),
}

/// A COSE Key as provided by the authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct COSEKey {
    /// The signature algorithm this key is used with
    pub type_: COSEAlgorithm,
    /// The public key
    pub key: COSEKeyType,
}

/// COSE key type identifiers.
/// <https://datatracker.ietf.org/doc/html/rfc8152#section-13>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum COSEKeyTypeId {
    /// Elliptic curve keys with x and y coordinates
    EC_EC2 = 2,
    /// RSA keys
    EC_RSA = 3,
}

/// The credential data attested by the authenticator during registration.
#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    /// The AAGUID of the authenticator model.
    pub aaguid: Aaguid,
    /// The ID of this credential.
    pub credential_id: CredentialID,
    /// The credential public key as a COSE value tree.
    pub credential_pk: serde_cbor::Value,
}

/// Authenticator data as produced during a registration ceremony, parsed
/// from its raw bytes. The raw bytes are preserved because attestation
/// signatures are computed over them, never over a re-serialisation.
/// <https://w3c.github.io/webauthn/#sctn-authenticator-data>
#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    /// SHA-256 hash of the relying party ID.
    pub rp_id_hash: Vec<u8>,
    /// The raw flags byte.
    pub flags: u8,
    /// The signature counter.
    pub counter: u32,
    /// The attested credential data, present when the AT flag is set.
    pub acd: Option<AttestedCredentialData>,
    /// Authenticator extension outputs, present when the ED flag is set.
    pub extensions: Option<serde_cbor::Value>,
    raw: Vec<u8>,
}

impl AuthenticatorData {
    /// Parse authenticator data from its raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, AuthenticatorDataError> {
        if data.len() < 37 {
            return Err(AuthenticatorDataError::Truncated(data.len()));
        }
        let rp_id_hash = data[0..32].to_vec();
        let flags = data[32];
        let mut counter_bytes = [0; 4];
        counter_bytes.copy_from_slice(&data[33..37]);
        let counter = u32::from_be_bytes(counter_bytes);

        let mut rest = &data[37..];

        let acd = if flags & (1 << 6) != 0 {
            if rest.len() < 18 {
                return Err(AuthenticatorDataError::Truncated(data.len() - rest.len()));
            }
            let mut aaguid = [0; 16];
            aaguid.copy_from_slice(&rest[0..16]);
            let cred_id_len = u16::from_be_bytes([rest[16], rest[17]]) as usize;
            rest = &rest[18..];
            if rest.len() < cred_id_len {
                return Err(AuthenticatorDataError::Truncated(data.len() - rest.len()));
            }
            let credential_id = rest[..cred_id_len].to_vec();
            rest = &rest[cred_id_len..];

            let (credential_pk, consumed) = take_cbor_value(rest)
                .map_err(|e| AuthenticatorDataError::CredentialPublicKey(e.to_string()))?;
            rest = &rest[consumed..];

            Some(AttestedCredentialData {
                aaguid,
                credential_id,
                credential_pk,
            })
        } else {
            None
        };

        let extensions = if flags & (1 << 7) != 0 {
            let (ext, consumed) = take_cbor_value(rest)
                .map_err(|e| AuthenticatorDataError::CredentialPublicKey(e.to_string()))?;
            rest = &rest[consumed..];
            Some(ext)
        } else {
            None
        };

        if !rest.is_empty() {
            return Err(AuthenticatorDataError::TrailingBytes);
        }

        Ok(AuthenticatorData {
            rp_id_hash,
            flags,
            counter,
            acd,
            extensions,
            raw: data.to_vec(),
        })
    }

    /// The raw bytes this structure was parsed from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Whether the user was present for this ceremony.
    pub fn user_present(&self) -> bool {
        self.flags & (1 << 0) != 0
    }

    /// Whether the user was verified for this ceremony.
    pub fn user_verified(&self) -> bool {
        self.flags & (1 << 2) != 0
    }
}

/// Read one CBOR value from the head of `data`, returning it and the number
/// of bytes it occupied.
fn take_cbor_value(data: &[u8]) -> Result<(serde_cbor::Value, usize), serde_cbor::Error> {
    let mut deserializer = serde_cbor::Deserializer::from_slice(data);
    let value = serde_cbor::Value::deserialize(&mut deserializer)?;
    Ok((value, deserializer.byte_offset()))
}

/// The attestation formats this crate can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationFormat {
    /// The `android-key` format (hardware keystore attestation).
    AndroidKey,
    /// The `tpm` format (AIK attestation).
    Tpm,
}

impl TryFrom<&str> for AttestationFormat {
    type Error = ();

    fn try_from(a: &str) -> Result<AttestationFormat, Self::Error> {
        match a {
            "android-key" => Ok(AttestationFormat::AndroidKey),
            "tpm" => Ok(AttestationFormat::Tpm),
            _ => Err(()),
        }
    }
}

/// The level of trust the statement conveys once verified. The trust path
/// carries `x5c` in its original order; chain validation against a trust
/// anchor set is the caller's responsibility.
#[derive(Debug, Clone)]
pub enum ParsedAttestation {
    /// A basic attestation: the credential certificate chain vouches for
    /// the credential key.
    Basic(Vec<openssl::x509::X509>),
    /// The statement verified, but its trust can only be established by
    /// validating the chain against a vendor root store.
    Uncertain(Vec<openssl::x509::X509>),
}

impl ParsedAttestation {
    /// The certificate chain for the caller to validate, leaf first.
    pub fn trust_path(&self) -> &[openssl::x509::X509] {
        match self {
            ParsedAttestation::Basic(chain) => chain,
            ParsedAttestation::Uncertain(chain) => chain,
        }
    }
}

/// Policy controlling which authorization list an android-key attestation
/// must carry its key properties in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustLevel {
    /// Accept key properties from the software enforced list or the TEE
    /// enforced list.
    SoftwareEnforced,
    /// Require key properties to be enforced by the trusted execution
    /// environment.
    TeeEnforced,
}

/// Configuration for android-key attestation verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidKeyFormatConfig {
    /// The authorization list policy to enforce.
    pub required_trust_level: TrustLevel,
}
