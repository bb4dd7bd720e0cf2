//! Wire format parsers for the TPM 2.0 structures embedded in a `tpm`
//! attestation statement: `TPMS_ATTEST` (certInfo) and `TPMT_PUBLIC`
//! (pubArea). All integers are big endian; all variable length fields are
//! preceded by a u16 big endian length.
//!
//! Both structures keep the buffer they were parsed from. Attestation
//! signatures and names are computed over those original bytes, so neither
//! structure offers a serialiser - re-encoding is never correct here.

use std::convert::TryFrom;

use nom::combinator::all_consuming;
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u32, be_u64, be_u8};
use nom::IResult;

use crate::error::TpmDecodeError;

/// The constant marking a structure as TPM generated, per TPMv2-Part2
/// section 6.2.
pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;

/// TPM_ST_ATTEST_CERTIFY, per TPMv2-Part2 section 6.9.
pub const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

/// The TPM algorithm identifiers this crate understands, per TPMv2-Part2
/// section 6.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmAlgId {
    /// TPM_ALG_RSA
    Rsa = 0x0001,
    /// TPM_ALG_SHA1
    Sha1 = 0x0004,
    /// TPM_ALG_SHA256
    Sha256 = 0x000b,
    /// TPM_ALG_ECC
    Ecc = 0x0023,
}

/// The TPM elliptic curve identifiers this crate understands, per
/// TPMv2-Part2 section 6.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmiEccCurve {
    /// TPM_ECC_NIST_P256
    NistP256 = 0x0003,
    /// TPM_ECC_NIST_P384
    NistP384 = 0x0004,
    /// TPM_ECC_NIST_P521
    NistP521 = 0x0005,
}

/// TPMS_CLOCK_INFO, per TPMv2-Part2 section 10.11.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsClockInfo {
    /// TPM clock in milliseconds.
    pub clock: u64,
    /// Number of TPM resets.
    pub reset_count: u32,
    /// Number of TPM restarts.
    pub restart_count: u32,
    /// Whether clock can only have advanced since the last report.
    /// Decoded as `byte == 1`; never consulted by the verifier.
    pub safe: bool,
}

/// TPMS_CERTIFY_INFO, per TPMv2-Part2 section 10.12.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsCertifyInfo {
    /// The qualified name of the certified object.
    pub name: Vec<u8>,
    /// The qualified name of the parent of the certified object.
    pub qualified_name: Vec<u8>,
}

/// TPMS_ATTEST, per TPMv2-Part2 section 10.12.8. The certInfo of a `tpm`
/// attestation statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    /// The indication that this structure was created by a TPM. The
    /// verifier, not the parser, requires this to be TPM_GENERATED_VALUE.
    pub magic: u32,
    /// Type of the attestation structure.
    pub type_: u16,
    /// Qualified name of the signing key.
    pub qualified_signer: Vec<u8>,
    /// External information supplied by the caller.
    pub extra_data: Vec<u8>,
    /// Clock, resetCount, restartCount and safe.
    pub clock_info: TpmsClockInfo,
    /// TPM firmware version.
    pub firmware_version: u64,
    /// The certified object names.
    pub attested: TpmsCertifyInfo,
    raw: Vec<u8>,
}

impl TpmsAttest {
    /// The bytes this structure was parsed from, preserved verbatim.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// RSA public parameters, per TPMv2-Part2 section 12.2.3.5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsRsaParms {
    /// Symmetric algorithm, kept opaque.
    pub symmetric: u16,
    /// Signing scheme, kept opaque.
    pub scheme: u16,
    /// Number of bits in the public modulus.
    pub key_bits: u16,
    /// The public exponent. A value of zero on the wire means 65537 and is
    /// substituted during parsing.
    pub exponent: u32,
}

/// ECC public parameters, per TPMv2-Part2 section 12.2.3.6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsEccParms {
    /// Symmetric algorithm, kept opaque.
    pub symmetric: u16,
    /// Signing scheme, kept opaque.
    pub scheme: u16,
    /// The curve the key is on.
    pub curve_id: TpmiEccCurve,
    /// Key derivation scheme, kept opaque.
    pub kdf: u16,
}

/// The algorithm specific public parameters of a TPMT_PUBLIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicParms {
    /// Parameters of an RSA key.
    Rsa(TpmsRsaParms),
    /// Parameters of an ECC key.
    Ecc(TpmsEccParms),
}

/// The algorithm specific unique field of a TPMT_PUBLIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicId {
    /// The RSA public modulus, big endian.
    Rsa(Vec<u8>),
    /// The ECC public point coordinates, big endian.
    Ecc {
        /// The X coordinate.
        x: Vec<u8>,
        /// The Y coordinate.
        y: Vec<u8>,
    },
}

/// TPMT_PUBLIC, per TPMv2-Part2 section 12.2.4. The pubArea of a `tpm`
/// attestation statement, describing the credential public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    /// The key type. Only RSA and ECC keys are supported.
    pub type_: TpmAlgId,
    /// The algorithm used to compute the name of this object. Only SHA1
    /// and SHA256 are supported.
    pub name_alg: TpmAlgId,
    /// The raw nameAlg identifier, prepended to the name digest.
    pub name_alg_raw: u16,
    /// Object attribute flags, kept opaque.
    pub object_attributes: u32,
    /// Policy digest for object authorization.
    pub auth_policy: Vec<u8>,
    /// The algorithm specific parameters.
    pub parameters: TpmuPublicParms,
    /// The unique identifier (key material) of the object.
    pub unique: TpmuPublicId,
    raw: Vec<u8>,
}

impl TpmtPublic {
    /// The bytes this structure was parsed from, preserved verbatim.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// A u16 length-prefixed byte blob (the TPM2B_* pattern).
fn tpm2b(i: &[u8]) -> IResult<&[u8], &[u8]> {
    length_data(be_u16)(i)
}

fn tpms_clock_info(i: &[u8]) -> IResult<&[u8], TpmsClockInfo> {
    let (i, clock) = be_u64(i)?;
    let (i, reset_count) = be_u32(i)?;
    let (i, restart_count) = be_u32(i)?;
    let (i, safe) = be_u8(i)?;
    Ok((
        i,
        TpmsClockInfo {
            clock,
            reset_count,
            restart_count,
            safe: safe == 1,
        },
    ))
}

fn tpms_attest_inner(i: &[u8]) -> IResult<&[u8], TpmsAttest> {
    let (i, magic) = be_u32(i)?;
    let (i, type_) = be_u16(i)?;
    let (i, qualified_signer) = tpm2b(i)?;
    let (i, extra_data) = tpm2b(i)?;
    let (i, clock_info) = tpms_clock_info(i)?;
    let (i, firmware_version) = be_u64(i)?;
    let (i, name) = tpm2b(i)?;
    let (i, qualified_name) = tpm2b(i)?;
    Ok((
        i,
        TpmsAttest {
            magic,
            type_,
            qualified_signer: qualified_signer.to_vec(),
            extra_data: extra_data.to_vec(),
            clock_info,
            firmware_version,
            attested: TpmsCertifyInfo {
                name: name.to_vec(),
                qualified_name: qualified_name.to_vec(),
            },
            raw: Vec::new(),
        },
    ))
}

fn fail(i: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(i, nom::error::ErrorKind::Tag))
}

fn tpmt_public_inner(i: &[u8]) -> IResult<&[u8], TpmtPublic> {
    let at_type = i;
    let (i, type_raw) = be_u16(i)?;
    let type_ = match type_raw {
        0x0001 => TpmAlgId::Rsa,
        0x0023 => TpmAlgId::Ecc,
        _ => return Err(fail(at_type)),
    };

    let at_name_alg = i;
    let (i, name_alg_raw) = be_u16(i)?;
    let name_alg = match name_alg_raw {
        0x0004 => TpmAlgId::Sha1,
        0x000b => TpmAlgId::Sha256,
        _ => return Err(fail(at_name_alg)),
    };

    let (i, object_attributes) = be_u32(i)?;
    let (i, auth_policy) = tpm2b(i)?;

    let (i, parameters, unique) = match type_ {
        TpmAlgId::Rsa => {
            let (i, symmetric) = be_u16(i)?;
            let (i, scheme) = be_u16(i)?;
            let (i, key_bits) = be_u16(i)?;
            let (i, exponent) = be_u32(i)?;
            // An exponent of zero indicates the TPM default of 2^16 + 1.
            let exponent = if exponent == 0 { 65537 } else { exponent };
            let (i, modulus) = tpm2b(i)?;
            (
                i,
                TpmuPublicParms::Rsa(TpmsRsaParms {
                    symmetric,
                    scheme,
                    key_bits,
                    exponent,
                }),
                TpmuPublicId::Rsa(modulus.to_vec()),
            )
        }
        TpmAlgId::Ecc => {
            let (i, symmetric) = be_u16(i)?;
            let (i, scheme) = be_u16(i)?;
            let at_curve = i;
            let (i, curve_raw) = be_u16(i)?;
            let curve_id = match curve_raw {
                0x0003 => TpmiEccCurve::NistP256,
                0x0004 => TpmiEccCurve::NistP384,
                0x0005 => TpmiEccCurve::NistP521,
                _ => return Err(fail(at_curve)),
            };
            let (i, kdf) = be_u16(i)?;
            let (i, x) = tpm2b(i)?;
            let (i, y) = tpm2b(i)?;
            (
                i,
                TpmuPublicParms::Ecc(TpmsEccParms {
                    symmetric,
                    scheme,
                    curve_id,
                    kdf,
                }),
                TpmuPublicId::Ecc {
                    x: x.to_vec(),
                    y: y.to_vec(),
                },
            )
        }
        _ => return Err(fail(at_type)),
    };

    Ok((
        i,
        TpmtPublic {
            type_,
            name_alg,
            name_alg_raw,
            object_attributes,
            auth_policy: auth_policy.to_vec(),
            parameters,
            unique,
            raw: Vec::new(),
        },
    ))
}

fn nom_error(data: &[u8], e: nom::Err<nom::error::Error<&[u8]>>) -> TpmDecodeError {
    match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => TpmDecodeError::Tpm(
            data.len() - e.input.len(),
            e.code.description().to_string(),
        ),
        nom::Err::Incomplete(_) => {
            TpmDecodeError::Tpm(data.len(), "input exhausted".to_string())
        }
    }
}

impl TryFrom<&[u8]> for TpmsAttest {
    type Error = TpmDecodeError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        all_consuming(tpms_attest_inner)(data)
            .map(|(_, mut attest)| {
                attest.raw = data.to_vec();
                attest
            })
            .map_err(|e| nom_error(data, e))
    }
}

impl TryFrom<&[u8]> for TpmtPublic {
    type Error = TpmDecodeError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        all_consuming(tpmt_public_inner)(data)
            .map(|(_, mut public)| {
                public.raw = data.to_vec();
                public
            })
            .map_err(|e| nom_error(data, e))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    pub(crate) fn sample_attest_bytes(
        magic: u32,
        type_: u16,
        extra_data: &[u8],
        name: &[u8],
    ) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&magic.to_be_bytes());
        v.extend_from_slice(&type_.to_be_bytes());
        v.extend_from_slice(&4u16.to_be_bytes());
        v.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        v.extend_from_slice(&(extra_data.len() as u16).to_be_bytes());
        v.extend_from_slice(extra_data);
        v.extend_from_slice(&0x55u64.to_be_bytes());
        v.extend_from_slice(&1u32.to_be_bytes());
        v.extend_from_slice(&2u32.to_be_bytes());
        v.push(0x01);
        v.extend_from_slice(&0x99u64.to_be_bytes());
        v.extend_from_slice(&(name.len() as u16).to_be_bytes());
        v.extend_from_slice(name);
        v.extend_from_slice(&4u16.to_be_bytes());
        v.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        v
    }

    pub(crate) fn sample_rsa_public_bytes(exponent: u32, modulus: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&0x0001u16.to_be_bytes()); // TPM_ALG_RSA
        v.extend_from_slice(&0x000bu16.to_be_bytes()); // TPM_ALG_SHA256
        v.extend_from_slice(&0x0005_0072u32.to_be_bytes());
        v.extend_from_slice(&0u16.to_be_bytes()); // empty authPolicy
        v.extend_from_slice(&0x0010u16.to_be_bytes()); // TPM_ALG_NULL
        v.extend_from_slice(&0x0010u16.to_be_bytes()); // TPM_ALG_NULL
        v.extend_from_slice(&2048u16.to_be_bytes());
        v.extend_from_slice(&exponent.to_be_bytes());
        v.extend_from_slice(&(modulus.len() as u16).to_be_bytes());
        v.extend_from_slice(modulus);
        v
    }

    fn sample_ecc_public_bytes(curve: u16, name_alg: u16) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&0x0023u16.to_be_bytes()); // TPM_ALG_ECC
        v.extend_from_slice(&name_alg.to_be_bytes());
        v.extend_from_slice(&0x0005_0072u32.to_be_bytes());
        v.extend_from_slice(&0u16.to_be_bytes());
        v.extend_from_slice(&0x0010u16.to_be_bytes());
        v.extend_from_slice(&0x0018u16.to_be_bytes()); // TPM_ALG_ECDSA
        v.extend_from_slice(&curve.to_be_bytes());
        v.extend_from_slice(&0x0010u16.to_be_bytes());
        v.extend_from_slice(&32u16.to_be_bytes());
        v.extend_from_slice(&[0x0a; 32]);
        v.extend_from_slice(&32u16.to_be_bytes());
        v.extend_from_slice(&[0x0b; 32]);
        v
    }

    #[test]
    fn parse_tpms_attest() {
        let data =
            sample_attest_bytes(TPM_GENERATED_VALUE, TPM_ST_ATTEST_CERTIFY, &[0x44; 32], &[0x77; 34]);
        let attest = TpmsAttest::try_from(data.as_slice()).unwrap();
        assert_eq!(attest.magic, TPM_GENERATED_VALUE);
        assert_eq!(attest.type_, TPM_ST_ATTEST_CERTIFY);
        assert_eq!(attest.qualified_signer, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(attest.extra_data, vec![0x44; 32]);
        assert_eq!(attest.clock_info.clock, 0x55);
        assert_eq!(attest.clock_info.reset_count, 1);
        assert_eq!(attest.clock_info.restart_count, 2);
        assert!(attest.clock_info.safe);
        assert_eq!(attest.firmware_version, 0x99);
        assert_eq!(attest.attested.name, vec![0x77; 34]);
        assert_eq!(attest.attested.qualified_name, vec![0x01, 0x02, 0x03, 0x04]);
        assert_eq!(attest.raw(), data.as_slice());
    }

    #[test]
    fn tpms_attest_unsafe_clock_values() {
        // Any safe byte other than 1 decodes as false.
        let mut data =
            sample_attest_bytes(TPM_GENERATED_VALUE, TPM_ST_ATTEST_CERTIFY, &[], &[0x77; 34]);
        // magic + type + qualifiedSigner + extraData + clock/reset/restart
        let safe_offset = 4 + 2 + (2 + 4) + 2 + (8 + 4 + 4);
        data[safe_offset] = 0xff;
        let attest = TpmsAttest::try_from(data.as_slice()).unwrap();
        assert!(!attest.clock_info.safe);
    }

    #[test]
    fn tpms_attest_must_be_exhausted() {
        let data =
            sample_attest_bytes(TPM_GENERATED_VALUE, TPM_ST_ATTEST_CERTIFY, &[0x44; 32], &[0x77; 34]);

        let mut longer = data.clone();
        longer.push(0x00);
        assert!(matches!(
            TpmsAttest::try_from(longer.as_slice()),
            Err(TpmDecodeError::Tpm(_, _))
        ));

        let shorter = &data[..data.len() - 1];
        assert!(matches!(
            TpmsAttest::try_from(shorter),
            Err(TpmDecodeError::Tpm(_, _))
        ));
    }

    #[test]
    fn parse_tpmt_public_rsa() {
        let data = sample_rsa_public_bytes(0x0101_0001, &[0xab; 256]);
        let public = TpmtPublic::try_from(data.as_slice()).unwrap();
        assert_eq!(public.type_, TpmAlgId::Rsa);
        assert_eq!(public.name_alg, TpmAlgId::Sha256);
        assert_eq!(public.name_alg_raw, 0x000b);
        match &public.parameters {
            TpmuPublicParms::Rsa(parms) => {
                assert_eq!(parms.key_bits, 2048);
                assert_eq!(parms.exponent, 65537);
            }
            _ => panic!("expected rsa parameters"),
        }
        match &public.unique {
            TpmuPublicId::Rsa(modulus) => assert_eq!(modulus, &vec![0xab; 256]),
            _ => panic!("expected rsa unique"),
        }
        assert_eq!(public.raw(), data.as_slice());
    }

    #[test]
    fn tpmt_public_rsa_zero_exponent_means_f4() {
        let data = sample_rsa_public_bytes(0, &[0xab; 256]);
        let public = TpmtPublic::try_from(data.as_slice()).unwrap();
        match &public.parameters {
            TpmuPublicParms::Rsa(parms) => assert_eq!(parms.exponent, 65537),
            _ => panic!("expected rsa parameters"),
        }
    }

    #[test]
    fn parse_tpmt_public_ecc() {
        let data = sample_ecc_public_bytes(0x0003, 0x0004);
        let public = TpmtPublic::try_from(data.as_slice()).unwrap();
        assert_eq!(public.type_, TpmAlgId::Ecc);
        assert_eq!(public.name_alg, TpmAlgId::Sha1);
        match &public.parameters {
            TpmuPublicParms::Ecc(parms) => assert_eq!(parms.curve_id, TpmiEccCurve::NistP256),
            _ => panic!("expected ecc parameters"),
        }
        match &public.unique {
            TpmuPublicId::Ecc { x, y } => {
                assert_eq!(x, &vec![0x0a; 32]);
                assert_eq!(y, &vec![0x0b; 32]);
            }
            _ => panic!("expected ecc unique"),
        }
    }

    #[test]
    fn tpmt_public_rejects_unknown_type() {
        let mut data = sample_rsa_public_bytes(0, &[0xab; 4]);
        data[0] = 0x00;
        data[1] = 0x10; // TPM_ALG_NULL is not a key type
        assert!(matches!(
            TpmtPublic::try_from(data.as_slice()),
            Err(TpmDecodeError::Tpm(0, _))
        ));
    }

    #[test]
    fn tpmt_public_rejects_unknown_name_alg() {
        let mut data = sample_rsa_public_bytes(0, &[0xab; 4]);
        data[2] = 0x00;
        data[3] = 0x0c; // TPM_ALG_SHA384 is not a legal name alg here
        assert!(matches!(
            TpmtPublic::try_from(data.as_slice()),
            Err(TpmDecodeError::Tpm(2, _))
        ));
    }

    #[test]
    fn tpmt_public_rejects_unknown_curve() {
        let mut data = sample_ecc_public_bytes(0x0010, 0x000b);
        assert!(matches!(
            TpmtPublic::try_from(data.as_slice()),
            Err(TpmDecodeError::Tpm(_, _))
        ));
        // restore a valid curve and it parses again
        data[14] = 0x00;
        data[15] = 0x05;
        assert!(TpmtPublic::try_from(data.as_slice()).is_ok());
    }

    #[test]
    fn tpmt_public_must_be_exhausted() {
        let mut data = sample_rsa_public_bytes(0, &[0xab; 256]);
        data.push(0x00);
        assert!(matches!(
            TpmtPublic::try_from(data.as_slice()),
            Err(TpmDecodeError::Tpm(_, _))
        ));
    }
}
