//! The `android-key` attestation statement format.
//!
//! An android-key statement binds the credential to a key held in the
//! Android hardware keystore. The credential certificate carries the
//! keystore's key description extension, whose authorization lists prove
//! where the key lives and what it may be used for.
//! <https://www.w3.org/TR/webauthn-3/#sctn-android-key-attestation>
//! <https://source.android.com/docs/security/features/keystore/attestation>

use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::fmt;

use openssl::pkey;
use openssl::x509;

use crate::crypto::verify_signature;
use crate::error::{AndroidKeyDecodeError, AndroidKeyVerifyError};
use crate::proto::{
    AndroidKeyFormatConfig, AuthenticatorData, COSEAlgorithm, COSEKey, ParsedAttestation,
    TrustLevel,
};

/// OID of the android keystore key description extension.
pub(crate) const ANDROID_KEY_ATTESTATION_EXT_OID: der_parser::oid::Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .11129 .2 .1 .17);

/// The key was generated in the keystore and never existed outside it.
pub const KM_ORIGIN_GENERATED: i64 = 0;
/// The key may be used to sign.
pub const KM_PURPOSE_SIGN: i64 = 2;

/// The context tags an AuthorizationList may carry, in the order the
/// grammar declares them. Anything else inside a list is a decoding error.
const AUTHORIZATION_LIST_TAGS: &[u32] = &[
    1, 2, 3, 5, 6, 10, 200, 303, 400, 401, 402, 503, 504, 505, 506, 507, 508, 509, 600, 601, 701,
    702, 703, 704, 705, 706, 709, 710, 711, 712, 713, 714, 715, 716, 717, 718, 719,
];

/// The subset of an android keystore AuthorizationList consulted during
/// attestation verification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorizationList {
    /// `[1]` The purposes the key may be used for.
    pub purpose: Option<BTreeSet<i64>>,
    /// `[600]` Present when the key is usable by all applications.
    pub all_applications: Option<()>,
    /// `[702]` Where the key material originated.
    pub origin: Option<i64>,
}

impl AuthorizationList {
    pub(crate) fn parse(i: &[u8]) -> der_parser::error::BerResult<Self> {
        use der_parser::ber::BerObjectContent;
        use der_parser::{der::*, error::BerError};
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError.into()));
            }

            let mut list = AuthorizationList::default();
            let mut last_tag: Option<u32> = None;

            let mut i = i;
            while !i.is_empty() {
                let (k, obj) = parse_der(i)?;
                i = k;

                let Tag(tag) = obj.tag();
                if !AUTHORIZATION_LIST_TAGS.contains(&tag) {
                    return Err(nom::Err::Error(BerError::InvalidTag.into()));
                }
                // Fields appear at most once, in ascending tag order.
                if last_tag.map_or(false, |last| tag <= last) {
                    return Err(nom::Err::Error(BerError::InvalidTag.into()));
                }
                last_tag = Some(tag);

                match tag {
                    1 => {
                        if let BerObjectContent::Unknown(o) = &obj.content {
                            let (_, set) = parse_der(&o.data)?;
                            let items = match &set.content {
                                BerObjectContent::Set(items) => items,
                                _ => return Err(nom::Err::Error(BerError::BerTypeError.into())),
                            };
                            let mut purpose = BTreeSet::new();
                            for item in items {
                                purpose.insert(item.as_i64()?);
                            }
                            list.purpose = Some(purpose);
                        }
                    }
                    600 => {
                        list.all_applications = Some(());
                    }
                    702 => {
                        if let BerObjectContent::Unknown(o) = &obj.content {
                            let (_, val) = parse_der_integer(&o.data)?;
                            list.origin = Some(val.as_i64()?);
                        }
                    }
                    _ => continue,
                }
            }

            Ok((i, list))
        })(i)
    }
}

/// The parsed android keystore key description extension
/// (OID 1.3.6.1.4.1.11129.2.1.17).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescription {
    /// The challenge baked into the attestation. Must equal the client
    /// data hash of the ceremony, so it is always a 32 byte digest.
    pub attestation_challenge: Vec<u8>,
    /// Properties enforced by the Android system.
    pub software_enforced: AuthorizationList,
    /// Properties enforced by the trusted execution environment.
    pub tee_enforced: AuthorizationList,
}

impl KeyDescription {
    pub(crate) fn parse(i: &[u8]) -> der_parser::error::BerResult<Self> {
        use der_parser::{der::*, error::BerError};
        parse_der_container(|i: &[u8], hdr: Header| {
            if hdr.tag() != Tag::Sequence {
                return Err(nom::Err::Error(BerError::BerTypeError.into()));
            }
            let (i, attestation_version) = parse_der_integer(i)?;
            let _attestation_version = attestation_version.as_i64()?;

            let (i, attest_sec_level) = parse_der_enum(i)?;
            let _attest_sec_level = attest_sec_level.as_u32()?;
            let (i, _) = parse_der_integer(i)?; // keymasterVersion
            let (i, km_sec_level) = parse_der_enum(i)?;
            let _km_sec_level = km_sec_level.as_u32()?;

            let (i, attestation_challenge) = parse_der_octetstring(i)?;
            let attestation_challenge = attestation_challenge.as_slice()?;
            // The challenge must be the client data hash, a SHA-256 digest.
            if attestation_challenge.len() != 32 {
                return Err(nom::Err::Error(BerError::InvalidLength.into()));
            }

            // uniqueId. Emitters disagree on its encoding; skip exactly one
            // element without inspecting it.
            let (i, _unique_id) = parse_der(i)?;

            let (i, software_enforced) = AuthorizationList::parse(i)?;
            let (i, tee_enforced) = AuthorizationList::parse(i)?;

            let data = KeyDescription {
                attestation_challenge: attestation_challenge.to_vec(),
                software_enforced,
                tee_enforced,
            };

            Ok((i, data))
        })(i)
    }
}

/// A decoded `android-key` attestation statement.
///
/// Constructed once by [`AndroidKeyAttestationStatement::decode`], immutable
/// afterwards, and consumed by [`AndroidKeyAttestationStatement::verify`].
#[derive(Clone)]
pub struct AndroidKeyAttestationStatement {
    /// The COSE algorithm the attestation signature was produced with.
    pub(crate) alg: COSEAlgorithm,
    /// The attestation signature.
    pub(crate) sig: Vec<u8>,
    /// The credential certificate and its chain, leaf first.
    pub(crate) x5c: Vec<x509::X509>,
    /// The DER of each element of x5c, preserved verbatim.
    pub(crate) x5c_raw: Vec<Vec<u8>>,
    /// The subject public key of the credential certificate.
    pub(crate) credential_certificate_key: pkey::PKey<pkey::Public>,
    /// The parsed key description extension of the credential certificate.
    pub(crate) att_ext: KeyDescription,
}

impl fmt::Debug for AndroidKeyAttestationStatement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AndroidKeyAttestationStatement")
            .field("alg", &self.alg)
            .field("x5c_len", &self.x5c.len())
            .field("att_ext", &self.att_ext)
            .finish()
    }
}

impl AndroidKeyAttestationStatement {
    /// The COSE algorithm of the attestation signature.
    pub fn alg(&self) -> COSEAlgorithm {
        self.alg
    }

    /// The certificate chain of the statement, leaf first.
    pub fn x5c(&self) -> &[x509::X509] {
        &self.x5c
    }

    /// The parsed key description extension.
    pub fn att_ext(&self) -> &KeyDescription {
        &self.att_ext
    }

    /// Decode a statement from the attStmt CBOR map of an attestation
    /// object.
    pub fn decode(
        att_stmt: &serde_cbor::Value,
    ) -> Result<AndroidKeyAttestationStatement, AndroidKeyDecodeError> {
        let unexpected = || AndroidKeyDecodeError::UnexpectedCborStructure(att_stmt.clone());

        let att_stmt_map = cbor_try_map!(att_stmt).map_err(|_| unexpected())?;

        let alg = {
            let alg_value = att_stmt_map
                .get(&serde_cbor::Value::Text("alg".to_string()))
                .ok_or_else(unexpected)?;
            let alg_int = cbor_try_i128!(alg_value).map_err(|_| unexpected())?;
            COSEAlgorithm::try_from(alg_int).map_err(|_| {
                AndroidKeyDecodeError::UnknownAlgorithmIdentifier(
                    i32::try_from(alg_int).unwrap_or(i32::MIN),
                )
            })?
        };

        let sig = {
            let sig_value = att_stmt_map
                .get(&serde_cbor::Value::Text("sig".to_string()))
                .ok_or_else(unexpected)?;
            cbor_try_bytes!(sig_value).map_err(|_| unexpected())?.clone()
        };

        let x5c_raw = {
            let x5c_value = att_stmt_map
                .get(&serde_cbor::Value::Text("x5c".to_string()))
                .ok_or_else(unexpected)?;
            let x5c_array = cbor_try_array!(x5c_value).map_err(|_| unexpected())?;
            // Must have at least one x509 cert, the credential certificate.
            if x5c_array.is_empty() {
                return Err(unexpected());
            }
            x5c_array
                .iter()
                .map(|value| cbor_try_bytes!(value).map(|b| b.clone()).map_err(|_| unexpected()))
                .collect::<Result<Vec<_>, _>>()?
        };

        let x5c = x5c_raw
            .iter()
            .map(|der| {
                x509::X509::from_der(der)
                    .map_err(|e| AndroidKeyDecodeError::Certificate(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (_, cred_cert) = x509_parser::parse_x509_certificate(&x5c_raw[0])
            .map_err(|e| AndroidKeyDecodeError::Certificate(e.to_string()))?;

        let att_ext = cred_cert
            .extensions()
            .iter()
            .find(|extension| extension.oid == ANDROID_KEY_ATTESTATION_EXT_OID)
            .ok_or(AndroidKeyDecodeError::CertificateExtensionMissing)
            .and_then(|extension| {
                KeyDescription::parse(extension.value)
                    .map(|(_, data)| data)
                    .map_err(|e| AndroidKeyDecodeError::CertificateExtension(e.to_string()))
            })?;

        let credential_certificate_key = x5c[0].public_key().map_err(|_| {
            AndroidKeyDecodeError::PublicKey(cred_cert.public_key().raw.to_vec())
        })?;

        Ok(AndroidKeyAttestationStatement {
            alg,
            sig,
            x5c,
            x5c_raw,
            credential_certificate_key,
            att_ext,
        })
    }

    /// Re-encode the fields preserved by the wire format as a CBOR map.
    pub fn to_cbor(&self) -> serde_cbor::Value {
        let mut map = BTreeMap::new();
        map.insert(
            serde_cbor::Value::Text("alg".to_string()),
            serde_cbor::Value::Integer(i64::from(self.alg) as i128),
        );
        map.insert(
            serde_cbor::Value::Text("sig".to_string()),
            serde_cbor::Value::Bytes(self.sig.clone()),
        );
        map.insert(
            serde_cbor::Value::Text("x5c".to_string()),
            serde_cbor::Value::Array(
                self.x5c_raw
                    .iter()
                    .map(|der| serde_cbor::Value::Bytes(der.clone()))
                    .collect(),
            ),
        );
        serde_cbor::Value::Map(map)
    }

    /// Run the android-key verification procedure over this statement.
    ///
    /// On success the attestation type is Basic with trust path x5c; chain
    /// validation is the caller's responsibility.
    pub fn verify(
        &self,
        auth_data: &AuthenticatorData,
        client_data_hash: &[u8],
        config: AndroidKeyFormatConfig,
    ) -> Result<ParsedAttestation, AndroidKeyVerifyError> {
        debug!("begin android-key attestation verification");

        // 1. Verify that sig is a valid signature over the concatenation of
        //    authenticatorData and clientDataHash using the public key in
        //    the first certificate in x5c with the algorithm in alg.
        let verification_data: Vec<u8> = auth_data
            .raw()
            .iter()
            .chain(client_data_hash.iter())
            .copied()
            .collect();

        let attestn_cert = self.x5c.first().ok_or_else(|| {
            AndroidKeyVerifyError::VerificationFailure("x5c is empty".to_string())
        })?;

        let verified = verify_signature(self.alg, attestn_cert, &self.sig, &verification_data)
            .map_err(|e| AndroidKeyVerifyError::VerificationFailure(e.to_string()))?;
        if !verified {
            error!("signature verification failed!");
            return Err(AndroidKeyVerifyError::VerificationFailure(
                "signature over authenticator data did not verify".to_string(),
            ));
        }

        // 2. Verify that the public key in the first certificate in x5c
        //    matches the credentialPublicKey in authenticatorData. Equality
        //    is on key material, not on any encoded form.
        let acd = auth_data
            .acd
            .as_ref()
            .ok_or(AndroidKeyVerifyError::CredentialKeyMismatch)?;
        let credential_public_key = COSEKey::try_from(&acd.credential_pk)
            .map_err(|_| AndroidKeyVerifyError::CredentialKeyMismatch)?;
        let credential_pkey = credential_public_key
            .get_openssl_pkey()
            .map_err(|_| AndroidKeyVerifyError::CredentialKeyMismatch)?;
        if !credential_pkey.public_eq(&self.credential_certificate_key) {
            return Err(AndroidKeyVerifyError::CredentialKeyMismatch);
        }

        // 3. Verify that the attestationChallenge in the key description
        //    is identical to clientDataHash.
        if self.att_ext.attestation_challenge != client_data_hash {
            return Err(AndroidKeyVerifyError::ClientDataHashMismatch);
        }

        // 4. and 5. Authorization list requirements.
        assert_authorization_requirements(&self.att_ext, config.required_trust_level)?;

        Ok(ParsedAttestation::Basic(self.x5c.clone()))
    }
}

/// Enforce the authorization list requirements of the android-key
/// verification procedure.
///
/// The credential must be scoped to the RP, so allApplications may not be
/// present in either list. The key must have been generated on the device
/// and be a signing key; with [`TrustLevel::TeeEnforced`] both properties
/// must sit in the TEE enforced list, with [`TrustLevel::SoftwareEnforced`]
/// either list will do. The purpose must be exactly {KM_PURPOSE_SIGN} - a
/// key that may also do other things is rejected.
pub(crate) fn assert_authorization_requirements(
    ext: &KeyDescription,
    level: TrustLevel,
) -> Result<(), AndroidKeyVerifyError> {
    if ext.software_enforced.all_applications.is_some()
        || ext.tee_enforced.all_applications.is_some()
    {
        return Err(AndroidKeyVerifyError::AllApplicationsFieldFound);
    }

    let required_purpose: BTreeSet<i64> = std::iter::once(KM_PURPOSE_SIGN).collect();

    match level {
        TrustLevel::TeeEnforced => {
            if ext.tee_enforced.origin != Some(KM_ORIGIN_GENERATED) {
                return Err(AndroidKeyVerifyError::OriginFieldInvalid);
            }
            if ext.tee_enforced.purpose.as_ref() != Some(&required_purpose) {
                return Err(AndroidKeyVerifyError::PurposeFieldInvalid);
            }
        }
        TrustLevel::SoftwareEnforced => {
            if ext.software_enforced.origin != Some(KM_ORIGIN_GENERATED)
                && ext.tee_enforced.origin != Some(KM_ORIGIN_GENERATED)
            {
                return Err(AndroidKeyVerifyError::OriginFieldInvalid);
            }
            if ext.software_enforced.purpose.as_ref() != Some(&required_purpose)
                && ext.tee_enforced.purpose.as_ref() != Some(&required_purpose)
            {
                return Err(AndroidKeyVerifyError::PurposeFieldInvalid);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::fixtures;

    fn der_int(v: u8) -> Vec<u8> {
        vec![0x02, 0x01, v]
    }

    fn der_enum(v: u8) -> Vec<u8> {
        vec![0x0a, 0x01, v]
    }

    fn der_octets(b: &[u8]) -> Vec<u8> {
        let mut v = vec![0x04, b.len() as u8];
        v.extend_from_slice(b);
        v
    }

    fn der_null() -> Vec<u8> {
        vec![0x05, 0x00]
    }

    fn der_seq(children: &[Vec<u8>]) -> Vec<u8> {
        let content: Vec<u8> = children.iter().flatten().copied().collect();
        let mut v = vec![0x30, content.len() as u8];
        v.extend_from_slice(&content);
        v
    }

    fn der_set(children: &[Vec<u8>]) -> Vec<u8> {
        let content: Vec<u8> = children.iter().flatten().copied().collect();
        let mut v = vec![0x31, content.len() as u8];
        v.extend_from_slice(&content);
        v
    }

    fn context_tag(tag: u32, inner: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        if tag < 31 {
            v.push(0xa0 | tag as u8);
        } else {
            v.push(0xbf);
            let mut groups = vec![(tag & 0x7f) as u8];
            let mut t = tag >> 7;
            while t > 0 {
                groups.push(((t & 0x7f) as u8) | 0x80);
                t >>= 7;
            }
            groups.reverse();
            v.extend_from_slice(&groups);
        }
        v.push(inner.len() as u8);
        v.extend_from_slice(inner);
        v
    }

    fn tee_list(purpose: &[u8], origin: u8) -> Vec<u8> {
        der_seq(&[
            context_tag(1, &der_set(&purpose.iter().map(|p| der_int(*p)).collect::<Vec<_>>())),
            context_tag(702, &der_int(origin)),
        ])
    }

    fn key_description(challenge: &[u8], software: Vec<u8>, tee: Vec<u8>) -> Vec<u8> {
        der_seq(&[
            der_int(3),           // attestationVersion
            der_enum(1),          // attestationSecurityLevel
            der_int(4),           // keymasterVersion
            der_enum(1),          // keymasterSecurityLevel
            der_octets(challenge),
            der_octets(&[]),      // uniqueId
            software,
            tee,
        ])
    }

    #[test]
    fn parse_key_description() {
        let data = key_description(&[0x5a; 32], der_seq(&[]), tee_list(&[2], 0));
        let (_, desc) = KeyDescription::parse(&data).unwrap();
        assert_eq!(desc.attestation_challenge, vec![0x5a; 32]);
        assert_eq!(desc.software_enforced, AuthorizationList::default());
        assert_eq!(
            desc.tee_enforced.purpose,
            Some(std::iter::once(2).collect())
        );
        assert_eq!(desc.tee_enforced.origin, Some(0));
        assert_eq!(desc.tee_enforced.all_applications, None);
    }

    #[test]
    fn key_description_challenge_must_be_a_digest() {
        let data = key_description(&[0x5a; 31], der_seq(&[]), tee_list(&[2], 0));
        assert!(KeyDescription::parse(&data).is_err());
    }

    #[test]
    fn authorization_list_collects_purpose_sets() {
        let data = tee_list(&[2, 3], 0);
        let (_, list) = AuthorizationList::parse(&data).unwrap();
        assert_eq!(list.purpose, Some([2, 3].into_iter().collect()));
    }

    #[test]
    fn authorization_list_all_applications() {
        let data = der_seq(&[context_tag(600, &der_null())]);
        let (_, list) = AuthorizationList::parse(&data).unwrap();
        assert_eq!(list.all_applications, Some(()));
    }

    #[test]
    fn authorization_list_rejects_unknown_tag() {
        let data = der_seq(&[context_tag(4, &der_int(1))]);
        assert!(AuthorizationList::parse(&data).is_err());
    }

    #[test]
    fn authorization_list_rejects_descending_tags() {
        let data = der_seq(&[
            context_tag(702, &der_int(0)),
            context_tag(1, &der_set(&[der_int(2)])),
        ]);
        assert!(AuthorizationList::parse(&data).is_err());
    }

    fn description(
        software: AuthorizationList,
        tee: AuthorizationList,
    ) -> KeyDescription {
        KeyDescription {
            attestation_challenge: vec![0; 32],
            software_enforced: software,
            tee_enforced: tee,
        }
    }

    fn signing_list() -> AuthorizationList {
        AuthorizationList {
            purpose: Some(std::iter::once(KM_PURPOSE_SIGN).collect()),
            all_applications: None,
            origin: Some(KM_ORIGIN_GENERATED),
        }
    }

    #[test]
    fn tee_policy_accepts_tee_enforced_keys() {
        let desc = description(AuthorizationList::default(), signing_list());
        assert!(assert_authorization_requirements(&desc, TrustLevel::TeeEnforced).is_ok());
    }

    #[test]
    fn tee_policy_rejects_software_only_keys() {
        let desc = description(signing_list(), AuthorizationList::default());
        assert_eq!(
            assert_authorization_requirements(&desc, TrustLevel::TeeEnforced),
            Err(AndroidKeyVerifyError::OriginFieldInvalid)
        );
    }

    #[test]
    fn software_policy_accepts_either_list() {
        let desc = description(signing_list(), AuthorizationList::default());
        assert!(
            assert_authorization_requirements(&desc, TrustLevel::SoftwareEnforced).is_ok()
        );
        let desc = description(AuthorizationList::default(), signing_list());
        assert!(
            assert_authorization_requirements(&desc, TrustLevel::SoftwareEnforced).is_ok()
        );
    }

    #[test]
    fn purpose_must_be_exactly_sign() {
        let mut list = signing_list();
        list.purpose = Some([KM_PURPOSE_SIGN, 3].into_iter().collect());
        let desc = description(AuthorizationList::default(), list);
        assert_eq!(
            assert_authorization_requirements(&desc, TrustLevel::TeeEnforced),
            Err(AndroidKeyVerifyError::PurposeFieldInvalid)
        );

        let mut list = signing_list();
        list.purpose = Some(std::iter::once(0).collect());
        let desc = description(AuthorizationList::default(), list);
        assert_eq!(
            assert_authorization_requirements(&desc, TrustLevel::TeeEnforced),
            Err(AndroidKeyVerifyError::PurposeFieldInvalid)
        );
    }

    #[test]
    fn origin_must_be_generated() {
        let mut list = signing_list();
        list.origin = Some(1);
        let desc = description(AuthorizationList::default(), list);
        assert_eq!(
            assert_authorization_requirements(&desc, TrustLevel::TeeEnforced),
            Err(AndroidKeyVerifyError::OriginFieldInvalid)
        );
    }

    #[test]
    fn all_applications_is_always_rejected() {
        let mut software = AuthorizationList::default();
        software.all_applications = Some(());
        let desc = description(software, signing_list());
        assert_eq!(
            assert_authorization_requirements(&desc, TrustLevel::TeeEnforced),
            Err(AndroidKeyVerifyError::AllApplicationsFieldFound)
        );
        assert_eq!(
            assert_authorization_requirements(&desc, TrustLevel::SoftwareEnforced),
            Err(AndroidKeyVerifyError::AllApplicationsFieldFound)
        );
    }

    #[test]
    fn decode_rejects_non_map() {
        let err = AndroidKeyAttestationStatement::decode(&serde_cbor::Value::Integer(4))
            .unwrap_err();
        assert!(matches!(
            err,
            AndroidKeyDecodeError::UnexpectedCborStructure(_)
        ));
    }

    #[test]
    fn decode_rejects_unknown_algorithm() {
        let map = fixtures::att_stmt_map(&[
            ("alg", serde_cbor::Value::Integer(-300)),
            ("sig", serde_cbor::Value::Bytes(vec![0x01])),
            (
                "x5c",
                serde_cbor::Value::Array(vec![serde_cbor::Value::Bytes(fixtures::cert_der())]),
            ),
        ]);
        assert_eq!(
            AndroidKeyAttestationStatement::decode(&map).unwrap_err(),
            AndroidKeyDecodeError::UnknownAlgorithmIdentifier(-300)
        );
    }

    #[test]
    fn decode_rejects_empty_x5c() {
        let map = fixtures::att_stmt_map(&[
            ("alg", serde_cbor::Value::Integer(-7)),
            ("sig", serde_cbor::Value::Bytes(vec![0x01])),
            ("x5c", serde_cbor::Value::Array(vec![])),
        ]);
        assert!(matches!(
            AndroidKeyAttestationStatement::decode(&map).unwrap_err(),
            AndroidKeyDecodeError::UnexpectedCborStructure(_)
        ));
    }

    #[test]
    fn decode_requires_the_attestation_extension() {
        // A certificate without the keystore extension cannot attest.
        let map = fixtures::att_stmt_map(&[
            ("alg", serde_cbor::Value::Integer(-257)),
            ("sig", serde_cbor::Value::Bytes(vec![0x01; 256])),
            (
                "x5c",
                serde_cbor::Value::Array(vec![serde_cbor::Value::Bytes(fixtures::cert_der())]),
            ),
        ]);
        assert_eq!(
            AndroidKeyAttestationStatement::decode(&map).unwrap_err(),
            AndroidKeyDecodeError::CertificateExtensionMissing
        );
    }

    #[test]
    fn verify_fails_on_bad_signature() {
        let cert = fixtures::cert();
        let statement = AndroidKeyAttestationStatement {
            alg: COSEAlgorithm::RS256,
            sig: vec![0x42; 256],
            x5c: vec![cert.clone()],
            x5c_raw: vec![fixtures::cert_der()],
            credential_certificate_key: cert.public_key().unwrap(),
            att_ext: description(AuthorizationList::default(), signing_list()),
        };
        let auth_data = fixtures::auth_data_without_acd();
        let err = statement
            .verify(
                &auth_data,
                &[0x0d; 32],
                AndroidKeyFormatConfig {
                    required_trust_level: TrustLevel::TeeEnforced,
                },
            )
            .unwrap_err();
        assert!(matches!(err, AndroidKeyVerifyError::VerificationFailure(_)));
    }

    #[test]
    fn statement_round_trips_preserved_fields() {
        let cert = fixtures::cert();
        let statement = AndroidKeyAttestationStatement {
            alg: COSEAlgorithm::ES256,
            sig: vec![0x42; 70],
            x5c: vec![cert.clone()],
            x5c_raw: vec![fixtures::cert_der()],
            credential_certificate_key: cert.public_key().unwrap(),
            att_ext: description(AuthorizationList::default(), signing_list()),
        };
        let encoded = statement.to_cbor();
        let map = cbor_try_map!(&encoded).unwrap();
        assert_eq!(
            map.get(&serde_cbor::Value::Text("alg".to_string())),
            Some(&serde_cbor::Value::Integer(-7))
        );
        assert_eq!(
            map.get(&serde_cbor::Value::Text("sig".to_string())),
            Some(&serde_cbor::Value::Bytes(vec![0x42; 70]))
        );
        assert_eq!(
            map.get(&serde_cbor::Value::Text("x5c".to_string())),
            Some(&serde_cbor::Value::Array(vec![serde_cbor::Value::Bytes(
                fixtures::cert_der()
            )]))
        );
    }
}
