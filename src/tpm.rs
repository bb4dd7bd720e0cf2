//! The `tpm` attestation statement format.
//!
//! A tpm statement binds the credential to a key resident in a TPM: an
//! Attestation Identity Key certifies the credential key by signing a
//! `TPMS_ATTEST` structure over it, and the AIK certificate in turn names
//! the TPM vendor. <https://w3c.github.io/webauthn/#sctn-tpm-attestation>

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

use der_parser::oid::Oid;
use openssl::pkey;
use openssl::x509;
use x509_parser::extensions::ParsedExtension;

use crate::crypto::{
    self, compute_sha1, compute_sha256, only_hash_from_type, verify_signature,
};
use crate::error::{TpmDecodeError, TpmVerifyError};
use crate::internals::{
    TpmAlgId, TpmiEccCurve, TpmsAttest, TpmtPublic, TpmuPublicId, TpmuPublicParms,
    TPM_GENERATED_VALUE, TPM_ST_ATTEST_CERTIFY,
};
use crate::proto::{
    Aaguid, AttestedCredentialData, AuthenticatorData, COSEAlgorithm, COSEKey, ECDSACurve,
    ParsedAttestation,
};

pub(crate) const SUBJECT_ALTERNATIVE_NAME_OID: Oid<'static> = der_parser::oid!(2.5.29 .17);

// If cert contains an extension with OID 1.3.6.1.4.1.45724.1.1.4
// (id-fido-gen-ce-aaguid), its value must match the aaguid in
// authenticatorData.
pub(crate) const FIDO_GEN_CE_AAGUID_OID: Oid<'static> =
    der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);

pub(crate) const TCG_AT_TPM_MANUFACTURER: Oid<'static> = der_parser::oid!(2.23.133 .2 .1);
pub(crate) const TCG_AT_TPM_MODEL: Oid<'static> = der_parser::oid!(2.23.133 .2 .2);
pub(crate) const TCG_AT_TPM_VERSION: Oid<'static> = der_parser::oid!(2.23.133 .2 .3);

/// tcg-kp-AIKCertificate, the extended key usage purpose every AIK
/// certificate must carry.
pub(crate) const TCG_KP_AIK_CERTIFICATE: &str = "2.23.133.8.3";

/// The TCG registered TPM vendor IDs, as they appear in the
/// tpmManufacturer SAN attribute. The hex portion compares
/// case-insensitively.
const TPM_MANUFACTURER_IDS: &[&str] = &[
    "FFFFF1D0", // FIDO conformance testing
    "414D4400", // AMD
    "41544D4C", // Atmel
    "4252434D", // Broadcom
    "4353434F", // Cisco
    "464C5953", // Flyslice
    "48504500", // HPE
    "49424D00", // IBM
    "49465800", // Infineon
    "494E5443", // Intel
    "4C454E00", // Lenovo
    "4D534654", // Microsoft
    "4E534D20", // National Semiconductor
    "4E545A00", // Nationz
    "4E544300", // Nuvoton
    "51434F4D", // Qualcomm
    "534D5343", // SMSC
    "53544D20", // STMicroelectronics
    "534D534E", // Samsung
    "534E5300", // Sinosun
    "54584E00", // Texas Instruments
    "57454300", // Winbond
    "524F4343", // Fuzhou Rockchip
    "474F4F47", // Google
];

/// Whether a tpmManufacturer SAN value names a TCG registered vendor.
pub(crate) fn manufacturer_is_known(manufacturer: &str) -> bool {
    manufacturer
        .strip_prefix("id:")
        .map(|hex| {
            TPM_MANUFACTURER_IDS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(hex))
        })
        .unwrap_or(false)
}

/// The TPM device identity carried in the AIK certificate subject
/// alternative name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmSanData {
    /// The TPM vendor, as "id:XXXXXXXX".
    pub manufacturer: String,
    /// The vendor part number.
    pub model: String,
    /// The vendor firmware version.
    pub version: String,
}

#[derive(Default)]
struct TpmSanDataBuilder {
    manufacturer: Option<String>,
    model: Option<String>,
    version: Option<String>,
}

impl TpmSanDataBuilder {
    fn new() -> Self {
        Default::default()
    }

    fn attribute(mut self, oid: &Oid, value: String) -> Self {
        if *oid == TCG_AT_TPM_MANUFACTURER {
            self.manufacturer = Some(value);
        } else if *oid == TCG_AT_TPM_MODEL {
            self.model = Some(value);
        } else if *oid == TCG_AT_TPM_VERSION {
            self.version = Some(value);
        }
        self
    }

    fn build(self) -> Option<TpmSanData> {
        self.manufacturer
            .zip(self.model)
            .zip(self.version)
            .map(|((manufacturer, model), version)| TpmSanData {
                manufacturer,
                model,
                version,
            })
    }
}

/// Collect every (OID, DirectoryString) pair below `obj`, at any depth.
///
/// Real TPMs disagree on whether the SAN directoryName is a set of
/// sequences or a sequence of sets, so this never matches on an exact
/// container shape: it pairs each OID with the next string, wherever the
/// enclosing grammar put them.
fn walk_object<'a>(
    obj: &der_parser::ber::BerObject<'a>,
    pending: &mut Option<Oid<'a>>,
    pairs: &mut Vec<(Oid<'a>, String)>,
) {
    use der_parser::ber::BerObjectContent;
    match &obj.content {
        BerObjectContent::OID(oid) => {
            *pending = Some(oid.clone());
        }
        BerObjectContent::UTF8String(s)
        | BerObjectContent::PrintableString(s)
        | BerObjectContent::IA5String(s)
        | BerObjectContent::T61String(s) => {
            if let Some(oid) = pending.take() {
                pairs.push((oid, (*s).to_string()));
            }
        }
        BerObjectContent::Sequence(items) | BerObjectContent::Set(items) => {
            for item in items {
                walk_object(item, pending, pairs);
            }
        }
        BerObjectContent::Tagged(_, _, inner) => walk_object(inner, pending, pairs),
        BerObjectContent::Unknown(any) => walk_stream(any.data, pending, pairs),
        _ => {}
    }
}

fn walk_stream<'a>(
    mut input: &'a [u8],
    pending: &mut Option<Oid<'a>>,
    pairs: &mut Vec<(Oid<'a>, String)>,
) {
    while !input.is_empty() {
        match der_parser::der::parse_der(input) {
            Ok((rest, obj)) => {
                walk_object(&obj, pending, pairs);
                input = rest;
            }
            Err(_) => break,
        }
    }
}

impl TryFrom<&[u8]> for TpmSanData {
    type Error = String;

    fn try_from(extension_value: &[u8]) -> Result<Self, Self::Error> {
        let (_, obj) =
            der_parser::der::parse_der(extension_value).map_err(|e| e.to_string())?;
        let mut pending = None;
        let mut pairs = Vec::new();
        walk_object(&obj, &mut pending, &mut pairs);

        pairs
            .into_iter()
            .fold(TpmSanDataBuilder::new(), |builder, (oid, value)| {
                builder.attribute(&oid, value)
            })
            .build()
            .ok_or_else(|| "subjectAlternativeName lacks a tpm attribute".to_string())
    }
}

fn parse_aaguid_extension(i: &[u8]) -> Result<Aaguid, String> {
    let (_, obj) = der_parser::der::parse_der_octetstring(i).map_err(|e| e.to_string())?;
    let slice = obj.as_slice().map_err(|e| e.to_string())?;
    Aaguid::try_from(slice).map_err(|_| "aaguid must be 16 bytes".to_string())
}

/// A decoded `tpm` attestation statement.
///
/// Constructed once by [`TpmAttestationStatement::decode`], immutable
/// afterwards, and consumed by [`TpmAttestationStatement::verify`].
#[derive(Clone)]
pub struct TpmAttestationStatement {
    /// The COSE algorithm the attestation signature was produced with.
    pub(crate) alg: COSEAlgorithm,
    /// The AIK certificate and its chain, leaf first.
    pub(crate) x5c: Vec<x509::X509>,
    /// The DER of each element of x5c, preserved verbatim.
    pub(crate) x5c_raw: Vec<Vec<u8>>,
    /// The AIK certificate, x5c[0].
    pub(crate) aik_cert: x509::X509,
    /// The TPM device identity from the AIK certificate.
    pub(crate) subject_alternative_name: TpmSanData,
    /// The id-fido-gen-ce-aaguid extension value, when present.
    pub(crate) aaguid_ext: Option<Aaguid>,
    /// The extended key usage purposes of the AIK certificate, as dotted
    /// OID strings.
    pub(crate) extended_key_usage: Vec<String>,
    /// The basic constraints CA flag of the AIK certificate.
    pub(crate) basic_constraints_ca: bool,
    /// The attestation signature over certInfo.
    pub(crate) sig: Vec<u8>,
    /// The TPMS_ATTEST the signature covers, with its raw bytes.
    pub(crate) cert_info: TpmsAttest,
    /// The TPMT_PUBLIC describing the credential key, with its raw bytes.
    pub(crate) pub_area: TpmtPublic,
    /// The credential public key reconstructed from pubArea alone.
    pub(crate) pub_area_key: pkey::PKey<pkey::Public>,
}

impl fmt::Debug for TpmAttestationStatement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TpmAttestationStatement")
            .field("alg", &self.alg)
            .field("x5c_len", &self.x5c.len())
            .field("subject_alternative_name", &self.subject_alternative_name)
            .field("cert_info", &self.cert_info)
            .field("pub_area", &self.pub_area)
            .finish()
    }
}

/// Reconstruct the credential public key from the parameters and unique
/// fields of a pubArea. This is derivable from pubArea alone; the verifier
/// compares it against the credential key in authenticator data.
pub(crate) fn pub_area_key(
    pub_area: &TpmtPublic,
) -> Result<pkey::PKey<pkey::Public>, TpmDecodeError> {
    match (&pub_area.parameters, &pub_area.unique) {
        (TpmuPublicParms::Rsa(parms), TpmuPublicId::Rsa(modulus)) => {
            crypto::pkey_from_rsa_components(modulus, parms.exponent)
                .map_err(|_| TpmDecodeError::ExtractingPublicKey)
        }
        (TpmuPublicParms::Ecc(parms), TpmuPublicId::Ecc { x, y }) => {
            let curve = match parms.curve_id {
                TpmiEccCurve::NistP256 => ECDSACurve::SECP256R1,
                TpmiEccCurve::NistP384 => ECDSACurve::SECP384R1,
                TpmiEccCurve::NistP521 => ECDSACurve::SECP521R1,
            };
            crypto::pkey_from_ec_coords(curve, x, y)
                .map_err(|_| TpmDecodeError::ExtractingPublicKey)
        }
        _ => Err(TpmDecodeError::ExtractingPublicKey),
    }
}

impl TpmAttestationStatement {
    /// The COSE algorithm of the attestation signature.
    pub fn alg(&self) -> COSEAlgorithm {
        self.alg
    }

    /// The certificate chain of the statement, leaf first.
    pub fn x5c(&self) -> &[x509::X509] {
        &self.x5c
    }

    /// The parsed TPMS_ATTEST.
    pub fn cert_info(&self) -> &TpmsAttest {
        &self.cert_info
    }

    /// The parsed TPMT_PUBLIC.
    pub fn pub_area(&self) -> &TpmtPublic {
        &self.pub_area
    }

    /// The TPM device identity from the AIK certificate.
    pub fn subject_alternative_name(&self) -> &TpmSanData {
        &self.subject_alternative_name
    }

    /// Decode a statement from the attStmt CBOR map of an attestation
    /// object.
    pub fn decode(
        att_stmt: &serde_cbor::Value,
    ) -> Result<TpmAttestationStatement, TpmDecodeError> {
        let unexpected = || TpmDecodeError::UnexpectedCborStructure(att_stmt.clone());

        let att_stmt_map = cbor_try_map!(att_stmt).map_err(|_| unexpected())?;

        // The version of the TPM specification to which the signature
        // conforms. 2.0 is the only one that exists.
        let ver = {
            let ver_value = att_stmt_map
                .get(&serde_cbor::Value::Text("ver".to_string()))
                .ok_or_else(unexpected)?;
            cbor_try_string!(ver_value).map_err(|_| unexpected())?
        };
        if ver != "2.0" {
            return Err(unexpected());
        }

        let alg = {
            let alg_value = att_stmt_map
                .get(&serde_cbor::Value::Text("alg".to_string()))
                .ok_or_else(unexpected)?;
            let alg_int = cbor_try_i128!(alg_value).map_err(|_| unexpected())?;
            COSEAlgorithm::try_from(alg_int).map_err(|_| {
                TpmDecodeError::UnknownAlgorithmIdentifier(
                    i32::try_from(alg_int).unwrap_or(i32::MIN),
                )
            })?
        };

        let x5c_raw = {
            let x5c_value = att_stmt_map
                .get(&serde_cbor::Value::Text("x5c".to_string()))
                .ok_or_else(unexpected)?;
            let x5c_array = cbor_try_array!(x5c_value).map_err(|_| unexpected())?;
            // Must have at least one x509 cert, the AIK certificate.
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
                x509::X509::from_der(der).map_err(|e| TpmDecodeError::Certificate(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let aik_cert = x5c[0].clone();

        let sig = {
            let sig_value = att_stmt_map
                .get(&serde_cbor::Value::Text("sig".to_string()))
                .ok_or_else(unexpected)?;
            cbor_try_bytes!(sig_value).map_err(|_| unexpected())?.clone()
        };

        // The TPMS_ATTEST structure over which the signature was computed,
        // as specified in [TPMv2-Part2] section 10.12.8.
        let cert_info = {
            let certinfo_value = att_stmt_map
                .get(&serde_cbor::Value::Text("certInfo".to_string()))
                .ok_or_else(unexpected)?;
            let certinfo_bytes = cbor_try_bytes!(certinfo_value).map_err(|_| unexpected())?;
            TpmsAttest::try_from(certinfo_bytes.as_slice())?
        };

        // The TPMT_PUBLIC structure (see [TPMv2-Part2] section 12.2.4) used
        // by the TPM to represent the credential public key.
        let pub_area = {
            let pubarea_value = att_stmt_map
                .get(&serde_cbor::Value::Text("pubArea".to_string()))
                .ok_or_else(unexpected)?;
            let pubarea_bytes = cbor_try_bytes!(pubarea_value).map_err(|_| unexpected())?;
            TpmtPublic::try_from(pubarea_bytes.as_slice())?
        };

        let pub_area_key = pub_area_key(&pub_area)?;

        // The webauthn AIK requirements are checked during verification,
        // but the material they consult comes out of the certificate here.
        let (_, aik_parsed) = x509_parser::parse_x509_certificate(&x5c_raw[0])
            .map_err(|e| TpmDecodeError::Certificate(e.to_string()))?;

        let mut san = None;
        let mut aaguid_ext = None;
        let mut extended_key_usage = None;
        let mut basic_constraints_ca = None;

        for extension in aik_parsed.extensions() {
            if extension.oid == SUBJECT_ALTERNATIVE_NAME_OID {
                let data = TpmSanData::try_from(extension.value)
                    .map_err(TpmDecodeError::CertificateExtension)?;
                san = Some(data);
            } else if extension.oid == FIDO_GEN_CE_AAGUID_OID {
                let aaguid = parse_aaguid_extension(extension.value)
                    .map_err(TpmDecodeError::CertificateExtension)?;
                aaguid_ext = Some(aaguid);
            }
            match extension.parsed_extension() {
                ParsedExtension::ExtendedKeyUsage(eku) => {
                    extended_key_usage =
                        Some(eku.other.iter().map(|oid| oid.to_id_string()).collect());
                }
                ParsedExtension::BasicConstraints(bc) => {
                    basic_constraints_ca = Some(bc.ca);
                }
                _ => {}
            }
        }

        let subject_alternative_name = san.ok_or(TpmDecodeError::CertificateExtensionMissing)?;
        let extended_key_usage =
            extended_key_usage.ok_or(TpmDecodeError::CertificateExtensionMissing)?;
        let basic_constraints_ca =
            basic_constraints_ca.ok_or(TpmDecodeError::CertificateExtensionMissing)?;

        Ok(TpmAttestationStatement {
            alg,
            x5c,
            x5c_raw,
            aik_cert,
            subject_alternative_name,
            aaguid_ext,
            extended_key_usage,
            basic_constraints_ca,
            sig,
            cert_info,
            pub_area,
            pub_area_key,
        })
    }

    /// Re-encode the fields preserved by the wire format as a CBOR map.
    /// The certInfo and pubArea bytes are emitted verbatim.
    pub fn to_cbor(&self) -> serde_cbor::Value {
        let mut map = BTreeMap::new();
        map.insert(
            serde_cbor::Value::Text("ver".to_string()),
            serde_cbor::Value::Text("2.0".to_string()),
        );
        map.insert(
            serde_cbor::Value::Text("alg".to_string()),
            serde_cbor::Value::Integer(i64::from(self.alg) as i128),
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
        map.insert(
            serde_cbor::Value::Text("sig".to_string()),
            serde_cbor::Value::Bytes(self.sig.clone()),
        );
        map.insert(
            serde_cbor::Value::Text("certInfo".to_string()),
            serde_cbor::Value::Bytes(self.cert_info.raw().to_vec()),
        );
        map.insert(
            serde_cbor::Value::Text("pubArea".to_string()),
            serde_cbor::Value::Bytes(self.pub_area.raw().to_vec()),
        );
        serde_cbor::Value::Map(map)
    }

    /// Run the tpm verification procedure over this statement.
    ///
    /// On success the attestation type is Uncertain with trust path x5c;
    /// the caller upgrades it by validating the chain against a TPM vendor
    /// root store.
    pub fn verify(
        &self,
        auth_data: &AuthenticatorData,
        client_data_hash: &[u8],
    ) -> Result<ParsedAttestation, TpmVerifyError> {
        debug!("begin tpm attestation verification");

        // 1. Verify that the public key specified by the parameters and
        //    unique fields of pubArea is identical to the
        //    credentialPublicKey in authenticatorData.
        let acd = auth_data
            .acd
            .as_ref()
            .ok_or(TpmVerifyError::CredentialKeyMismatch)?;
        let credential_public_key = COSEKey::try_from(&acd.credential_pk)
            .map_err(|_| TpmVerifyError::InvalidPublicKey)?;
        let credential_pkey = credential_public_key
            .get_openssl_pkey()
            .map_err(|_| TpmVerifyError::InvalidPublicKey)?;
        if !credential_pkey.public_eq(&self.pub_area_key) {
            return Err(TpmVerifyError::CredentialKeyMismatch);
        }

        // 2. Concatenate authenticatorData and clientDataHash to form
        //    attToBeSigned.
        let att_to_be_signed: Vec<u8> = auth_data
            .raw()
            .iter()
            .chain(client_data_hash.iter())
            .copied()
            .collect();

        // 3. Verify that magic is set to TPM_GENERATED_VALUE.
        if self.cert_info.magic != TPM_GENERATED_VALUE {
            return Err(TpmVerifyError::InvalidMagicNumber(self.cert_info.magic));
        }

        // 4. Verify that type is set to TPM_ST_ATTEST_CERTIFY.
        if self.cert_info.type_ != TPM_ST_ATTEST_CERTIFY {
            return Err(TpmVerifyError::InvalidType(self.cert_info.type_));
        }

        // 5. Verify that extraData is set to the hash of attToBeSigned
        //    using the hash algorithm employed in "alg".
        let att_hash = only_hash_from_type(self.alg, &att_to_be_signed)
            .map_err(|_| TpmVerifyError::UnknownHashFunction)?;
        if att_hash != self.cert_info.extra_data {
            return Err(TpmVerifyError::HashMismatch(
                att_hash,
                self.cert_info.extra_data.clone(),
            ));
        }

        // 6. Verify that attested holds a valid Name for pubArea, computed
        //    with the nameAlg of pubArea over the original pubArea bytes.
        //    The name carries the algorithm identifier in its first two
        //    bytes; the spec says nothing about checking them, so they are
        //    folded into the comparison to enforce them anyway.
        let name_digest = match self.pub_area.name_alg {
            TpmAlgId::Sha1 => compute_sha1(self.pub_area.raw()),
            TpmAlgId::Sha256 => compute_sha256(self.pub_area.raw()),
            _ => return Err(TpmVerifyError::InvalidNameAlgorithm),
        };
        let mut pub_name = self.pub_area.name_alg_raw.to_be_bytes().to_vec();
        pub_name.extend_from_slice(&name_digest);
        if self.cert_info.attested.name != pub_name {
            return Err(TpmVerifyError::InvalidName(
                pub_name,
                self.cert_info.attested.name.clone(),
            ));
        }

        // 7. Verify the sig is a valid signature over certInfo using the
        //    attestation public key in the AIK certificate with the
        //    algorithm specified in alg. certInfo is the original bytes -
        //    a re-serialisation would not be byte identical.
        let valid = verify_signature(self.alg, &self.aik_cert, &self.sig, self.cert_info.raw())
            .map_err(|_| TpmVerifyError::VerificationFailure)?;
        if !valid {
            error!("signature verification failed!");
            return Err(TpmVerifyError::VerificationFailure);
        }

        // 8. Verify that the AIK certificate meets the requirements of
        //    8.3.1 TPM Attestation Statement Certificate Requirements.
        assert_aik_attest_req(self)?;

        // 9. If the AIK certificate carries id-fido-gen-ce-aaguid, it must
        //    match the aaguid in authenticatorData.
        check_aaguid_binding(self.aaguid_ext, auth_data.acd.as_ref())?;

        // The remaining TPMS_ATTEST fields (qualifiedSigner, clockInfo,
        // firmwareVersion) are risk engine inputs only and are ignored.

        Ok(ParsedAttestation::Uncertain(self.x5c.clone()))
    }
}

/// The AIK certificate requirements of the tpm attestation format.
/// <https://w3c.github.io/webauthn/#sctn-tpm-cert-requirements>
pub(crate) fn assert_aik_attest_req(
    stmt: &TpmAttestationStatement,
) -> Result<(), TpmVerifyError> {
    // Version MUST be set to 3 (which is indicated by an ASN.1 INTEGER
    // with value 2).
    let version = stmt.aik_cert.version();
    if version != 2 {
        return Err(TpmVerifyError::CertificateVersion(2, version));
    }

    // Subject field MUST be set to empty.
    if stmt.aik_cert.subject_name().entries().count() != 0 {
        return Err(TpmVerifyError::NonEmptySubjectField);
    }

    // The subject alternative name must identify a TCG registered vendor.
    if !manufacturer_is_known(&stmt.subject_alternative_name.manufacturer) {
        return Err(TpmVerifyError::UnknownVendor);
    }

    // The Extended Key Usage extension MUST contain the OID
    // 2.23.133.8.3 ("joint-iso-itu-t(2) internationalorganizations(23)
    // 133 tcg-kp(8) tcg-kp-AIKCertificate(3)").
    if !stmt
        .extended_key_usage
        .iter()
        .any(|oid| oid == TCG_KP_AIK_CERTIFICATE)
    {
        return Err(TpmVerifyError::ExtKeyOidMissing);
    }

    // The Basic Constraints extension MUST have the CA component set to
    // false.
    if stmt.basic_constraints_ca {
        return Err(TpmVerifyError::BasicConstraintsTrue);
    }

    Ok(())
}

/// Enforce the optional AAGUID binding between the AIK certificate and the
/// attested credential data.
pub(crate) fn check_aaguid_binding(
    aaguid_ext: Option<Aaguid>,
    acd: Option<&AttestedCredentialData>,
) -> Result<(), TpmVerifyError> {
    match aaguid_ext {
        Some(cert_aaguid) => {
            let acd = acd.ok_or(TpmVerifyError::CredentialAaguidMissing)?;
            if acd.aaguid != cert_aaguid {
                return Err(TpmVerifyError::CertificateAaguidMismatch);
            }
            Ok(())
        }
        None => Ok(()),
    }
}
