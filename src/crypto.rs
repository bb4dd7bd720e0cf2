//! Cryptographic operation wrapper for attestation verification. This
//! module exists to allow ease of auditing, safe operation wrappers for the
//! verification engines, and cryptographic provider abstraction. This module
//! currently uses OpenSSL as the cryptographic primitive provider.

use std::convert::TryFrom;

use openssl::{bn, ec, error::ErrorStack, hash, nid, pkey, sha, sign, x509};

use crate::proto::{
    COSEAlgorithm, COSEEC2Key, COSEKey, COSEKeyType, COSEKeyTypeId, COSERSAKey, ECDSACurve,
};

// Why OpenSSL over another rust crate?
// - Well, the openssl crate allows us to reconstruct a public key from the
//   x/y group coords or an RSA modulus/exponent pair, where most others want
//   a pkcs formatted structure. As TPM pubArea and COSE keys only carry the
//   raw components, it gives us exactly what we need for these operations.

/// Failures converting or using a COSE public key.
#[derive(Debug)]
pub enum CoseKeyError {
    InvalidCborValue,
    InvalidType,
    EcdsaXYInvalid,
    RsaNEInvalid,
    OpenSsl(ErrorStack),
}

impl From<ErrorStack> for CoseKeyError {
    fn from(e: ErrorStack) -> Self {
        CoseKeyError::OpenSsl(e)
    }
}

impl ECDSACurve {
    fn to_openssl_nid(self) -> nid::Nid {
        match self {
            ECDSACurve::SECP256R1 => nid::Nid::X9_62_PRIME256V1,
            ECDSACurve::SECP384R1 => nid::Nid::SECP384R1,
            ECDSACurve::SECP521R1 => nid::Nid::SECP521R1,
        }
    }
}

impl TryFrom<&serde_cbor::Value> for COSEKey {
    type Error = CoseKeyError;

    fn try_from(d: &serde_cbor::Value) -> Result<COSEKey, Self::Error> {
        let m = cbor_try_map!(d).map_err(|_| CoseKeyError::InvalidCborValue)?;

        // See also https://tools.ietf.org/html/rfc8152#section-3.1
        // Each of these integer keys has a specific meaning.
        // Value 1 is the key type, value 3 the content/signature algorithm.
        let key_type_value = m
            .get(&serde_cbor::Value::Integer(1))
            .ok_or(CoseKeyError::InvalidCborValue)?;
        let key_type = cbor_try_i128!(key_type_value).map_err(|_| CoseKeyError::InvalidCborValue)?;

        let content_type_value = m
            .get(&serde_cbor::Value::Integer(3))
            .ok_or(CoseKeyError::InvalidCborValue)?;
        let content_type =
            cbor_try_i128!(content_type_value).map_err(|_| CoseKeyError::InvalidCborValue)?;

        let type_ = COSEAlgorithm::try_from(content_type).map_err(|_| CoseKeyError::InvalidType)?;

        if key_type == (COSEKeyTypeId::EC_EC2 as i128)
            && (type_ == COSEAlgorithm::ES256
                || type_ == COSEAlgorithm::ES384
                || type_ == COSEAlgorithm::ES512)
        {
            // This is an EC2 key consisting of crv, x, y, stored in
            // crv (-1), x (-2) and y (-3).
            let curve_type_value = m
                .get(&serde_cbor::Value::Integer(-1))
                .ok_or(CoseKeyError::InvalidCborValue)?;
            let curve_type =
                cbor_try_i128!(curve_type_value).map_err(|_| CoseKeyError::InvalidCborValue)?;
            let curve = ECDSACurve::try_from(curve_type).map_err(|_| CoseKeyError::InvalidType)?;

            let x_value = m
                .get(&serde_cbor::Value::Integer(-2))
                .ok_or(CoseKeyError::InvalidCborValue)?;
            let x = cbor_try_bytes!(x_value).map_err(|_| CoseKeyError::InvalidCborValue)?;

            let y_value = m
                .get(&serde_cbor::Value::Integer(-3))
                .ok_or(CoseKeyError::InvalidCborValue)?;
            let y = cbor_try_bytes!(y_value).map_err(|_| CoseKeyError::InvalidCborValue)?;

            let coord_len = curve.coordinate_size();
            if x.len() != coord_len || y.len() != coord_len {
                return Err(CoseKeyError::EcdsaXYInvalid);
            }

            let cose_key = COSEKey {
                type_,
                key: COSEKeyType::EC_EC2(COSEEC2Key {
                    curve,
                    x: x.to_vec(),
                    y: y.to_vec(),
                }),
            };

            // The rfc additionally states:
            //   "Applications MUST check that the curve and the key type are
            //    consistent and reject a key if they are not."
            // this means feeding the values to openssl to validate them for us!
            cose_key.validate()?;
            Ok(cose_key)
        } else if key_type == (COSEKeyTypeId::EC_RSA as i128)
            && (type_ == COSEAlgorithm::RS256
                || type_ == COSEAlgorithm::RS384
                || type_ == COSEAlgorithm::RS512
                || type_ == COSEAlgorithm::INSECURE_RS1)
        {
            // RSAKey: -1 -> n 256 bytes, -2 -> e 3 bytes
            let n_value = m
                .get(&serde_cbor::Value::Integer(-1))
                .ok_or(CoseKeyError::InvalidCborValue)?;
            let n = cbor_try_bytes!(n_value).map_err(|_| CoseKeyError::InvalidCborValue)?;

            let e_value = m
                .get(&serde_cbor::Value::Integer(-2))
                .ok_or(CoseKeyError::InvalidCborValue)?;
            let e = cbor_try_bytes!(e_value).map_err(|_| CoseKeyError::InvalidCborValue)?;

            if n.len() != 256 || e.len() != 3 {
                return Err(CoseKeyError::RsaNEInvalid);
            }

            let mut e_temp = [0; 3];
            e_temp.copy_from_slice(e.as_slice());

            let cose_key = COSEKey {
                type_,
                key: COSEKeyType::RSA(COSERSAKey {
                    n: n.to_vec(),
                    e: e_temp,
                }),
            };

            cose_key.validate()?;
            Ok(cose_key)
        } else {
            debug!(?key_type, ?type_, "unsupported COSE key type");
            Err(CoseKeyError::InvalidType)
        }
    }
}

impl COSEKey {
    pub(crate) fn validate(&self) -> Result<(), CoseKeyError> {
        self.get_openssl_pkey().map(|_| ())
    }

    /// Retrieve the public key of this COSEKey as an OpenSSL structure.
    pub(crate) fn get_openssl_pkey(&self) -> Result<pkey::PKey<pkey::Public>, CoseKeyError> {
        match &self.key {
            COSEKeyType::EC_EC2(ec2k) => {
                pkey_from_ec_coords(ec2k.curve, &ec2k.x, &ec2k.y).map_err(CoseKeyError::OpenSsl)
            }
            COSEKeyType::RSA(rsak) => {
                let nbn = bn::BigNum::from_slice(&rsak.n)?;
                let ebn = bn::BigNum::from_slice(&rsak.e)?;
                let rsa = openssl::rsa::Rsa::from_public_components(nbn, ebn)?;
                pkey::PKey::from_rsa(rsa).map_err(CoseKeyError::OpenSsl)
            }
        }
    }

    /// Verifies data was signed with this [COSEKey].
    pub fn verify_signature(
        &self,
        signature: &[u8],
        verification_data: &[u8],
    ) -> Result<bool, ErrorStack> {
        let pkey = self.get_openssl_pkey().map_err(|e| match e {
            CoseKeyError::OpenSsl(e) => e,
            _ => ErrorStack::get(),
        })?;
        let mut verifier = sign::Verifier::new(cose_digest(self.type_), &pkey)?;
        verifier.update(verification_data)?;
        verifier.verify(signature)
    }
}

/// Reconstruct an OpenSSL public key from raw elliptic curve affine
/// coordinates. Validates the point is on the curve.
pub(crate) fn pkey_from_ec_coords(
    curve: ECDSACurve,
    x: &[u8],
    y: &[u8],
) -> Result<pkey::PKey<pkey::Public>, ErrorStack> {
    let ec_group = ec::EcGroup::from_curve_name(curve.to_openssl_nid())?;
    let xbn = bn::BigNum::from_slice(x)?;
    let ybn = bn::BigNum::from_slice(y)?;
    let ec_key = ec::EcKey::from_public_key_affine_coordinates(&ec_group, &xbn, &ybn)?;
    ec_key.check_key()?;
    pkey::PKey::from_ec_key(ec_key)
}

/// Reconstruct an OpenSSL public key from a raw RSA modulus and public
/// exponent.
pub(crate) fn pkey_from_rsa_components(
    n: &[u8],
    e: u32,
) -> Result<pkey::PKey<pkey::Public>, ErrorStack> {
    let nbn = bn::BigNum::from_slice(n)?;
    let ebn = bn::BigNum::from_u32(e)?;
    let rsa = openssl::rsa::Rsa::from_public_components(nbn, ebn)?;
    pkey::PKey::from_rsa(rsa)
}

/// The message digest a COSE signature algorithm verifies with.
pub(crate) fn cose_digest(alg: COSEAlgorithm) -> hash::MessageDigest {
    match alg {
        COSEAlgorithm::ES256 | COSEAlgorithm::RS256 => hash::MessageDigest::sha256(),
        COSEAlgorithm::ES384 | COSEAlgorithm::RS384 => hash::MessageDigest::sha384(),
        COSEAlgorithm::ES512 | COSEAlgorithm::RS512 => hash::MessageDigest::sha512(),
        COSEAlgorithm::INSECURE_RS1 => hash::MessageDigest::sha1(),
    }
}

/// Validate a signature over `verification_data` against the subject public
/// key of the supplied certificate, with the digest selected by `alg`.
pub fn verify_signature(
    alg: COSEAlgorithm,
    cert: &x509::X509Ref,
    signature: &[u8],
    verification_data: &[u8],
) -> Result<bool, ErrorStack> {
    let pkey = cert.public_key()?;
    let mut verifier = sign::Verifier::new(cose_digest(alg), &pkey)?;
    verifier.update(verification_data)?;
    verifier.verify(signature)
}

/// Produce the bare digest of `data` matching the hash employed by `alg`.
/// Used to validate TPM certInfo.extraData.
pub(crate) fn only_hash_from_type(
    alg: COSEAlgorithm,
    data: &[u8],
) -> Result<Vec<u8>, ErrorStack> {
    if alg == COSEAlgorithm::INSECURE_RS1 {
        warn!("INSECURE SHA1 USAGE DETECTED");
    }
    hash::hash(cose_digest(alg), data).map(|d| d.to_vec())
}

/// Compute the sha256 of a slice of data.
pub fn compute_sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = sha::Sha256::new();
    hasher.update(data);
    hasher.finish().to_vec()
}

/// Compute the sha1 of a slice of data.
pub(crate) fn compute_sha1(data: &[u8]) -> Vec<u8> {
    let mut hasher = sha::Sha1::new();
    hasher.update(data);
    hasher.finish().to_vec()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;
    use hex_literal::hex;

    #[test]
    fn cbor_es256() {
        let hex_data = hex!(
                "A5"         // Map - 5 elements
                "01 02"      //   1:   2,  ; kty: EC2 key type
                "03 26"      //   3:  -7,  ; alg: ES256 signature algorithm
                "20 01"      //  -1:   1,  ; crv: P-256 curve
                "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d" // -2:   x,  ; x-coordinate
                "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c" // -3:   y,  ; y-coordinate
        );

        let val: serde_cbor::Value = serde_cbor::from_slice(&hex_data).unwrap();
        let key = COSEKey::try_from(&val).unwrap();

        assert_eq!(key.type_, COSEAlgorithm::ES256);
        match key.key {
            COSEKeyType::EC_EC2(pkey) => {
                assert_eq!(
                    pkey.x.as_slice(),
                    hex!("65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d")
                );
                assert_eq!(
                    pkey.y.as_slice(),
                    hex!("1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c")
                );
                assert_eq!(pkey.curve, ECDSACurve::SECP256R1);
            }
            _ => panic!("Key should be parsed EC2 key"),
        }
    }

    #[test]
    fn cbor_key_rejects_unknown_algorithm() {
        let val = serde_cbor::Value::Map(
            vec![
                (serde_cbor::Value::Integer(1), serde_cbor::Value::Integer(2)),
                (serde_cbor::Value::Integer(3), serde_cbor::Value::Integer(-8)),
            ]
            .into_iter()
            .collect(),
        );
        assert!(COSEKey::try_from(&val).is_err());
    }

    // RFC 6979 A.2.5: ECDSA P-256 w/ SHA-256 over the message "sample".
    #[test]
    fn ecdsa_p256_known_answer() {
        let key = COSEKey {
            type_: COSEAlgorithm::ES256,
            key: COSEKeyType::EC_EC2(COSEEC2Key {
                curve: ECDSACurve::SECP256R1,
                x: hex!("60FED4BA255A9D31C961EB74C6356D68C049B8923B61FA6CE669622E60F29FB6")
                    .to_vec(),
                y: hex!("7903FE1008B8BC99A41AE9E95628BC64F2F1B20C2D7E9F5177A3C294D4462299")
                    .to_vec(),
            }),
        };

        let sig = hex!(
            "3046"
            "0221 00EFD48B2AACB6A8FD1140DD9CD45E81D69D2C877B56AAF991C34D0EA84EAF3716"
            "0221 00F7CB1C942D657C41D436C7A1B6E29F65F3E900DBB9AFF4064DC4AB2F843ACDA8"
        );

        assert!(key.verify_signature(&sig, b"sample").unwrap());
        assert!(!key.verify_signature(&sig, b"samplE").unwrap_or(false));
    }

    #[test]
    fn sha256_known_answer() {
        assert_eq!(
            compute_sha256(b"abc"),
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad").to_vec()
        );
    }

    #[test]
    fn hash_from_algorithm() {
        assert_eq!(
            only_hash_from_type(COSEAlgorithm::ES256, b"abc").unwrap(),
            compute_sha256(b"abc")
        );
        assert_eq!(
            only_hash_from_type(COSEAlgorithm::INSECURE_RS1, b"abc").unwrap(),
            hex!("a9993e364706816aba3e25717850c26c9cd0d89d").to_vec()
        );
    }

    #[test]
    fn rsa_key_from_components() {
        let n = [0xABu8; 256];
        let pkey = pkey_from_rsa_components(&n, 65537).unwrap();
        let rsa = pkey.rsa().unwrap();
        assert_eq!(rsa.e().to_vec(), vec![0x01, 0x00, 0x01]);
        assert_eq!(rsa.n().to_vec(), n.to_vec());
    }
}
