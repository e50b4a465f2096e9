// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-certificate loading: PEM decoding, X.509 parsing, and the EC /
//! P-521 structural checks every accepted certificate must pass.
//!
//! Chain/trust-store verification is intentionally not implemented (see
//! `--no-cert-check` in the CLI); the checks here are invariants of the
//! wire format, not a policy the caller can opt out of.

use std::io::BufReader;
use std::path::Path;

use der::Decode;
use p521::PublicKey;
use x509_cert::Certificate;

use crate::error::{Error, Result};

/// OID 1.2.840.10045.2.1, id-ecPublicKey.
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
/// OID 1.3.132.0.35, secp521r1 / NIST P-521.
const OID_SECP521R1: &str = "1.3.132.0.35";

/// Loads every `CERTIFICATE` PEM block in `path`, in file order, and
/// returns the P-521 public key carried by each.
pub fn load_host_public_keys(path: &Path) -> Result<Vec<PublicKey>> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let ders: Vec<Vec<u8>> = rustls_pemfile::certs(&mut reader)
        .map_err(|e| Error::io(path, e))?;
    if ders.is_empty() {
        return Err(Error::Cert {
            path: path.to_path_buf(),
            index: 0,
            reason: "no CERTIFICATE PEM blocks found".into(),
        });
    }

    ders.iter()
        .enumerate()
        .map(|(index, der)| {
            public_key_from_der(der).map_err(|reason| Error::Cert {
                path: path.to_path_buf(),
                index,
                reason,
            })
        })
        .collect()
}

fn public_key_from_der(der: &[u8]) -> std::result::Result<PublicKey, String> {
    let cert = Certificate::from_der(der).map_err(|e| format!("not a valid X.509 certificate: {e}"))?;
    let spki = &cert.tbs_certificate.subject_public_key_info;

    let alg_oid = spki.algorithm.oid.to_string();
    if alg_oid != OID_EC_PUBLIC_KEY {
        return Err(format!("subject key algorithm is {alg_oid}, not EC"));
    }

    let curve_oid = spki
        .algorithm
        .parameters
        .as_ref()
        .and_then(|p| p.decode_as::<der::asn1::ObjectIdentifier>().ok())
        .map(|oid| oid.to_string());

    let point_bytes = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| "subject public key is not an octet-aligned bit string".to_string())?;

    match curve_oid.as_deref() {
        Some(OID_SECP521R1) => PublicKey::from_sec1_bytes(point_bytes)
            .map_err(|e| format!("curve is P-521 by OID, but point is invalid: {e}")),
        Some(other) => Err(format!("subject key curve OID {other} is not P-521")),
        // No curve OID present (e.g. an implicit-curve or compressed
        // encoding some issuers emit): fall back to confirming the raw
        // point is itself a valid P-521 point.
        None => PublicKey::from_sec1_bytes(point_bytes)
            .map_err(|_| "curve OID absent and point is not a valid P-521 point".to_string()),
    }
}
