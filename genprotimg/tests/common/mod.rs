// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test-only helper: builds a minimal, self-signed-looking P-521
//! certificate PEM. `crypto::cert` only inspects `subjectPublicKeyInfo`
//! (chain/trust verification is explicitly out of scope — see
//! `--no-cert-check`), so this hand-rolled DER only needs to be
//! structurally valid ASN.1, not cryptographically meaningful.

use base64::Engine;
use genprotimg::crypto::ec::KeyPair;

fn der_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes = (len as u64).to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    let significant = &bytes[start..];
    let mut out = vec![0x80 | significant.len() as u8];
    out.extend_from_slice(significant);
    out
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(der_len(content.len()));
    out.extend_from_slice(content);
    out
}

fn der_sequence(parts: &[Vec<u8>]) -> Vec<u8> {
    let content: Vec<u8> = parts.iter().flatten().copied().collect();
    der_tlv(0x30, &content)
}

fn der_integer(value: u64) -> Vec<u8> {
    let mut bytes = value.to_be_bytes().to_vec();
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes.remove(0);
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    der_tlv(0x02, &bytes)
}

fn der_bit_string(data: &[u8]) -> Vec<u8> {
    let mut content = vec![0u8];
    content.extend_from_slice(data);
    der_tlv(0x03, &content)
}

fn der_utc_time(s: &str) -> Vec<u8> {
    der_tlv(0x17, s.as_bytes())
}

fn encode_base128(mut v: u64) -> Vec<u8> {
    if v == 0 {
        return vec![0];
    }
    let mut bytes = Vec::new();
    while v > 0 {
        bytes.push((v & 0x7f) as u8);
        v >>= 7;
    }
    bytes.reverse();
    let last = bytes.len() - 1;
    for b in &mut bytes[..last] {
        *b |= 0x80;
    }
    bytes
}

fn der_oid(dotted: &str) -> Vec<u8> {
    let arcs: Vec<u64> = dotted.split('.').map(|a| a.parse().unwrap()).collect();
    let mut body = vec![(arcs[0] * 40 + arcs[1]) as u8];
    for &arc in &arcs[2..] {
        body.extend(encode_base128(arc));
    }
    der_tlv(0x06, &body)
}

const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_SECP521R1: &str = "1.3.132.0.35";
const OID_ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";

/// Generates a fresh P-521 keypair, wraps its public key in a minimal
/// self-signed-shaped X.509 certificate, writes it as PEM to `path`, and
/// returns the keypair (mostly for tests that want the public key too).
pub fn write_host_cert(path: &std::path::Path) -> KeyPair {
    let keypair = KeyPair::generate().unwrap();
    let point = genprotimg::crypto::ec::serialize_public_key(keypair.public_key()).unwrap();

    let mut uncompressed = vec![0x04u8];
    uncompressed.extend_from_slice(&point);

    let spki = der_sequence(&[
        der_sequence(&[der_oid(OID_EC_PUBLIC_KEY), der_oid(OID_SECP521R1)]),
        der_bit_string(&uncompressed),
    ]);

    let empty_name = der_sequence(&[]);
    let validity = der_sequence(&[
        der_utc_time("250101000000Z"),
        der_utc_time("350101000000Z"),
    ]);
    let signature_alg = der_sequence(&[der_oid(OID_ECDSA_WITH_SHA256)]);

    let tbs = der_sequence(&[
        der_integer(1),
        signature_alg.clone(),
        empty_name.clone(),
        validity,
        empty_name,
        spki,
    ]);

    let cert = der_sequence(&[tbs, signature_alg, der_bit_string(&[0u8; 8])]);

    let b64 = base64::engine::general_purpose::STANDARD.encode(&cert);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for chunk in b64.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).unwrap());
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");

    std::fs::write(path, pem).unwrap();
    keypair
}
