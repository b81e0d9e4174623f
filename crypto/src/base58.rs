// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{sha256d, Error};

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Encode `payload` with a trailing 4-byte double-sha checksum.
pub fn to_base58check(payload: &[u8]) -> String {
    let checksum = sha256d(payload);
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum[..4]);
    encode(&data)
}

/// Decode a base58check string, verifying and stripping the checksum.
pub fn from_base58check(s: &str) -> Result<Vec<u8>, Error> {
    let data = decode(s)?;
    if data.len() < 4 {
        return Err(Error::InvalidBase58("input too short for checksum".into()));
    }
    let (payload, checksum) = data.split_at(data.len() - 4);
    if sha256d(payload)[..4] != *checksum {
        return Err(Error::InvalidBase58("checksum mismatch".into()));
    }
    Ok(payload.to_vec())
}

fn encode(data: &[u8]) -> String {
    let zeros = data.iter().take_while(|b| **b == 0).count();
    let mut digits: Vec<u8> = Vec::with_capacity(data.len() * 138 / 100 + 1);
    for &byte in data {
        let mut carry = byte as u32;
        for d in digits.iter_mut() {
            carry += (*d as u32) << 8;
            *d = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }
    let mut out = String::with_capacity(zeros + digits.len());
    for _ in 0..zeros {
        out.push('1');
    }
    for &d in digits.iter().rev() {
        out.push(ALPHABET[d as usize] as char);
    }
    out
}

fn decode(s: &str) -> Result<Vec<u8>, Error> {
    let zeros = s.bytes().take_while(|b| *b == b'1').count();
    let mut bytes: Vec<u8> = Vec::with_capacity(s.len());
    for c in s.bytes() {
        let value = ALPHABET
            .iter()
            .position(|a| *a == c)
            .ok_or_else(|| Error::InvalidBase58(format!("invalid character {:?}", c as char)))?;
        let mut carry = value as u32;
        for b in bytes.iter_mut() {
            carry += (*b as u32) * 58;
            *b = (carry & 0xFF) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xFF) as u8);
            carry >>= 8;
        }
    }
    let mut out = vec![0u8; zeros];
    out.extend(bytes.iter().rev());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn check_round_trip() {
        let payload = b"agora base58 payload";
        let s = to_base58check(payload);
        assert_eq!(from_base58check(&s).unwrap(), payload);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut s = to_base58check(b"payload");
        let last = s.pop().unwrap();
        s.push(if last == '2' { '3' } else { '2' });
        assert!(from_base58check(&s).is_err());
    }

    #[test]
    fn leading_zeros_survive() {
        let payload = [0u8, 0, 0, 7, 42];
        let s = to_base58check(&payload);
        assert_eq!(from_base58check(&s).unwrap(), payload);
    }

    #[quickcheck]
    fn round_trip_any_payload(payload: Vec<u8>) -> bool {
        from_base58check(&to_base58check(&payload)).unwrap() == payload
    }
}
