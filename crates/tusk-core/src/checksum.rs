//! Chunk checksum validation
//!
//! Clients may declare a digest for each chunk they send; the engine
//! refuses to write a chunk whose bytes do not hash to the declared value.
//! Verification is pure and stateless. The set of accepted algorithms is
//! configuration, not hard-coded.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::UploadError;

/// Supported chunk digest algorithms, named as clients spell them on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
    Md5,
}

impl ChecksumAlgorithm {
    /// Every algorithm this build can compute.
    pub const ALL: [ChecksumAlgorithm; 3] = [
        ChecksumAlgorithm::Sha1,
        ChecksumAlgorithm::Sha256,
        ChecksumAlgorithm::Md5,
    ];

    /// Compute the digest of `data` under this algorithm.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            ChecksumAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            ChecksumAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            ChecksumAlgorithm::Md5 => Md5::digest(data).to_vec(),
        }
    }
}

impl Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ChecksumAlgorithm::Sha1 => write!(f, "sha1"),
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
            ChecksumAlgorithm::Md5 => write!(f, "md5"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha1" => Ok(ChecksumAlgorithm::Sha1),
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "md5" => Ok(ChecksumAlgorithm::Md5),
            _ => Err(anyhow::anyhow!("Invalid checksum algorithm: {}", s)),
        }
    }
}

/// Verifies declared chunk digests against a configured set of algorithms.
#[derive(Debug, Clone)]
pub struct ChecksumVerifier {
    supported: Vec<ChecksumAlgorithm>,
}

impl ChecksumVerifier {
    pub fn new(supported: Vec<ChecksumAlgorithm>) -> Self {
        Self { supported }
    }

    /// The algorithms this verifier accepts, for capability advertisement.
    pub fn supported(&self) -> &[ChecksumAlgorithm] {
        &self.supported
    }

    pub fn is_supported(&self, algorithm: ChecksumAlgorithm) -> bool {
        self.supported.contains(&algorithm)
    }

    /// Check `chunk` against `declared_digest` under `algorithm`.
    ///
    /// Returns `Ok(true)` when the digests match byte-for-byte, `Ok(false)`
    /// when they differ, and `UnsupportedChecksumAlgorithm` when the
    /// algorithm is unknown or not in the configured set. Comparison is not
    /// constant-time: this is an integrity check, not a secret comparison.
    pub fn verify(
        &self,
        algorithm: &str,
        declared_digest: &[u8],
        chunk: &[u8],
    ) -> Result<bool, UploadError> {
        let algorithm = ChecksumAlgorithm::from_str(algorithm)
            .map_err(|_| UploadError::UnsupportedChecksumAlgorithm(algorithm.to_string()))?;

        if !self.is_supported(algorithm) {
            return Err(UploadError::UnsupportedChecksumAlgorithm(
                algorithm.to_string(),
            ));
        }

        Ok(algorithm.digest(chunk) == declared_digest)
    }
}

impl Default for ChecksumVerifier {
    fn default() -> Self {
        Self::new(ChecksumAlgorithm::ALL.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_known_vector() {
        // sha1("abc")
        let expected = hex::decode("a9993e364706816aba3e25717850c26c9cd0d89d").unwrap();
        assert_eq!(ChecksumAlgorithm::Sha1.digest(b"abc"), expected);
    }

    #[test]
    fn test_sha256_known_vector() {
        let expected =
            hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
                .unwrap();
        assert_eq!(ChecksumAlgorithm::Sha256.digest(b"abc"), expected);
    }

    #[test]
    fn test_md5_known_vector() {
        let expected = hex::decode("900150983cd24fb0d6963f7d28e17f72").unwrap();
        assert_eq!(ChecksumAlgorithm::Md5.digest(b"abc"), expected);
    }

    #[test]
    fn test_verify_match_and_mismatch() {
        let verifier = ChecksumVerifier::default();
        let digest = ChecksumAlgorithm::Sha1.digest(b"chunk bytes");

        assert!(verifier.verify("sha1", &digest, b"chunk bytes").unwrap());
        assert!(!verifier.verify("sha1", &digest, b"other bytes").unwrap());
    }

    #[test]
    fn test_verify_unknown_algorithm() {
        let verifier = ChecksumVerifier::default();
        let result = verifier.verify("crc32", b"", b"data");
        assert!(matches!(
            result,
            Err(UploadError::UnsupportedChecksumAlgorithm(ref a)) if a == "crc32"
        ));
    }

    #[test]
    fn test_verify_algorithm_not_in_configured_set() {
        let verifier = ChecksumVerifier::new(vec![ChecksumAlgorithm::Sha256]);
        let digest = ChecksumAlgorithm::Sha1.digest(b"data");
        let result = verifier.verify("sha1", &digest, b"data");
        assert!(matches!(
            result,
            Err(UploadError::UnsupportedChecksumAlgorithm(_))
        ));
    }

    #[test]
    fn test_algorithm_round_trip_names() {
        for algorithm in ChecksumAlgorithm::ALL {
            let parsed: ChecksumAlgorithm = algorithm.to_string().parse().unwrap();
            assert_eq!(parsed, algorithm);
        }
    }
}
