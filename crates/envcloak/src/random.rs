//! randomness sources
//!
//! one sampling interface over several entropy sources. the caller picks
//! the source deliberately; there is no fallback between them since they
//! carry different guarantees.

use std::fmt;
use std::str::FromStr;

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::rngs::OsRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::{Error, Result};

/// entropy source selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomSource {
    /// raw bytes from the os entropy pool, read as big-endian
    OsCsprng,
    /// chacha20 csprng seeded from the os, uniform up to i64::MAX
    SoftwareCsprng,
    /// uniform in [0, 10^n), for pin style codes
    BoundedUniform,
    /// exactly n*4 random bits
    BitCountUniform,
}

impl RandomSource {
    pub const ALL: [RandomSource; 4] = [
        RandomSource::OsCsprng,
        RandomSource::SoftwareCsprng,
        RandomSource::BoundedUniform,
        RandomSource::BitCountUniform,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RandomSource::OsCsprng => "os_csprng",
            RandomSource::SoftwareCsprng => "software_csprng",
            RandomSource::BoundedUniform => "bounded_uniform",
            RandomSource::BitCountUniform => "bit_count_uniform",
        }
    }
}

impl fmt::Display for RandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RandomSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        RandomSource::ALL
            .into_iter()
            .find(|source| source.name() == normalized)
            .ok_or_else(|| Error::Configuration(format!("unknown random source: {}", s)))
    }
}

/// samples integers from the selected source
pub struct RandomnessProvider {
    software: ChaCha20Rng,
}

impl RandomnessProvider {
    /// seed the software csprng from the os, independent of thread_rng
    pub fn new() -> Self {
        Self {
            software: ChaCha20Rng::from_entropy(),
        }
    }

    /// deterministic provider for tests
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            software: ChaCha20Rng::from_seed(seed),
        }
    }

    /// sample an integer from `source`
    ///
    /// `byte_length` is the byte count for `OsCsprng`, the decimal digit
    /// count for `BoundedUniform` and half the bit count for
    /// `BitCountUniform`. `SoftwareCsprng` ignores it. lengths whose range
    /// cannot be represented are a configuration error.
    pub fn sample(&mut self, byte_length: usize, source: RandomSource) -> Result<BigUint> {
        let value = match source {
            RandomSource::OsCsprng => BigUint::from_bytes_be(&random_bytes(byte_length)),
            RandomSource::SoftwareCsprng => {
                BigUint::from(self.software.gen_range(0..=i64::MAX as u64))
            }
            RandomSource::BoundedUniform => {
                let digits = u32::try_from(byte_length).map_err(|_| {
                    Error::Configuration(format!("digit count too large: {}", byte_length))
                })?;
                let bound = BigUint::from(10u32).pow(digits);
                if bound.is_one() {
                    return Ok(BigUint::zero());
                }
                OsRng.gen_biguint_below(&bound)
            }
            RandomSource::BitCountUniform => {
                let bits = byte_length
                    .checked_mul(4)
                    .and_then(|bits| u64::try_from(bits).ok())
                    .ok_or_else(|| {
                        Error::Configuration(format!("bit count too large: {} * 4", byte_length))
                    })?;
                OsRng.gen_biguint(bits)
            }
        };
        Ok(value)
    }

    /// parse the source name first, unknown names are a configuration error
    pub fn sample_named(&mut self, byte_length: usize, source: &str) -> Result<BigUint> {
        let source = source.parse::<RandomSource>()?;
        self.sample(byte_length, source)
    }
}

impl Default for RandomnessProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// fill a fresh vec with os randomness
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// generate a fixed-size array of os randomness
pub fn random_array<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        for source in RandomSource::ALL {
            assert_eq!(source.name().parse::<RandomSource>().unwrap(), source);
        }
        assert_eq!("OS-CSPRNG".parse::<RandomSource>().unwrap(), RandomSource::OsCsprng);
    }

    #[test]
    fn test_unknown_source_is_configuration_error() {
        let mut rng = RandomnessProvider::new();
        let result = rng.sample_named(8, "dev_urandom_please");
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_os_csprng_fits_byte_length() {
        let mut rng = RandomnessProvider::new();
        for _ in 0..32 {
            let n = rng.sample(4, RandomSource::OsCsprng).unwrap();
            assert!(n.bits() <= 32);
        }
        assert!(rng.sample(0, RandomSource::OsCsprng).unwrap().is_zero());
    }

    #[test]
    fn test_bounded_uniform_range() {
        let mut rng = RandomnessProvider::new();
        let bound = BigUint::from(1_000_000u32);
        for _ in 0..64 {
            assert!(rng.sample(6, RandomSource::BoundedUniform).unwrap() < bound);
        }
        assert!(rng.sample(0, RandomSource::BoundedUniform).unwrap().is_zero());
    }

    #[test]
    fn test_bounded_uniform_large_digit_count() {
        let mut rng = RandomnessProvider::new();
        let bound = BigUint::from(10u32).pow(60);
        assert!(rng.sample(60, RandomSource::BoundedUniform).unwrap() < bound);
    }

    #[test]
    fn test_oversized_length_is_configuration_error() {
        let mut rng = RandomnessProvider::new();
        let too_many_digits = u32::MAX as usize + 2;
        assert!(matches!(
            rng.sample(too_many_digits, RandomSource::BoundedUniform),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            rng.sample(usize::MAX, RandomSource::BitCountUniform),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_bit_count_uniform() {
        let mut rng = RandomnessProvider::new();
        for _ in 0..32 {
            assert!(rng.sample(16, RandomSource::BitCountUniform).unwrap().bits() <= 64);
        }
    }

    #[test]
    fn test_software_csprng_is_seeded_independently() {
        let mut a = RandomnessProvider::with_seed([7u8; 32]);
        let mut b = RandomnessProvider::with_seed([7u8; 32]);
        let x = a.sample(0, RandomSource::SoftwareCsprng).unwrap();
        assert_eq!(x, b.sample(0, RandomSource::SoftwareCsprng).unwrap());
        assert!(x <= BigUint::from(i64::MAX as u64));
    }

    #[test]
    fn test_random_bytes_differ() {
        assert_ne!(random_array::<32>(), random_array::<32>());
        assert_eq!(random_bytes(17).len(), 17);
    }
}
