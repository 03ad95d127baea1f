//! shannon entropy audit for keys and ciphertext

use std::fmt;

/// minimum bits per byte for `looks_random`
pub const RANDOM_THRESHOLD: f64 = 7.5;
/// below this many bytes the estimate is too noisy to judge
pub const MIN_AUDIT_LEN: usize = 256;

/// bits of entropy per byte, in [0, 8]. empty input is 0.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut counts = [0usize; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let entropy: f64 = counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum();

    // a single symbol sums to -0.0
    entropy.max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    LooksRandom,
    LowEntropy,
    TooShort,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::LooksRandom => write!(f, "looks random"),
            Verdict::LowEntropy => write!(f, "low entropy"),
            Verdict::TooShort => write!(f, "too short to judge"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyReport {
    pub entropy: f64,
    pub len: usize,
    pub distinct: usize,
    pub verdict: Verdict,
}

pub fn audit(data: &[u8]) -> EntropyReport {
    let entropy = shannon_entropy(data);
    let mut seen = [false; 256];
    for &byte in data {
        seen[byte as usize] = true;
    }
    let verdict = if data.len() < MIN_AUDIT_LEN {
        Verdict::TooShort
    } else if entropy >= RANDOM_THRESHOLD {
        Verdict::LooksRandom
    } else {
        Verdict::LowEntropy
    };
    EntropyReport {
        entropy,
        len: data.len(),
        distinct: seen.iter().filter(|&&s| s).count(),
        verdict,
    }
}
