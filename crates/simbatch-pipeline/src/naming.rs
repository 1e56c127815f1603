use crate::factorial::Factorial;
use sha2::{Digest, Sha256};
use std::str::FromStr;

pub const DEFAULT_HASH_LENGTH: usize = 16;

/// How a simulation's identifier is derived from its factorial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamingStrategy {
    /// The factorial's display name.
    #[default]
    Manual,
    /// The first `length` hex characters of the SHA-256 of the display name.
    Sha256 { length: usize },
}

impl FromStr for NamingStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "manual" => Ok(NamingStrategy::Manual),
            "sha256" => Ok(NamingStrategy::Sha256 {
                length: DEFAULT_HASH_LENGTH,
            }),
            other => Err(format!("unknown naming strategy: {other}")),
        }
    }
}

impl NamingStrategy {
    pub fn key(&self) -> &'static str {
        match self {
            NamingStrategy::Manual => "manual",
            NamingStrategy::Sha256 { .. } => "sha256",
        }
    }

    pub fn simulation_name(&self, factorial: &Factorial) -> String {
        let name = factorial.name();
        match self {
            NamingStrategy::Manual => name,
            NamingStrategy::Sha256 { length } => {
                let digest = sha256_hex(&name);
                digest[..(*length).min(digest.len())].to_string()
            }
        }
    }
}

fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    format!("{:x}", digest)
}
