use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_letter: bool,
    pub require_digit: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            require_letter: true,
            require_digit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Config {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    pub output_length: usize,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_cost_kib: 19456,
            time_cost: 2,
            parallelism: 1,
            output_length: 32,
        }
    }
}

impl Argon2Config {
    /// Cheap parameters for tests.
    pub fn low_memory() -> Self {
        Self {
            memory_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
            output_length: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordIssue {
    TooShort { min: usize, actual: usize },
    TooLong { max: usize, actual: usize },
    MissingLetter,
    MissingDigit,
}

impl PasswordIssue {
    pub fn message(&self) -> String {
        match self {
            Self::TooShort { min, actual } => {
                format!("Password must be at least {min} characters (currently {actual})")
            }
            Self::TooLong { max, actual } => {
                format!("Password must be at most {max} characters (currently {actual})")
            }
            Self::MissingLetter => "Password must contain at least one letter".into(),
            Self::MissingDigit => "Password must contain at least one digit".into(),
        }
    }
}

pub struct PasswordService {
    argon2: Argon2<'static>,
    policy: PasswordPolicy,
}

impl PasswordService {
    pub fn new(argon2_config: Argon2Config, policy: PasswordPolicy) -> Result<Self> {
        let params = Params::new(
            argon2_config.memory_cost_kib,
            argon2_config.time_cost,
            argon2_config.parallelism,
            Some(argon2_config.output_length),
        )
        .map_err(|e| anyhow!("Invalid Argon2 parameters: {e}"))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            policy,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(Argon2Config::default(), PasswordPolicy::default())
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
        Ok(hash.to_string())
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow!("Password verification failed: {e}")),
        }
    }

    pub fn validate(&self, password: &str) -> Vec<PasswordIssue> {
        let mut issues = Vec::new();
        let length = password.chars().count();

        if length < self.policy.min_length {
            issues.push(PasswordIssue::TooShort {
                min: self.policy.min_length,
                actual: length,
            });
        }
        if length > self.policy.max_length {
            issues.push(PasswordIssue::TooLong {
                max: self.policy.max_length,
                actual: length,
            });
        }
        if self.policy.require_letter && !password.chars().any(char::is_alphabetic) {
            issues.push(PasswordIssue::MissingLetter);
        }
        if self.policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            issues.push(PasswordIssue::MissingDigit);
        }

        issues
    }

    /// Validates then hashes. Policy failures come back as one joined message.
    pub fn hash_checked(&self, password: &str) -> Result<String, String> {
        let issues = self.validate(password);
        if !issues.is_empty() {
            return Err(issues
                .iter()
                .map(PasswordIssue::message)
                .collect::<Vec<_>>()
                .join("; "));
        }
        self.hash(password).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PasswordService {
        PasswordService::new(Argon2Config::low_memory(), PasswordPolicy::default())
            .expect("valid params")
    }

    #[test]
    fn test_hash_and_verify() {
        let service = service();
        let hash = service.hash("correct horse 42").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(service.verify("correct horse 42", &hash).expect("verify"));
        assert!(!service.verify("wrong horse 42", &hash).expect("verify"));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(service().verify("anything", "not-a-hash").is_err());
    }

    #[test]
    fn test_policy() {
        let service = service();
        assert!(service.validate("s3cretpass").is_empty());
        assert_eq!(
            service.validate("a1"),
            vec![PasswordIssue::TooShort { min: 8, actual: 2 }]
        );
        assert_eq!(service.validate("12345678"), vec![PasswordIssue::MissingLetter]);
        assert_eq!(service.validate("abcdefgh"), vec![PasswordIssue::MissingDigit]);
    }

    #[test]
    fn test_hash_checked_reports_all_issues() {
        let err = service().hash_checked("abc").unwrap_err();
        assert!(err.contains("at least 8"));
        assert!(err.contains("digit"));
    }
}
