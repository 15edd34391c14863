//! Input rules for usernames, emails, passwords and passcodes

use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::config::{PasscodePolicy, PasswordPolicy};
use crate::error::{IdentityError, IdentityResult};

lazy_static! {
    static ref USERNAME_REGEX: Option<Regex> = Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").ok();
    static ref EMAIL_REGEX: Option<Regex> =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$").ok();
}

/// Lowercased passwords that are rejected outright
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "passw0rd", "p@ssw0rd", "p@ssword1", "123456",
    "12345678", "123456789", "1234567890", "qwerty", "qwerty123", "qwertyuiop", "abc123",
    "letmein", "letmein1!", "welcome", "welcome1", "welcome1!", "admin", "admin123", "admin@123",
    "iloveyou", "monkey", "dragon", "football", "baseball", "sunshine", "princess", "trustno1",
    "changeme", "changeme1!", "summer2024!", "winter2024!", "hello123", "secret123",
];

/// Numeric passcodes that are rejected outright
const COMMON_PASSCODES: &[&str] = &[
    "0000", "1111", "1234", "1212", "7777", "1004", "2000", "4444", "2222", "6969", "9999", "3333",
    "5555", "6666", "1122", "1313", "8888", "4321", "2001", "1010", "2580", "0852", "1478", "3690",
    "1984", "1969", "2468", "13579", "112233", "123456", "654321", "121212", "696969", "159753",
    "147258", "123321", "102030", "000000", "111111", "11223344", "12344321",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PolicyViolation {
    TooShort { min: usize },
    TooLong { max: usize },
    MissingUppercase,
    MissingLowercase,
    MissingDigit,
    MissingSpecial,
    CommonPassword,
    ContainsIdentity,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { min } => write!(f, "must be at least {min} characters"),
            Self::TooLong { max } => write!(f, "must be at most {max} characters"),
            Self::MissingUppercase => f.write_str("must contain an uppercase letter"),
            Self::MissingLowercase => f.write_str("must contain a lowercase letter"),
            Self::MissingDigit => f.write_str("must contain a digit"),
            Self::MissingSpecial => f.write_str("must contain a special character"),
            Self::CommonPassword => f.write_str("is too common"),
            Self::ContainsIdentity => f.write_str("must not contain the username or email"),
        }
    }
}

pub fn validate_username(username: &str) -> IdentityResult<()> {
    let valid = USERNAME_REGEX
        .as_ref()
        .map(|re| re.is_match(username))
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(IdentityError::InvalidUsername(
            "3-32 characters of letters, digits, '_', '.' or '-'".to_string(),
        ))
    }
}

pub fn validate_email(email: &str) -> IdentityResult<()> {
    let valid = email.len() <= 254
        && EMAIL_REGEX
            .as_ref()
            .map(|re| re.is_match(email))
            .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(IdentityError::InvalidEmail)
    }
}

fn is_special(c: char) -> bool {
    !c.is_alphanumeric() && !c.is_whitespace()
}

impl PasswordPolicy {
    /// Every rule `password` breaks, empty when it is acceptable
    pub fn violations(&self, password: &str, username: &str, email: &str) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();
        let length = password.chars().count();

        if length < self.min_length {
            violations.push(PolicyViolation::TooShort { min: self.min_length });
        }
        if length > self.max_length {
            violations.push(PolicyViolation::TooLong { max: self.max_length });
        }
        if self.require_uppercase && !password.chars().any(char::is_uppercase) {
            violations.push(PolicyViolation::MissingUppercase);
        }
        if self.require_lowercase && !password.chars().any(char::is_lowercase) {
            violations.push(PolicyViolation::MissingLowercase);
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push(PolicyViolation::MissingDigit);
        }
        if self.require_special && !password.chars().any(is_special) {
            violations.push(PolicyViolation::MissingSpecial);
        }

        let lowered = password.to_lowercase();
        if self.block_common && COMMON_PASSWORDS.contains(&lowered.as_str()) {
            violations.push(PolicyViolation::CommonPassword);
        }
        if self.forbid_identity && contains_identity(&lowered, username, email) {
            violations.push(PolicyViolation::ContainsIdentity);
        }

        violations
    }

    pub fn validate(&self, password: &str, username: &str, email: &str) -> IdentityResult<()> {
        let violations = self.violations(password, username, email);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(IdentityError::WeakPassword(violations))
        }
    }

    /// A random password that satisfies this policy
    pub fn generate_temporary(&self, username: &str, email: &str) -> String {
        const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
        const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
        const DIGITS: &[u8] = b"23456789";
        const SPECIAL: &[u8] = b"!@#$%^&*-_=+?";

        let length = self.min_length.max(16).min(self.max_length.max(4));
        let all: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();
        let mut rng = rand::thread_rng();
        let mut candidate = String::new();

        // A contradictory policy can never be met; give up after a few draws
        for _ in 0..32 {
            let mut chars: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL]
                .iter()
                .filter_map(|set| set.choose(&mut rng).copied())
                .collect();
            while chars.len() < length {
                if let Some(c) = all.choose(&mut rng) {
                    chars.push(*c);
                }
            }
            chars.shuffle(&mut rng);

            candidate = chars.into_iter().map(char::from).collect();
            if self.violations(&candidate, username, email).is_empty() {
                break;
            }
        }
        candidate
    }
}

fn contains_identity(lowered_password: &str, username: &str, email: &str) -> bool {
    let username = username.to_lowercase();
    let local_part = email
        .split('@')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    [username, local_part]
        .iter()
        .any(|needle| needle.chars().count() >= 3 && lowered_password.contains(needle.as_str()))
}

impl PasscodePolicy {
    pub fn validate(&self, passcode: &str) -> IdentityResult<()> {
        let reject = |message: &str| Err(IdentityError::InvalidPasscode(message.to_string()));

        if !passcode.chars().all(|c| c.is_ascii_digit()) {
            return reject("must contain digits only");
        }
        let digits: Vec<u8> = passcode.bytes().map(|b| b - b'0').collect();
        if digits.len() < self.min_length || digits.len() > self.max_length {
            return Err(IdentityError::InvalidPasscode(format!(
                "must be {}-{} digits",
                self.min_length, self.max_length
            )));
        }
        if digits.windows(2).all(|w| w.first() == w.last()) {
            return reject("must not repeat a single digit");
        }
        if is_step_sequence(&digits, 1) || is_step_sequence(&digits, -1) {
            return reject("must not be a sequence");
        }
        if has_repeating_block(&digits) {
            return reject("must not repeat a pattern");
        }
        if COMMON_PASSCODES.contains(&passcode) {
            return reject("is too common");
        }
        Ok(())
    }
}

fn is_step_sequence(digits: &[u8], step: i8) -> bool {
    digits.windows(2).all(|w| match (w.first(), w.last()) {
        (Some(a), Some(b)) => i16::from(*b) - i16::from(*a) == i16::from(step),
        _ => false,
    })
}

/// True when the passcode is a shorter block repeated, e.g. 1212 or 123123
fn has_repeating_block(digits: &[u8]) -> bool {
    let len = digits.len();
    (2..=len / 2)
        .filter(|block| len % block == 0)
        .any(|block| {
            digits
                .chunks(block)
                .all(|chunk| digits.get(..block).map(|first| chunk == first).unwrap_or(false))
        })
}
