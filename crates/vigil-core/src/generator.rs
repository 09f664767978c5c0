//! Random password generation from selectable character sets.

use rand::rngs::OsRng;
use rand::Rng;
use thiserror::Error;

pub const MAX_LENGTH: usize = 128;
pub const DEFAULT_LENGTH: usize = 20;

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";
const SPECIAL: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";
const BRACKETS: &str = "[]{}()<>";
const LATIN1: &str = "ÀÁÂÃÄÅÆÇÈÉÊËÌÍÎÏÐÑÒÓÔÕÖØÙÚÛÜÝÞßàáâãäåæçèéêëìíîïðñòóôõöøùúûüýþÿ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("select at least one character set")]
    EmptyPool,

    #[error("password length must be between 1 and 128, got {0}")]
    InvalidLength(usize),
}

/// Character sets and length of a generated password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub length: usize,
    pub upper_case: bool,
    pub lower_case: bool,
    pub digits: bool,
    pub special: bool,
    pub brackets: bool,
    pub space: bool,
    pub minus: bool,
    pub underline: bool,
    pub latin1: bool,
    pub custom: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            upper_case: true,
            lower_case: true,
            digits: true,
            special: true,
            brackets: false,
            space: false,
            minus: false,
            underline: false,
            latin1: false,
            custom: String::new(),
        }
    }
}

impl GeneratorOptions {
    /// Options reproducing the length and character sets of `current`.
    ///
    /// An empty password gives the defaults.
    pub fn matching(current: &str) -> Self {
        if current.is_empty() {
            return Self::default();
        }
        let has = |set: &str| current.chars().any(|c| set.contains(c));

        Self {
            length: current.chars().count().min(MAX_LENGTH),
            upper_case: has(UPPER),
            lower_case: has(LOWER),
            digits: has(DIGITS),
            special: has(SPECIAL),
            brackets: has(BRACKETS),
            space: current.chars().any(char::is_whitespace),
            minus: has("-"),
            underline: has("_"),
            latin1: has(LATIN1),
            custom: String::new(),
        }
    }

    /// Distinct characters the password is drawn from, in set order.
    pub fn pool(&self) -> Vec<char> {
        let sets = [
            (self.upper_case, UPPER),
            (self.lower_case, LOWER),
            (self.digits, DIGITS),
            (self.special, SPECIAL),
            (self.brackets, BRACKETS),
            (self.space, " "),
            (self.minus, "-"),
            (self.underline, "_"),
            (self.latin1, LATIN1),
            (true, self.custom.as_str()),
        ];

        let mut pool: Vec<char> = Vec::new();
        for c in sets
            .iter()
            .filter(|(enabled, _)| *enabled)
            .flat_map(|(_, chars)| chars.chars())
        {
            if !pool.contains(&c) {
                pool.push(c);
            }
        }
        pool
    }
}

/// Draw a password uniformly from the option's pool using the OS random source.
pub fn generate(options: &GeneratorOptions) -> Result<String, GeneratorError> {
    if options.length == 0 || options.length > MAX_LENGTH {
        return Err(GeneratorError::InvalidLength(options.length));
    }
    let pool = options.pool();
    if pool.is_empty() {
        return Err(GeneratorError::EmptyPool);
    }

    let mut rng = OsRng;
    Ok((0..options.length)
        .map(|_| pool[rng.gen_range(0..pool.len())])
        .collect())
}
