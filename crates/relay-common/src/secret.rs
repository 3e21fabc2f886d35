use std::fmt::{Debug, Display};

const LIMIT: usize = 7;
const SHOW: usize = 3;

#[derive(Clone, Eq, PartialEq)]
/// Keeps credentials such as bot tokens out of debug and display output.
/// Long secrets keep their first 3 characters visible, short ones are fully redacted.
pub struct SecretString {
    inner: String,
}

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    pub fn expose(&self) -> &str {
        &self.inner
    }
}

fn mask(secret: &str) -> String {
    secret
        .chars()
        .enumerate()
        .map(|(i, c)| if i < SHOW { c } else { '*' })
        .collect()
}

impl Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.inner.chars().count() > LIMIT {
            f.write_str(&mask(&self.inner))
        } else {
            f.write_str("[redacted]")
        }
    }
}

impl Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}
