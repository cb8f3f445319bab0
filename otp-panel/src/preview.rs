use std::fmt;

use rand::Rng;

/// Six-digit code shown to the operator while a new device is being created.
///
/// Purely informational: once the service answers, the code it stored is the
/// one that counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewCode(String);

impl PreviewCode {
    pub fn generate() -> Self {
        let n: u32 = rand::rng().random_range(100_000..1_000_000);
        Self(n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_six_digits_without_leading_zero() {
        for _ in 0..1_000 {
            let code = PreviewCode::generate();
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.as_str().as_bytes()[0], b'0');
        }
    }
}
