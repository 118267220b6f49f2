//! Crate-wide error type.
//!
//! Every fallible operation returns `Result<_, AppError>`. The exit code doubles as a
//! coarse error category so the binary can surface it directly:
//!
//! - `2`: invalid input or configuration (bad formula, zero schools, unwritable path)
//! - `3`: insufficient data for the requested fit
//! - `4`: estimation or numerical failure (singular design, non-finite criterion)

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Invalid input or configuration.
    pub fn input(message: impl Into<String>) -> Self {
        Self::new(2, message)
    }

    /// Not enough observations (or groups) to fit.
    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(3, message)
    }

    /// Estimation failed numerically.
    pub fn estimation(message: impl Into<String>) -> Self {
        Self::new(4, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_exit_codes() {
        assert_eq!(AppError::input("x").exit_code(), 2);
        assert_eq!(AppError::insufficient("x").exit_code(), 3);
        assert_eq!(AppError::estimation("x").exit_code(), 4);
        assert_eq!(AppError::estimation("singular").to_string(), "singular");
    }
}
