//! # Account Numbers
//!
//! A library account number is exactly 14 ASCII digits. Input is validated
//! once, before any rendering happens, and is immutable afterwards.

use std::fmt;
use std::str::FromStr;

use crate::error::CardError;

/// Number of digits in a library account number.
pub const ACCOUNT_DIGITS: usize = 14;

/// A validated 14-digit library account number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Validate user input. Surrounding whitespace is ignored.
    ///
    /// ## Example
    ///
    /// ```
    /// use cardpress::AccountNumber;
    ///
    /// assert!(AccountNumber::parse("12345678901234").is_ok());
    /// assert!(AccountNumber::parse("1234567890123").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, CardError> {
        let number = input.trim();
        if number.len() != ACCOUNT_DIGITS || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CardError::Input(format!(
                "Please enter exactly {} digits.",
                ACCOUNT_DIGITS
            )));
        }
        Ok(Self(number.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The symbology payload: the number wrapped in Codabar start/stop `A`.
    pub fn codabar_payload(&self) -> String {
        format!("A{}A", self.0)
    }
}

impl FromStr for AccountNumber {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
