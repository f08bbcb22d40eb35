use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Prefix carried by the QR payload printed on tickets.
pub const QR_PREFIX: &str = "TICKET:";

const MIN_LEN: usize = 6;
const MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("ticket code is empty")]
    Empty,

    #[error("ticket code must be between 6 and 64 characters")]
    Length,

    #[error("ticket code contains invalid character '{0}'")]
    Character(char),
}

/// A normalized ticket code, as found in `tickets.ticket_code`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TicketCode(String);

impl TicketCode {
    /// Normalizes whatever a scanner or a keyboard produced.
    ///
    /// Accepts either a bare code or a full QR payload (`TICKET:<code>`),
    /// in any case, surrounded by whitespace.
    pub fn parse(raw: &str) -> Result<Self, CodeError> {
        let trimmed = raw.trim();
        let body = match trimmed.get(..QR_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(QR_PREFIX) => {
                trimmed[QR_PREFIX.len()..].trim()
            }
            _ => trimmed,
        };

        if body.is_empty() {
            return Err(CodeError::Empty);
        }

        let code = body.to_ascii_uppercase();
        if let Some(bad) = code
            .chars()
            .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(CodeError::Character(bad));
        }
        if !(MIN_LEN..=MAX_LEN).contains(&code.len()) {
            return Err(CodeError::Length);
        }

        Ok(Self(code))
    }

    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        Self(format!("TKT-{}", &hex[..12]))
    }

    pub fn qr_payload(&self) -> String {
        format!("{QR_PREFIX}{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
