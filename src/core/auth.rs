use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use crate::common::error::{Result, ServiceError};
use crate::service::protocol::{
    read_fixed, read_i32, write_fixed, write_i32, AUTH_FAILURE, AUTH_SUCCESS, CREDENTIAL_FIELD_LEN,
};

/// The one username/password pair a server accepts.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Exact, case-sensitive byte comparison.
    pub fn matches(&self, username: &[u8], password: &[u8]) -> bool {
        self.username.as_bytes() == username && self.password.as_bytes() == password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Server side of the credential exchange: two fixed-size fields in, one
/// result code out. The caller closes the connection on `false`.
pub fn authenticate<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    credential: &Credential,
) -> Result<bool> {
    let username = read_fixed(reader, CREDENTIAL_FIELD_LEN)?;
    let password = read_fixed(reader, CREDENTIAL_FIELD_LEN)?;

    let accepted = credential.matches(&username, &password);
    let shown = String::from_utf8_lossy(&username);
    if accepted {
        tracing::info!(user = %shown, "Authentication succeeded");
    } else {
        tracing::warn!(user = %shown, "Authentication failed");
    }

    write_i32(writer, if accepted { AUTH_SUCCESS } else { AUTH_FAILURE })?;
    writer.flush()?;
    Ok(accepted)
}

/// Client side: send both fields, then wait for the result code.
pub fn login<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    username: &str,
    password: &str,
) -> Result<bool> {
    write_fixed(writer, username.as_bytes(), CREDENTIAL_FIELD_LEN)?;
    write_fixed(writer, password.as_bytes(), CREDENTIAL_FIELD_LEN)?;
    writer.flush()?;

    match read_i32(reader)? {
        AUTH_SUCCESS => Ok(true),
        AUTH_FAILURE => Ok(false),
        other => Err(ServiceError::Protocol(format!("Unexpected authentication code {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn credential_bytes(username: &[u8], password: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_fixed(&mut out, username, CREDENTIAL_FIELD_LEN).unwrap();
        write_fixed(&mut out, password, CREDENTIAL_FIELD_LEN).unwrap();
        out
    }

    fn run(username: &[u8], password: &[u8]) -> (bool, Vec<u8>) {
        let credential = Credential::new("admin", "admin123");
        let mut input = Cursor::new(credential_bytes(username, password));
        let mut output = Vec::new();
        let accepted = authenticate(&mut input, &mut output, &credential).unwrap();
        (accepted, output)
    }

    #[test]
    fn test_matching_credential_writes_success_code() {
        let (accepted, output) = run(b"admin", b"admin123");
        assert!(accepted);
        assert_eq!(output, AUTH_SUCCESS.to_le_bytes());
    }

    #[test]
    fn test_non_matching_credentials_write_failure_code() {
        for (username, password) in [
            (&b"admin"[..], &b"wrong"[..]),
            (b"root", b"admin123"),
            (b"ADMIN", b"admin123"),
            (b"admin", b"ADMIN123"),
            (b"admin", b""),
            (b"", b""),
            (b"admin ", b"admin123"),
        ] {
            let (accepted, output) = run(username, password);
            assert!(!accepted, "{:?}/{:?} must be rejected", username, password);
            assert_eq!(output, AUTH_FAILURE.to_le_bytes());
        }
    }

    #[test]
    fn test_oversized_field_is_truncated_not_rejected() {
        let long_user = "u".repeat(CREDENTIAL_FIELD_LEN);
        let credential = Credential::new(long_user.clone(), "pw");

        let mut sent = long_user.into_bytes();
        sent.extend_from_slice(b"overflow");
        let mut input = Cursor::new(credential_bytes(&sent, b"pw"));
        let mut output = Vec::new();
        assert!(authenticate(&mut input, &mut output, &credential).unwrap());
    }

    #[test]
    fn test_short_input_is_an_io_error() {
        let credential = Credential::new("admin", "admin123");
        let mut input = Cursor::new(b"admin\0".to_vec());
        let mut output = Vec::new();
        let err = authenticate(&mut input, &mut output, &credential).unwrap_err();
        assert!(err.is_disconnect());
        assert!(output.is_empty());
    }

    #[test]
    fn test_login_sends_fixed_fields() {
        let mut written = Vec::new();
        let mut reply = Cursor::new(AUTH_SUCCESS.to_le_bytes().to_vec());
        assert!(login(&mut reply, &mut written, "admin", "admin123").unwrap());
        assert_eq!(written.len(), 2 * CREDENTIAL_FIELD_LEN);
        assert_eq!(written, credential_bytes(b"admin", b"admin123"));
    }

    #[test]
    fn test_login_rejects_unknown_code() {
        let mut written = Vec::new();
        let mut reply = Cursor::new(7i32.to_le_bytes().to_vec());
        let err = login(&mut reply, &mut written, "admin", "admin123").unwrap_err();
        assert!(matches!(err, ServiceError::Protocol(_)));

        let mut reply = Cursor::new(AUTH_FAILURE.to_le_bytes().to_vec());
        assert!(!login(&mut reply, &mut Vec::new(), "admin", "nope").unwrap());
    }

    #[test]
    fn test_debug_redacts_password() {
        let shown = format!("{:?}", Credential::new("admin", "admin123"));
        assert!(shown.contains("admin"));
        assert!(!shown.contains("admin123"));
    }
}
