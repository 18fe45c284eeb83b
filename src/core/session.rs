use std::io::{BufReader, Read, Write};
use std::time::{Duration, Instant};
use crate::common::config::ProtocolConfig;
use crate::common::error::Result;
use crate::core::auth::{authenticate, Credential};
use crate::core::handlers;
use crate::service::protocol::{read_i32, Selector, ServiceRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticating,
    Authenticated,
    Closed,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Wrong credentials; the failure code was sent.
    Rejected,
    /// The client sent the quit selector.
    Quit { requests: u64 },
    /// The peer closed, reset, or timed out.
    Disconnected { requests: u64 },
}

/// One client connection on the session server. Owned by a single worker.
pub struct Session<R: Read, W: Write> {
    reader: BufReader<R>,
    writer: W,
    state: SessionState,
    requests: u64,
    started_at: Instant,
}

impl<R: Read, W: Write> Session<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            state: SessionState::Connected,
            requests: 0,
            started_at: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Authenticate, then answer requests until quit or disconnect.
    /// The session is `Closed` when this returns, whatever the result.
    pub fn run(&mut self, credential: &Credential, protocol: ProtocolConfig) -> Result<SessionOutcome> {
        let result = self.drive(credential, protocol);
        self.state = SessionState::Closed;

        match result {
            Err(e) if e.is_disconnect() => Ok(SessionOutcome::Disconnected { requests: self.requests }),
            other => other,
        }
    }

    fn drive(&mut self, credential: &Credential, protocol: ProtocolConfig) -> Result<SessionOutcome> {
        self.state = SessionState::Authenticating;
        if !authenticate(&mut self.reader, &mut self.writer, credential)? {
            return Ok(SessionOutcome::Rejected);
        }
        self.state = SessionState::Authenticated;

        loop {
            if let Some(outcome) = self.step(protocol)? {
                return Ok(outcome);
            }
        }
    }

    /// One selector in, at most one response out.
    fn step(&mut self, protocol: ProtocolConfig) -> Result<Option<SessionOutcome>> {
        let selector = read_i32(&mut self.reader)?;

        let response = match Selector::from(selector) {
            Selector::Quit => {
                return Ok(Some(SessionOutcome::Quit { requests: self.requests }));
            }
            Selector::Service(kind) => {
                let request = ServiceRequest::read_payload(kind, &mut self.reader)?;
                tracing::debug!(service = kind.name(), ?request, "Dispatching request");
                handlers::handle(&request)
            }
            Selector::Unknown(value) => {
                tracing::warn!(selector = value, "Invalid service selector");
                handlers::unknown_service(value)
            }
        };

        response.write_to(&mut self.writer, protocol)?;
        self.requests += 1;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::protocol::{
        write_cstring, write_fixed, write_i32, write_i64, ServiceResponse, AUTH_FAILURE,
        AUTH_SUCCESS, CREDENTIAL_FIELD_LEN,
    };
    use std::io::Cursor;

    const PLAIN: ProtocolConfig = ProtocolConfig { status_prefix: false };

    fn credential() -> Credential {
        Credential::new("admin", "admin123")
    }

    fn login_bytes(password: &str) -> Vec<u8> {
        let mut out = Vec::new();
        write_fixed(&mut out, b"admin", CREDENTIAL_FIELD_LEN).unwrap();
        write_fixed(&mut out, password.as_bytes(), CREDENTIAL_FIELD_LEN).unwrap();
        out
    }

    fn read_responses(output: Vec<u8>, protocol: ProtocolConfig) -> (i32, Vec<ServiceResponse>) {
        let mut cursor = Cursor::new(output);
        let code = read_i32(&mut cursor).unwrap();
        let mut responses = Vec::new();
        while (cursor.position() as usize) < cursor.get_ref().len() {
            responses.push(ServiceResponse::read_from(&mut cursor, protocol).unwrap());
        }
        (code, responses)
    }

    #[test]
    fn test_rejected_session_never_dispatches() {
        let mut input = login_bytes("wrong");
        write_i32(&mut input, 1).unwrap();

        let mut output = Vec::new();
        let mut session = Session::new(Cursor::new(input), &mut output);
        assert_eq!(session.run(&credential(), PLAIN).unwrap(), SessionOutcome::Rejected);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.requests(), 0);

        assert_eq!(output, AUTH_FAILURE.to_le_bytes());
    }

    #[test]
    fn test_one_response_per_request_including_invalid_selectors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();

        let mut input = login_bytes("admin123");
        write_i32(&mut input, 1).unwrap();
        write_i32(&mut input, 7).unwrap();
        write_i32(&mut input, 3).unwrap();
        write_cstring(&mut input, dir.path().join("a.txt").to_str().unwrap().as_bytes()).unwrap();
        write_i32(&mut input, -5).unwrap();
        write_i32(&mut input, 2).unwrap();
        write_cstring(&mut input, dir.path().to_str().unwrap().as_bytes()).unwrap();
        write_i32(&mut input, 4).unwrap();
        write_i64(&mut input, chrono::Utc::now().timestamp()).unwrap();
        write_i32(&mut input, 0).unwrap();

        let mut output = Vec::new();
        let mut session = Session::new(Cursor::new(input), &mut output);
        let outcome = session.run(&credential(), PLAIN).unwrap();
        assert_eq!(outcome, SessionOutcome::Quit { requests: 6 });

        let (code, responses) = read_responses(output, PLAIN);
        assert_eq!(code, AUTH_SUCCESS);
        assert_eq!(responses.len(), 6);
        assert!(responses[0].text().starts_with("Date: "));
        assert_eq!(responses[1].text(), "Erreur: Service inconnu (7)");
        assert_eq!(responses[2].text(), "alpha");
        assert_eq!(responses[3].text(), "Erreur: Service inconnu (-5)");
        assert_eq!(responses[4].text(), "a.txt");
        assert!(responses[5].text().starts_with("Durée de connexion: 0 minute(s)"));
    }

    #[test]
    fn test_disconnect_ends_session_cleanly() {
        let mut input = login_bytes("admin123");
        write_i32(&mut input, 1).unwrap();
        // Half a selector, then EOF
        input.extend_from_slice(&[2, 0]);

        let mut output = Vec::new();
        let mut session = Session::new(Cursor::new(input), &mut output);
        let outcome = session.run(&credential(), PLAIN).unwrap();
        assert_eq!(outcome, SessionOutcome::Disconnected { requests: 1 });
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_disconnect_during_authentication() {
        let mut output = Vec::new();
        let mut session = Session::new(Cursor::new(b"adm".to_vec()), &mut output);
        let outcome = session.run(&credential(), PLAIN).unwrap();
        assert_eq!(outcome, SessionOutcome::Disconnected { requests: 0 });
        assert!(output.is_empty());
    }

    #[test]
    fn test_status_prefix_marks_errors() {
        let protocol = ProtocolConfig { status_prefix: true };
        let mut input = login_bytes("admin123");
        write_i32(&mut input, 3).unwrap();
        write_cstring(&mut input, b"/no/such/file").unwrap();
        write_i32(&mut input, 0).unwrap();

        let mut output = Vec::new();
        Session::new(Cursor::new(input), &mut output).run(&credential(), protocol).unwrap();

        let (_, responses) = read_responses(output, protocol);
        assert_eq!(responses.len(), 1);
        assert!(!responses[0].success);
        assert_eq!(responses[0].text(), handlers::ERR_FILE);
    }
}
