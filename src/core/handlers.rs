use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt::Display;
use std::fs::{self, File};
use std::os::unix::ffi::OsStrExt;
use std::io::Read;
use std::path::Path;
use crate::service::protocol::{ServiceRequest, ServiceResponse, RESPONSE_MAX_LEN};

pub const ERR_DIRECTORY: &str = "Erreur: Impossible d'ouvrir le répertoire";
pub const ERR_FILE: &str = "Erreur: Impossible d'ouvrir le fichier";

const CLOCK_FORMAT: &str = "Date: %d/%m/%Y - Heure: %H:%M:%S";

/// Runs one request against the local clock and filesystem.
pub fn handle(request: &ServiceRequest) -> ServiceResponse {
    match request {
        ServiceRequest::Clock => clock(Local::now()),
        ServiceRequest::ListDirectory { path } => list_directory(path),
        ServiceRequest::ReadFile { name } => read_file(name),
        ServiceRequest::ElapsedSince { start } => elapsed_since(*start, Utc::now().timestamp()),
    }
}

pub fn unknown_service(selector: i32) -> ServiceResponse {
    ServiceResponse::error(format!("Erreur: Service inconnu ({})", selector))
}

pub fn clock<Tz>(now: DateTime<Tz>) -> ServiceResponse
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    ServiceResponse::ok(now.format(CLOCK_FORMAT).to_string())
}

/// Entry names in directory iteration order, one per line.
///
/// Names that would overflow the response buffer are dropped whole.
pub fn list_directory(path: impl AsRef<Path>) -> ServiceResponse {
    let path = path.as_ref();
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cannot open directory");
            return ServiceResponse::error(ERR_DIRECTORY);
        }
    };

    let mut listing: Vec<u8> = Vec::new();
    let mut truncated = false;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.as_bytes();
        let needed = name.len() + usize::from(!listing.is_empty());
        if listing.len() + needed > RESPONSE_MAX_LEN - 1 {
            truncated = true;
            break;
        }
        if !listing.is_empty() {
            listing.push(b'\n');
        }
        listing.extend_from_slice(name);
    }

    if truncated {
        tracing::debug!(path = %path.display(), "Directory listing truncated to fit the response");
    }
    ServiceResponse::ok(listing)
}

/// At most `RESPONSE_MAX_LEN - 1` bytes of the file; larger files are cut.
pub fn read_file(name: impl AsRef<Path>) -> ServiceResponse {
    let name = name.as_ref();
    let file = match File::open(name) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(file = %name.display(), error = %e, "Cannot open file");
            return ServiceResponse::error(ERR_FILE);
        }
    };

    let mut content = Vec::with_capacity(RESPONSE_MAX_LEN);
    if let Err(e) = file.take((RESPONSE_MAX_LEN - 1) as u64).read_to_end(&mut content) {
        tracing::debug!(file = %name.display(), error = %e, "Cannot read file");
        return ServiceResponse::error(ERR_FILE);
    }

    tracing::debug!(file = %name.display(), bytes = content.len(), "File content read");
    ServiceResponse::ok(content)
}

/// `now - start` in whole seconds; a start in the future counts as zero.
pub fn elapsed_since(start: i64, now: i64) -> ServiceResponse {
    let elapsed = now.saturating_sub(start).max(0);
    ServiceResponse::ok(format_duration(elapsed))
}

pub fn format_duration(seconds: i64) -> String {
    format!(
        "Durée de connexion: {} minute(s) et {} seconde(s)",
        seconds / 60,
        seconds % 60
    )
}
