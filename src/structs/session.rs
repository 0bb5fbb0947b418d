use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::PortalError;
use crate::structs::LoginResult;

/// The logged-in user's identity, as handed out by the server at login.
/// Opaque to the subscription engine; read by the portal at action time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token sent with every authenticated request.
    pub token: String,
    pub user_id: u64,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

impl Session {
    /// Name to greet the user with. Falls back to the email, then the numeric id.
    pub fn display_name(&self) -> String {
        self.user_name
            .clone()
            .or_else(|| self.user_email.clone())
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

impl From<LoginResult> for Session {
    fn from(login: LoginResult) -> Self {
        Self {
            token: login.session_token,
            user_id: login.user_id,
            user_name: login.user_name,
            user_email: login.user_email,
        }
    }
}

/// JSON file holding the current session between runs.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored session. A missing file means nobody is logged in.
    pub fn load(&self) -> Result<Option<Session>, PortalError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(PortalError::SessionStore(err.to_string())),
        };

        if raw.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| PortalError::SessionStore(err.to_string()))
    }

    pub fn save(&self, session: &Session) -> Result<(), PortalError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|err| PortalError::SessionStore(err.to_string()))?;
            }
        }

        let json = serde_json::to_string_pretty(session)
            .map_err(|err| PortalError::SessionStore(err.to_string()))?;

        write_private(&self.path, json.as_bytes())
            .map_err(|err| PortalError::SessionStore(err.to_string()))?;

        debug!(path = %self.path.display(), user_id = session.user_id, "session saved");
        Ok(())
    }

    /// Removes the stored session. Clearing an absent session is not an error.
    pub fn clear(&self) -> Result<(), PortalError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "session cleared");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PortalError::SessionStore(err.to_string())),
        }
    }
}

/// Writes `contents`, readable by the owner only on unix since the file holds a bearer token.
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;

    // `mode` only applies on creation; tighten files left by older runs too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)
}
