//! Session unlock decision.
//!
//! A single call walks device read → owner lookup → session validation →
//! key rotation → unlock. Every check fails closed; the key is only rotated
//! once all checks have passed, and the session is only unlocked after the
//! rotated key is safely stored and written.

use crate::audit::{AuditLog, EventSeverity};
use crate::device::DeviceKeyCodec;
use crate::error::{Error, Result};
use crate::issuer::KeyIssuer;
use crate::matcher::find_owner;
use crate::session::{Session, SessionProvider};
use crate::store::SecretStore;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockOutcome {
    pub identity: String,
    pub session_id: String,
    /// Fingerprint of the freshly rotated key now on the device.
    pub fingerprint: String,
}

pub struct UnlockAuthorizer<'a> {
    store: &'a SecretStore,
    codec: &'a DeviceKeyCodec,
    sessions: &'a dyn SessionProvider,
    audit: &'a AuditLog,
}

impl<'a> UnlockAuthorizer<'a> {
    pub fn new(
        store: &'a SecretStore,
        codec: &'a DeviceKeyCodec,
        sessions: &'a dyn SessionProvider,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            store,
            codec,
            sessions,
            audit,
        }
    }

    pub fn unlock(&self, device: &Path) -> Result<UnlockOutcome> {
        match self.authorize_and_unlock(device) {
            Ok(outcome) => {
                self.record(
                    "UNLOCK_SUCCEEDED",
                    EventSeverity::Info,
                    serde_json::json!({
                        "device": device.display().to_string(),
                        "identity": outcome.identity,
                        "session": outcome.session_id,
                        "fingerprint": outcome.fingerprint,
                    }),
                );
                info!(identity = %outcome.identity, session = %outcome.session_id, "session unlocked");
                Ok(outcome)
            }
            Err(err) => {
                let severity = match err {
                    Error::IdentityMismatch { .. } => EventSeverity::Critical,
                    _ if err.is_security_event() => EventSeverity::Warn,
                    _ => EventSeverity::Error,
                };
                self.record(
                    "UNLOCK_DENIED",
                    severity,
                    serde_json::json!({
                        "device": device.display().to_string(),
                        "reason": err.code(),
                        "detail": err.to_string(),
                    }),
                );
                warn!(device = %device.display(), reason = err.code(), "unlock denied: {err}");
                Err(err)
            }
        }
    }

    fn authorize_and_unlock(&self, device: &Path) -> Result<UnlockOutcome> {
        let presented = self.codec.read(device).map_err(|e| Error::DeviceNotFound {
            device: device.to_path_buf(),
            reason: e.to_string(),
        })?;

        let keys = self.store.load()?;
        let identity =
            find_owner(&presented, &keys).ok_or_else(|| Error::NoKeyFound(device.to_path_buf()))?;
        drop(presented);

        let session = self.validate_session(&identity)?;

        let rotated = KeyIssuer::new(self.store, self.codec).issue(device, &identity)?;
        self.record(
            "KEY_ROTATED",
            EventSeverity::Info,
            serde_json::json!({
                "device": device.display().to_string(),
                "identity": identity,
                "fingerprint": rotated.fingerprint(),
            }),
        );

        self.sessions.unlock(&session.id)?;
        Ok(UnlockOutcome {
            identity,
            session_id: session.id,
            fingerprint: rotated.fingerprint(),
        })
    }

    fn validate_session(&self, identity: &str) -> Result<Session> {
        let mut sessions = self.sessions.active_sessions()?;
        if sessions.len() != 1 {
            return Err(Error::UnexpectedSessionCount(sessions.len()));
        }
        let session = sessions.remove(0);
        if session.user != identity {
            return Err(Error::IdentityMismatch {
                key_owner: identity.to_string(),
                session_owner: session.user,
            });
        }
        if session.id.trim().is_empty() {
            return Err(Error::InvalidSession(session.user));
        }
        Ok(session)
    }

    fn record(&self, event_type: &str, severity: EventSeverity, data: serde_json::Value) {
        if let Err(e) = self.audit.append(event_type, severity, data) {
            warn!(event_type, "audit log write failed: {e}");
        }
    }
}
