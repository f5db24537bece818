use crate::audit::{AuditEntry, AuditLog, EventSeverity};
use crate::device::DeviceKeyCodec;
use crate::error::{Error, Result};
use crate::inventory::{ensure_overwritable, BlockDeviceInventory, Lsblk};
use crate::issuer::KeyIssuer;
use crate::matcher::find_owner;
use crate::session::{Loginctl, SessionProvider};
use crate::settings::KeySettings;
use crate::store::SecretStore;
use crate::unlock::{UnlockAuthorizer, UnlockOutcome};
use std::path::Path;
use tracing::{info, warn};

/// Administrative and unlock operations over one keyfile.
pub struct KeyManager {
    settings: KeySettings,
    store: SecretStore,
    codec: DeviceKeyCodec,
    audit: AuditLog,
    inventory: Box<dyn BlockDeviceInventory>,
    sessions: Box<dyn SessionProvider>,
}

impl KeyManager {
    /// Manager backed by `lsblk` and `loginctl`.
    pub fn system(settings: KeySettings) -> Result<Self> {
        Self::with_collaborators(settings, Box::new(Lsblk), Box::new(Loginctl))
    }

    pub fn with_collaborators(
        settings: KeySettings,
        inventory: Box<dyn BlockDeviceInventory>,
        sessions: Box<dyn SessionProvider>,
    ) -> Result<Self> {
        settings.validate()?;
        let audit = AuditLog::open(&settings.audit_log, settings.audit_log_max_bytes)?;
        Ok(Self {
            store: SecretStore::new(&settings.keyfile),
            codec: DeviceKeyCodec::new(settings.key_size),
            audit,
            inventory,
            sessions,
            settings,
        })
    }

    pub fn settings(&self) -> &KeySettings {
        &self.settings
    }

    pub fn store(&self) -> &SecretStore {
        &self.store
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Enroll `device` as the key for `identity`, destroying its leading bytes.
    ///
    /// The inventory check runs before any key material exists.
    pub fn make(&self, device: &Path, identity: &str) -> Result<String> {
        validate_identity(identity)?;
        let info = self.inventory.describe(device)?;
        if let Err(err) = ensure_overwritable(device, &info) {
            self.record(
                "MAKE_REFUSED",
                EventSeverity::Warn,
                serde_json::json!({
                    "device": device.display().to_string(),
                    "identity": identity,
                    "reason": err.to_string(),
                }),
            );
            return Err(err);
        }

        let secret = KeyIssuer::new(&self.store, &self.codec).issue(device, identity)?;
        let fingerprint = secret.fingerprint();
        self.record(
            "KEY_ISSUED",
            EventSeverity::Info,
            serde_json::json!({
                "device": device.display().to_string(),
                "identity": identity,
                "fingerprint": fingerprint,
            }),
        );
        Ok(fingerprint)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    pub fn delete(&self, identity: &str) -> Result<()> {
        self.store.remove(identity)?;
        self.record(
            "KEY_DELETED",
            EventSeverity::Info,
            serde_json::json!({ "identity": identity }),
        );
        info!(identity, "key deleted");
        Ok(())
    }

    pub fn unlock(&self, device: &Path) -> Result<UnlockOutcome> {
        UnlockAuthorizer::new(&self.store, &self.codec, self.sessions.as_ref(), &self.audit)
            .unlock(device)
    }

    /// Owner of the key on `device`, without rotating it or touching sessions.
    pub fn check(&self, device: &Path) -> Result<Option<String>> {
        let presented = self.codec.read(device)?;
        let keys = self.store.load()?;
        Ok(find_owner(&presented, &keys))
    }

    pub fn events(&self, limit: Option<usize>) -> Result<Vec<AuditEntry>> {
        self.audit.read_recent(limit)
    }

    fn record(&self, event_type: &str, severity: EventSeverity, data: serde_json::Value) {
        if let Err(e) = self.audit.append(event_type, severity, data) {
            warn!(event_type, "audit log write failed: {e}");
        }
    }
}

fn validate_identity(identity: &str) -> Result<()> {
    if identity.trim().is_empty() || identity.chars().any(char::is_control) {
        return Err(Error::InvalidIdentity(identity.to_string()));
    }
    Ok(())
}
