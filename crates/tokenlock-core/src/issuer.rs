use crate::crypto::Secret;
use crate::device::DeviceKeyCodec;
use crate::error::Result;
use crate::store::SecretStore;
use std::path::Path;
use tracing::info;

/// Generates fresh secrets and binds them to an identity and a device.
pub struct KeyIssuer<'a> {
    store: &'a SecretStore,
    codec: &'a DeviceKeyCodec,
}

impl<'a> KeyIssuer<'a> {
    pub fn new(store: &'a SecretStore, codec: &'a DeviceKeyCodec) -> Self {
        Self { store, codec }
    }

    /// Issue a new secret for `identity` and write it onto `device`.
    ///
    /// The keyfile is updated before the device is touched: if the device
    /// write fails the stored entry is authoritative and the device is just
    /// unusable until the key is issued again.
    pub fn issue(&self, device: &Path, identity: &str) -> Result<Secret> {
        let secret = Secret::generate(self.codec.key_size());
        self.store.put(identity, &secret)?;
        self.codec.write(device, &secret)?;
        info!(
            identity,
            device = %device.display(),
            fingerprint = %secret.fingerprint(),
            "key issued"
        );
        Ok(secret)
    }
}
