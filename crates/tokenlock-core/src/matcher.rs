use crate::crypto::{constant_time_eq, Secret};
use crate::store::KeyMap;

/// Resolve which identity, if any, owns the key read from a device.
///
/// Every stored secret is compared in full, even after a hit, so the time
/// taken does not reveal which entry matched or how much of it did. When
/// more than one entry matches, the first in identity order wins.
pub fn find_owner(device_key: &Secret, keys: &KeyMap) -> Option<String> {
    let presented = device_key.to_hex();
    let mut owner: Option<&String> = None;
    for (identity, stored) in keys {
        let hit = constant_time_eq(presented.as_bytes(), stored.as_bytes());
        if hit && owner.is_none() {
            owner = Some(identity);
        }
    }
    owner.cloned()
}
