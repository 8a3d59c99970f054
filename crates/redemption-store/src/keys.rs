//! Key encoding for the column families.

use chrono::{DateTime, Utc};
use redemption_core::{EntryId, IdempotencyKey, ItemId, UserId};

const DEDUCTION_REF_PREFIX: &[u8] = b"deduct:";
const GRANT_REF_PREFIX: &[u8] = b"grant:";

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a ledger entry key.
#[must_use]
pub fn entry_key(entry_id: &EntryId) -> Vec<u8> {
    entry_id.to_bytes().to_vec()
}

/// Create a user-entry index key.
///
/// Format: `user_id (16 bytes) || entry_id (16 bytes)`. ULIDs sort by time,
/// so a user's entries are stored oldest first.
#[must_use]
pub fn user_entry_key(user_id: &UserId, entry_id: &EntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Smallest key strictly above every index key of the user.
#[must_use]
pub fn user_entries_upper_bound(user_id: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&[0xFF; 17]);
    key
}

/// Extract the entry ID from a user-entry index key.
#[must_use]
pub fn entry_id_from_user_key(key: &[u8]) -> Option<EntryId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(EntryId::from_bytes(bytes))
}

/// Journal key of a redemption deduction.
#[must_use]
pub fn deduction_ref_key(reference: &str) -> Vec<u8> {
    [DEDUCTION_REF_PREFIX, reference.as_bytes()].concat()
}

/// Journal key of a points grant.
#[must_use]
pub fn grant_ref_key(reference: &str) -> Vec<u8> {
    [GRANT_REF_PREFIX, reference.as_bytes()].concat()
}

/// Create a catalog item key.
#[must_use]
pub fn item_key(item_id: &ItemId) -> Vec<u8> {
    item_id.as_str().as_bytes().to_vec()
}

/// Create a redemption record key.
#[must_use]
pub fn redemption_key(key: &IdempotencyKey) -> Vec<u8> {
    key.as_str().as_bytes().to_vec()
}

/// Create a pending-index key.
///
/// Format: `created_at millis (8 bytes BE) || idempotency key`, so a forward
/// scan visits the oldest records first.
#[must_use]
pub fn pending_key(created_at: DateTime<Utc>, key: &IdempotencyKey) -> Vec<u8> {
    let millis = u64::try_from(created_at.timestamp_millis()).unwrap_or(0);
    let mut out = Vec::with_capacity(8 + key.as_str().len());
    out.extend_from_slice(&millis.to_be_bytes());
    out.extend_from_slice(key.as_str().as_bytes());
    out
}

/// Split a pending-index key into its timestamp and idempotency key bytes.
#[must_use]
pub fn split_pending_key(key: &[u8]) -> Option<(u64, &[u8])> {
    if key.len() <= 8 {
        return None;
    }
    let (millis, rest) = key.split_at(8);
    Some((u64::from_be_bytes(millis.try_into().ok()?), rest))
}

/// Create an ownership key.
///
/// Format: `user_id (16 bytes) || item_id`.
#[must_use]
pub fn ownership_key(user_id: &UserId, item_id: &ItemId) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + item_id.as_str().len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(item_id.as_str().as_bytes());
    key
}

/// Prefix of all ownership keys of a user.
#[must_use]
pub fn user_ownership_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn user_entry_key_format() {
        let user_id = UserId::generate();
        let entry_id = EntryId::generate();
        let key = user_entry_key(&user_id, &entry_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(entry_id_from_user_key(&key), Some(entry_id));
        assert!(key < user_entries_upper_bound(&user_id));
    }

    #[test]
    fn reference_kinds_do_not_collide() {
        assert_ne!(deduction_ref_key("abc"), grant_ref_key("abc"));
    }

    #[test]
    fn pending_keys_sort_by_time() {
        let key = IdempotencyKey::from_str("k").unwrap();
        let earlier = pending_key(DateTime::from_timestamp_millis(1_000).unwrap(), &key);
        let later = pending_key(DateTime::from_timestamp_millis(2_000).unwrap(), &key);
        assert!(earlier < later);

        let (millis, rest) = split_pending_key(&later).unwrap();
        assert_eq!(millis, 2_000);
        assert_eq!(rest, b"k");
    }
}
