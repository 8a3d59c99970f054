//! Column families of the redemption database.

/// Column family names.
pub mod cf {
    /// Point accounts, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const LEDGER_ENTRIES: &str = "ledger_entries";

    /// Index: ledger entries by user, keyed by `user_id || entry_id`.
    /// Value is empty.
    pub const ENTRIES_BY_USER: &str = "entries_by_user";

    /// Ledger reference journal, keyed by `kind prefix || reference`.
    ///
    /// Deductions store a `DeductionState`; grants store the entry id.
    pub const LEDGER_REFS: &str = "ledger_refs";

    /// Catalog items, keyed by `item_id`.
    pub const ITEMS: &str = "items";

    /// Redemption records, keyed by idempotency key.
    pub const REDEMPTIONS: &str = "redemptions";

    /// Index: unresolved pending redemptions, keyed by
    /// `created_at millis (u64 BE) || idempotency key`. Value is empty.
    pub const PENDING_REDEMPTIONS: &str = "pending_redemptions";

    /// Index: redemptions flagged for manual review, keyed by idempotency key.
    /// Value is empty.
    pub const MANUAL_REVIEW: &str = "manual_review";

    /// Ownership records, keyed by `user_id || item_id`.
    pub const OWNERSHIP: &str = "ownership";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::LEDGER_ENTRIES,
        cf::ENTRIES_BY_USER,
        cf::LEDGER_REFS,
        cf::ITEMS,
        cf::REDEMPTIONS,
        cf::PENDING_REDEMPTIONS,
        cf::MANUAL_REVIEW,
        cf::OWNERSHIP,
    ]
}
