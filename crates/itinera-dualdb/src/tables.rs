//! Logical tables of the Itinera schema.
//!
//! The verifier sweeps `Table::ALL`; the manager and stores address tables
//! through this enum instead of raw strings, so an unknown table name is
//! unrepresentable.

use serde::{Deserialize, Serialize};

/// A logical table mirrored between the primary and backup stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    User,
    Session,
    Profile,
    Trip,
    ItineraryDay,
    Activity,
    Booking,
    Accommodation,
    Flight,
    Transport,
    Expense,
    Budget,
    PackingList,
    PackingItem,
    JournalEntry,
    Photo,
    Review,
    Collaborator,
    Notification,
}

impl Table {
    /// Every mirrored table, in verification sweep order.
    pub const ALL: &'static [Table] = &[
        Table::User,
        Table::Session,
        Table::Profile,
        Table::Trip,
        Table::ItineraryDay,
        Table::Activity,
        Table::Booking,
        Table::Accommodation,
        Table::Flight,
        Table::Transport,
        Table::Expense,
        Table::Budget,
        Table::PackingList,
        Table::PackingItem,
        Table::JournalEntry,
        Table::Photo,
        Table::Review,
        Table::Collaborator,
        Table::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Session => "session",
            Self::Profile => "profile",
            Self::Trip => "trip",
            Self::ItineraryDay => "itinerary_day",
            Self::Activity => "activity",
            Self::Booking => "booking",
            Self::Accommodation => "accommodation",
            Self::Flight => "flight",
            Self::Transport => "transport",
            Self::Expense => "expense",
            Self::Budget => "budget",
            Self::PackingList => "packing_list",
            Self::PackingItem => "packing_item",
            Self::JournalEntry => "journal_entry",
            Self::Photo => "photo",
            Self::Review => "review",
            Self::Collaborator => "collaborator",
            Self::Notification => "notification",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
