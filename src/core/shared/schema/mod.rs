pub mod core;
pub use self::core::*;

pub mod ticket_tables;
pub use self::ticket_tables::*;

pub mod content;
pub use self::content::*;

pub mod reports;
pub use self::reports::*;

diesel::allow_tables_to_appear_in_same_query!(
    users,
    tickets,
    ticket_comments,
    ticket_activities,
    ticket_followers,
    documents,
    reminders,
    manuals,
    workflows,
);
