//! Database enum types.
//!
//! Every enum here is stored as a `SMALLINT` column and travels over the API as a
//! snake_case string. `FromStr` is lenient about case and accepts a few aliases
//! so spreadsheet imports and older clients keep working.

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::SmallInt;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::io::Write;

macro_rules! db_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($variant:ident = $value:literal => $text:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
            AsExpression, FromSqlRow,
        )]
        #[diesel(sql_type = SmallInt)]
        #[serde(rename_all = "snake_case")]
        #[repr(i16)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl ToSql<SmallInt, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                let v = *self as i16;
                out.write_all(&v.to_be_bytes())?;
                Ok(serialize::IsNull::No)
            }
        }

        impl FromSql<SmallInt, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let value = i16::from_sql(bytes)?;
                match value {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(format!("Unknown {}: {}", $label, value).into()),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
                match normalized.as_str() {
                    $($text $(| $alias)* => Ok(Self::$variant),)+
                    _ => Err(format!("Unknown {}: {}", $label, s)),
                }
            }
        }
    };
}

// ============================================================================
// TICKETS
// ============================================================================

db_enum! {
    /// Lifecycle state of a ticket
    TicketStatus, "ticket status" {
        Open = 0 => "open" | "new" | "aberto",
        InProgress = 1 => "in_progress" | "doing" | "em_andamento",
        Pending = 2 => "pending" | "waiting" | "pendente",
        Resolved = 3 => "resolved" | "done" | "resolvido",
        Closed = 4 => "closed" | "fechado",
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl TicketStatus {
    /// Resolved and closed tickets carry a `resolved_at` stamp.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

db_enum! {
    TicketPriority, "ticket priority" {
        Low = 0 => "low" | "baixa",
        Medium = 1 => "medium" | "normal" | "media",
        High = 2 => "high" | "alta",
        Critical = 3 => "critical" | "urgent" | "critica",
    }
}

impl Default for TicketPriority {
    fn default() -> Self {
        Self::Medium
    }
}

db_enum! {
    TicketType, "ticket type" {
        Bug = 0 => "bug" | "defect",
        Feature = 1 => "feature" | "funcionalidade",
        Improvement = 2 => "improvement" | "enhancement" | "melhoria",
        Support = 3 => "support" | "suporte",
        Incident = 4 => "incident" | "incidente",
        Question = 5 => "question" | "duvida",
    }
}

impl Default for TicketType {
    fn default() -> Self {
        Self::Support
    }
}

db_enum! {
    /// Kanban column
    TicketStage, "ticket stage" {
        Backlog = 0 => "backlog",
        Dev = 1 => "dev" | "development",
        Homolog = 2 => "homolog" | "staging" | "homologacao",
        Prod = 3 => "prod" | "production" | "producao",
    }
}

impl Default for TicketStage {
    fn default() -> Self {
        Self::Backlog
    }
}

// ============================================================================
// USERS
// ============================================================================

db_enum! {
    UserRole, "user role" {
        User = 0 => "user",
        Admin = 1 => "admin" | "administrator",
    }
}

impl Default for UserRole {
    fn default() -> Self {
        Self::User
    }
}
