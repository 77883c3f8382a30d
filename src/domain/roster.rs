use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tickets;

pub type FunJumperId = i64;
pub type PilotId = i64;
pub type InstructorId = i64;

/// A licensed skydiver who pays for jumps with jump tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunJumper {
    pub id: FunJumperId,
    pub first_name: String,
    pub last_name: String,
    pub license_number: Option<String>,
    pub email: Option<String>,
    /// Cached ledger sum. Only the ledger coordinator writes it.
    pub jump_ticket_balance: Tickets,
    pub created_at: DateTime<Utc>,
}

impl FunJumper {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pilot {
    pub id: PilotId,
    pub first_name: String,
    pub last_name: String,
    pub license_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Pilot {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A fun-jumper rated to take tandem passengers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TandemInstructor {
    pub id: InstructorId,
    pub funjumper_id: FunJumperId,
    pub tandem_rating: bool,
    pub camera_rating: bool,
    pub notes: Option<String>,
}

/// Instructor row joined with the fun-jumper it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructorProfile {
    pub instructor: TandemInstructor,
    pub name: String,
}
