use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FunJumperId, InstructorId, PilotId};

pub type EntryId = i64;

/// Jump tickets are whole units; a jump consumes one.
pub type Tickets = i64;

/// Who a ledger entry is booked against. Exactly one subject per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Subject {
    FunJumper(FunJumperId),
    Pilot(PilotId),
    Instructor(InstructorId),
}

impl Subject {
    pub fn label(&self) -> &'static str {
        match self {
            Subject::FunJumper(_) => "funjumper",
            Subject::Pilot(_) => "pilot",
            Subject::Instructor(_) => "instructor",
        }
    }

    pub fn id(&self) -> i64 {
        match *self {
            Subject::FunJumper(id) | Subject::Pilot(id) | Subject::Instructor(id) => id,
        }
    }

    pub fn fun_jumper(&self) -> Option<FunJumperId> {
        match *self {
            Subject::FunJumper(id) => Some(id),
            _ => None,
        }
    }

    /// Split into the `(funjumper_id, pilot_id, tandem_instructor_id)` column triple.
    pub fn to_columns(&self) -> (Option<i64>, Option<i64>, Option<i64>) {
        match *self {
            Subject::FunJumper(id) => (Some(id), None, None),
            Subject::Pilot(id) => (None, Some(id), None),
            Subject::Instructor(id) => (None, None, Some(id)),
        }
    }

    /// Rebuild from the column triple. Returns `None` unless exactly one column is set.
    pub fn from_columns(
        funjumper_id: Option<i64>,
        pilot_id: Option<i64>,
        instructor_id: Option<i64>,
    ) -> Option<Self> {
        match (funjumper_id, pilot_id, instructor_id) {
            (Some(id), None, None) => Some(Subject::FunJumper(id)),
            (None, Some(id), None) => Some(Subject::Pilot(id)),
            (None, None, Some(id)) => Some(Subject::Instructor(id)),
            _ => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label(), self.id())
    }
}

impl std::str::FromStr for Subject {
    type Err = String;

    /// Parses `funjumper:12`, `pilot:3` or `instructor:7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <kind>:<id>, got '{}'", s))?;
        let id: i64 = id
            .trim()
            .parse()
            .map_err(|_| format!("invalid subject id '{}'", id))?;
        match label.trim().to_lowercase().as_str() {
            "funjumper" | "fun_jumper" => Ok(Subject::FunJumper(id)),
            "pilot" => Ok(Subject::Pilot(id)),
            "instructor" | "tandem_instructor" => Ok(Subject::Instructor(id)),
            other => Err(format!("unknown subject kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Jump,
    CancelJump,
    BuyJumpticket,
    CancelJumpticket,
    TandemJump,
    TandemPhotos,
    TandemVideos,
    Other,
}

impl EntryKind {
    /// Kinds whose amounts make up a fun-jumper's jump-ticket balance.
    pub const TICKET_KINDS: [EntryKind; 4] = [
        EntryKind::Jump,
        EntryKind::CancelJump,
        EntryKind::BuyJumpticket,
        EntryKind::CancelJumpticket,
    ];

    pub const ALL: [EntryKind; 8] = [
        EntryKind::Jump,
        EntryKind::CancelJump,
        EntryKind::BuyJumpticket,
        EntryKind::CancelJumpticket,
        EntryKind::TandemJump,
        EntryKind::TandemPhotos,
        EntryKind::TandemVideos,
        EntryKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Jump => "jump",
            EntryKind::CancelJump => "cancel_jump",
            EntryKind::BuyJumpticket => "buy_jumpticket",
            EntryKind::CancelJumpticket => "cancel_jumpticket",
            EntryKind::TandemJump => "tandem_jump",
            EntryKind::TandemPhotos => "tandem_photos",
            EntryKind::TandemVideos => "tandem_videos",
            EntryKind::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        EntryKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim().to_lowercase())
    }

    pub fn affects_ticket_balance(&self) -> bool {
        EntryKind::TICKET_KINDS.contains(self)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryKind::from_str(s).ok_or_else(|| format!("unknown transaction type '{}'", s))
    }
}

/// A ledger entry that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub subject: Subject,
    pub kind: EntryKind,
    /// Negative consumes tickets, positive credits them.
    pub amount: Tickets,
    pub notes: Option<String>,
}

impl NewLedgerEntry {
    pub fn new(subject: Subject, kind: EntryKind, amount: Tickets) -> Self {
        Self {
            subject,
            kind,
            amount,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// True when storing this entry must be followed by a balance recompute.
    pub fn moves_ticket_balance(&self) -> bool {
        self.kind.affects_ticket_balance() && self.subject.fun_jumper().is_some()
    }
}

/// A stored ledger entry. Never updated or deleted; corrections are new entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub subject: Subject,
    pub kind: EntryKind,
    pub amount: Tickets,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Jump-ticket balance of one fun-jumper, folded from a list of entries.
pub fn compute_ticket_balance(jumper: FunJumperId, entries: &[LedgerEntry]) -> Tickets {
    entries
        .iter()
        .filter(|e| e.subject == Subject::FunJumper(jumper) && e.kind.affects_ticket_balance())
        .map(|e| e.amount)
        .sum()
}

/// Jump-ticket balances for every fun-jumper that has at least one qualifying entry.
pub fn compute_all_ticket_balances(entries: &[LedgerEntry]) -> HashMap<FunJumperId, Tickets> {
    let mut balances = HashMap::new();
    for entry in entries.iter().filter(|e| e.kind.affects_ticket_balance()) {
        if let Some(jumper) = entry.subject.fun_jumper() {
            *balances.entry(jumper).or_insert(0) += entry.amount;
        }
    }
    balances
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: EntryId, subject: Subject, kind: EntryKind, amount: Tickets) -> LedgerEntry {
        LedgerEntry {
            id,
            subject,
            kind,
            amount,
            notes: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_balance_of_empty_ledger_is_zero() {
        assert_eq!(compute_ticket_balance(1, &[]), 0);
    }

    #[test]
    fn test_balance_sums_ticket_kinds_only() {
        let entries = vec![
            entry(1, Subject::FunJumper(1), EntryKind::BuyJumpticket, 10),
            entry(2, Subject::FunJumper(1), EntryKind::Jump, -1),
            entry(3, Subject::FunJumper(1), EntryKind::Jump, -1),
            entry(4, Subject::FunJumper(1), EntryKind::CancelJump, 1),
            entry(5, Subject::FunJumper(1), EntryKind::Other, 50),
            entry(6, Subject::FunJumper(1), EntryKind::CancelJumpticket, -2),
        ];

        assert_eq!(compute_ticket_balance(1, &entries), 7);
    }

    #[test]
    fn test_balance_ignores_other_subjects() {
        let entries = vec![
            entry(1, Subject::FunJumper(1), EntryKind::BuyJumpticket, 5),
            entry(2, Subject::FunJumper(2), EntryKind::BuyJumpticket, 3),
            // Same numeric id, different subject kind
            entry(3, Subject::Instructor(1), EntryKind::TandemJump, 1),
            entry(4, Subject::Pilot(1), EntryKind::Jump, -1),
        ];

        assert_eq!(compute_ticket_balance(1, &entries), 5);
        assert_eq!(compute_ticket_balance(2, &entries), 3);
    }

    #[test]
    fn test_compute_all_ticket_balances() {
        let entries = vec![
            entry(1, Subject::FunJumper(1), EntryKind::BuyJumpticket, 5),
            entry(2, Subject::FunJumper(2), EntryKind::Jump, -1),
            entry(3, Subject::Instructor(9), EntryKind::TandemPhotos, 1),
        ];

        let balances = compute_all_ticket_balances(&entries);

        assert_eq!(balances.get(&1), Some(&5));
        assert_eq!(balances.get(&2), Some(&-1));
        assert_eq!(balances.len(), 2);
    }

    #[test]
    fn test_subject_columns_roundtrip() {
        for subject in [
            Subject::FunJumper(4),
            Subject::Pilot(5),
            Subject::Instructor(6),
        ] {
            let (f, p, i) = subject.to_columns();
            assert_eq!(Subject::from_columns(f, p, i), Some(subject));
        }
    }

    #[test]
    fn test_subject_requires_exactly_one_column() {
        assert_eq!(Subject::from_columns(None, None, None), None);
        assert_eq!(Subject::from_columns(Some(1), Some(2), None), None);
    }

    #[test]
    fn test_parse_subject() {
        assert_eq!("funjumper:12".parse::<Subject>(), Ok(Subject::FunJumper(12)));
        assert_eq!("pilot:3".parse::<Subject>(), Ok(Subject::Pilot(3)));
        assert_eq!("instructor:7".parse::<Subject>(), Ok(Subject::Instructor(7)));
        assert!("passenger:1".parse::<Subject>().is_err());
        assert!("funjumper".parse::<Subject>().is_err());
        assert!("funjumper:abc".parse::<Subject>().is_err());
    }

    #[test]
    fn test_entry_kind_parse() {
        for kind in EntryKind::ALL {
            assert_eq!(EntryKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EntryKind::from_str("refund"), None);
    }

    #[test]
    fn test_only_fun_jumper_ticket_entries_move_balance() {
        let jump = NewLedgerEntry::new(Subject::FunJumper(1), EntryKind::Jump, -1);
        let tandem = NewLedgerEntry::new(Subject::Instructor(1), EntryKind::TandemJump, 1);
        let other = NewLedgerEntry::new(Subject::FunJumper(1), EntryKind::Other, 3);
        let pilot = NewLedgerEntry::new(Subject::Pilot(1), EntryKind::BuyJumpticket, 3);

        assert!(jump.moves_ticket_balance());
        assert!(!tandem.moves_ticket_balance());
        assert!(!other.moves_ticket_balance());
        assert!(!pilot.moves_ticket_balance());
    }
}
