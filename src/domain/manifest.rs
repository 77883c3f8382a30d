use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntryKind, FunJumperId, InstructorId, NewLedgerEntry, PilotId, Subject};

pub type LoadId = i64;
pub type JumpId = i64;
pub type AirplaneId = i64;
pub type JumpTypeId = i64;
pub type PassengerId = i64;
pub type TandemId = i64;

/// Slots taken by one tandem pair (passenger plus instructor).
pub const TANDEM_SLOTS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Active,
    Inactive,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Active => "active",
            LoadStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(LoadStatus::Active),
            "inactive" => Some(LoadStatus::Inactive),
            _ => None,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            LoadStatus::Active => LoadStatus::Inactive,
            LoadStatus::Inactive => LoadStatus::Active,
        }
    }
}

impl std::fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airplane {
    pub id: AirplaneId,
    pub tail_number: String,
    pub aircraft_type: Option<String>,
    /// Jumper seats available on one load.
    pub slots: i64,
    pub fuel_type_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpType {
    pub id: JumpTypeId,
    pub name: String,
    pub height_feet: i64,
}

/// A single flight of an airplane carrying jumpers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Load {
    pub id: LoadId,
    pub airplane_id: AirplaneId,
    pub pilot_id: PilotId,
    pub takeoff_at: DateTime<Utc>,
    pub status: LoadStatus,
    pub notes: Option<String>,
}

/// Who occupies a manifest slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Jumper {
    FunJumper(FunJumperId),
    Tandem(TandemId),
}

/// Membership of a jumper on a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestJump {
    pub id: JumpId,
    pub load_id: LoadId,
    pub jumper: Jumper,
    pub jump_type_id: Option<JumpTypeId>,
    pub group_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passenger {
    pub id: PassengerId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl Passenger {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A tandem booked at check-in. Pending until an instructor is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TandemBooking {
    pub id: TandemId,
    pub passenger_id: PassengerId,
    pub instructor_id: Option<InstructorId>,
    pub waiver_signed: bool,
    pub photos: bool,
    pub videos: bool,
    pub notes: Option<String>,
}

impl TandemBooking {
    pub fn is_pending(&self) -> bool {
        self.instructor_id.is_none()
    }

    /// Credits owed to the instructor for flying this tandem on a load:
    /// one `tandem_jump`, plus one entry per booked media add-on.
    pub fn compensation_entries(
        &self,
        instructor: InstructorId,
        load_id: LoadId,
    ) -> Vec<NewLedgerEntry> {
        let subject = Subject::Instructor(instructor);
        let passenger = self.passenger_id;
        let mut entries = vec![
            NewLedgerEntry::new(subject, EntryKind::TandemJump, 1).with_notes(format!(
                "Tandem instructor on load {} with passenger {}",
                load_id, passenger
            )),
        ];
        if self.photos {
            entries.push(
                NewLedgerEntry::new(subject, EntryKind::TandemPhotos, 1).with_notes(format!(
                    "Tandem photos on load {} with passenger {}",
                    load_id, passenger
                )),
            );
        }
        if self.videos {
            entries.push(
                NewLedgerEntry::new(subject, EntryKind::TandemVideos, 1).with_notes(format!(
                    "Tandem video on load {} with passenger {}",
                    load_id, passenger
                )),
            );
        }
        entries
    }

    /// Entries that cancel `compensation_entries` when the tandem is pulled off a load.
    pub fn reversal_entries(&self, instructor: InstructorId, load_id: LoadId) -> Vec<NewLedgerEntry> {
        self.compensation_entries(instructor, load_id)
            .into_iter()
            .map(|entry| {
                let notes = format!(
                    "Reversal: {}",
                    entry.notes.as_deref().unwrap_or("tandem compensation")
                );
                NewLedgerEntry::new(entry.subject, entry.kind, -entry.amount).with_notes(notes)
            })
            .collect()
    }
}

/// Seats used on a load. A tandem takes two.
pub fn used_slots(fun_jumpers: usize, tandems: usize) -> i64 {
    fun_jumpers as i64 + tandems as i64 * TANDEM_SLOTS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(photos: bool, videos: bool) -> TandemBooking {
        TandemBooking {
            id: 1,
            passenger_id: 42,
            instructor_id: None,
            waiver_signed: true,
            photos,
            videos,
            notes: None,
        }
    }

    #[test]
    fn test_compensation_with_photos_only() {
        let entries = booking(true, false).compensation_entries(7, 3);

        let kinds: Vec<EntryKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::TandemJump, EntryKind::TandemPhotos]);
        assert!(entries.iter().all(|e| e.amount == 1));
        assert!(entries.iter().all(|e| e.subject == Subject::Instructor(7)));
    }

    #[test]
    fn test_compensation_without_media() {
        let entries = booking(false, false).compensation_entries(7, 3);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::TandemJump);
    }

    #[test]
    fn test_compensation_with_photos_and_videos() {
        let entries = booking(true, true).compensation_entries(7, 3);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].kind, EntryKind::TandemVideos);
    }

    #[test]
    fn test_reversal_negates_compensation() {
        let b = booking(true, true);
        let credits: i64 = b.compensation_entries(7, 3).iter().map(|e| e.amount).sum();
        let debits: i64 = b.reversal_entries(7, 3).iter().map(|e| e.amount).sum();

        assert_eq!(credits, 3);
        assert_eq!(credits + debits, 0);
    }

    #[test]
    fn test_used_slots_counts_tandems_twice() {
        assert_eq!(used_slots(0, 0), 0);
        assert_eq!(used_slots(3, 2), 7);
    }

    #[test]
    fn test_load_status_toggle() {
        assert_eq!(LoadStatus::Active.toggled(), LoadStatus::Inactive);
        assert_eq!(LoadStatus::Inactive.toggled(), LoadStatus::Active);
        assert_eq!(LoadStatus::from_str("ACTIVE"), Some(LoadStatus::Active));
    }
}
