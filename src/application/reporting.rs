use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EntryKind, InstructorId, LoadId, LoadStatus};

use super::{AppError, DropzoneService};

/// Ledger activity for one transaction type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindSummary {
    pub kind: EntryKind,
    pub count: i64,
    pub total: i64,
}

/// Net credits owed to one tandem instructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructorCompensation {
    pub instructor_id: InstructorId,
    pub name: String,
    pub tandem_jumps: i64,
    pub photos: i64,
    pub videos: i64,
}

/// A tandem pair as listed in the daily resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TandemPair {
    pub passenger: String,
    pub instructor: Option<String>,
}

/// One load of the day, with who flew it and who jumped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResume {
    pub load_id: LoadId,
    pub takeoff_at: DateTime<Utc>,
    pub status: LoadStatus,
    pub pilot_name: String,
    pub tail_number: String,
    pub notes: Option<String>,
    pub fun_jumpers: Vec<String>,
    pub tandems: Vec<TandemPair>,
}

/// Everything that flew on one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyOperations {
    pub date: NaiveDate,
    pub loads: Vec<LoadResume>,
    pub total_fun_jumpers: usize,
    pub total_tandems: usize,
}

impl DropzoneService {
    /// Entry count and total per transaction type, for every type on the ledger.
    pub async fn ledger_summary(&self) -> Result<Vec<KindSummary>, AppError> {
        let rows = self.repo.summarize_by_kind().await?;
        Ok(rows
            .into_iter()
            .map(|(kind, count, total)| KindSummary { kind, count, total })
            .collect())
    }

    /// Tandem, photo and video credits per instructor, net of reversals.
    pub async fn instructor_compensation(&self) -> Result<Vec<InstructorCompensation>, AppError> {
        let rows = self.repo.instructor_compensation().await?;

        let mut by_instructor: BTreeMap<(String, InstructorId), InstructorCompensation> =
            BTreeMap::new();
        for row in rows {
            let summary = by_instructor
                .entry((row.name.clone(), row.instructor_id))
                .or_insert_with(|| InstructorCompensation {
                    instructor_id: row.instructor_id,
                    name: row.name.clone(),
                    ..Default::default()
                });
            match row.kind {
                EntryKind::TandemJump => summary.tandem_jumps += row.total,
                EntryKind::TandemPhotos => summary.photos += row.total,
                EntryKind::TandemVideos => summary.videos += row.total,
                _ => {}
            }
        }

        Ok(by_instructor.into_values().collect())
    }

    /// Resume of a day of operations: every load taking off on `date` (UTC),
    /// active or not, with its pilot, airplane and jumpers.
    pub async fn daily_operations(&self, date: NaiveDate) -> Result<DailyOperations, AppError> {
        let overviews = self.repo.list_loads_on(date).await?;

        let mut loads = Vec::with_capacity(overviews.len());
        for overview in overviews {
            let load_id = overview.load.id;
            let fun_jumpers = self.repo.list_fun_jumper_slots(load_id).await?;
            let tandems = self.repo.list_tandem_slots(load_id).await?;

            loads.push(LoadResume {
                load_id,
                takeoff_at: overview.load.takeoff_at,
                status: overview.load.status,
                pilot_name: overview.pilot_name,
                tail_number: overview.tail_number,
                notes: overview.load.notes,
                fun_jumpers: fun_jumpers.into_iter().map(|slot| slot.name).collect(),
                tandems: tandems
                    .into_iter()
                    .map(|slot| TandemPair {
                        passenger: slot.passenger_name,
                        instructor: slot.instructor_name,
                    })
                    .collect(),
            });
        }

        Ok(DailyOperations {
            date,
            total_fun_jumpers: loads.iter().map(|load| load.fun_jumpers.len()).sum(),
            total_tandems: loads.iter().map(|load| load.tandems.len()).sum(),
            loads,
        })
    }
}
