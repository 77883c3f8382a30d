use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::DropzoneService;
use crate::domain::{FunJumper, LedgerEntry};

/// Full ledger snapshot for backup and audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub fun_jumpers: Vec<FunJumper>,
    pub entries: Vec<LedgerEntry>,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a DropzoneService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a DropzoneService) -> Self {
        Self { service }
    }

    /// Export every ledger entry, oldest first, to CSV
    pub async fn export_ledger_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self.service.list_all_entries().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "transaction_datetime",
            "transaction_type",
            "subject",
            "subject_id",
            "amount",
            "notes",
        ])?;

        for entry in &entries {
            csv_writer.write_record([
                entry.id.to_string(),
                entry.recorded_at.to_rfc3339(),
                entry.kind.as_str().to_string(),
                entry.subject.label().to_string(),
                entry.subject.id().to_string(),
                entry.amount.to_string(),
                entry.notes.clone().unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    /// Export cached and ledger balances of every fun-jumper to CSV
    pub async fn export_balances_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let jumpers = self.service.list_fun_jumpers().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["funjumper_id", "name", "cached_balance", "ledger_balance"])?;

        for jumper in &jumpers {
            let balance = self.service.get_ticket_balance(jumper.id).await?;
            csv_writer.write_record([
                jumper.id.to_string(),
                jumper.full_name(),
                balance.cached.to_string(),
                balance.ledger.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(jumpers.len())
    }

    /// Export fun-jumpers and the full ledger as a JSON snapshot
    pub async fn export_snapshot_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            fun_jumpers: self.service.list_fun_jumpers().await?,
            entries: self.service.list_all_entries().await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
