//! Snapshot download and inspection.

use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use txd_client::TransactionSystemClient;
use txd_core::{InProgressKind, SnapshotStore, TransactionSnapshot};

/// Snapshot summary for display.
#[derive(Debug, Serialize)]
pub struct SnapshotSummary {
    /// When the snapshot was taken, epoch ms.
    pub timestamp: i64,
    /// Highest committed write pointer.
    pub read_pointer: i64,
    /// Last assigned write pointer.
    pub write_pointer: i64,
    /// Invalid write pointers.
    pub invalid: Vec<i64>,
    /// Aborted write pointers still hidden from readers.
    pub aborted: Vec<i64>,
    /// Open write pointers.
    pub in_progress: Vec<OpenEntry>,
    /// Transactions that passed `canCommit` but have not committed.
    pub committing: usize,
    /// Retained committed change sets.
    pub committed: usize,
}

/// One open write pointer.
#[derive(Debug, Serialize)]
pub struct OpenEntry {
    /// Write pointer.
    pub write_pointer: i64,
    /// `short`, `long` or `checkpoint`.
    pub kind: &'static str,
    /// Owning transaction for checkpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<i64>,
    /// Expiration, epoch ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
}

impl From<&TransactionSnapshot> for SnapshotSummary {
    fn from(snapshot: &TransactionSnapshot) -> Self {
        let in_progress = snapshot
            .in_progress
            .iter()
            .map(|(write_pointer, entry)| {
                let (kind, parent) = match entry.kind {
                    InProgressKind::Short => ("short", None),
                    InProgressKind::Long => ("long", None),
                    InProgressKind::Checkpoint { parent } => ("checkpoint", Some(parent)),
                };
                OpenEntry {
                    write_pointer: *write_pointer,
                    kind,
                    parent,
                    expiration: entry.expiration,
                }
            })
            .collect();

        Self {
            timestamp: snapshot.timestamp,
            read_pointer: snapshot.read_pointer,
            write_pointer: snapshot.write_pointer,
            invalid: snapshot.invalid.clone(),
            aborted: snapshot.aborted.clone(),
            in_progress,
            committing: snapshot.committing_change_sets.len(),
            committed: snapshot.committed_change_sets.len(),
        }
    }
}

/// Downloads a snapshot from the service into `out`.
pub fn download(address: &str, out: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = super::connect(address).snapshot_stream()?;
    let mut writer = BufWriter::new(File::create(out)?);
    let written = io::copy(&mut stream, &mut writer)?;
    writer.flush()?;
    println!("Wrote {} bytes to {}", written, out.display());
    Ok(())
}

/// Prints the contents of a snapshot file.
pub fn inspect(file: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = SnapshotStore::read(file)?;
    let summary = SnapshotSummary::from(&snapshot);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_text_output(&summary),
    }
    Ok(())
}

fn print_text_output(summary: &SnapshotSummary) {
    println!("Snapshot taken at {}", summary.timestamp);
    println!("  Read pointer:  {}", summary.read_pointer);
    println!("  Write pointer: {}", summary.write_pointer);
    println!("  Invalid:       {} {:?}", summary.invalid.len(), summary.invalid);
    println!("  Aborted:       {} {:?}", summary.aborted.len(), summary.aborted);
    println!("  Committing:    {}", summary.committing);
    println!("  Committed:     {}", summary.committed);
    println!("  In progress:   {}", summary.in_progress.len());
    for entry in &summary.in_progress {
        let mut line = format!("    {} {}", entry.write_pointer, entry.kind);
        if let Some(parent) = entry.parent {
            line.push_str(&format!(" of {parent}"));
        }
        if let Some(expiration) = entry.expiration {
            line.push_str(&format!(" expires {expiration}"));
        }
        println!("{line}");
    }
}
