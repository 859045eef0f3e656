use std::fs::File;
use std::io::{stderr, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::Session;
use crate::crm::{validation, AccessContext, ContactService};
use crate::db::Database;
use crate::models::{ContactType, NewContact};
use crate::notify::Notifier;

/// A row from a lead backfill CSV.
///
/// Headers must match field names exactly. Empty strings become `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRow {
    pub first_name: String,
    pub last_name: String,
    pub email: String,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub phone: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub company: Option<String>,

    /// LEAD, CLIENT, AFFILIATE or PREPARER; defaults to LEAD
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub contact_type: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub referrer_username: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub referrer_type: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub attribution_method: Option<String>,

    #[serde(default)]
    pub attribution_confidence: Option<u8>,
}

impl ImportRow {
    pub fn into_new_contact(self) -> Result<NewContact> {
        let contact_type = match self.contact_type {
            Some(raw) => raw.parse::<ContactType>().map_err(anyhow::Error::msg)?,
            None => ContactType::Lead,
        };

        Ok(NewContact {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            contact_type,
            referrer_username: self.referrer_username,
            referrer_type: self.referrer_type,
            attribution_method: self.attribution_method,
            attribution_confidence: self.attribution_confidence,
            ..Default::default()
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub created: u32,
    pub updated: u32,
    pub errors: u32,
}

/// Execute the import command.
pub fn run_import(session: &Session, file: &Path, dry_run: bool) -> Result<()> {
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }
    let reader = File::open(file).context("Failed to open CSV file")?;

    if dry_run {
        eprintln!("Dry run: {}", file.display());
    } else {
        eprintln!("Importing: {}", file.display());
    }

    let stats = import_contacts(&session.db, &session.notifier, &session.ctx, reader, dry_run)?;
    print_summary(&stats, dry_run);
    Ok(())
}

/// Upsert every row by email. Bad rows are reported and counted; they never stop the import.
pub fn import_contacts(
    db: &Database,
    notifier: &Notifier,
    ctx: &AccessContext,
    reader: impl Read,
    dry_run: bool,
) -> Result<ImportStats> {
    let service = ContactService::new(db, notifier);
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut stats = ImportStats::default();

    let rows: Vec<_> = csv_reader.deserialize::<ImportRow>().collect();
    let total = rows.len();

    for (idx, result) in rows.into_iter().enumerate() {
        // header is line 1
        let line = idx + 2;

        if idx % 100 == 0 || idx + 1 == total {
            eprint!("\r  {}/{}", idx + 1, total);
            let _ = stderr().flush();
        }

        let input = match result
            .map_err(anyhow::Error::from)
            .and_then(ImportRow::into_new_contact)
        {
            Ok(input) => input,
            Err(e) => {
                eprintln!("\nLine {}: parse error: {}", line, e);
                stats.errors += 1;
                continue;
            }
        };

        let outcome = if dry_run {
            check_row(db, input)
        } else {
            service
                .create_contact(input, true, ctx)
                .map(|outcome| outcome.was_created())
                .map_err(anyhow::Error::from)
        };

        match outcome {
            Ok(true) => stats.created += 1,
            Ok(false) => stats.updated += 1,
            Err(e) => {
                eprintln!("\nLine {}: {}", line, e);
                stats.errors += 1;
            }
        }
    }

    if total > 0 {
        eprintln!();
    }
    Ok(stats)
}

/// Validate a row without writing. Returns whether it would create a new contact.
fn check_row(db: &Database, mut input: NewContact) -> Result<bool> {
    validation::prepare_new_contact(&mut input)?;
    Ok(db.find_contact_by_email(&input.email)?.is_none())
}

fn print_summary(stats: &ImportStats, dry_run: bool) {
    let (create_verb, update_verb) = if dry_run {
        ("Would create", "would update")
    } else {
        ("Created", "updated")
    };
    println!("\n{} {} contacts, {} {}", create_verb, stats.created, update_verb, stats.updated);

    if stats.errors > 0 {
        println!("Errors: {}", stats.errors);
    }
}
