use crate::domain::models::Complaint;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use csv::{QuoteStyle, WriterBuilder};

pub const CSV_HEADER: [&str; 11] = [
    "ticketId",
    "fullName",
    "email",
    "category",
    "description",
    "location",
    "status",
    "createdAt",
    "updatedAt",
    "latestResponse",
    "latestResponseAt",
];

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row(complaint: &Complaint) -> [String; 11] {
    let latest = complaint.responses.last();
    [
        complaint.ticket_id.clone(),
        complaint.full_name.clone(),
        complaint.email.clone(),
        complaint.category.to_string(),
        complaint.description.clone(),
        complaint.location.clone().unwrap_or_default(),
        complaint.status.to_string(),
        timestamp(complaint.created_at),
        timestamp(complaint.updated_at),
        latest.map(|r| r.message.clone()).unwrap_or_default(),
        latest.map(|r| timestamp(r.responded_at)).unwrap_or_default(),
    ]
}

/// Renders complaints as CSV, one row each in the given order. Every field is
/// quoted and embedded quotes are doubled.
pub fn export_csv(complaints: &[Complaint]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for complaint in complaints {
        writer
            .write_record(row(complaint))
            .with_context(|| format!("failed to write complaint {}", complaint.ticket_id))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}
