//! Tabular export of submission records.
//!
//! One column order is shared by the CSV document sent to the operator and
//! the rows appended to the spreadsheet.

use chrono::{DateTime, Local, Utc};

use crate::errors::AdminError;
use crate::store::SubmissionRecord;

pub const EXPORT_HEADER: [&str; 11] = [
    "ID",
    "User ID",
    "Username",
    "Направление",
    "Дата вылета",
    "Ночей",
    "Взрослых",
    "Детей",
    "Бюджет",
    "Комментарий",
    "Создана",
];

/// `created_at` rendered in the server's local time
pub const CREATED_AT_FORMAT: &str = "%d.%m.%Y %H:%M";

const MISSING_USERNAME: &str = "N/A";
const MISSING_COMMENT: &str = "Нет";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A rendered CSV document ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub bytes: Vec<u8>,
    pub filename: String,
    /// Number of records in the file
    pub count: usize,
}

pub fn format_created_at(created_at: DateTime<Utc>) -> String {
    created_at.with_timezone(&Local).format(CREATED_AT_FORMAT).to_string()
}

/// Cells of one record in export column order
pub fn record_row(record: &SubmissionRecord) -> Vec<String> {
    vec![
        record.id.to_string(),
        record.user_id.to_string(),
        record.username.clone().unwrap_or_else(|| MISSING_USERNAME.to_string()),
        record.destination.clone(),
        record.departure_date.clone(),
        record.nights.to_string(),
        record.adults.to_string(),
        record.children.to_string(),
        record.budget.to_string(),
        record.comment.clone().unwrap_or_else(|| MISSING_COMMENT.to_string()),
        format_created_at(record.created_at),
    ]
}

pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("requests_{}.csv", now.with_timezone(&Local).format("%Y%m%d_%H%M%S"))
}

/// Render records as a `;`-separated CSV with a BOM so spreadsheet tools detect UTF-8
pub fn build_csv(records: &[SubmissionRecord], now: DateTime<Utc>) -> Result<ExportFile, AdminError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(UTF8_BOM.to_vec());

    writer
        .write_record(EXPORT_HEADER)
        .map_err(|e| AdminError::Export(e.to_string()))?;
    for record in records {
        writer
            .write_record(record_row(record))
            .map_err(|e| AdminError::Export(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AdminError::Export(e.to_string()))?;

    Ok(ExportFile {
        bytes,
        filename: export_filename(now),
        count: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> SubmissionRecord {
        SubmissionRecord {
            id: 5,
            user_id: 42,
            username: None,
            destination: "Турция; Анталья".to_string(),
            departure_date: "01.06.2030".to_string(),
            nights: 7,
            adults: 2,
            children: 1,
            budget: 150_000,
            comment: None,
            created_at: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn test_missing_fields_use_placeholders() {
        let row = record_row(&record());
        assert_eq!(row.len(), EXPORT_HEADER.len());
        assert_eq!(row[2], "N/A");
        assert_eq!(row[9], "Нет");
    }

    #[test]
    fn test_csv_has_bom_header_and_quoted_delimiters() {
        let file = build_csv(&[record()], Utc::now()).unwrap();
        assert!(file.bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(file.bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "ID;User ID;Username;Направление;Дата вылета;Ночей;Взрослых;Детей;Бюджет;Комментарий;Создана"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("5;42;N/A;\"Турция; Анталья\";01.06.2030;7;2;1;150000;Нет;"));
        assert_eq!(file.count, 1);
    }

    #[test]
    fn test_filename_shape() {
        let name = export_filename(Utc::now());
        assert!(name.starts_with("requests_"));
        assert!(name.ends_with(".csv"));
        // requests_YYYYMMDD_HHMMSS.csv
        assert_eq!(name.len(), "requests_".len() + 15 + ".csv".len());
    }
}
