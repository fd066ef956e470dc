//! Spreadsheet import for tickets.
//!
//! The first sheet's first row names the columns. Headers are matched without
//! regard to case or accents, in English or Portuguese.

use calamine::{Data, Reader, Xlsx};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::io::Cursor;
use uuid::Uuid;

use super::types::{clean_title, ImportRowError, TicketDraft};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Title,
    Description,
    Status,
    Priority,
    Type,
    Stage,
    Assignee,
    DueDate,
}

impl Column {
    pub fn from_header(header: &str) -> Option<Self> {
        let key = normalize_header(header);
        let column = match key.as_str() {
            "title" | "titulo" | "subject" | "assunto" | "summary" | "resumo" => Self::Title,
            "description" | "descricao" | "details" | "detalhes" => Self::Description,
            "status" | "situacao" | "estado" => Self::Status,
            "priority" | "prioridade" => Self::Priority,
            "type" | "ticket_type" | "tipo" | "categoria" => Self::Type,
            "stage" | "etapa" | "fase" | "coluna" => Self::Stage,
            "assignee" | "assignee_email" | "responsavel" | "atribuido_a" | "email" => {
                Self::Assignee
            }
            "due_date" | "due" | "deadline" | "prazo" | "vencimento" | "data_limite" => {
                Self::DueDate
            }
            _ => return None,
        };
        Some(column)
    }
}

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            ' ' | '-' | '.' => '_',
            other => other,
        })
        .collect()
}

/// One data row, keyed by recognised column. `row` is the 1-based sheet row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportRecord {
    pub row: usize,
    pub values: HashMap<Column, String>,
}

impl ImportRecord {
    fn get(&self, column: Column) -> Option<&str> {
        self.values
            .get(&column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn is_blank(&self) -> bool {
        self.values.values().all(|v| v.trim().is_empty())
    }

    pub fn assignee_email(&self) -> Option<String> {
        self.get(Column::Assignee).map(|e| e.to_lowercase())
    }
}

/// Serial of 9999-12-31, the last date Excel can show.
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Converts an Excel serial day number to a date (1900 date system).
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(0.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::try_days(serial.floor() as i64)?)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        // Out-of-range serials stay numeric so the row fails date parsing.
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
    }
}

/// Reads the first worksheet of an `.xlsx` file into string cells.
pub fn read_sheet(bytes: &[u8]) -> Result<Vec<Vec<String>>, String> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| format!("Not a valid .xlsx file: {e}"))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first = sheet_names
        .first()
        .ok_or_else(|| "Excel file has no sheets".to_string())?;

    let range = workbook
        .worksheet_range(first)
        .map_err(|e| format!("Failed to read sheet: {e}"))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

/// Maps the header row onto columns and returns the data rows.
pub fn rows_to_records(rows: Vec<Vec<String>>) -> Result<Vec<ImportRecord>, String> {
    let mut rows = rows.into_iter();
    let headers = rows.next().ok_or_else(|| "Excel sheet is empty".to_string())?;

    let columns: Vec<Option<Column>> = headers.iter().map(|h| Column::from_header(h)).collect();
    if !columns.contains(&Some(Column::Title)) {
        return Err("Missing required column: title".into());
    }

    Ok(rows
        .enumerate()
        .map(|(index, cells)| {
            let mut values = HashMap::new();
            for (column, value) in columns.iter().zip(cells) {
                if let Some(column) = column {
                    values.entry(*column).or_insert(value);
                }
            }
            ImportRecord {
                row: index + 2,
                values,
            }
        })
        .collect())
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or RFC 3339.
pub fn parse_due_date(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| format!("invalid due date '{value}', expected YYYY-MM-DD"))
}

fn parse_or_default<T: std::str::FromStr + Default>(value: Option<&str>) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or_default()
}

/// Builds a draft from a record; `assignees` maps lowercased emails to user ids.
pub fn record_to_draft(
    record: &ImportRecord,
    assignees: &HashMap<String, Uuid>,
) -> Result<TicketDraft, ImportRowError> {
    let fail = |message: String| ImportRowError {
        row: record.row,
        message,
    };

    let title = record
        .get(Column::Title)
        .ok_or_else(|| fail("title is required".into()))
        .and_then(|t| clean_title(t).map_err(fail))?;

    let assignee_id = match record.assignee_email() {
        Some(email) => Some(
            *assignees
                .get(&email)
                .ok_or_else(|| fail(format!("unknown assignee {email}")))?,
        ),
        None => None,
    };

    let due_date = record
        .get(Column::DueDate)
        .map(parse_due_date)
        .transpose()
        .map_err(fail)?;

    Ok(TicketDraft {
        title,
        description: record.get(Column::Description).map(String::from),
        status: parse_or_default(record.get(Column::Status)),
        priority: parse_or_default(record.get(Column::Priority)),
        ticket_type: parse_or_default(record.get(Column::Type)),
        stage: parse_or_default(record.get(Column::Stage)),
        assignee_id,
        due_date,
    })
}
