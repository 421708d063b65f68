//! Spreadsheet reading and cell conversion
//!
//! The first worksheet is read; its first row names the columns. Header
//! names are matched ignoring case, accents and punctuation, in Spanish or
//! English.

use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};

use super::ImportError;
use crate::rules::Money;

/// Customer fields the import understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    BusinessName,
    ContactName,
    Email,
    Phone,
    Industry,
    Plan,
    MonthlyFee,
    StartDate,
    Status,
    Notes,
}

impl Field {
    /// Match a normalized header against the known aliases
    fn from_header(normalized: &str) -> Option<Field> {
        let field = match normalized {
            "empresa" | "negocio" | "nombre del negocio" | "nombre negocio" | "cliente"
            | "razon social" | "business name" | "business" | "company" | "nombre" => {
                Field::BusinessName
            }
            "contacto" | "nombre de contacto" | "nombre contacto" | "contact" | "contact name" => {
                Field::ContactName
            }
            "email" | "e mail" | "correo" | "correo electronico" | "mail" => Field::Email,
            "telefono" | "tel" | "celular" | "whatsapp" | "phone" | "phone number" => Field::Phone,
            "giro" | "industria" | "sector" | "industry" => Field::Industry,
            "plan" | "paquete" | "package" | "servicio" => Field::Plan,
            "monto" | "monto mensual" | "mensualidad" | "precio" | "tarifa" | "fee"
            | "monthly fee" | "iguala" => Field::MonthlyFee,
            "fecha inicio" | "fecha de inicio" | "inicio" | "fecha alta" | "fecha de alta"
            | "start date" | "start" => Field::StartDate,
            "estado" | "estatus" | "status" => Field::Status,
            "notas" | "comentarios" | "observaciones" | "notes" | "comments" => Field::Notes,
            _ => return None,
        };
        Some(field)
    }
}

/// A spreadsheet cell reduced to what the import cares about
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Trimmed text, numbers rendered without a trailing `.0`
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        }
    }
}

/// One data row, keyed by recognized column
#[derive(Debug, Clone, Default)]
pub struct SheetRow {
    /// 1-based spreadsheet line, for error messages
    pub line: usize,
    pub values: HashMap<Field, Cell>,
}

impl SheetRow {
    pub fn get(&self, field: Field) -> &Cell {
        self.values.get(&field).unwrap_or(&Cell::Empty)
    }

    pub fn text(&self, field: Field) -> Option<String> {
        self.get(field).as_text()
    }
}

/// Lowercase, strip accents and punctuation, collapse whitespace
pub fn normalize_header(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Map header and data rows to `SheetRow`s, skipping blank lines
pub fn rows_from_grid(grid: Vec<Vec<Cell>>) -> Result<Vec<SheetRow>, ImportError> {
    let mut lines = grid.into_iter();
    let header = lines.next().ok_or(ImportError::NoWorksheet)?;

    let columns: Vec<Option<Field>> = header
        .iter()
        .map(|cell| {
            cell.as_text()
                .and_then(|h| Field::from_header(&normalize_header(&h)))
        })
        .collect();

    if !columns.contains(&Some(Field::BusinessName)) {
        return Err(ImportError::MissingColumn("empresa / business name"));
    }

    let rows = lines
        .enumerate()
        .filter_map(|(i, cells)| {
            let mut row = SheetRow {
                // header is line 1
                line: i + 2,
                values: HashMap::new(),
            };
            for (field, cell) in columns.iter().zip(cells) {
                if let Some(field) = field {
                    // first matching column wins
                    row.values.entry(*field).or_insert(cell);
                }
            }
            if row.values.values().all(Cell::is_empty) {
                None
            } else {
                Some(row)
            }
        })
        .collect();

    Ok(rows)
}

/// Read the first worksheet of an `.xlsx`/`.xls`/`.ods` file
pub fn read_rows(path: &Path) -> Result<Vec<SheetRow>, ImportError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::NoWorksheet)??;

    let grid = range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect();

    rows_from_grid(grid)
}

/// `$1,234.50`, `1234.5 MXN`, or a numeric cell; empty is zero
pub fn parse_currency(cell: &Cell) -> Result<Money, String> {
    match cell {
        Cell::Empty => Ok(Money::ZERO),
        Cell::Number(n) => Money::try_from_pesos(*n).ok_or_else(|| format!("invalid amount {n}")),
        Cell::Text(raw) => {
            let cleaned: String = raw
                .trim()
                .trim_end_matches("MXN")
                .trim_end_matches("mxn")
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | ' '))
                .collect();
            if cleaned.is_empty() {
                return Ok(Money::ZERO);
            }
            cleaned
                .parse::<f64>()
                .ok()
                .and_then(Money::try_from_pesos)
                .ok_or_else(|| format!("invalid amount '{}'", raw.trim()))
        }
    }
}

/// Excel serial day number (1900 date system) to a calendar date
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // serials past 9999-12-31 are not dates
    if !serial.is_finite() || !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    // the 1899-12-30 epoch absorbs Excel's phantom 1900-02-29
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// A date cell: Excel serial, ISO or day-first text
pub fn parse_date(cell: &Cell) -> Result<Option<NaiveDate>, String> {
    match cell {
        Cell::Empty => Ok(None),
        Cell::Number(serial) => excel_serial_to_date(*serial)
            .map(Some)
            .ok_or_else(|| format!("invalid date serial {serial}")),
        Cell::Text(raw) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(None);
            }
            ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d/%m/%y"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .map(Some)
                .ok_or_else(|| format!("invalid date '{raw}'"))
        }
    }
}
