//! Spreadsheet backend built on calamine (`.xlsx` and legacy `.xls`).

use super::{run_blocking, Cell, Sheet, SpreadsheetBackend, Workbook};
use crate::error::BackendError;
use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use tracing::debug;

const NAME: &str = "calamine";

/// [`SpreadsheetBackend`] reading every sheet with calamine.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineBackend;

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        other => Cell::Text(other.to_string()),
    }
}

fn read_blocking(path: &Path) -> Result<Workbook, BackendError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| BackendError::failed(NAME, format!("cannot open '{}': {e}", path.display())))?;
    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| BackendError::failed(NAME, format!("sheet '{name}': {e}")))?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(to_cell).collect())
            .collect::<Vec<Vec<Cell>>>();
        debug!("Sheet '{}' → {} rows", name, rows.len());
        sheets.push(Sheet { name, rows });
    }
    Ok(Workbook { sheets })
}

#[async_trait]
impl SpreadsheetBackend for CalamineBackend {
    async fn read_workbook(&self, path: &Path) -> Result<Workbook, BackendError> {
        let path = path.to_path_buf();
        run_blocking(NAME, move || read_blocking(&path)).await
    }

    async fn sheet_names(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        let path = path.to_path_buf();
        run_blocking(NAME, move || {
            let workbook = open_workbook_auto(&path).map_err(|e| {
                BackendError::failed(NAME, format!("cannot open '{}': {e}", path.display()))
            })?;
            Ok(workbook.sheet_names().to_vec())
        })
        .await
    }
}
