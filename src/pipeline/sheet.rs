//! Spreadsheet pipelines: CSV, JSON and HTML tables.

use super::{escape_html, html_document, PipelineContext, PipelineResult, Produced, StepError};
use crate::backend::{Cell, Sheet, Workbook};
use crate::error::BackendError;
use serde_json::{Map, Value};

fn pick_sheet<'w>(workbook: &'w Workbook, name: Option<&str>) -> Result<&'w Sheet, StepError> {
    workbook.sheet(name).ok_or_else(|| {
        let detail = match name {
            Some(n) => format!(
                "no sheet named '{n}' (sheets: {})",
                workbook.sheet_names().join(", ")
            ),
            None => "workbook has no sheets".to_string(),
        };
        StepError::Backend(BackendError::failed("workbook", detail))
    })
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn sheet_to_csv(sheet: &Sheet) -> String {
    let mut out = sheet
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|c| csv_field(&c.display()))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn cell_json(cell: &Cell) -> Value {
    match cell {
        Cell::Empty => Value::Null,
        Cell::Text(s) => Value::String(s.clone()),
        Cell::Bool(b) => Value::Bool(*b),
        Cell::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Value::from(*n as i64),
        Cell::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

/// Column keys from the header row; blank and repeated headers get
/// `__EMPTY`/`_N` suffixes so every key is unique.
fn header_keys(header: &[Cell], width: usize) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(width);
    let mut blanks = 0;
    for i in 0..width {
        let raw = header.get(i).map(Cell::display).unwrap_or_default();
        let mut key = if raw.trim().is_empty() {
            let k = if blanks == 0 {
                "__EMPTY".to_string()
            } else {
                format!("__EMPTY_{blanks}")
            };
            blanks += 1;
            k
        } else {
            raw
        };
        let base = key.clone();
        let mut n = 1;
        while keys.contains(&key) {
            key = format!("{base}_{n}");
            n += 1;
        }
        keys.push(key);
    }
    keys
}

/// Rows after the header as objects keyed by header; empty cells and
/// empty rows are skipped.
pub fn sheet_to_records(sheet: &Sheet) -> Vec<Value> {
    let Some((header, body)) = sheet.rows.split_first() else {
        return Vec::new();
    };
    let width = sheet.rows.iter().map(Vec::len).max().unwrap_or(0);
    let keys = header_keys(header, width);
    body.iter()
        .filter_map(|row| {
            let obj: Map<String, Value> = row
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.is_empty())
                .map(|(i, c)| (keys[i].clone(), cell_json(c)))
                .collect();
            (!obj.is_empty()).then_some(Value::Object(obj))
        })
        .collect()
}

pub fn workbook_to_json(workbook: &Workbook) -> Value {
    let obj: Map<String, Value> = workbook
        .sheets
        .iter()
        .map(|s| (s.name.clone(), Value::Array(sheet_to_records(s))))
        .collect();
    Value::Object(obj)
}

/// `<table>` with the first row as header cells.
pub fn sheet_to_table(sheet: &Sheet) -> String {
    let mut html = String::from("<table>\n");
    for (i, row) in sheet.rows.iter().enumerate() {
        let tag = if i == 0 { "th" } else { "td" };
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<{tag}>{}</{tag}>", escape_html(&cell.display())));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>");
    html
}

pub async fn to_csv(ctx: &PipelineContext) -> PipelineResult {
    let workbook = ctx.backends.spreadsheet.read_workbook(&ctx.input).await?;
    let sheet = pick_sheet(&workbook, ctx.options.sheet.as_deref())?;
    Ok(Produced::new(
        sheet_to_csv(sheet),
        format!("Converted sheet \"{}\" to CSV", sheet.name),
    ))
}

pub async fn to_json(ctx: &PipelineContext) -> PipelineResult {
    let workbook = ctx.backends.spreadsheet.read_workbook(&ctx.input).await?;
    let json = serde_json::to_string_pretty(&workbook_to_json(&workbook))
        .map_err(|e| BackendError::failed("json", e))?;
    Ok(Produced::new(
        json,
        format!("Converted {} sheets to JSON", workbook.sheets.len()),
    ))
}

pub async fn to_html(ctx: &PipelineContext) -> PipelineResult {
    let workbook = ctx.backends.spreadsheet.read_workbook(&ctx.input).await?;
    let sheet = pick_sheet(&workbook, ctx.options.sheet.as_deref())?;
    let body = format!("<h1>{}</h1>\n{}", escape_html(&sheet.name), sheet_to_table(sheet));
    Ok(Produced::new(
        html_document(&sheet.name, &body),
        format!("Converted sheet \"{}\" to HTML", sheet.name),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn t(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    fn people() -> Sheet {
        Sheet {
            name: "People".into(),
            rows: vec![
                vec![t("name"), t("age"), t("note")],
                vec![t("Ada"), Cell::Number(36.0), t("likes, commas")],
                vec![Cell::Empty, Cell::Empty, Cell::Empty],
                vec![t("Bob"), Cell::Number(41.5), t("said \"hi\"")],
            ],
        }
    }

    #[test]
    fn csv_quotes_when_needed() {
        let csv = sheet_to_csv(&people());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "name,age,note");
        assert_eq!(lines[1], "Ada,36,\"likes, commas\"");
        assert_eq!(lines[2], ",,");
        assert_eq!(lines[3], "Bob,41.5,\"said \"\"hi\"\"\"");
    }

    #[test]
    fn records_skip_empty_rows_and_cells() {
        let records = sheet_to_records(&people());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], json!({"name": "Ada", "age": 36, "note": "likes, commas"}));
        assert_eq!(records[1]["age"], json!(41.5));
    }

    #[test]
    fn blank_and_duplicate_headers_get_unique_keys() {
        let keys = header_keys(&[t("a"), Cell::Empty, t("a"), Cell::Empty], 5);
        assert_eq!(keys, vec!["a", "__EMPTY", "a_1", "__EMPTY_1", "__EMPTY_2"]);
    }

    #[test]
    fn json_keeps_sheet_order() {
        let wb = Workbook {
            sheets: vec![
                Sheet { name: "Zeta".into(), rows: vec![vec![t("k")], vec![t("v")]] },
                Sheet { name: "Alpha".into(), rows: vec![] },
            ],
        };
        let json = workbook_to_json(&wb);
        let names: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
        assert_eq!(json["Zeta"], json!([{"k": "v"}]));
        assert_eq!(json["Alpha"], json!([]));
    }

    #[test]
    fn table_uses_header_cells() {
        let html = sheet_to_table(&people());
        assert!(html.contains("<tr><th>name</th><th>age</th><th>note</th></tr>"));
        assert!(html.contains("<td>said &quot;hi&quot;</td>"));
    }

    #[test]
    fn missing_sheet_lists_available() {
        let wb = Workbook { sheets: vec![people()] };
        let err = pick_sheet(&wb, Some("Nope")).unwrap_err();
        assert!(err.to_string().contains("People"));
    }
}
