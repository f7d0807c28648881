use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ExchangeError, FileError};
use crate::table::ReviewTable;

fn write_json(path: &Path, map: &BTreeMap<String, String>) -> Result<(), ExchangeError> {
    let json = serde_json::to_string_pretty(map).map_err(|source| ExchangeError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|e| FileError::new("write", path, e))?;
    Ok(())
}

/// Writes `address → translation` as indented UTF-8 JSON.
pub fn export_json(table: &ReviewTable, path: &Path) -> Result<usize, ExchangeError> {
    let map = table.translation_map();
    write_json(path, &map)?;
    Ok(map.len())
}

/// Writes `address → original text`, for translating outside the tool.
pub fn export_source_json(table: &ReviewTable, path: &Path) -> Result<usize, ExchangeError> {
    let map = table.source_map();
    write_json(path, &map)?;
    Ok(map.len())
}

pub fn import_json(path: &Path) -> Result<BTreeMap<String, String>, ExchangeError> {
    let text = std::fs::read_to_string(path).map_err(|e| FileError::new("read", path, e))?;
    serde_json::from_str(text.trim_start_matches('\u{feff}')).map_err(|source| ExchangeError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// `xpath,original_text,translated_text` for every row.
pub fn export_csv(table: &ReviewTable, path: &Path) -> Result<usize, ExchangeError> {
    let csv_err = |source: csv::Error| ExchangeError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(["xpath", "original_text", "translated_text"])
        .map_err(csv_err)?;
    for row in table.rows() {
        wtr.write_record([row.address.as_str(), row.original.as_str(), row.translation.as_str()])
            .map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| FileError::new("write", path, e))?;
    Ok(table.len())
}

/// Reads the `xpath` and `translated_text` columns, in whatever order they appear.
pub fn import_csv(path: &Path) -> Result<BTreeMap<String, String>, ExchangeError> {
    let csv_err = |source: csv::Error| ExchangeError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let headers = rdr.headers().map_err(csv_err)?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
            .ok_or(ExchangeError::MissingColumn {
                path: path.to_path_buf(),
                column: name,
            })
    };
    let xpath_col = column("xpath")?;
    let text_col = column("translated_text")?;

    let mut out = BTreeMap::new();
    for record in rdr.records() {
        let record = record.map_err(csv_err)?;
        let (Some(xpath), Some(text)) = (record.get(xpath_col), record.get(text_col)) else {
            continue;
        };
        let xpath = xpath.trim();
        if xpath.is_empty() {
            continue;
        }
        out.insert(xpath.to_string(), text.to_string());
    }
    Ok(out)
}
