// Primitives for reading CSV files.

use log::debug;
use snafu::prelude::*;

use crate::pipeline::config_reader::{ColumnMap, FileSource};
use crate::pipeline::io_common::ColumnLayout;
use crate::pipeline::{CsvLineParseSnafu, CsvOpenSnafu, ParsedRow, PipelineResult};

pub fn read_appointment_csv(
    path: String,
    source: &FileSource,
    columns: &ColumnMap,
) -> PipelineResult<Vec<ParsedRow>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path.clone())
        .context(CsvOpenSnafu { path: path.clone() })?;
    let mut records = rdr.into_records();

    let header: Vec<String> = match records.next() {
        Some(line_r) => line_r
            .context(CsvLineParseSnafu {})?
            .iter()
            .map(|s| s.to_string())
            .collect(),
        None => whatever!("CSV file {} is empty", path),
    };
    debug!("read_appointment_csv: header: {:?}", header);
    let layout = ColumnLayout::resolve(&header, source, columns, &path)?;

    let mut res: Vec<ParsedRow> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu {})?;
        debug!("read_appointment_csv: lineno: {:?} row: {:?}", lineno, line);
        res.push(layout.parse_row(|i| line.get(i).map(|s| s.to_string())));
    }
    Ok(res)
}
