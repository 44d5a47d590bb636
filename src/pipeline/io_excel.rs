// Reader for Excel-based appointment registers.

use log::debug;
use snafu::prelude::*;

use calamine::{open_workbook, Reader, Xlsx};

use crate::pipeline::config_reader::{ColumnMap, FileSource};
use crate::pipeline::io_common::ColumnLayout;
use crate::pipeline::{EmptyExcelSnafu, OpeningExcelSnafu, ParsedRow, PipelineResult};

pub fn read_appointment_excel(
    path: String,
    source: &FileSource,
    columns: &ColumnMap,
) -> PipelineResult<Vec<ParsedRow>> {
    let mut workbook: Xlsx<_> =
        open_workbook(path.clone()).context(OpeningExcelSnafu { path: path.clone() })?;
    let wrange = match &source.worksheet_name {
        Some(name) => workbook
            .worksheet_range(name)
            .context(EmptyExcelSnafu { path: path.clone() })?
            .context(OpeningExcelSnafu { path: path.clone() })?,
        None => workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu { path: path.clone() })?
            .context(OpeningExcelSnafu { path: path.clone() })?,
    };

    let mut rows = wrange.rows();
    let header: Vec<String> = rows
        .next()
        .context(EmptyExcelSnafu { path: path.clone() })?
        .iter()
        .map(cell_to_string)
        .collect();
    debug!("read_appointment_excel: header: {:?}", header);
    let layout = ColumnLayout::resolve(&header, source, columns, &path)?;

    let mut res: Vec<ParsedRow> = Vec::new();
    for row in rows {
        res.push(layout.parse_row(|i| {
            row.get(i)
                .map(cell_to_string)
                .filter(|s| !s.is_empty())
        }));
    }
    Ok(res)
}

/// Renders one worksheet cell as text. Spreadsheet exports routinely turn
/// a year into a float; integral floats print without the trailing ".0".
fn cell_to_string(cell: &calamine::DataType) -> String {
    match cell {
        calamine::DataType::String(s) => s.clone(),
        calamine::DataType::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        calamine::DataType::Float(f) => format!("{}", f),
        calamine::DataType::Int(i) => format!("{}", i),
        calamine::DataType::Bool(b) => format!("{}", b),
        _ => String::new(),
    }
}
