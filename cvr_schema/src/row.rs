use log::debug;
use std::collections::BTreeMap;

use crate::config::*;
use crate::schema::SchemaRegistry;

/// The fixed columns of a row, selected once from the structure of the input.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum RowShape {
    SingleFile,
    Report,
}

impl RowShape {
    const SINGLE_FILE_COLUMNS: [&'static str; 6] = [
        "CvrGuid",
        "BatchNumber",
        "BatchSequence",
        "SheetNumber",
        "CreateDate",
        "ModifyDate",
    ];

    const REPORT_COLUMNS: [&'static str; 5] = [
        "BallotImageId",
        "CreatingDeviceId",
        "BallotStyleId",
        "ObjectId",
        "ElectionId",
    ];

    pub fn for_structure(structure: StructureType) -> RowShape {
        match structure {
            StructureType::SingleCvrFile => RowShape::SingleFile,
            StructureType::CastVoteRecordReport => RowShape::Report,
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            RowShape::SingleFile => &RowShape::SINGLE_FILE_COLUMNS,
            RowShape::Report => &RowShape::REPORT_COLUMNS,
        }
    }
}

/// Removes the line breaks from a value.
pub fn clean_value(value: &str) -> String {
    value.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

/// Quotes a cleaned value for CSV output if it contains a comma, a quote or
/// a control character.
pub fn wrap_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c == ',' || c == '"' || c.is_control());
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// A value as written in a CSV field: cleaned, then quoted if needed.
pub fn format_value(value: &str) -> String {
    wrap_value(&clean_value(value))
}

/// One output line: the fixed columns of its shape, and, once a schema is
/// attached, one sparse slot per contest or option column.
#[derive(Debug, Clone)]
pub struct CvrRow<'a> {
    shape: RowShape,
    values: Vec<Option<String>>,
    schema: Option<&'a SchemaRegistry>,
    marks: BTreeMap<usize, String>,
}

impl<'a> CvrRow<'a> {
    pub fn new(shape: RowShape) -> CvrRow<'a> {
        CvrRow {
            shape,
            values: vec![None; shape.columns().len()],
            schema: None,
            marks: BTreeMap::new(),
        }
    }

    pub fn shape(&self) -> RowShape {
        self.shape
    }

    /// Sets a fixed column. Returns false (and does nothing) for a name that
    /// is not a column of this shape.
    pub fn set_column_value(&mut self, name: &str, value: &str) -> bool {
        match self.shape.columns().iter().position(|c| *c == name) {
            Some(idx) => {
                self.values[idx] = Some(value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn column_value(&self, name: &str) -> Option<&str> {
        let idx = self.shape.columns().iter().position(|c| *c == name)?;
        self.values[idx].as_deref()
    }

    pub fn attach_schema(&mut self, schema: &'a SchemaRegistry) {
        self.schema = Some(schema);
    }

    pub fn mark(&self, column: usize) -> Option<&str> {
        self.marks.get(&column).map(|s| s.as_str())
    }

    /// Marks a contest column (empty option id) or an option column.
    ///
    /// Returns whether the column was found in the schema. Marking the same
    /// option column twice is an error and keeps the first mark.
    pub fn mark_contest_column(
        &mut self,
        party: &str,
        contest_id: &str,
        contest_name: &str,
        option_id: &str,
        option_name: &str,
        token: &str,
    ) -> SchemaResult<bool> {
        let schema = match self.schema {
            Some(s) => s,
            None => return Ok(false),
        };
        if option_id.is_empty() {
            return match schema.find_contest_column_index(party, contest_id, contest_name) {
                Some(idx) => {
                    self.marks.insert(idx, token.to_string());
                    Ok(true)
                }
                None => Ok(false),
            };
        }
        let (_, option_idx) = schema.find_contest_option_column_indices(
            party,
            contest_id,
            contest_name,
            option_id,
            option_name,
        );
        match option_idx {
            Some(idx) if self.marks.contains_key(&idx) => DuplicateMarkSnafu {
                column: idx,
                name: option_name,
            }
            .fail(),
            Some(idx) => {
                self.marks.insert(idx, token.to_string());
                Ok(true)
            }
            None => {
                debug!(
                    "mark_contest_column: no column for party {:?} contest {:?} option {:?}",
                    party, contest_name, option_name
                );
                Ok(false)
            }
        }
    }

    pub fn format_header(&self) -> String {
        let mut fields: Vec<String> = self.shape.columns().iter().map(|c| format_value(c)).collect();
        if let Some(schema) = self.schema {
            fields.extend(schema.contest_columns().iter().map(|c| format_value(c)));
        }
        fields.join(",")
    }

    pub fn format_row(&self) -> String {
        let mut fields: Vec<String> = self
            .values
            .iter()
            .map(|v| format_value(v.as_deref().unwrap_or("")))
            .collect();
        if let Some(schema) = self.schema {
            fields.extend(
                (0..schema.len()).map(|i| format_value(self.mark(i).unwrap_or(""))),
            );
        }
        fields.join(",")
    }
}
