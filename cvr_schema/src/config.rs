// ********* Input data structures ***********

use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::fmt::Display;
use std::str::FromStr;

/// The two supported layouts of cast vote record files.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum StructureType {
    /// One `CVR` element per file.
    #[serde(rename = "singlecvr")]
    SingleCvrFile,
    /// A `CastVoteRecordReport` holding many `CVR` elements.
    #[serde(rename = "cvrreport")]
    CastVoteRecordReport,
}

impl StructureType {
    /// The name used on the command line.
    pub fn cli_name(&self) -> &'static str {
        match self {
            StructureType::SingleCvrFile => "singlecvr",
            StructureType::CastVoteRecordReport => "cvrreport",
        }
    }
}

impl Default for StructureType {
    fn default() -> Self {
        StructureType::SingleCvrFile
    }
}

impl FromStr for StructureType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "singlecvr" => Ok(StructureType::SingleCvrFile),
            "cvrreport" => Ok(StructureType::CastVoteRecordReport),
            _ => UnknownStructureSnafu { name: s }.fail(),
        }
    }
}

impl Display for StructureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cli_name())
    }
}

// ******** Errors *********

/// Errors raised by the contest aggregator, the schema registry and the row projector.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    #[snafu(display("The contest must exist (contest id {contest_id}) before adding an option"))]
    ContestNotFound { contest_id: String },

    #[snafu(display(
        "The contest option must exist (contest id {contest_id}, option id {option_id}) before adding a selection"
    ))]
    OptionNotFound {
        contest_id: String,
        option_id: String,
    },

    #[snafu(display("Column {column} ({name}) was already marked on this row"))]
    DuplicateMark { column: usize, name: String },

    #[snafu(display("Unknown structure type {name:?}, expected singlecvr or cvrreport"))]
    UnknownStructure { name: String },

    #[snafu(display("Could not parse the contest column schema"))]
    SchemaParse { source: serde_json::Error },

    #[snafu(display("Inconsistent contest column schema: {message}"))]
    SchemaInvalid { message: String },

    #[snafu(display("Could not serialize the contest column schema"))]
    SchemaSerialize { source: serde_json::Error },

    #[snafu(display("I/O error on contest column schema {path}"))]
    SchemaIo {
        source: std::io::Error,
        path: String,
    },
}

pub type SchemaResult<T> = Result<T, SchemaError>;
