use chrono::NaiveDateTime;
use cvr_schema::StructureType;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::path::PathBuf;

use crate::args::Args;
use crate::cvr::*;

/// The settings of one run, resolved from the command line.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(rename = "cvrsPaths")]
    pub cvrs_paths: Vec<PathBuf>,
    #[serde(rename = "structureType")]
    pub structure_type: StructureType,
    /// No limit if not set.
    #[serde(rename = "maxFileProcessCount")]
    pub max_file_process_count: Option<usize>,
    #[serde(rename = "maxCvrProcessCount")]
    pub max_cvr_process_count: Option<usize>,
}

impl RunConfig {
    pub fn new(cvrs_path: &str, structure_type: StructureType) -> RunConfig {
        RunConfig {
            cvrs_paths: vec![PathBuf::from(cvrs_path)],
            structure_type,
            max_file_process_count: None,
            max_cvr_process_count: None,
        }
    }

    pub fn from_args(args: &Args) -> CvrResult<RunConfig> {
        let structure_type: StructureType = args
            .structure
            .parse()
            .context(InvalidArgumentsSnafu {})?;
        let mut res = RunConfig::new(&args.input, structure_type);
        // Zero means no limit.
        res.max_file_process_count = args.max_files.filter(|x| *x > 0);
        res.max_cvr_process_count = args.max_records.filter(|x| *x > 0);
        Ok(res)
    }

    /// The first corpus folder, without trailing separators. All the output
    /// paths are derived from it.
    fn corpus_base(&self) -> String {
        let first = self
            .cvrs_paths
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        first.trim_end_matches(|c| c == '/' || c == '\\').to_string()
    }

    pub fn csv_output_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.cvrs.csv", self.corpus_base()))
    }

    pub fn contests_csv_output_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.cvrs-contests.csv", self.corpus_base()))
    }

    pub fn contests_json_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.contests.json", self.corpus_base()))
    }

    pub fn log_path(&self, started: &NaiveDateTime) -> PathBuf {
        PathBuf::from(format!(
            "{}.{}.log",
            self.corpus_base(),
            started.format("%Y%m%d-%H%M%S")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(input: &str, structure: &str) -> Args {
        Args {
            input: input.to_string(),
            structure: structure.to_string(),
            max_files: Some(0),
            max_records: Some(250),
        }
    }

    #[test]
    fn derived_paths() {
        let config = RunConfig::from_args(&args("/data/cvrs/", "singlecvr")).unwrap();
        assert_eq!(config.structure_type, StructureType::SingleCvrFile);
        assert_eq!(config.max_file_process_count, None);
        assert_eq!(config.max_cvr_process_count, Some(250));
        assert_eq!(config.csv_output_path(), PathBuf::from("/data/cvrs.cvrs.csv"));
        assert_eq!(
            config.contests_csv_output_path(),
            PathBuf::from("/data/cvrs.cvrs-contests.csv")
        );
        assert_eq!(config.contests_json_path(), PathBuf::from("/data/cvrs.contests.json"));
        let started = chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap();
        assert_eq!(
            config.log_path(&started),
            PathBuf::from("/data/cvrs.20240305-140709.log")
        );
    }

    #[test]
    fn structure_names() {
        let config = RunConfig::from_args(&args("c:\\cvrs\\", "CvrReport")).unwrap();
        assert_eq!(config.structure_type, StructureType::CastVoteRecordReport);
        assert_eq!(config.contests_json_path(), PathBuf::from("c:\\cvrs.contests.json"));
        assert!(matches!(
            RunConfig::from_args(&args("x", "dominion")),
            Err(CvrError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn serialized_names() {
        let config = RunConfig::new("cvrs", StructureType::CastVoteRecordReport);
        let js = serde_json::to_value(&config).unwrap();
        assert_eq!(js["structureType"], "cvrreport");
        assert_eq!(js["cvrsPaths"][0], "cvrs");
    }
}
