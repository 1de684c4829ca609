pub mod config_reader;
pub mod io_files;
pub mod io_xml;
pub mod report;
pub mod run_log;

use log::{debug, error, info, warn};

use cvr_schema::*;
use snafu::{prelude::*, Snafu};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cvr::config_reader::RunConfig;
use crate::cvr::io_files::walk_cvr_files;
use crate::cvr::io_xml::{read_report_cvr, read_single_cvr, CvrRecord, PresentField, ReportIndex, XmlElement};
use crate::cvr::run_log::RunLog;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CvrError {
    #[snafu(display("Error reading file {path}"))]
    ReadingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error walking folder {path}"))]
    WalkingFolder {
        source: walkdir::Error,
        path: String,
    },
    #[snafu(display("Malformed XML in {path} near byte {position}"))]
    XmlParse {
        source: quick_xml::Error,
        path: String,
        position: usize,
    },
    #[snafu(display("Unexpected XML structure in {path}: {message}"))]
    XmlStructure { path: String, message: String },
    #[snafu(display("{element} has no {field}"))]
    MissingField { element: String, field: String },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Contest column schema {path} could not be used"))]
    SchemaCache { source: SchemaError, path: String },
    #[snafu(display("Invalid arguments"))]
    InvalidArguments { source: SchemaError },
    #[snafu(display("Could not install the logger"))]
    LoggerInit { source: log::SetLoggerError },
    #[snafu(display("Could not install the cancellation handler"))]
    CancelHook { source: ctrlc::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CvrResult<T> = Result<T, CvrError>;

/// The states of a run. Cancellation is a flag on the side, not a state.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ScanPhase {
    Idle,
    Discovering,
    SchemaFrozen,
    Projecting,
    Done,
}

/// Why a pass over the corpus stopped.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PassEnd {
    Exhausted,
    FileCap,
    RecordCap,
    Canceled,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PassSummary {
    pub files: usize,
    pub records: usize,
    pub end: PassEnd,
}

/// The counters of the projection pass.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ScanCounters {
    pub emitted_rows: usize,
    /// Records dropped because an option column was marked twice.
    pub rejected_rows: usize,
    /// Marks with no column in the frozen schema.
    pub unresolved_marks: usize,
    pub malformed_contests: usize,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RunOutcome {
    pub canceled: bool,
    pub schema_from_cache: bool,
    pub columns: usize,
}

fn stop_before_record(config: &RunConfig, cancel: &AtomicBool, records: usize) -> Option<PassEnd> {
    if cancel.load(Ordering::SeqCst) {
        return Some(PassEnd::Canceled);
    }
    match config.max_cvr_process_count {
        Some(max) if records >= max => Some(PassEnd::RecordCap),
        _ => None,
    }
}

/// Feeds every record of the corpus to `on_record`, with its index in the pass.
///
/// The cancellation flag is checked between folders, files and records.
pub fn scan_corpus<F>(config: &RunConfig, cancel: &AtomicBool, mut on_record: F) -> CvrResult<PassSummary>
where
    F: FnMut(usize, CvrRecord) -> CvrResult<()>,
{
    let mut summary = PassSummary {
        files: 0,
        records: 0,
        end: PassEnd::Exhausted,
    };
    if config.cvrs_paths.is_empty() {
        whatever!("No folder of cast vote records to scan");
    }
    for folder in config.cvrs_paths.iter() {
        if cancel.load(Ordering::SeqCst) {
            summary.end = PassEnd::Canceled;
            return Ok(summary);
        }
        info!("Scanning folder {:?}", folder);
        for cvr_file in walk_cvr_files(folder) {
            if cancel.load(Ordering::SeqCst) {
                summary.end = PassEnd::Canceled;
                return Ok(summary);
            }
            if let Some(max) = config.max_file_process_count {
                if summary.files >= max {
                    info!("Reached the maximum number of files: {}", max);
                    summary.end = PassEnd::FileCap;
                    return Ok(summary);
                }
            }
            let cvr_file = cvr_file?;
            summary.files += 1;
            let path_name = cvr_file.path.display().to_string();
            debug!("scan_corpus: reading {}", path_name);
            let content = fs::read_to_string(&cvr_file.path).context(ReadingFileSnafu {
                path: path_name.clone(),
            })?;
            let root = XmlElement::parse(&content, &path_name)?;

            match config.structure_type {
                StructureType::SingleCvrFile => {
                    if let Some(end) = stop_before_record(config, cancel, summary.records) {
                        summary.end = end;
                        return Ok(summary);
                    }
                    on_record(summary.records, read_single_cvr(&root, &cvr_file))?;
                    summary.records += 1;
                }
                StructureType::CastVoteRecordReport => {
                    let index = ReportIndex::build(&root);
                    let cvrs: Vec<&XmlElement> = if root.name == "CVR" {
                        vec![&root]
                    } else {
                        root.children_named("CVR").collect()
                    };
                    debug!("scan_corpus: {} records in {}", cvrs.len(), path_name);
                    for cvr in cvrs {
                        if let Some(end) = stop_before_record(config, cancel, summary.records) {
                            summary.end = end;
                            return Ok(summary);
                        }
                        on_record(summary.records, read_report_cvr(cvr, &index, &cvr_file))?;
                        summary.records += 1;
                    }
                }
            }
        }
    }
    Ok(summary)
}

/// Adds the contests, options and selection values of a record to an aggregator.
pub fn discover_record(agg: &mut ContestAggregator, rec: &CvrRecord) {
    let party = rec.party.as_deref().unwrap_or("");
    for contest in rec.contests.iter() {
        let contest = match contest {
            Ok(c) => c,
            Err(e) => {
                debug!("discover_record: skipping contest: {}", e);
                continue;
            }
        };
        let entry = agg.get_or_create_contest(&contest.id, &contest.name, party);
        entry.add_participant();
        for opt in contest.options.iter() {
            let option = entry.get_or_create_option(&opt.id, &opt.name);
            for value in opt.values.iter() {
                option.get_or_create_selection(value, "").add_vote();
            }
        }
    }
}

/// Updates the statistics with the fields present in a record.
pub fn tally_stats(stats: &mut StatisticsEngine, rec: &CvrRecord) {
    let party = rec.party.as_deref();
    stats.record_total(party);
    if rec.has(PresentField::Party) {
        stats.note_party();
    }
    if rec.has(PresentField::Guid) {
        stats.note_guid(party);
    }
    if rec.has(PresentField::BatchSequence) {
        stats.note_batch_sequence(party);
    }
    if rec.has(PresentField::BatchNumber) {
        stats.note_batch_number(party);
    }
    if rec.has(PresentField::SheetNumber) {
        stats.note_sheet_number(party);
    }
    if rec.has(PresentField::Contests) {
        stats.note_contests(party);
    }
    if rec.has(PresentField::PrecinctSplit) {
        stats.note_precinct_split(party);
    }
    if let Some(sheet) = rec.sheet_number.as_deref() {
        match sheet.trim().parse::<i32>() {
            Ok(x) => stats.check_sheet_number(party, x),
            Err(_) => warn!("Sheet number {:?} is not a number", sheet),
        }
    }
    if let Some(d) = rec.modify_date {
        stats.check_modify_date(party, d);
    }
    for contest in rec.contests.iter().filter_map(|c| c.as_ref().ok()) {
        stats.note_contest_touch(party, &contest.name);
    }
}

/// Projects a record onto the frozen schema.
///
/// Returns the row and the number of marks that found no column.
pub fn project_record<'a>(
    schema: &'a SchemaRegistry,
    shape: RowShape,
    rec: &CvrRecord,
) -> SchemaResult<(CvrRow<'a>, usize)> {
    let mut row = CvrRow::new(shape);
    row.attach_schema(schema);
    for (name, value) in rec.fields.iter() {
        if !row.set_column_value(name, value) {
            debug!("project_record: {} is not a column of {:?}", name, shape);
        }
    }
    let party = rec.party.as_deref().unwrap_or("");
    let mut unresolved = 0;
    for contest in rec.contests.iter().filter_map(|c| c.as_ref().ok()) {
        if !row.mark_contest_column(party, &contest.id, &contest.name, "", "", "X")? {
            unresolved += 1;
        }
        for opt in contest.options.iter() {
            let token = if opt.values.is_empty() { "0" } else { "1" };
            if !row.mark_contest_column(party, &contest.id, &contest.name, &opt.id, &opt.name, token)? {
                unresolved += 1;
            }
        }
    }
    Ok((row, unresolved))
}

/// One run over a corpus: discovery (unless a schema is cached), projection
/// into the CSV file, then the reports.
pub struct CvrScan {
    config: RunConfig,
    cancel: Arc<AtomicBool>,
    phase: ScanPhase,
    pub stats: StatisticsEngine,
    /// The contests seen during projection, for the totals.
    pub tally: ContestAggregator,
    pub counters: ScanCounters,
}

impl CvrScan {
    pub fn new(config: RunConfig, cancel: Arc<AtomicBool>) -> CvrScan {
        CvrScan {
            config,
            cancel,
            phase: ScanPhase::Idle,
            stats: StatisticsEngine::new(),
            tally: ContestAggregator::new(),
            counters: ScanCounters::default(),
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    fn transition(&mut self, next: ScanPhase) {
        info!("Phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    pub fn run(&mut self, log: &mut RunLog) -> CvrResult<RunOutcome> {
        info!("Run configuration: {:?}", self.config);
        let schema_path = self.config.contests_json_path();
        let schema_path_name = schema_path.display().to_string();

        let cached = SchemaRegistry::load_if_exists(&schema_path).context(SchemaCacheSnafu {
            path: schema_path_name.clone(),
        })?;
        let schema_from_cache = cached.is_some();
        let schema = match cached {
            Some(schema) => {
                log.line(format!("Using the contest columns of {}", schema_path_name));
                self.transition(ScanPhase::SchemaFrozen);
                schema
            }
            None => {
                self.transition(ScanPhase::Discovering);
                let (schema, summary) = self.discover()?;
                if summary.end == PassEnd::Canceled {
                    warn!("Discovery was canceled, the contest column schema is not saved");
                    self.transition(ScanPhase::Done);
                    return Ok(RunOutcome {
                        canceled: true,
                        schema_from_cache,
                        columns: schema.len(),
                    });
                }
                schema.save(&schema_path).context(SchemaCacheSnafu {
                    path: schema_path_name.clone(),
                })?;
                self.transition(ScanPhase::SchemaFrozen);
                schema
            }
        };

        self.transition(ScanPhase::Projecting);
        let summary = self.project(&schema, log)?;
        self.transition(ScanPhase::Done);
        self.report(&schema, log)?;
        Ok(RunOutcome {
            canceled: summary.end == PassEnd::Canceled,
            schema_from_cache,
            columns: schema.len(),
        })
    }

    fn discover(&mut self) -> CvrResult<(SchemaRegistry, PassSummary)> {
        let mut agg = ContestAggregator::new();
        let summary = scan_corpus(&self.config, &self.cancel, |_, rec| {
            discover_record(&mut agg, &rec);
            Ok(())
        })?;
        info!(
            "Discovery: {} files, {} records, {} contests ({:?})",
            summary.files,
            summary.records,
            agg.len(),
            summary.end
        );
        Ok((build_schema(&agg), summary))
    }

    fn project(&mut self, schema: &SchemaRegistry, log: &mut RunLog) -> CvrResult<PassSummary> {
        let path = self.config.csv_output_path();
        let path_name = path.display().to_string();
        let shape = RowShape::for_structure(self.config.structure_type);

        let file = File::create(&path).context(WritingOutputSnafu {
            path: path_name.clone(),
        })?;
        let mut out = BufWriter::new(file);
        let mut header_row = CvrRow::new(shape);
        header_row.attach_schema(schema);
        let header = header_row.format_header();
        writeln!(out, "{}", header).context(WritingOutputSnafu {
            path: path_name.clone(),
        })?;

        // Everything is recomputed in this pass.
        self.stats = StatisticsEngine::new();
        self.tally = ContestAggregator::new();
        self.counters = ScanCounters::default();
        let stats = &mut self.stats;
        let tally = &mut self.tally;
        let counters = &mut self.counters;

        let summary = scan_corpus(&self.config, &self.cancel, |idx, rec| {
            tally_stats(stats, &rec);
            discover_record(tally, &rec);
            for contest in rec.contests.iter() {
                match contest {
                    Err(e) => {
                        warn!("Record {}: skipping malformed contest: {}", idx, e);
                        counters.malformed_contests += 1;
                    }
                    Ok(c) => {
                        if let Some(e) = c.error.as_ref() {
                            warn!(
                                "Record {}: contest {} ({}) kept up to a malformed option: {}",
                                idx, c.id, c.name, e
                            );
                            counters.malformed_contests += 1;
                        }
                    }
                }
            }
            match project_record(schema, shape, &rec) {
                Ok((row, unresolved)) => {
                    counters.unresolved_marks += unresolved;
                    let line = row.format_row();
                    if counters.emitted_rows == 0 {
                        log.line("First Row Data Sample");
                        log.line(&header);
                        log.line(&line);
                    }
                    writeln!(out, "{}", line).context(WritingOutputSnafu {
                        path: path_name.clone(),
                    })?;
                    counters.emitted_rows += 1;
                }
                Err(e) => {
                    error!("Record {} rejected: {}", idx, e);
                    counters.rejected_rows += 1;
                }
            }
            Ok(())
        })?;
        out.flush().context(WritingOutputSnafu {
            path: path_name.clone(),
        })?;
        info!(
            "Projection: {} files, {} records, {} rows written to {} ({:?})",
            summary.files, summary.records, self.counters.emitted_rows, path_name, summary.end
        );
        Ok(summary)
    }

    fn report(&self, schema: &SchemaRegistry, log: &mut RunLog) -> CvrResult<()> {
        report::write_statistics(log, &self.stats);
        report::write_contests(log, &self.tally);
        report::write_contest_totals(&self.config.contests_csv_output_path(), schema, &self.tally)?;
        log.line("");
        log.line(format!("Rows written:       {:07}", self.counters.emitted_rows));
        log.line(format!("Rows rejected:      {:07}", self.counters.rejected_rows));
        log.line(format!("Malformed contests: {:07}", self.counters.malformed_contests));
        log.line(format!("Unresolved marks:   {:07}", self.counters.unresolved_marks));
        if self.counters.unresolved_marks > 0 {
            warn!(
                "{} contest or option marks had no column in the schema. Delete {:?} to discover the columns again.",
                self.counters.unresolved_marks,
                self.config.contests_json_path()
            );
        }
        log.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn single_xml(guid: &str, party: &str, sheet: &str, smith: bool) -> String {
        let (smith_value, jones_value) = if smith {
            ("<Value>1</Value>", "")
        } else {
            ("", "<Value>1</Value>")
        };
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<CastVoteRecord>
  <CvrGuid>{}</CvrGuid>
  <BatchNumber>3</BatchNumber>
  <SheetNumber>{}</SheetNumber>
  <Party><Name>{}</Name></Party>
  <Contests>
    <Contest>
      <Id>1</Id>
      <Name>Mayor</Name>
      <Options>
        <Option><Id>11</Id><Name>Smith</Name>{}</Option>
        <Option><Id>12</Id><Name>Jones</Name>{}</Option>
      </Options>
    </Contest>
  </Contests>
</CastVoteRecord>"#,
            guid, sheet, party, smith_value, jones_value
        )
    }

    fn corpus(dir: &Path) -> std::path::PathBuf {
        let corpus = dir.join("cvrs");
        fs::create_dir(&corpus).unwrap();
        fs::write(corpus.join("a.xml"), single_xml("g-rep", "REP", "7", true)).unwrap();
        fs::write(corpus.join("b.xml"), single_xml("g-dem", "DEM", "3", false)).unwrap();
        corpus
    }

    fn scan(corpus: &Path, structure: StructureType) -> CvrScan {
        let config = RunConfig::new(&corpus.display().to_string(), structure);
        CvrScan::new(config, Arc::new(AtomicBool::new(false)))
    }

    fn csv_lines(dir: &Path) -> Vec<String> {
        fs::read_to_string(dir.join("cvrs.cvrs.csv"))
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    fn contest_fields(line: &str) -> Vec<String> {
        line.split(',').skip(6).map(|s| s.to_string()).collect()
    }

    #[test]
    fn two_parties_share_a_contest_name() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        let mut scan = scan(&corpus, StructureType::SingleCvrFile);
        let outcome = scan.run(&mut RunLog::console()).unwrap();
        assert!(!outcome.canceled);
        assert!(!outcome.schema_from_cache);
        assert_eq!(outcome.columns, 6);
        assert_eq!(scan.phase(), ScanPhase::Done);

        let lines = csv_lines(dir.path());
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "CvrGuid,BatchNumber,BatchSequence,SheetNumber,CreateDate,ModifyDate,Mayor,Jones,Smith,Mayor,Jones,Smith"
        );
        assert!(lines[1].starts_with("g-rep,3,,7,"));
        assert_eq!(contest_fields(&lines[1]), vec!["", "", "", "X", "0", "1"]);
        assert!(lines[2].starts_with("g-dem,3,,3,"));
        assert_eq!(contest_fields(&lines[2]), vec!["X", "1", "0", "", "", ""]);

        let cache = SchemaRegistry::load_if_exists(&dir.path().join("cvrs.contests.json"))
            .unwrap()
            .unwrap();
        assert_eq!(cache.party_span("DEM").map(|s| (s.min, s.max)), Some((0, 2)));
        assert_eq!(cache.party_span("REP").map(|s| (s.min, s.max)), Some((3, 5)));

        let totals = fs::read_to_string(dir.path().join("cvrs.cvrs-contests.csv")).unwrap();
        assert_eq!(totals, "Mayor,Jones,Smith,Mayor,Jones,Smith\n1,1,0,1,0,1\n");

        assert_eq!(scan.stats.overall.total_count, 2);
        assert_eq!(scan.stats.overall.with_party, 2);
        assert_eq!(scan.stats.overall.sheet_number_range(), Some((3, 7)));
        assert_eq!(scan.stats.party("REP").map(|s| s.total_count), Some(1));
        assert_eq!(scan.stats.overall.contest_counts.get("DEM: Mayor"), Some(&1));
        assert_eq!(scan.counters.emitted_rows, 2);
        assert_eq!(scan.counters.unresolved_marks, 0);
    }

    #[test]
    fn cached_schema_skips_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        // Only the columns of REP are known.
        fs::write(
            dir.path().join("cvrs.contests.json"),
            r#"{"contestColumns":["Mayor","Jones","Smith"],"columnItemIds":["1","12","11"],"partyColumnSpans":{"REP":{"Min":0,"Max":2}}}"#,
        )
        .unwrap();
        let mut scan = scan(&corpus, StructureType::SingleCvrFile);
        let outcome = scan.run(&mut RunLog::console()).unwrap();
        assert!(outcome.schema_from_cache);
        assert_eq!(outcome.columns, 3);

        let lines = csv_lines(dir.path());
        assert_eq!(contest_fields(&lines[1]), vec!["X", "0", "1"]);
        assert_eq!(contest_fields(&lines[2]), vec!["", "", ""]);
        // The DEM contest and its two options.
        assert_eq!(scan.counters.unresolved_marks, 3);
        // Totals still come from the data of this run.
        let totals = fs::read_to_string(dir.path().join("cvrs.cvrs-contests.csv")).unwrap();
        assert_eq!(totals, "Mayor,Jones,Smith\n1,0,1\n");
    }

    #[test]
    fn unreadable_cache_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        fs::write(dir.path().join("cvrs.contests.json"), "not json").unwrap();
        let mut scan = scan(&corpus, StructureType::SingleCvrFile);
        let res = scan.run(&mut RunLog::console());
        assert!(matches!(res, Err(CvrError::SchemaCache { .. })));
        assert!(!dir.path().join("cvrs.cvrs.csv").exists());
    }

    #[test]
    fn canceled_before_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        let config = RunConfig::new(&corpus.display().to_string(), StructureType::SingleCvrFile);
        let mut scan = CvrScan::new(config, Arc::new(AtomicBool::new(true)));
        let outcome = scan.run(&mut RunLog::console()).unwrap();
        assert!(outcome.canceled);
        assert!(!dir.path().join("cvrs.contests.json").exists());
        assert!(!dir.path().join("cvrs.cvrs.csv").exists());
    }

    #[test]
    fn duplicate_option_rejects_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        let doubled = single_xml("g-dup", "REP", "1", true).replace(
            "<Option><Id>12</Id>",
            "<Option><Id>11</Id><Name>Smith</Name></Option><Option><Id>12</Id>",
        );
        fs::write(corpus.join("c.xml"), doubled).unwrap();
        let mut scan = scan(&corpus, StructureType::SingleCvrFile);
        scan.run(&mut RunLog::console()).unwrap();
        assert_eq!(scan.counters.rejected_rows, 1);
        assert_eq!(scan.counters.emitted_rows, 2);
        assert_eq!(csv_lines(dir.path()).len(), 3);
        // The record still counts in the statistics.
        assert_eq!(scan.stats.overall.total_count, 3);
    }

    #[test]
    fn record_cap() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        let mut config = RunConfig::new(&corpus.display().to_string(), StructureType::SingleCvrFile);
        config.max_cvr_process_count = Some(1);
        let mut scan = CvrScan::new(config.clone(), Arc::new(AtomicBool::new(false)));
        scan.run(&mut RunLog::console()).unwrap();
        assert_eq!(csv_lines(dir.path()).len(), 2);
        // Discovery stopped at the same record: only REP has columns.
        assert_eq!(contest_fields(&csv_lines(dir.path())[0]), vec!["Mayor", "Jones", "Smith"]);

        let summary = scan_corpus(&config, &AtomicBool::new(false), |_, _| Ok(())).unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(summary.end, PassEnd::RecordCap);
    }

    #[test]
    fn file_cap() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        let mut config = RunConfig::new(&corpus.display().to_string(), StructureType::SingleCvrFile);
        config.max_file_process_count = Some(1);
        let mut scan = CvrScan::new(config.clone(), Arc::new(AtomicBool::new(false)));
        let outcome = scan.run(&mut RunLog::console()).unwrap();
        assert!(!outcome.canceled);
        assert_eq!(csv_lines(dir.path()).len(), 2);
        assert!(csv_lines(dir.path())[1].starts_with("g-rep,"));

        let summary = scan_corpus(&config, &AtomicBool::new(false), |_, _| Ok(())).unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.end, PassEnd::FileCap);
    }

    #[test]
    fn cancel_between_records_keeps_written_rows() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        let config = RunConfig::new(&corpus.display().to_string(), StructureType::SingleCvrFile);
        let cancel = AtomicBool::new(false);
        let schema = SchemaRegistry::new();
        let out_path = dir.path().join("partial.csv");
        let mut out = BufWriter::new(File::create(&out_path).unwrap());

        let summary = scan_corpus(&config, &cancel, |_, rec| {
            let (row, _) = project_record(&schema, RowShape::SingleFile, &rec).unwrap();
            writeln!(out, "{}", row.format_row()).unwrap();
            cancel.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        out.flush().unwrap();
        drop(out);

        assert_eq!(summary.end, PassEnd::Canceled);
        assert_eq!(summary.records, 1);
        let written = fs::read_to_string(&out_path).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.starts_with("g-rep,3,,7,"));
    }

    #[test]
    fn cancel_during_projection() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        let cancel = Arc::new(AtomicBool::new(false));
        let config = RunConfig::new(&corpus.display().to_string(), StructureType::SingleCvrFile);
        let mut scan = CvrScan::new(config, cancel.clone());
        let (schema, summary) = scan.discover().unwrap();
        assert_eq!(summary.end, PassEnd::Exhausted);

        cancel.store(true, Ordering::SeqCst);
        let summary = scan.project(&schema, &mut RunLog::console()).unwrap();
        assert_eq!(summary.end, PassEnd::Canceled);
        // The header is still written and the file is valid.
        let lines = csv_lines(dir.path());
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("Mayor,Jones,Smith,Mayor,Jones,Smith"));
        assert_eq!(scan.counters.emitted_rows, 0);
    }

    #[test]
    fn malformed_option_keeps_the_contest() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus(dir.path());
        // Smith is read, then the option without an id stops the contest.
        let partial = single_xml("g-part", "REP", "1", true).replace("<Id>12</Id>", "");
        fs::write(corpus.join("c.xml"), partial).unwrap();
        let mut scan = scan(&corpus, StructureType::SingleCvrFile);
        scan.run(&mut RunLog::console()).unwrap();

        let lines = csv_lines(dir.path());
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with("g-part,"));
        assert_eq!(contest_fields(&lines[3]), vec!["", "", "", "X", "", "1"]);
        assert_eq!(scan.counters.malformed_contests, 1);
        assert_eq!(scan.counters.emitted_rows, 3);
        assert_eq!(scan.stats.party("REP").and_then(|s| s.contest_counts.get("Mayor").copied()), Some(2));

        let totals = fs::read_to_string(dir.path().join("cvrs.cvrs-contests.csv")).unwrap();
        assert_eq!(totals, "Mayor,Jones,Smith,Mayor,Jones,Smith\n1,1,0,2,0,2\n");
    }

    #[test]
    fn report_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("cvrs");
        fs::create_dir(&corpus).unwrap();
        fs::write(
            corpus.join("report.xml"),
            r#"<CastVoteRecordReport>
  <CVR ObjectId="cvr-1">
    <BallotImage><Image FileName="0042_a.tif"/></BallotImage>
    <CVRSnapshot ObjectId="s-1">
      <CVRContest>
        <ContestId>c-1</ContestId>
        <CVRContestSelection>
          <ContestSelectionId>cs-1</ContestSelectionId>
          <SelectionPosition><HasIndication>yes</HasIndication></SelectionPosition>
        </CVRContestSelection>
      </CVRContest>
    </CVRSnapshot>
  </CVR>
  <CVR ObjectId="cvr-2">
    <CVRSnapshot ObjectId="s-2">
      <CVRContest><ContestId>c-1</ContestId></CVRContest>
    </CVRSnapshot>
  </CVR>
  <Election>
    <Contest ObjectId="c-1">
      <Name>Measure, B</Name>
      <ContestSelection ObjectId="cs-1"><Selection>Yes</Selection></ContestSelection>
    </Contest>
  </Election>
</CastVoteRecordReport>"#,
        )
        .unwrap();
        let mut scan = scan(&corpus, StructureType::CastVoteRecordReport);
        scan.run(&mut RunLog::console()).unwrap();

        let lines = csv_lines(dir.path());
        assert_eq!(
            lines,
            vec![
                "BallotImageId,CreatingDeviceId,BallotStyleId,ObjectId,ElectionId,\"Measure, B\",Yes",
                "0042,,,cvr-1,,X,1",
                ",,,cvr-2,,X,",
            ]
        );
        assert_eq!(scan.stats.overall.with_guid, 1);
        assert_eq!(scan.stats.overall.with_contests, 2);
    }
}
