// Summaries written at the end of a run.

use chrono::NaiveDateTime;
use cvr_schema::{column_totals, format_value, ContestAggregator, CvrStats, SchemaRegistry, StatisticsEngine};
use log::info;
use snafu::ResultExt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::cvr::run_log::RunLog;
use crate::cvr::*;

fn format_date(d: NaiveDateTime) -> String {
    d.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn write_stats(log: &mut RunLog, stats: &CvrStats, indent: &str) {
    log.line(format!("{}With BatchSequence  {:07}", indent, stats.with_batch_sequence));
    log.line(format!("{}With BatchNumber    {:07}", indent, stats.with_batch_number));
    log.line(format!("{}With SheetNumber    {:07}", indent, stats.with_sheet_number));
    log.line(format!("{}With CvrGuid:       {:07}", indent, stats.with_guid));
    log.line(format!("{}With Contests:      {:07}", indent, stats.with_contests));
    log.line(format!("{}With PrecinctSplit: {:07}", indent, stats.with_precinct_split));
    log.line(format!("{}With Party:         {:07}", indent, stats.with_party));
    match stats.sheet_number_range() {
        Some((min, max)) => {
            log.line(format!("{}Min SheetNumber:    {:07}", indent, min));
            log.line(format!("{}Max SheetNumber:    {:07}", indent, max));
        }
        None => log.line(format!("{}SheetNumber:        none", indent)),
    }
    match stats.modify_date_range() {
        Some((min, max)) => {
            log.line(format!("{}Min Modify Date:    {}", indent, format_date(min)));
            log.line(format!("{}Max Modify Date:    {}", indent, format_date(max)));
        }
        None => log.line(format!("{}Modify Date:        none", indent)),
    }
    for (contest, count) in stats.contest_counts.iter() {
        log.line(format!("{}Contest: {} - {:07}", indent, contest, count));
    }
}

/// The overall statistics, then one block per party.
pub fn write_statistics(log: &mut RunLog, stats: &StatisticsEngine) {
    log.line("");
    log.line(format!("Total CVRs processed: {:07}", stats.overall.total_count));
    write_stats(log, &stats.overall, "  ");
    for (party, party_stats) in stats.parties.iter() {
        log.line(format!("  Party: {} - - - - - - - - - - -", party));
        log.line(format!("    Total CVRs: {:07}", party_stats.total_count));
        write_stats(log, party_stats, "      ");
    }
}

/// Every contest with its options and the distinct values marked for them.
pub fn write_contests(log: &mut RunLog, tally: &ContestAggregator) {
    log.line("");
    log.line("Contests and Options w/ Vote Counts");
    for contest in tally.sorted_contests() {
        let party_segment = if contest.party().is_empty() {
            "".to_string()
        } else {
            format!("Party: {} ", contest.party())
        };
        log.line(format!(
            "  {}Contest Name: {} Total Included: {}",
            party_segment,
            contest.name(),
            contest.participant_count
        ));
        for option in contest.sorted_options() {
            log.line(format!("    Option: {}", option.name));
            for sel in option.sorted_selections() {
                log.line(format!(
                    "      Selection: {} - {} - {}",
                    sel.value, sel.name, sel.count
                ));
            }
        }
        log.line(format!("    Total Selections: {}", contest.total_selections()));
    }
}

/// The contest totals as CSV: a header of column names and one row of totals.
pub fn format_contest_totals(schema: &SchemaRegistry, tally: &ContestAggregator) -> (String, String) {
    let header: Vec<String> = schema.contest_columns().iter().map(|c| format_value(c)).collect();
    let values: Vec<String> = column_totals(schema, tally)
        .iter()
        .map(|t| t.map(|x| x.to_string()).unwrap_or_default())
        .collect();
    (header.join(","), values.join(","))
}

pub fn write_contest_totals(
    path: &Path,
    schema: &SchemaRegistry,
    tally: &ContestAggregator,
) -> CvrResult<()> {
    let path_name = path.display().to_string();
    let (header, values) = format_contest_totals(schema, tally);
    let file = File::create(path).context(WritingOutputSnafu {
        path: path_name.clone(),
    })?;
    let mut w = BufWriter::new(file);
    writeln!(w, "{}", header)
        .and_then(|_| writeln!(w, "{}", values))
        .and_then(|_| w.flush())
        .context(WritingOutputSnafu { path: path_name })?;
    info!("Wrote contest totals to {:?}", path);
    Ok(())
}
