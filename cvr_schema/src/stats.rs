use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Counters for one subset of the records (all of them, or one party).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CvrStats {
    pub party_filter: String,
    pub total_count: u64,
    pub with_batch_sequence: u64,
    pub with_batch_number: u64,
    pub with_sheet_number: u64,
    pub with_guid: u64,
    pub with_contests: u64,
    pub with_precinct_split: u64,
    pub with_party: u64,
    pub min_sheet_number: i32,
    pub max_sheet_number: i32,
    pub min_modify_date: NaiveDateTime,
    pub max_modify_date: NaiveDateTime,
    /// Number of records referencing each contest label.
    pub contest_counts: BTreeMap<String, u64>,
}

impl CvrStats {
    pub fn new(party_filter: &str) -> CvrStats {
        CvrStats {
            party_filter: party_filter.to_string(),
            total_count: 0,
            with_batch_sequence: 0,
            with_batch_number: 0,
            with_sheet_number: 0,
            with_guid: 0,
            with_contests: 0,
            with_precinct_split: 0,
            with_party: 0,
            min_sheet_number: i32::MAX,
            max_sheet_number: i32::MIN,
            min_modify_date: NaiveDateTime::MAX,
            max_modify_date: NaiveDateTime::MIN,
            contest_counts: BTreeMap::new(),
        }
    }

    /// The observed sheet number range, if any sheet number was seen.
    pub fn sheet_number_range(&self) -> Option<(i32, i32)> {
        if self.min_sheet_number > self.max_sheet_number {
            None
        } else {
            Some((self.min_sheet_number, self.max_sheet_number))
        }
    }

    pub fn modify_date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        if self.min_modify_date > self.max_modify_date {
            None
        } else {
            Some((self.min_modify_date, self.max_modify_date))
        }
    }

    pub fn check_sheet_number(&mut self, sheet_number: i32) {
        self.min_sheet_number = self.min_sheet_number.min(sheet_number);
        self.max_sheet_number = self.max_sheet_number.max(sheet_number);
    }

    pub fn check_modify_date(&mut self, modify_date: NaiveDateTime) {
        self.min_modify_date = self.min_modify_date.min(modify_date);
        self.max_modify_date = self.max_modify_date.max(modify_date);
    }

    pub fn check_contest(&mut self, label: &str) {
        *self.contest_counts.entry(label.to_string()).or_insert(0) += 1;
    }
}

impl Default for CvrStats {
    fn default() -> Self {
        CvrStats::new("")
    }
}

/// The overall statistics and one bucket per observed party.
///
/// Every update takes the party of the current record; `None` (or an empty
/// label) only updates the overall bucket.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct StatisticsEngine {
    pub overall: CvrStats,
    pub parties: BTreeMap<String, CvrStats>,
}

impl StatisticsEngine {
    pub fn new() -> StatisticsEngine {
        StatisticsEngine::default()
    }

    pub fn party(&self, party: &str) -> Option<&CvrStats> {
        self.parties.get(party)
    }

    fn party_bucket(&mut self, party: Option<&str>) -> Option<&mut CvrStats> {
        match party {
            Some(p) if !p.is_empty() => Some(
                self.parties
                    .entry(p.to_string())
                    .or_insert_with(|| CvrStats::new(p)),
            ),
            _ => None,
        }
    }

    fn update(&mut self, party: Option<&str>, f: impl Fn(&mut CvrStats)) {
        f(&mut self.overall);
        if let Some(bucket) = self.party_bucket(party) {
            f(bucket);
        }
    }

    pub fn record_total(&mut self, party: Option<&str>) {
        self.update(party, |s| s.total_count += 1);
    }

    pub fn note_batch_sequence(&mut self, party: Option<&str>) {
        self.update(party, |s| s.with_batch_sequence += 1);
    }

    pub fn note_batch_number(&mut self, party: Option<&str>) {
        self.update(party, |s| s.with_batch_number += 1);
    }

    pub fn note_sheet_number(&mut self, party: Option<&str>) {
        self.update(party, |s| s.with_sheet_number += 1);
    }

    pub fn note_guid(&mut self, party: Option<&str>) {
        self.update(party, |s| s.with_guid += 1);
    }

    pub fn note_contests(&mut self, party: Option<&str>) {
        self.update(party, |s| s.with_contests += 1);
    }

    pub fn note_precinct_split(&mut self, party: Option<&str>) {
        self.update(party, |s| s.with_precinct_split += 1);
    }

    /// Only counted overall: every record of a party bucket has a party.
    pub fn note_party(&mut self) {
        self.overall.with_party += 1;
    }

    pub fn check_sheet_number(&mut self, party: Option<&str>, value: i32) {
        self.update(party, |s| s.check_sheet_number(value));
    }

    pub fn check_modify_date(&mut self, party: Option<&str>, value: NaiveDateTime) {
        self.update(party, |s| s.check_modify_date(value));
    }

    /// Overall, the contest is counted under a party-qualified label; in the
    /// party bucket, under its plain name.
    pub fn note_contest_touch(&mut self, party: Option<&str>, contest_name: &str) {
        let label = match party {
            Some(p) if !p.is_empty() => format!("{}: {}", p, contest_name),
            _ => contest_name.to_string(),
        };
        self.overall.check_contest(&label);
        if let Some(bucket) = self.party_bucket(party) {
            bucket.check_contest(contest_name);
        }
    }
}
