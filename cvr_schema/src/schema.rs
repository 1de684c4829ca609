use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::*;

/// The inclusive range of column indices registered for one party.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ColumnSpan {
    #[serde(alias = "Min")]
    pub min: usize,
    #[serde(alias = "Max")]
    pub max: usize,
}

impl ColumnSpan {
    pub fn contains(&self, index: usize) -> bool {
        self.min <= index && index <= self.max
    }
}

/// The ordered, addressable layout of the contest and option columns.
///
/// Columns are append-only: the index returned by [`SchemaRegistry::add_column`]
/// is the permanent address of the column.
///
/// The span of a party is only meaningful if all the columns of that party
/// were registered consecutively. A lookup that falls outside of the span is
/// reported as not found, never as an error.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRegistry {
    contest_columns: Vec<String>,
    column_item_ids: Vec<String>,
    party_column_spans: BTreeMap<String, ColumnSpan>,
}

impl SchemaRegistry {
    pub fn new() -> SchemaRegistry {
        SchemaRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.contest_columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contest_columns.is_empty()
    }

    /// The display names, in column order.
    pub fn contest_columns(&self) -> &[String] {
        &self.contest_columns
    }

    /// The source ids, parallel to the display names.
    pub fn column_item_ids(&self) -> &[String] {
        &self.column_item_ids
    }

    pub fn party_column_spans(&self) -> &BTreeMap<String, ColumnSpan> {
        &self.party_column_spans
    }

    pub fn party_span(&self, party: &str) -> Option<ColumnSpan> {
        self.party_column_spans.get(party).copied()
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.contest_columns.get(index).map(|s| s.as_str())
    }

    /// Appends a column and returns its index.
    ///
    /// A column registered under the empty party never creates or extends a span.
    pub fn add_column(&mut self, party: &str, item_id: &str, display_name: &str) -> usize {
        let index = self.contest_columns.len();
        self.contest_columns.push(display_name.to_string());
        self.column_item_ids.push(item_id.to_string());
        if let Some(span) = self.party_column_spans.get_mut(party) {
            span.max = index;
        } else if !party.is_empty() {
            self.party_column_spans.insert(
                party.to_string(),
                ColumnSpan {
                    min: index,
                    max: index,
                },
            );
        }
        index
    }

    fn matches(&self, index: usize, item_id: &str, display_name: &str) -> bool {
        self.contest_columns[index] == display_name && self.column_item_ids[index] == item_id
    }

    /// The index of the contest column, searched within the span of the party
    /// (or over all the columns for the empty party).
    pub fn find_contest_column_index(
        &self,
        party: &str,
        contest_id: &str,
        contest_name: &str,
    ) -> Option<usize> {
        let (start, end) = self.search_range(party)?;
        (start..end).find(|&i| self.matches(i, contest_id, contest_name))
    }

    /// The indices of a contest column and of one of its option columns.
    ///
    /// The option is searched strictly after the contest column, up to the end
    /// of the span of the party (or the end of the columns for the empty party).
    pub fn find_contest_option_column_indices(
        &self,
        party: &str,
        contest_id: &str,
        contest_name: &str,
        option_id: &str,
        option_name: &str,
    ) -> (Option<usize>, Option<usize>) {
        let contest_idx = match self.find_contest_column_index(party, contest_id, contest_name) {
            Some(x) => x,
            None => return (None, None),
        };
        if option_id.is_empty() {
            return (Some(contest_idx), None);
        }
        // The contest was found, so the range exists.
        let end = self.search_range(party).map(|(_, e)| e).unwrap_or(0);
        let option_idx = (contest_idx + 1..end).find(|&i| self.matches(i, option_id, option_name));
        (Some(contest_idx), option_idx)
    }

    // Half-open range of the indices to search for a party.
    fn search_range(&self, party: &str) -> Option<(usize, usize)> {
        if party.is_empty() {
            return Some((0, self.contest_columns.len()));
        }
        let span = self.party_column_spans.get(party)?;
        Some((span.min, span.max.saturating_add(1).min(self.contest_columns.len())))
    }

    pub fn serialize(&self) -> SchemaResult<String> {
        serde_json::to_string(self).context(SchemaSerializeSnafu {})
    }

    pub fn deserialize(js: &str) -> SchemaResult<SchemaRegistry> {
        let res: SchemaRegistry = serde_json::from_str(js).context(SchemaParseSnafu {})?;
        res.validate()?;
        Ok(res)
    }

    // The lookups index both lists and trust the spans.
    fn validate(&self) -> SchemaResult<()> {
        let len = self.contest_columns.len();
        ensure!(
            self.column_item_ids.len() == len,
            SchemaInvalidSnafu {
                message: format!(
                    "{} column names but {} item ids",
                    len,
                    self.column_item_ids.len()
                ),
            }
        );
        for (party, span) in self.party_column_spans.iter() {
            ensure!(
                span.min <= span.max && span.max < len,
                SchemaInvalidSnafu {
                    message: format!(
                        "span [{}, {}] of party {:?} does not fit in {} columns",
                        span.min, span.max, party, len
                    ),
                }
            );
        }
        Ok(())
    }

    /// Loads a persisted schema if the file exists.
    pub fn load_if_exists(path: &Path) -> SchemaResult<Option<SchemaRegistry>> {
        if !path.exists() {
            debug!("load_if_exists: no schema at {:?}", path);
            return Ok(None);
        }
        let contents = fs::read_to_string(path).context(SchemaIoSnafu {
            path: path.display().to_string(),
        })?;
        let res = SchemaRegistry::deserialize(&contents)?;
        info!(
            "Loaded contest column schema from {:?}: {} columns, {} parties",
            path,
            res.len(),
            res.party_column_spans.len()
        );
        Ok(Some(res))
    }

    pub fn save(&self, path: &Path) -> SchemaResult<()> {
        let js = self.serialize()?;
        fs::write(path, js).context(SchemaIoSnafu {
            path: path.display().to_string(),
        })?;
        info!("Wrote contest column schema to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn two_party_registry() -> SchemaRegistry {
        let mut reg = SchemaRegistry::new();
        reg.add_column("DEM", "1", "Mayor");
        reg.add_column("DEM", "11", "Jones");
        reg.add_column("DEM", "12", "Smith");
        reg.add_column("REP", "1", "Mayor");
        reg.add_column("REP", "11", "Jones");
        reg.add_column("REP", "12", "Smith");
        reg.add_column("", "5", "Sheriff");
        reg.add_column("", "51", "Brown");
        reg
    }

    #[test]
    fn spans_follow_registration() {
        let reg = two_party_registry();
        assert_eq!(reg.party_span("DEM"), Some(ColumnSpan { min: 0, max: 2 }));
        assert_eq!(reg.party_span("REP"), Some(ColumnSpan { min: 3, max: 5 }));
        assert_eq!(reg.party_span(""), None);
    }

    #[test]
    fn party_scoped_lookup() {
        let reg = two_party_registry();
        assert_eq!(reg.find_contest_column_index("DEM", "1", "Mayor"), Some(0));
        assert_eq!(reg.find_contest_column_index("REP", "1", "Mayor"), Some(3));
        assert_eq!(reg.find_contest_column_index("GRN", "1", "Mayor"), None);
        assert_eq!(reg.find_contest_column_index("", "1", "Mayor"), Some(0));
        assert_eq!(reg.find_contest_column_index("", "5", "Sheriff"), Some(6));
        // The id must match as well as the name.
        assert_eq!(reg.find_contest_column_index("REP", "2", "Mayor"), None);
    }

    #[test]
    fn option_lookup() {
        let reg = two_party_registry();
        assert_eq!(
            reg.find_contest_option_column_indices("REP", "1", "Mayor", "12", "Smith"),
            (Some(3), Some(5))
        );
        assert_eq!(
            reg.find_contest_option_column_indices("DEM", "1", "Mayor", "12", "Smith"),
            (Some(0), Some(2))
        );
        assert_eq!(
            reg.find_contest_option_column_indices("", "5", "Sheriff", "51", "Brown"),
            (Some(6), Some(7))
        );
        assert_eq!(
            reg.find_contest_option_column_indices("DEM", "1", "Mayor", "", ""),
            (Some(0), None)
        );
        assert_eq!(
            reg.find_contest_option_column_indices("DEM", "1", "Mayor", "99", "Nobody"),
            (Some(0), None)
        );
        assert_eq!(
            reg.find_contest_option_column_indices("GRN", "1", "Mayor", "12", "Smith"),
            (None, None)
        );
    }

    #[test]
    fn option_is_not_searched_before_contest() {
        let mut reg = SchemaRegistry::new();
        reg.add_column("", "11", "Jones");
        reg.add_column("", "1", "Mayor");
        assert_eq!(
            reg.find_contest_option_column_indices("", "1", "Mayor", "11", "Jones"),
            (Some(1), None)
        );
    }

    #[test]
    fn json_layout() {
        let mut reg = SchemaRegistry::new();
        reg.add_column("REP", "1", "Mayor");
        let js = reg.serialize().unwrap();
        assert_eq!(
            js,
            r#"{"contestColumns":["Mayor"],"columnItemIds":["1"],"partyColumnSpans":{"REP":{"min":0,"max":0}}}"#
        );
    }

    #[test]
    fn reads_capitalized_spans() {
        let js = r#"{"contestColumns":["Mayor","Smith"],"columnItemIds":["1","2"],"partyColumnSpans":{"REP":{"Min":0,"Max":1}}}"#;
        let reg = SchemaRegistry::deserialize(js).unwrap();
        assert_eq!(reg.party_span("REP"), Some(ColumnSpan { min: 0, max: 1 }));
    }

    #[test]
    fn bad_cache_is_an_error() {
        let res = SchemaRegistry::deserialize("{\"contestColumns\": [");
        assert!(matches!(res, Err(SchemaError::SchemaParse { .. })));
    }

    #[test]
    fn inconsistent_cache_is_an_error() {
        let uneven = r#"{"contestColumns":["Mayor","Smith"],"columnItemIds":["1"],"partyColumnSpans":{}}"#;
        assert!(matches!(
            SchemaRegistry::deserialize(uneven),
            Err(SchemaError::SchemaInvalid { .. })
        ));

        let huge = format!(
            r#"{{"contestColumns":["Mayor","Smith"],"columnItemIds":["1","2"],"partyColumnSpans":{{"REP":{{"min":0,"max":{}}}}}}}"#,
            usize::MAX
        );
        assert!(matches!(
            SchemaRegistry::deserialize(&huge),
            Err(SchemaError::SchemaInvalid { .. })
        ));

        let past_end = r#"{"contestColumns":["Mayor","Smith"],"columnItemIds":["1","2"],"partyColumnSpans":{"REP":{"min":0,"max":2}}}"#;
        assert!(matches!(
            SchemaRegistry::deserialize(past_end),
            Err(SchemaError::SchemaInvalid { .. })
        ));

        let reversed = r#"{"contestColumns":["Mayor","Smith"],"columnItemIds":["1","2"],"partyColumnSpans":{"REP":{"min":1,"max":0}}}"#;
        assert!(matches!(
            SchemaRegistry::deserialize(reversed),
            Err(SchemaError::SchemaInvalid { .. })
        ));
    }

    fn arb_columns() -> impl Strategy<Value = Vec<(String, String, String)>> {
        prop::collection::vec(
            (
                prop_oneof![Just(""), Just("DEM"), Just("REP"), Just("LIB")],
                "[0-9]{1,2}",
                "[A-Z][a-z]{0,5}",
            )
                .prop_map(|(p, i, n)| (p.to_string(), i, n)),
            0..40,
        )
    }

    proptest! {
        #[test]
        fn prop_indices_increase_and_spans_grow(cols in arb_columns()) {
            let mut reg = SchemaRegistry::new();
            let mut first_min: BTreeMap<String, usize> = BTreeMap::new();
            for (expected, (party, id, name)) in cols.iter().enumerate() {
                let before = reg.party_span(party);
                let idx = reg.add_column(party, id, name);
                prop_assert_eq!(idx, expected);
                if !party.is_empty() {
                    let span = reg.party_span(party).unwrap();
                    prop_assert_eq!(span.max, idx);
                    let min = *first_min.entry(party.clone()).or_insert(idx);
                    prop_assert_eq!(span.min, min);
                    if let Some(b) = before {
                        prop_assert!(span.max > b.max);
                    }
                }
            }
        }

        #[test]
        fn prop_scoped_lookup_stays_in_span(cols in arb_columns()) {
            let mut reg = SchemaRegistry::new();
            for (party, id, name) in cols.iter() {
                reg.add_column(party, id, name);
            }
            for (party, id, name) in cols.iter() {
                let found = reg.find_contest_column_index(party, id, name);
                if party.is_empty() {
                    prop_assert!(found.is_some());
                } else {
                    let idx = found.unwrap();
                    prop_assert!(reg.party_span(party).unwrap().contains(idx));
                    prop_assert_eq!(reg.column_name(idx), Some(name.as_str()));
                }
            }
        }

        #[test]
        fn prop_json_round_trip(cols in arb_columns()) {
            let mut reg = SchemaRegistry::new();
            for (party, id, name) in cols.iter() {
                reg.add_column(party, id, name);
            }
            let back = SchemaRegistry::deserialize(&reg.serialize().unwrap()).unwrap();
            prop_assert_eq!(back, reg);
        }
    }

    #[test]
    fn unknown_contest_is_not_found() {
        let reg = two_party_registry();
        assert_eq!(reg.find_contest_column_index("", "404", "Nothing"), None);
        assert_eq!(SchemaRegistry::new().find_contest_column_index("", "1", "Mayor"), None);
    }
}
