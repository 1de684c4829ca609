/*!
Discovers the contests present in a corpus of cast vote records and lays them
out as CSV columns.

The engine works in two passes over the records:

1. every contest, option and selection value is fed to a [`ContestAggregator`],
   which is then frozen into a [`SchemaRegistry`] by [`build_schema`];
2. every record is projected into a [`CvrRow`] that carries the schema and
   only marks the columns the record touches.

```
use cvr_schema::*;

let mut agg = ContestAggregator::new();
let contest = agg.get_or_create_contest("1", "Mayor", "REP");
contest.add_participant();
contest.get_or_create_option("11", "Smith").get_or_create_selection("1", "").add_vote();

let schema = build_schema(&agg);
let mut row = CvrRow::new(RowShape::SingleFile);
row.attach_schema(&schema);
row.mark_contest_column("REP", "1", "Mayor", "11", "Smith", "1")?;
assert_eq!(row.format_row(), ",,,,,,,1");
# Ok::<(), SchemaError>(())
```
*/

mod aggregator;
mod config;
mod row;
mod schema;
mod stats;

use log::{debug, info};

pub use crate::aggregator::*;
pub use crate::config::*;
pub use crate::row::*;
pub use crate::schema::*;
pub use crate::stats::*;

/// Registers one column per contest, immediately followed by one column per
/// option of that contest.
///
/// Contests are visited by party label and name, options by name, so that the
/// columns of a party stay contiguous.
pub fn build_schema(aggregator: &ContestAggregator) -> SchemaRegistry {
    let mut schema = SchemaRegistry::new();
    for contest in aggregator.sorted_contests() {
        let idx = schema.add_column(contest.party(), contest.id(), &clean_value(contest.name()));
        debug!(
            "build_schema: contest {:?} party {:?} -> column {}",
            contest.name(),
            contest.party(),
            idx
        );
        for option in contest.sorted_options() {
            schema.add_column(contest.party(), &option.id, &clean_value(&option.name));
        }
    }
    info!(
        "Built contest column schema: {} contests, {} columns",
        aggregator.len(),
        schema.len()
    );
    schema
}

/// The totals of a pass, laid out on the columns of a schema: the participant
/// count for a contest column, the sum of the votes for an option column.
///
/// Columns that the aggregator never saw stay empty.
pub fn column_totals(schema: &SchemaRegistry, aggregator: &ContestAggregator) -> Vec<Option<u64>> {
    let mut res: Vec<Option<u64>> = vec![None; schema.len()];
    for contest in aggregator.sorted_contests() {
        let contest_name = clean_value(contest.name());
        let contest_idx =
            match schema.find_contest_column_index(contest.party(), contest.id(), &contest_name) {
                Some(x) => x,
                None => {
                    debug!("column_totals: contest {:?} not in schema", contest.key);
                    continue;
                }
            };
        res[contest_idx] = Some(contest.participant_count);
        for option in contest.sorted_options() {
            let (_, option_idx) = schema.find_contest_option_column_indices(
                contest.party(),
                contest.id(),
                &contest_name,
                &option.id,
                &clean_value(&option.name),
            );
            if let Some(idx) = option_idx {
                *res[idx].get_or_insert(0) += option.total_votes();
            }
        }
    }
    res
}
