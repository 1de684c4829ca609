use log::debug;
use std::collections::HashMap;

use crate::config::*;

/// Identity of a contest: the same contest id presented under two parties
/// gives two distinct contests.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct ContestKey {
    pub party: String,
    pub id: String,
    pub name: String,
}

/// A raw value marked by voters for one option, with its vote count.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Selection {
    pub option_id: String,
    pub value: String,
    /// Defaults to the value itself.
    pub name: String,
    pub count: u64,
}

impl Selection {
    pub fn add_vote(&mut self) {
        self.count += 1;
    }
}

/// A selectable choice within a contest.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ContestOption {
    pub id: String,
    pub name: String,
    pub selections: HashMap<String, Selection>,
}

impl ContestOption {
    fn new(id: &str, name: &str) -> ContestOption {
        ContestOption {
            id: id.to_string(),
            name: name.to_string(),
            selections: HashMap::new(),
        }
    }

    pub fn get_or_create_selection(&mut self, value: &str, name: &str) -> &mut Selection {
        let option_id = &self.id;
        self.selections
            .entry(value.to_string())
            .or_insert_with(|| Selection {
                option_id: option_id.clone(),
                value: value.to_string(),
                name: if name.is_empty() {
                    value.to_string()
                } else {
                    name.to_string()
                },
                count: 0,
            })
    }

    /// The sum of the votes over all the distinct values.
    pub fn total_votes(&self) -> u64 {
        self.selections.values().map(|s| s.count).sum()
    }

    /// The selections, ordered by value.
    pub fn sorted_selections(&self) -> Vec<&Selection> {
        let mut res: Vec<&Selection> = self.selections.values().collect();
        res.sort_by(|a, b| a.value.cmp(&b.value));
        res
    }
}

/// A race or question, possibly scoped to a party.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Contest {
    pub key: ContestKey,
    /// The number of records that contained this contest.
    pub participant_count: u64,
    pub options: HashMap<String, ContestOption>,
}

impl Contest {
    pub fn id(&self) -> &str {
        &self.key.id
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn party(&self) -> &str {
        &self.key.party
    }

    pub fn add_participant(&mut self) {
        self.participant_count += 1;
    }

    pub fn get_or_create_option(&mut self, option_id: &str, option_name: &str) -> &mut ContestOption {
        self.options
            .entry(option_id.to_string())
            .or_insert_with(|| ContestOption::new(option_id, option_name))
    }

    /// The options in column order: by display name, then by id.
    pub fn sorted_options(&self) -> Vec<&ContestOption> {
        let mut res: Vec<&ContestOption> = self.options.values().collect();
        res.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        res
    }

    /// The sum of the votes over all the options.
    pub fn total_selections(&self) -> u64 {
        self.options.values().map(|o| o.total_votes()).sum()
    }
}

/// Accumulates the contests, options and selection values seen over a pass.
///
/// All the entities are created lazily on first encounter and never removed.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ContestAggregator {
    contests: HashMap<ContestKey, Contest>,
}

impl ContestAggregator {
    pub fn new() -> ContestAggregator {
        ContestAggregator::default()
    }

    pub fn is_empty(&self) -> bool {
        self.contests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contests.len()
    }

    pub fn contest(&self, key: &ContestKey) -> Option<&Contest> {
        self.contests.get(key)
    }

    pub fn get_or_create_contest(&mut self, id: &str, name: &str, party: &str) -> &mut Contest {
        let key = ContestKey {
            party: party.to_string(),
            id: id.to_string(),
            name: name.to_string(),
        };
        self.contests.entry(key.clone()).or_insert_with(|| {
            debug!("get_or_create_contest: new contest {:?}", key);
            Contest {
                key,
                participant_count: 0,
                options: HashMap::new(),
            }
        })
    }

    /// Adds an option to a contest that must already exist.
    pub fn get_or_create_option(
        &mut self,
        key: &ContestKey,
        option_id: &str,
        option_name: &str,
    ) -> SchemaResult<&mut ContestOption> {
        match self.contests.get_mut(key) {
            Some(contest) => Ok(contest.get_or_create_option(option_id, option_name)),
            None => ContestNotFoundSnafu {
                contest_id: key.id.as_str(),
            }
            .fail(),
        }
    }

    /// Adds a selection value to an option that must already exist.
    pub fn get_or_create_selection(
        &mut self,
        key: &ContestKey,
        option_id: &str,
        value: &str,
        name: &str,
    ) -> SchemaResult<&mut Selection> {
        let contest = match self.contests.get_mut(key) {
            Some(c) => c,
            None => {
                return ContestNotFoundSnafu {
                    contest_id: key.id.as_str(),
                }
                .fail()
            }
        };
        match contest.options.get_mut(option_id) {
            Some(option) => Ok(option.get_or_create_selection(value, name)),
            None => OptionNotFoundSnafu {
                contest_id: key.id.as_str(),
                option_id,
            }
            .fail(),
        }
    }

    /// The contests in discovery order: by the concatenation of the party
    /// label and the contest name, then by id.
    pub fn sorted_contests(&self) -> Vec<&Contest> {
        let mut res: Vec<&Contest> = self.contests.values().collect();
        res.sort_by(|a, b| {
            let ka = format!("{}{}", a.key.party, a.key.name);
            let kb = format!("{}{}", b.key.party, b.key.name);
            ka.cmp(&kb).then_with(|| a.key.cmp(&b.key))
        });
        res
    }
}
