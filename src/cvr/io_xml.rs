// Reading cast vote records from XML files.

use chrono::NaiveDateTime;
use cvr_schema::clean_value;
use log::{debug, warn};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use snafu::{OptionExt, ResultExt};
use std::collections::HashMap;

use crate::cvr::io_files::CvrFile;
use crate::cvr::*;

static RE_FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+").unwrap());

/// An element of a parsed XML document, named by its local name.
///
/// Namespace prefixes are dropped: a corpus uses a single namespace.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn parse(content: &str, path: &str) -> CvrResult<XmlElement> {
        let mut reader = Reader::from_str(content);
        reader.trim_text(true);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        loop {
            let position = reader.buffer_position();
            let event = reader
                .read_event()
                .context(XmlParseSnafu { path, position })?;
            match event {
                Event::Start(e) => stack.push(start_element(&e, path, position)?),
                Event::Empty(e) => {
                    let elt = start_element(&e, path, position)?;
                    attach(&mut stack, &mut root, elt, path)?;
                }
                Event::End(_) => {
                    let elt = stack.pop().context(XmlStructureSnafu {
                        path,
                        message: "unbalanced closing tag",
                    })?;
                    attach(&mut stack, &mut root, elt, path)?;
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        let s = t.unescape().context(XmlParseSnafu { path, position })?;
                        top.text.push_str(&s);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if !stack.is_empty() {
            return XmlStructureSnafu {
                path,
                message: "unclosed element at end of file",
            }
            .fail();
        }
        root.context(XmlStructureSnafu {
            path,
            message: "no root element",
        })
    }

    /// The first element with this name, in document order, starting with self.
    pub fn find_first(&self, name: &str) -> Option<&XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_first(name))
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All the elements with this name below self, in document order.
    pub fn descendants_named(&self, name: &str) -> Vec<&XmlElement> {
        let mut res = Vec::new();
        for c in self.children.iter() {
            c.collect_named(name, &mut res);
        }
        res
    }

    fn collect_named<'a>(&'a self, name: &str, res: &mut Vec<&'a XmlElement>) {
        if self.name == name {
            res.push(self);
        }
        for c in self.children.iter() {
            c.collect_named(name, res);
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The text of this element and of all its descendants.
    pub fn value(&self) -> String {
        let mut res = self.text.clone();
        for c in self.children.iter() {
            res.push_str(&c.value());
        }
        res
    }

    fn child_value(&self, name: &str) -> Option<String> {
        self.child(name).map(|c| c.value())
    }
}

fn start_element(e: &BytesStart, path: &str, position: usize) -> CvrResult<XmlElement> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr
            .map_err(quick_xml::Error::from)
            .context(XmlParseSnafu { path, position })?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let value = attr
            .unescape_value()
            .context(XmlParseSnafu { path, position })?
            .to_string();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name: String::from_utf8_lossy(e.local_name().as_ref()).to_string(),
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    stack: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
    elt: XmlElement,
    path: &str,
) -> CvrResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(elt),
        None if root.is_none() => *root = Some(elt),
        None => {
            return XmlStructureSnafu {
                path,
                message: "more than one root element",
            }
            .fail()
        }
    }
    Ok(())
}

/// An option of a contest as read in one record.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct OptionRecord {
    pub id: String,
    pub name: String,
    /// The raw values marked for this option. Empty if not selected.
    pub values: Vec<String>,
}

/// A contest of a record. When an option is malformed, the options read
/// before it are kept and the reading stops there.
#[derive(Debug)]
pub struct ContestRecord {
    pub id: String,
    pub name: String,
    pub options: Vec<OptionRecord>,
    pub error: Option<CvrError>,
}

/// The optional structural elements a record may carry.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum PresentField {
    Guid,
    BatchSequence,
    BatchNumber,
    SheetNumber,
    Contests,
    PrecinctSplit,
    Party,
}

/// Everything read from one CVR element.
#[derive(Debug)]
pub struct CvrRecord {
    pub party: Option<String>,
    /// Fixed column values, by column name.
    pub fields: Vec<(String, String)>,
    pub present: Vec<PresentField>,
    pub sheet_number: Option<String>,
    pub modify_date: Option<NaiveDateTime>,
    /// One entry per contest; a malformed contest is an error that does not
    /// affect the others.
    pub contests: Vec<CvrResult<ContestRecord>>,
}

impl CvrRecord {
    fn new() -> CvrRecord {
        CvrRecord {
            party: None,
            fields: Vec::new(),
            present: Vec::new(),
            sheet_number: None,
            modify_date: None,
            contests: Vec::new(),
        }
    }

    pub fn has(&self, field: PresentField) -> bool {
        self.present.contains(&field)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn set_field(&mut self, name: &str, value: &str) {
        self.fields.push((name.to_string(), value.to_string()));
    }
}

fn format_date(d: &NaiveDateTime) -> String {
    d.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Reads a file holding a single CVR.
pub fn read_single_cvr(root: &XmlElement, file: &CvrFile) -> CvrRecord {
    let cvr = root.find_first("CVR").unwrap_or(root);
    let mut rec = CvrRecord::new();

    if let Some(party) = cvr.find_first("Party").and_then(|p| p.child("Name")) {
        rec.present.push(PresentField::Party);
        rec.party = Some(party.value());
    }

    // One file per record makes the file dates specific to the record.
    if let Some(d) = file.created {
        rec.set_field("CreateDate", &format_date(&d));
    }
    if let Some(d) = file.modified {
        rec.set_field("ModifyDate", &format_date(&d));
    }
    rec.modify_date = file.modified;

    for (name, field) in [
        ("CvrGuid", PresentField::Guid),
        ("BatchSequence", PresentField::BatchSequence),
        ("SheetNumber", PresentField::SheetNumber),
        ("BatchNumber", PresentField::BatchNumber),
    ] {
        if let Some(elt) = cvr.find_first(name) {
            let value = elt.value();
            rec.present.push(field);
            if field == PresentField::SheetNumber {
                rec.sheet_number = Some(value.clone());
            }
            rec.set_field(name, &value);
        }
    }
    if cvr.find_first("Contests").is_some() {
        rec.present.push(PresentField::Contests);
    }
    if cvr.find_first("PrecinctSplit").is_some() {
        rec.present.push(PresentField::PrecinctSplit);
    }

    rec.contests = cvr
        .descendants_named("Contest")
        .into_iter()
        .map(read_single_contest)
        .collect();
    rec
}

fn read_single_contest(elt: &XmlElement) -> CvrResult<ContestRecord> {
    let id = elt.child_value("Id").context(MissingFieldSnafu {
        element: "Contest",
        field: "Id",
    })?;
    let name = elt.child_value("Name").context(MissingFieldSnafu {
        element: format!("Contest {}", id),
        field: "Name",
    })?;
    let name = clean_value(&name);
    let mut options = Vec::new();
    if let Some(container) = elt.child("Options") {
        for opt in container.children_named("Option") {
            let opt_id = match opt.child_value("Id") {
                Some(x) => x,
                None => {
                    let error = MissingFieldSnafu {
                        element: format!("Option of contest {} ({})", id, name),
                        field: "Id",
                    }
                    .build();
                    return Ok(ContestRecord {
                        id,
                        name,
                        options,
                        error: Some(error),
                    });
                }
            };
            let opt_name = clean_value(&opt.child_value("Name").unwrap_or_else(|| "No Name".to_string()));
            let values: Vec<String> = opt
                .descendants_named("Value")
                .iter()
                .map(|v| v.value())
                .collect();
            if values.is_empty() {
                debug!("No value for option {} ({}) of contest {}", opt_name, opt_id, name);
            }
            options.push(OptionRecord {
                id: opt_id,
                name: opt_name,
                values,
            });
        }
    }
    Ok(ContestRecord {
        id,
        name,
        options,
        error: None,
    })
}

/// Names declared once at the top of a report, by object id.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ReportIndex {
    contests: HashMap<String, String>,
    selections: HashMap<String, String>,
    parties: HashMap<String, String>,
}

impl ReportIndex {
    pub fn build(report: &XmlElement) -> ReportIndex {
        let mut candidates: HashMap<String, String> = HashMap::new();
        let mut index = ReportIndex::default();
        for cand in report.descendants_named("Candidate") {
            if let (Some(id), Some(name)) = (cand.attribute("ObjectId"), cand.child("Name")) {
                candidates.insert(id.to_string(), name.value());
            }
        }
        for party in report.descendants_named("Party") {
            if let (Some(id), Some(name)) = (party.attribute("ObjectId"), party.child("Name")) {
                index.parties.insert(id.to_string(), clean_value(&name.value()));
            }
        }
        for contest in report.descendants_named("Contest") {
            if let (Some(id), Some(name)) = (contest.attribute("ObjectId"), contest.child("Name")) {
                index.contests.insert(id.to_string(), clean_value(&name.value()));
            }
        }
        for sel in report.descendants_named("ContestSelection") {
            let id = match sel.attribute("ObjectId") {
                Some(x) => x,
                None => continue,
            };
            let name = sel
                .child_value("Name")
                .or_else(|| sel.child_value("Selection"))
                .or_else(|| {
                    sel.child_value("CandidateIds").and_then(|ids| {
                        ids.split_whitespace()
                            .next()
                            .and_then(|cid| candidates.get(cid).cloned())
                    })
                });
            if let Some(n) = name {
                index.selections.insert(id.to_string(), clean_value(&n));
            }
        }
        debug!(
            "ReportIndex: {} contests, {} selections, {} parties",
            index.contests.len(),
            index.selections.len(),
            index.parties.len()
        );
        index
    }
}

/// Reads one CVR element of a cast vote record report.
pub fn read_report_cvr(cvr: &XmlElement, index: &ReportIndex, file: &CvrFile) -> CvrRecord {
    let mut rec = CvrRecord::new();
    rec.modify_date = file.modified;

    if let Some(image) = cvr.find_first("BallotImage").and_then(|b| b.find_first("Image")) {
        rec.present.push(PresentField::Guid);
        match image.attribute("FileName") {
            Some(file_name) => match RE_FIRST_NUMBER.find(file_name) {
                Some(m) => rec.set_field("BallotImageId", m.as_str()),
                None => warn!("No number found in: {}", file_name),
            },
            None => warn!("No file attribute on ballot image in {:?}", file.path),
        }
    }
    for name in ["CreatingDeviceId", "BallotStyleId", "ElectionId"] {
        if let Some(elt) = cvr.find_first(name) {
            rec.set_field(name, &elt.value());
        }
    }
    if let Some(object_id) = cvr.attribute("ObjectId") {
        rec.set_field("ObjectId", object_id);
    }
    if let Some(party_ids) = cvr.find_first("PartyIds") {
        rec.present.push(PresentField::Party);
        let raw = party_ids.value();
        if let Some(first) = raw.split_whitespace().next() {
            let party = index.parties.get(first).cloned().unwrap_or_else(|| first.to_string());
            rec.party = Some(party);
        }
    }

    // Only the current snapshot counts: earlier ones repeat the same contests.
    let current = cvr.child_value("CurrentSnapshotId");
    let snapshot = cvr
        .children_named("CVRSnapshot")
        .find(|s| current.is_some() && s.attribute("ObjectId") == current.as_deref())
        .or_else(|| cvr.child("CVRSnapshot"))
        .unwrap_or(cvr);

    let contests = snapshot.descendants_named("CVRContest");
    if !contests.is_empty() {
        rec.present.push(PresentField::Contests);
    }
    rec.contests = contests
        .into_iter()
        .map(|c| read_report_contest(c, index))
        .collect();
    rec
}

fn read_report_contest(elt: &XmlElement, index: &ReportIndex) -> CvrResult<ContestRecord> {
    let id = elt.child_value("ContestId").context(MissingFieldSnafu {
        element: "CVRContest",
        field: "ContestId",
    })?;
    let name = index.contests.get(&id).cloned().unwrap_or_else(|| id.clone());
    let mut options = Vec::new();
    for sel in elt.children_named("CVRContestSelection") {
        let opt_id = match sel.child_value("ContestSelectionId") {
            Some(x) => x,
            None => {
                let error = MissingFieldSnafu {
                    element: format!("CVRContestSelection of contest {}", id),
                    field: "ContestSelectionId",
                }
                .build();
                return Ok(ContestRecord {
                    id,
                    name,
                    options,
                    error: Some(error),
                });
            }
        };
        let opt_name = index
            .selections
            .get(&opt_id)
            .cloned()
            .unwrap_or_else(|| opt_id.clone());
        let values: Vec<String> = sel
            .descendants_named("SelectionPosition")
            .iter()
            .filter_map(|pos| {
                pos.child_value("HasIndication")
                    .or_else(|| pos.child_value("NumberVotes"))
            })
            .filter(|v| v != "no")
            .collect();
        options.push(OptionRecord {
            id: opt_id,
            name: opt_name,
            values,
        });
    }
    Ok(ContestRecord {
        id,
        name,
        options,
        error: None,
    })
}
