//! The localization record store: contacts, bipolar pairs, their coordinates, atlas labels and diagnostic infos.
//!
//! Components never own contact or pair state. They read geometry through [`LocalizationStore`]
//! and write results back through its field-level upsert operations.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{LocalizeError, Result};

/// A bipolar pair, given by the names of its two contacts.
pub type PairName = (String, String);


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSystem {
    Native,
    T1,
    Mni,
    /// Subject FreeSurfer surface space.
    Fs,
    /// Template surface space.
    Fsaverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateType {
    Raw,
    Corrected,
}


/// Electrode type of a contact. Parsed from jacksheet codes (`D`, `G`, `S`) or full names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContactType {
    Depth,
    Grid,
    Strip,
    Other(String),
}

impl ContactType {
    /// Grid and strip contacts lie on the cortical surface.
    pub fn is_planar(&self) -> bool {
        matches!(self, ContactType::Grid | ContactType::Strip)
    }

    /// The single letter code, as used in exchange files.
    pub fn code(&self) -> &str {
        match self {
            ContactType::Depth => "D",
            ContactType::Grid => "G",
            ContactType::Strip => "S",
            ContactType::Other(code) => code,
        }
    }
}

impl From<&str> for ContactType {
    fn from(code: &str) -> ContactType {
        match code.trim().to_ascii_lowercase().as_str() {
            "d" | "depth" => ContactType::Depth,
            "g" | "grid" => ContactType::Grid,
            "s" | "strip" => ContactType::Strip,
            _ => ContactType::Other(code.trim().to_string()),
        }
    }
}

impl From<String> for ContactType {
    fn from(code: String) -> ContactType {
        ContactType::from(code.as_str())
    }
}

impl From<ContactType> for String {
    fn from(contact_type: ContactType) -> String {
        contact_type.code().to_string()
    }
}

impl fmt::Display for ContactType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}


/// A diagnostic value attached to a contact or pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoValue {
    Missing,
    Flag(bool),
    Number(f64),
    Text(String),
    Point(Point3<f64>),
}

impl InfoValue {
    pub fn as_point(&self) -> Option<Point3<f64>> {
        match self {
            InfoValue::Point(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            InfoValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Option<bool>> for InfoValue {
    fn from(flag: Option<bool>) -> InfoValue {
        flag.map(InfoValue::Flag).unwrap_or(InfoValue::Missing)
    }
}

impl From<Option<f64>> for InfoValue {
    fn from(value: Option<f64>) -> InfoValue {
        value.map(InfoValue::Number).unwrap_or(InfoValue::Missing)
    }
}

impl From<Option<String>> for InfoValue {
    fn from(text: Option<String>) -> InfoValue {
        text.map(InfoValue::Text).unwrap_or(InfoValue::Missing)
    }
}

impl From<Point3<f64>> for InfoValue {
    fn from(point: Point3<f64>) -> InfoValue {
        InfoValue::Point(point)
    }
}


type Coordinates = BTreeMap<CoordinateSystem, BTreeMap<CoordinateType, Point3<f64>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(rename = "type")]
    pub contact_type: ContactType,
    #[serde(default)]
    pub coordinates: Coordinates,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub infos: BTreeMap<String, InfoValue>,
}

impl Contact {
    pub fn new<T: Into<ContactType>>(name: &str, contact_type: T) -> Contact {
        Contact {
            name: name.to_string(),
            contact_type: contact_type.into(),
            coordinates: BTreeMap::new(),
            labels: BTreeMap::new(),
            infos: BTreeMap::new(),
        }
    }

    pub fn with_coordinate(mut self, system: CoordinateSystem, coordinate_type: CoordinateType, value: Point3<f64>) -> Contact {
        self.coordinates.entry(system).or_default().insert(coordinate_type, value);
        self
    }

    pub fn coordinate(&self, system: CoordinateSystem, coordinate_type: CoordinateType) -> Option<Point3<f64>> {
        self.coordinates.get(&system).and_then(|c| c.get(&coordinate_type)).copied()
    }

    pub fn label(&self, atlas: &str) -> Option<&str> {
        self.labels.get(atlas).map(|l| l.as_str())
    }

    pub fn info(&self, field: &str) -> Option<&InfoValue> {
        self.infos.get(field)
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub contacts: PairName,
    #[serde(default)]
    pub coordinates: Coordinates,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub infos: BTreeMap<String, InfoValue>,
}

impl Pair {
    pub fn label(&self, atlas: &str) -> Option<&str> {
        self.labels.get(atlas).map(|l| l.as_str())
    }

    pub fn info(&self, field: &str) -> Option<&InfoValue> {
        self.infos.get(field)
    }
}


/// Access to the contacts and pairs of one subject.
///
/// Single-entity setters fail with [`LocalizeError::InvalidContact`] for unknown names, so callers can skip that
/// entity and go on. The batch forms stop at the first failure, writes done before it stay in place.
pub trait LocalizationStore {
    fn get_contacts(&self) -> Vec<String>;

    fn get_pairs(&self) -> Vec<PairName>;

    fn get_contact_type(&self, name: &str) -> Result<ContactType>;

    fn get_contact_coordinate(&self, system: CoordinateSystem, name: &str, coordinate_type: CoordinateType) -> Result<Option<Point3<f64>>>;

    fn set_contact_coordinate(&mut self, system: CoordinateSystem, name: &str, value: Point3<f64>, coordinate_type: CoordinateType) -> Result<()>;

    fn get_contact_label(&self, atlas: &str, name: &str) -> Result<Option<String>>;

    fn set_contact_label(&mut self, atlas: &str, name: &str, label: &str) -> Result<()>;

    fn set_pair_label(&mut self, atlas: &str, pair: &PairName, label: &str) -> Result<()>;

    fn set_contact_info(&mut self, field: &str, name: &str, value: InfoValue) -> Result<()>;

    fn set_pair_info(&mut self, field: &str, pair: &PairName, value: InfoValue) -> Result<()>;

    /// The pair's coordinate. Unless a store keeps its own, this is the midpoint of both contacts.
    fn get_pair_coordinate(&self, system: CoordinateSystem, pair: &PairName, coordinate_type: CoordinateType) -> Result<Option<Point3<f64>>> {
        contact_midpoint(self, system, pair, coordinate_type)
    }

    fn set_contact_coordinates(&mut self, system: CoordinateSystem, names: &[String], values: &[Point3<f64>], coordinate_type: CoordinateType) -> Result<()> {
        check_lengths("contact coordinates", names.len(), values.len())?;
        for (name, value) in names.iter().zip(values) {
            self.set_contact_coordinate(system, name, *value, coordinate_type)?;
        }
        Ok(())
    }

    fn set_contact_labels(&mut self, atlas: &str, names: &[String], labels: &[String]) -> Result<()> {
        check_lengths("contact labels", names.len(), labels.len())?;
        for (name, label) in names.iter().zip(labels) {
            self.set_contact_label(atlas, name, label)?;
        }
        Ok(())
    }

    fn set_pair_labels(&mut self, atlas: &str, pairs: &[PairName], labels: &[String]) -> Result<()> {
        check_lengths("pair labels", pairs.len(), labels.len())?;
        for (pair, label) in pairs.iter().zip(labels) {
            self.set_pair_label(atlas, pair, label)?;
        }
        Ok(())
    }

    fn set_contact_infos(&mut self, field: &str, names: &[String], values: &[InfoValue]) -> Result<()> {
        check_lengths(field, names.len(), values.len())?;
        for (name, value) in names.iter().zip(values) {
            self.set_contact_info(field, name, value.clone())?;
        }
        Ok(())
    }

    fn set_pair_infos(&mut self, field: &str, pairs: &[PairName], values: &[InfoValue]) -> Result<()> {
        check_lengths(field, pairs.len(), values.len())?;
        for (pair, value) in pairs.iter().zip(values) {
            self.set_pair_info(field, pair, value.clone())?;
        }
        Ok(())
    }
}

/// Midpoint of the two contacts of a pair, `None` if either has no such coordinate.
pub fn contact_midpoint<S: LocalizationStore + ?Sized>(store: &S, system: CoordinateSystem, pair: &PairName, coordinate_type: CoordinateType) -> Result<Option<Point3<f64>>> {
    let c1 = store.get_contact_coordinate(system, &pair.0, coordinate_type)?;
    let c2 = store.get_contact_coordinate(system, &pair.1, coordinate_type)?;
    Ok(match (c1, c2) {
        (Some(c1), Some(c2)) => Some(nalgebra::center(&c1, &c2)),
        _ => None,
    })
}

fn check_lengths(what: &str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(LocalizeError::LengthMismatch(what.to_string(), expected, found));
    }
    Ok(())
}


/// In-memory localization of one subject, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Localization {
    pub subject: String,
    contacts: Vec<Contact>,
    pairs: Vec<Pair>,
}

impl Localization {
    pub fn new(subject: &str) -> Localization {
        Localization {
            subject: subject.to_string(),
            ..Localization::default()
        }
    }

    /// Add a contact, replacing any contact of the same name.
    pub fn add_contact(&mut self, contact: Contact) {
        match self.contacts.iter_mut().find(|c| c.name == contact.name) {
            Some(existing) => *existing = contact,
            None => self.contacts.push(contact),
        }
    }

    /// Add a bipolar pair. Both contacts must already be part of the localization.
    pub fn add_pair(&mut self, first: &str, second: &str) -> Result<()> {
        for name in &[first, second] {
            if self.contact(name).is_none() {
                return Err(LocalizeError::InvalidContact(name.to_string()));
            }
        }
        let contacts = (first.to_string(), second.to_string());
        if self.pair(&contacts).is_none() {
            self.pairs.push(Pair {
                contacts,
                coordinates: BTreeMap::new(),
                labels: BTreeMap::new(),
                infos: BTreeMap::new(),
            });
        }
        Ok(())
    }

    pub fn contact(&self, name: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.name == name)
    }

    pub fn pair(&self, pair: &PairName) -> Option<&Pair> {
        self.pairs.iter().find(|p| &p.contacts == pair)
    }

    pub fn set_pair_coordinate(&mut self, system: CoordinateSystem, pair: &PairName, value: Point3<f64>, coordinate_type: CoordinateType) -> Result<()> {
        self.pair_mut(pair)?.coordinates.entry(system).or_default().insert(coordinate_type, value);
        Ok(())
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Localization> {
        let file = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    fn contact_ref(&self, name: &str) -> Result<&Contact> {
        self.contact(name).ok_or_else(|| LocalizeError::InvalidContact(name.to_string()))
    }

    fn contact_mut(&mut self, name: &str) -> Result<&mut Contact> {
        self.contacts
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| LocalizeError::InvalidContact(name.to_string()))
    }

    fn pair_mut(&mut self, pair: &PairName) -> Result<&mut Pair> {
        self.pairs
            .iter_mut()
            .find(|p| &p.contacts == pair)
            .ok_or_else(|| LocalizeError::InvalidContact(format!("{}-{}", pair.0, pair.1)))
    }
}

impl LocalizationStore for Localization {
    fn get_contacts(&self) -> Vec<String> {
        self.contacts.iter().map(|c| c.name.clone()).collect()
    }

    fn get_pairs(&self) -> Vec<PairName> {
        self.pairs.iter().map(|p| p.contacts.clone()).collect()
    }

    fn get_contact_type(&self, name: &str) -> Result<ContactType> {
        Ok(self.contact_ref(name)?.contact_type.clone())
    }

    fn get_contact_coordinate(&self, system: CoordinateSystem, name: &str, coordinate_type: CoordinateType) -> Result<Option<Point3<f64>>> {
        Ok(self.contact_ref(name)?.coordinate(system, coordinate_type))
    }

    fn set_contact_coordinate(&mut self, system: CoordinateSystem, name: &str, value: Point3<f64>, coordinate_type: CoordinateType) -> Result<()> {
        self.contact_mut(name)?.coordinates.entry(system).or_default().insert(coordinate_type, value);
        Ok(())
    }

    fn get_contact_label(&self, atlas: &str, name: &str) -> Result<Option<String>> {
        Ok(self.contact_ref(name)?.label(atlas).map(|l| l.to_string()))
    }

    fn set_contact_label(&mut self, atlas: &str, name: &str, label: &str) -> Result<()> {
        self.contact_mut(name)?.labels.insert(atlas.to_string(), label.to_string());
        Ok(())
    }

    fn set_pair_label(&mut self, atlas: &str, pair: &PairName, label: &str) -> Result<()> {
        self.pair_mut(pair)?.labels.insert(atlas.to_string(), label.to_string());
        Ok(())
    }

    fn set_contact_info(&mut self, field: &str, name: &str, value: InfoValue) -> Result<()> {
        self.contact_mut(name)?.infos.insert(field.to_string(), value);
        Ok(())
    }

    fn set_pair_info(&mut self, field: &str, pair: &PairName, value: InfoValue) -> Result<()> {
        self.pair_mut(pair)?.infos.insert(field.to_string(), value);
        Ok(())
    }

    fn get_pair_coordinate(&self, system: CoordinateSystem, pair: &PairName, coordinate_type: CoordinateType) -> Result<Option<Point3<f64>>> {
        let stored = self.pair(pair).and_then(|p| p.coordinates.get(&system)).and_then(|c| c.get(&coordinate_type));
        match stored {
            Some(value) => Ok(Some(*value)),
            None => contact_midpoint(self, system, pair, coordinate_type),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    fn two_contacts() -> Localization {
        let mut loc = Localization::new("R1001P");
        loc.add_contact(Contact::new("G1", "G").with_coordinate(CoordinateSystem::Fs, CoordinateType::Raw, Point3::new(0.0, 0.0, 0.0)));
        loc.add_contact(Contact::new("G2", "G").with_coordinate(CoordinateSystem::Fs, CoordinateType::Raw, Point3::new(2.0, 4.0, 6.0)));
        loc.add_pair("G1", "G2").unwrap();
        loc
    }

    #[test]
    fn contact_types_parse_codes_and_names() {
        assert_eq!(ContactType::Grid, ContactType::from("G"));
        assert_eq!(ContactType::Strip, ContactType::from("strip"));
        assert_eq!(ContactType::Depth, ContactType::from(" d "));
        assert_eq!(ContactType::Other(String::from("uD")), ContactType::from("uD"));
        assert!(ContactType::Strip.is_planar());
        assert!(!ContactType::Depth.is_planar());
    }

    #[test]
    fn pairs_need_known_contacts() {
        let mut loc = two_contacts();
        assert!(matches!(loc.add_pair("G1", "G9"), Err(LocalizeError::InvalidContact(name)) if name == "G9"));
        assert_eq!(1, loc.get_pairs().len());
    }

    #[test]
    fn pair_coordinates_default_to_the_contact_midpoint() {
        let mut loc = two_contacts();
        let pair = (String::from("G1"), String::from("G2"));
        assert_eq!(
            Some(Point3::new(1.0, 2.0, 3.0)),
            loc.get_pair_coordinate(CoordinateSystem::Fs, &pair, CoordinateType::Raw).unwrap()
        );
        assert_eq!(None, loc.get_pair_coordinate(CoordinateSystem::Fs, &pair, CoordinateType::Corrected).unwrap());

        loc.set_pair_coordinate(CoordinateSystem::Fs, &pair, Point3::new(9.0, 9.0, 9.0), CoordinateType::Raw).unwrap();
        assert_eq!(
            Some(Point3::new(9.0, 9.0, 9.0)),
            loc.get_pair_coordinate(CoordinateSystem::Fs, &pair, CoordinateType::Raw).unwrap()
        );
    }

    #[test]
    fn batch_setters_check_lengths_and_names() {
        let mut loc = two_contacts();
        let names = vec![String::from("G1"), String::from("G2")];
        assert!(matches!(
            loc.set_contact_labels("dk", &names, &[String::from("insula")]),
            Err(LocalizeError::LengthMismatch(_, 2, 1))
        ));

        let names = vec![String::from("G1"), String::from("X"), String::from("G2")];
        let labels = vec![String::from("a"), String::from("b"), String::from("c")];
        assert!(loc.set_contact_labels("dk", &names, &labels).is_err());
        assert_eq!(Some("a"), loc.contact("G1").unwrap().label("dk"));
        assert_eq!(None, loc.contact("G2").unwrap().label("dk"));
    }

    #[test]
    fn localizations_round_trip_through_json() {
        let mut loc = two_contacts();
        let pair = (String::from("G1"), String::from("G2"));
        loc.set_contact_coordinate(CoordinateSystem::Fs, "G1", Point3::new(0.5, 0.25, 1.0), CoordinateType::Corrected).unwrap();
        loc.set_contact_label("dk", "G1", "L_insula").unwrap();
        loc.set_pair_label("dk", &pair, "L_insula").unwrap();
        loc.set_contact_info("displacement", "G1", InfoValue::Flag(true)).unwrap();
        loc.set_contact_info("linked_electrodes", "G1", InfoValue::Missing).unwrap();
        loc.set_pair_info("closest_vertex_coordinate", &pair, InfoValue::Point(Point3::new(1.0, 2.0, 3.0))).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("localization.json");
        loc.to_json_file(&path).unwrap();
        let restored = Localization::from_json_file(&path).unwrap();

        assert_eq!(loc, restored);
        assert_eq!(ContactType::Grid, restored.get_contact_type("G2").unwrap());
    }
}
