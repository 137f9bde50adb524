use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// Key of an extractor-provided record line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    /// `DATA0` .. `DATA5`
    Data(u8),
    /// Modem firmware version reported by the generic passthrough file.
    ModemVersionUsed,
}

pub const DATA0: FieldKey = FieldKey::Data(0);
pub const DATA1: FieldKey = FieldKey::Data(1);
pub const DATA2: FieldKey = FieldKey::Data(2);
pub const DATA3: FieldKey = FieldKey::Data(3);
pub const DATA4: FieldKey = FieldKey::Data(4);
pub const DATA5: FieldKey = FieldKey::Data(5);

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Data(n) => write!(f, "DATA{}", n),
            FieldKey::ModemVersionUsed => write!(f, "MODEMVERSIONUSED"),
        }
    }
}

/// Which occurrence of a pattern a slot keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// The slot closes on the first match.
    First,
    /// Every match overwrites the previous one.
    Last,
}

/// One field being searched for while an extractor scans its artifact.
#[derive(Debug, Clone)]
pub struct Slot {
    value: Option<String>,
    capture: Capture,
}

impl Slot {
    pub fn first() -> Self {
        Self {
            value: None,
            capture: Capture::First,
        }
    }

    pub fn last() -> Self {
        Self {
            value: None,
            capture: Capture::Last,
        }
    }

    /// Whether a new match would still be accepted.
    pub fn is_open(&self) -> bool {
        match self.capture {
            Capture::First => self.value.is_none(),
            Capture::Last => true,
        }
    }

    pub fn is_found(&self) -> bool {
        self.value.is_some()
    }

    /// Offer a candidate match; returns true when it was stored.
    pub fn offer(&mut self, candidate: Option<&str>) -> bool {
        match candidate {
            Some(value) if self.is_open() => {
                self.value = Some(value.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The found value, or the empty string for a miss.
    pub fn into_value(self) -> String {
        self.value.unwrap_or_default()
    }
}

/// Ordered extractor output, one value per key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    values: IndexMap<FieldKey, String>,
}

impl ExtractedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, keeping its original position if it was already present.
    pub fn set(&mut self, key: FieldKey, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Copy every field of `other` in, overwriting values for shared keys.
    pub fn merge(&mut self, other: ExtractedFields) {
        for (key, value) in other.values {
            self.values.insert(key, value);
        }
    }
}

impl Serialize for ExtractedFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (key, value) in &self.values {
            map.serialize_entry(&key.to_string(), value)?;
        }
        map.end()
    }
}

/// Result of one extractor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub fields: ExtractedFields,
    /// Forced criticality decided from the artifact content.
    pub critical: bool,
}

impl Extraction {
    pub fn new(fields: ExtractedFields) -> Self {
        Self {
            fields,
            critical: false,
        }
    }

    /// Nothing to report (artifact absent).
    pub fn empty() -> Self {
        Self::default()
    }
}

impl From<ExtractedFields> for Extraction {
    fn from(fields: ExtractedFields) -> Self {
        Self::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_slot_keeps_first_match() {
        let mut slot = Slot::first();
        assert!(slot.offer(Some("a")));
        assert!(!slot.offer(Some("b")));
        assert_eq!(slot.value(), Some("a"));
    }

    #[test]
    fn test_last_slot_keeps_latest_match() {
        let mut slot = Slot::last();
        slot.offer(Some("a"));
        slot.offer(None);
        slot.offer(Some("b"));
        assert_eq!(slot.into_value(), "b");
    }

    #[test]
    fn test_empty_match_still_closes_slot() {
        let mut slot = Slot::first();
        assert!(slot.offer(Some("")));
        assert!(slot.is_found());
        assert!(!slot.is_open());
    }

    #[test]
    fn test_field_key_names() {
        assert_eq!(DATA0.to_string(), "DATA0");
        assert_eq!(DATA5.to_string(), "DATA5");
        assert_eq!(FieldKey::ModemVersionUsed.to_string(), "MODEMVERSIONUSED");
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut fields = ExtractedFields::new();
        fields.set(DATA0, "full dropbox");
        fields.set(DATA1, "x");
        fields.set(DATA0, "y");
        let keys: Vec<String> = fields.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["DATA0", "DATA1"]);
        assert_eq!(fields.get(DATA0), Some("y"));
    }

    #[test]
    fn test_absent_differs_from_empty() {
        let mut fields = ExtractedFields::new();
        fields.set(DATA2, "");
        assert_eq!(fields.get(DATA2), Some(""));
        assert_eq!(fields.get(DATA3), None);
    }

    #[test]
    fn test_serializes_in_insertion_order() {
        let mut fields = ExtractedFields::new();
        fields.set(DATA1, "b");
        fields.set(DATA0, "a");
        let json = serde_json::to_string(&fields).unwrap();
        assert_eq!(json, r#"{"DATA1":"b","DATA0":"a"}"#);
    }
}
