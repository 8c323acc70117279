// metadata.rs - Flat key/value description of a run, persisted as info.dat

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, SdwError};

/// String-keyed effective configuration of a simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataMap(BTreeMap<String, String>);

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Display) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Typed lookup of a numeric entry.
    pub fn get_f64(&self, key: &str) -> Result<f64> {
        let v = self.get(key).ok_or_else(|| SdwError::missing(key))?;
        v.parse().map_err(|_| SdwError::Parse { what: key.to_string(), value: v.to_string() })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` into self; entries of `other` win.
    pub fn extend(&mut self, other: &MetadataMap) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Write `key = value` lines preceded by an optional `#` header.
    pub fn write(&self, path: &Path, header: &str) -> Result<()> {
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        for line in header.lines() {
            writeln!(out, "# {line}")?;
        }
        for (k, v) in &self.0 {
            writeln!(out, "{k} = {v}")?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut map = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (k, v) = line
                .split_once('=')
                .ok_or_else(|| SdwError::Parse { what: "metadata line".to_string(), value: line.to_string() })?;
            map.insert(k.trim(), v.trim());
        }
        Ok(map)
    }
}
