use std::collections::HashMap;

use chrono::NaiveDate;

use crate::types::{CensusRecord, Island};

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Island '{0}' not found in scraped table")]
    MissingIsland(String),
    #[error("Invalid count: {0:?}")]
    InvalidCount(String),
}

/// Parses a count written with `.` as thousands separator (`"1.234"` -> `1234`).
pub fn parse_count(text: &str) -> Result<i64, NormalizeError> {
    let digits: String = text.trim().chars().filter(|c| *c != '.').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(NormalizeError::InvalidCount(text.to_string()));
    }
    digits
        .parse()
        .map_err(|_| NormalizeError::InvalidCount(text.to_string()))
}

/// Display name on a source page -> canonical island.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IslandMapping {
    entries: Vec<(String, Island)>,
}

impl IslandMapping {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Island)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, island)| (name.into(), island))
                .collect(),
        }
    }

    /// Row labels used by the ZOOCAN census table.
    pub fn zoocan() -> Self {
        Self::new(Island::ALL.map(|island| (island.to_string(), island)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Island)> {
        self.entries
            .iter()
            .map(|(name, island)| (name.as_str(), *island))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for IslandMapping {
    fn default() -> Self {
        Self::zoocan()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CensusNormalizer {
    mapping: IslandMapping,
}

impl CensusNormalizer {
    pub fn new(mapping: IslandMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &IslandMapping {
        &self.mapping
    }

    /// Builds a record from parallel island-name and count columns.
    ///
    /// Every mapped display name must appear in `islands`; extra rows are ignored.
    pub fn normalize(
        &self,
        islands: &[String],
        counts: &[String],
        date: NaiveDate,
    ) -> Result<CensusRecord, NormalizeError> {
        let scraped: HashMap<&str, &str> = islands
            .iter()
            .map(String::as_str)
            .zip(counts.iter().map(String::as_str))
            .collect();

        let mut record = CensusRecord::new(date);
        for (display_name, island) in self.mapping.iter() {
            let raw = scraped
                .get(display_name)
                .ok_or_else(|| NormalizeError::MissingIsland(display_name.to_string()))?;
            record.counts.insert(island, parse_count(raw)?);
        }

        for name in islands {
            if !self.mapping.iter().any(|(display_name, _)| display_name == name.as_str()) {
                log::debug!("Ignoring unmapped census row '{}'", name);
            }
        }

        Ok(record)
    }
}
