use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error(
    "Invalid island '{0}'. Accepted values: 'no_canario', 'el_hierro', 'fuerteventura', 'gran_canaria', 'la_gomera', 'la_palma', 'lanzarote', 'tenerife'"
)]
pub struct IslandParseError(String);

/// Canonical field keys of the `census` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Island {
    NoCanario,
    ElHierro,
    Fuerteventura,
    GranCanaria,
    LaGomera,
    LaPalma,
    Lanzarote,
    Tenerife,
}

impl Island {
    pub const ALL: [Island; 8] = [
        Island::NoCanario,
        Island::ElHierro,
        Island::Fuerteventura,
        Island::GranCanaria,
        Island::LaGomera,
        Island::LaPalma,
        Island::Lanzarote,
        Island::Tenerife,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Island::NoCanario => "no_canario",
            Island::ElHierro => "el_hierro",
            Island::Fuerteventura => "fuerteventura",
            Island::GranCanaria => "gran_canaria",
            Island::LaGomera => "la_gomera",
            Island::LaPalma => "la_palma",
            Island::Lanzarote => "lanzarote",
            Island::Tenerife => "tenerife",
        }
    }
}

impl FromStr for Island {
    type Err = IslandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Island::ALL
            .into_iter()
            .find(|island| island.key() == s)
            .ok_or_else(|| IslandParseError(s.to_string()))
    }
}

impl Display for Island {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Island::NoCanario => write!(f, "No Canario"),
            Island::ElHierro => write!(f, "El Hierro"),
            Island::Fuerteventura => write!(f, "Fuerteventura"),
            Island::GranCanaria => write!(f, "Gran Canaria"),
            Island::LaGomera => write!(f, "La Gomera"),
            Island::LaPalma => write!(f, "La Palma"),
            Island::Lanzarote => write!(f, "Lanzarote"),
            Island::Tenerife => write!(f, "Tenerife"),
        }
    }
}

pub type IslandCounts = BTreeMap<Island, i64>;

#[derive(Debug, thiserror::Error)]
#[error("Invalid census date {year}-{month}-{day}")]
pub struct InvalidDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

/// Dogs per island captured on one day. Stored flat, keyed by `(year, month, day)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CensusRow", into = "CensusRow")]
pub struct CensusRecord {
    pub date: NaiveDate,
    pub counts: IslandCounts,
}

impl CensusRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            counts: IslandCounts::new(),
        }
    }

    pub fn with_count(mut self, island: Island, count: i64) -> Self {
        self.counts.insert(island, count);
        self
    }

    pub fn count(&self, island: Island) -> Option<i64> {
        self.counts.get(&island).copied()
    }
}

impl Display for CensusRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.date)?;
        for island in Island::ALL {
            match self.count(island) {
                Some(n) => write!(f, " {}={}", island.key(), n)?,
                None => write!(f, " {}=-", island.key())?,
            }
        }
        Ok(())
    }
}

/// Column layout of the `census` table. Island columns are nullable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_canario: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub el_hierro: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuerteventura: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gran_canaria: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub la_gomera: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub la_palma: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lanzarote: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenerife: Option<i64>,
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CensusRow {
    fn column(&mut self, island: Island) -> &mut Option<i64> {
        match island {
            Island::NoCanario => &mut self.no_canario,
            Island::ElHierro => &mut self.el_hierro,
            Island::Fuerteventura => &mut self.fuerteventura,
            Island::GranCanaria => &mut self.gran_canaria,
            Island::LaGomera => &mut self.la_gomera,
            Island::LaPalma => &mut self.la_palma,
            Island::Lanzarote => &mut self.lanzarote,
            Island::Tenerife => &mut self.tenerife,
        }
    }
}

impl TryFrom<CensusRow> for CensusRecord {
    type Error = InvalidDate;

    fn try_from(mut row: CensusRow) -> Result<Self, Self::Error> {
        let date = NaiveDate::from_ymd_opt(row.year, row.month, row.day).ok_or(InvalidDate {
            year: row.year,
            month: row.month,
            day: row.day,
        })?;

        let counts = Island::ALL
            .into_iter()
            .filter_map(|island| row.column(island).map(|n| (island, n)))
            .collect();

        Ok(Self { date, counts })
    }
}

impl From<CensusRecord> for CensusRow {
    fn from(record: CensusRecord) -> Self {
        let mut row = CensusRow {
            year: record.date.year(),
            month: record.date.month(),
            day: record.date.day(),
            ..Default::default()
        };
        for (island, count) in record.counts {
            *row.column(island) = Some(count);
        }
        row
    }
}

/// A shelter's reported total. `created_at` is assigned by the table on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueRecord {
    pub total_dogs: i64,
    pub rescue_name: String,
    pub island: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RescueRecord {
    pub fn new(total_dogs: i64, rescue_name: impl Into<String>, island: impl Into<String>) -> Self {
        Self {
            total_dogs,
            rescue_name: rescue_name.into(),
            island: island.into(),
            created_at: None,
        }
    }
}

impl Display for RescueRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {} dogs",
            self.rescue_name, self.island, self.total_dogs
        )?;
        if let Some(created_at) = self.created_at {
            write!(f, " at {}", created_at.format("%Y-%m-%d %H:%M"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum Record {
    Census(CensusRecord),
    Rescue(RescueRecord),
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Record::Census(census) => write!(f, "census {}", census),
            Record::Rescue(rescue) => write!(f, "rescue {}", rescue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_island_keys_round_trip_through_from_str() {
        for island in Island::ALL {
            assert_eq!(island.key().parse::<Island>().unwrap(), island);
        }
        assert!("gran canaria".parse::<Island>().is_err());
    }

    #[test]
    fn test_census_record_serializes_flat() {
        let record = CensusRecord::new(NaiveDate::from_ymd_opt(2025, 3, 9).unwrap())
            .with_count(Island::Tenerife, 1234)
            .with_count(Island::ElHierro, 0);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"el_hierro": 0, "tenerife": 1234, "year": 2025, "month": 3, "day": 9})
        );
    }

    #[test]
    fn test_census_row_from_table_ignores_extra_columns() {
        let value = json!({
            "id": 7,
            "created_at": "2025-03-09T10:00:00+00:00",
            "no_canario": 3,
            "lanzarote": null,
            "year": 2025,
            "month": 3,
            "day": 9
        });

        let record: CensusRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert_eq!(record.count(Island::NoCanario), Some(3));
        assert_eq!(record.count(Island::Lanzarote), None);
        assert_eq!(record.counts.len(), 1);
    }

    #[test]
    fn test_census_row_with_impossible_date_is_rejected() {
        let value = json!({"tenerife": 1, "year": 2025, "month": 2, "day": 30});
        let err = serde_json::from_value::<CensusRecord>(value).unwrap_err();
        assert!(err.to_string().contains("2025-2-30"));
    }

    #[test]
    fn test_rescue_record_omits_created_at_until_stored() {
        let rescue = RescueRecord::new(42, "Sara", "Lanzarote");
        assert_eq!(
            serde_json::to_value(&rescue).unwrap(),
            json!({"total_dogs": 42, "rescue_name": "Sara", "island": "Lanzarote"})
        );

        let stored: RescueRecord = serde_json::from_value(json!({
            "id": 1,
            "total_dogs": 42,
            "rescue_name": "Sara",
            "island": "Lanzarote",
            "created_at": "2025-03-09T10:15:00.123456+00:00"
        }))
        .unwrap();
        assert!(stored.created_at.is_some());
        assert_eq!(stored.to_string(), "Sara (Lanzarote): 42 dogs at 2025-03-09 10:15");
    }

    #[test]
    fn test_record_is_tagged_with_table() {
        let record = Record::Rescue(RescueRecord::new(5, "Teguise", "Lanzarote"));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["table"], "rescue");
        assert_eq!(value["total_dogs"], 5);
    }
}
