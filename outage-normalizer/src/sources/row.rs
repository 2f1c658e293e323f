use std::{collections::BTreeMap, fmt};

use serde::Deserialize;

/// Canonical row keys shared by every source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Date,
    Time,
    RestorationTime,
    OutageType,
    AreaAffected,
    UtilityName,
    Region,
    DemandLossMw,
    CustomersAffected,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::Date,
        Field::Time,
        Field::RestorationTime,
        Field::OutageType,
        Field::AreaAffected,
        Field::UtilityName,
        Field::Region,
        Field::DemandLossMw,
        Field::CustomersAffected,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::Time => "time",
            Field::RestorationTime => "restoration_time",
            Field::OutageType => "outage_type",
            Field::AreaAffected => "area_affected",
            Field::UtilityName => "utility_name",
            Field::Region => "region",
            Field::DemandLossMw => "demand_loss_mw",
            Field::CustomersAffected => "customers_affected",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Historical column label for each canonical field.
///
/// Labels are matched exactly (after trimming surrounding whitespace).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ColumnLabels {
    pub date: String,
    pub time: String,
    pub restoration_time: String,
    pub outage_type: String,
    pub area_affected: String,
    pub utility_name: String,
    pub region: String,
    pub demand_loss_mw: String,
    pub customers_affected: String,
}

impl Default for ColumnLabels {
    fn default() -> Self {
        Self {
            date: "Date".to_string(),
            time: "Time".to_string(),
            restoration_time: "Restoration Time".to_string(),
            outage_type: "Type of Disturbance".to_string(),
            area_affected: "Area".to_string(),
            utility_name: "Utility/Power Pool (NERC Council)".to_string(),
            region: "NERC Region".to_string(),
            demand_loss_mw: "Loss (megawatts)".to_string(),
            customers_affected: "Number of Customers Affected".to_string(),
        }
    }
}

impl ColumnLabels {
    pub fn label(&self, field: Field) -> &str {
        match field {
            Field::Date => &self.date,
            Field::Time => &self.time,
            Field::RestorationTime => &self.restoration_time,
            Field::OutageType => &self.outage_type,
            Field::AreaAffected => &self.area_affected,
            Field::UtilityName => &self.utility_name,
            Field::Region => &self.region,
            Field::DemandLossMw => &self.demand_loss_mw,
            Field::CustomersAffected => &self.customers_affected,
        }
    }

    pub fn field_for(&self, header: &str) -> Option<Field> {
        let header = header.trim();
        Field::ALL.into_iter().find(|f| self.label(*f) == header)
    }
}

/// One source row keyed by canonical field.
///
/// A field is absent when its column does not exist in the source; an empty
/// cell is present with an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRow {
    values: BTreeMap<Field, String>,
}

impl NormalizedRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a row from `(header, value)` pairs, ignoring unknown headers.
    pub fn from_labeled<'a, I>(labels: &ColumnLabels, cells: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let mut row = Self::new();
        for (header, value) in cells {
            if let Some(field) = labels.field_for(header) {
                row.values.entry(field).or_insert(value);
            }
        }
        row
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn has(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }
}

impl fmt::Display for NormalizedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (field, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}: {value:?}")?;
        }
        f.write_str("}")
    }
}
