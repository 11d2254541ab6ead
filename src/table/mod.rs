// src/table/mod.rs

pub mod merge;

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub use merge::merge;

/// Fixed tenors quoted on the par yield curve, shortest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Maturity {
    M1,
    M2,
    M3,
    M6,
    Y1,
    Y2,
    Y3,
    Y5,
    Y7,
    Y10,
    Y20,
    Y30,
}

impl Maturity {
    pub const COUNT: usize = 12;

    /// Every maturity in column order.
    pub const ALL: [Maturity; Maturity::COUNT] = [
        Maturity::M1,
        Maturity::M2,
        Maturity::M3,
        Maturity::M6,
        Maturity::Y1,
        Maturity::Y2,
        Maturity::Y3,
        Maturity::Y5,
        Maturity::Y7,
        Maturity::Y10,
        Maturity::Y20,
        Maturity::Y30,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Maturity::M1 => "1M",
            Maturity::M2 => "2M",
            Maturity::M3 => "3M",
            Maturity::M6 => "6M",
            Maturity::Y1 => "1Y",
            Maturity::Y2 => "2Y",
            Maturity::Y3 => "3Y",
            Maturity::Y5 => "5Y",
            Maturity::Y7 => "7Y",
            Maturity::Y10 => "10Y",
            Maturity::Y20 => "20Y",
            Maturity::Y30 => "30Y",
        }
    }

    /// Tenor length in years, used as the x coordinate when plotting.
    pub fn years(&self) -> f64 {
        match self {
            Maturity::M1 => 0.0833,
            Maturity::M2 => 0.1667,
            Maturity::M3 => 0.25,
            Maturity::M6 => 0.5,
            Maturity::Y1 => 1.0,
            Maturity::Y2 => 2.0,
            Maturity::Y3 => 3.0,
            Maturity::Y5 => 5.0,
            Maturity::Y7 => 7.0,
            Maturity::Y10 => 10.0,
            Maturity::Y20 => 20.0,
            Maturity::Y30 => 30.0,
        }
    }

    /// Column position of this maturity within a record.
    pub fn position(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Maturity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Round a yield to the two decimals the source publishes. Halves go to the
/// even neighbour, matching pandas `round(2)`.
pub fn round_yield(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// One trading day of par yields.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct YieldRecord {
    pub date: NaiveDate,
    pub yields: [Option<f64>; Maturity::COUNT],
}

impl YieldRecord {
    /// Build a record, rounding every present yield to two decimals.
    pub fn new(date: NaiveDate, yields: [Option<f64>; Maturity::COUNT]) -> Self {
        Self {
            date,
            yields: yields.map(|y| y.map(round_yield)),
        }
    }

    pub fn get(&self, maturity: Maturity) -> Option<f64> {
        self.yields[maturity.position()]
    }

    /// `2Y - 10Y`; positive means the curve is inverted.
    pub fn spread_2s10s(&self) -> Option<f64> {
        Some(self.get(Maturity::Y2)? - self.get(Maturity::Y10)?)
    }

    /// True when the 2-year yield exceeds the 10-year yield.
    /// A missing value on either side never counts as inverted.
    pub fn is_inverted(&self) -> bool {
        matches!(self.spread_2s10s(), Some(s) if s > 0.0)
    }

    /// `(maturity, yield)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (Maturity, Option<f64>)> + '_ {
        Maturity::ALL.iter().map(move |m| (*m, self.get(*m)))
    }

    pub fn max_yield(&self) -> Option<f64> {
        self.yields.iter().flatten().copied().reduce(f64::max)
    }
}

/// Date-keyed yield history; at most one record per date, always in date order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct YieldTable {
    rows: BTreeMap<NaiveDate, YieldRecord>,
}

impl YieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect records into a table. A later record for the same date replaces an earlier one.
    pub fn from_records(records: impl IntoIterator<Item = YieldRecord>) -> Self {
        let mut table = Self::new();
        for record in records {
            table.insert(record);
        }
        table
    }

    /// Insert `record`, returning whatever was previously stored for its date.
    pub fn insert(&mut self, record: YieldRecord) -> Option<YieldRecord> {
        self.rows.insert(record.date, record)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&YieldRecord> {
        self.rows.get(date)
    }

    /// Records in ascending date order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &YieldRecord> + ExactSizeIterator {
        self.rows.values()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.keys().next_back().copied()
    }

    /// Rows dated on or after `begin`.
    pub fn since(&self, begin: NaiveDate) -> YieldTable {
        Self {
            rows: self
                .rows
                .range(begin..)
                .map(|(d, r)| (*d, r.clone()))
                .collect(),
        }
    }

    /// Largest non-null yield anywhere in the table.
    pub fn max_yield(&self) -> Option<f64> {
        self.iter().filter_map(YieldRecord::max_yield).reduce(f64::max)
    }

    pub fn inverted_days(&self) -> usize {
        self.iter().filter(|r| r.is_inverted()).count()
    }
}

impl IntoIterator for YieldTable {
    type Item = YieldRecord;
    type IntoIter = std::collections::btree_map::IntoValues<NaiveDate, YieldRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_values()
    }
}

impl FromIterator<YieldRecord> for YieldTable {
    fn from_iter<T: IntoIterator<Item = YieldRecord>>(iter: T) -> Self {
        Self::from_records(iter)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Record with a flat curve at `level`, except the 2Y and 10Y slots.
    pub(crate) fn record(d: &str, level: f64, two: f64, ten: f64) -> YieldRecord {
        let mut yields = [Some(level); Maturity::COUNT];
        yields[Maturity::Y2.position()] = Some(two);
        yields[Maturity::Y10.position()] = Some(ten);
        YieldRecord::new(date(d), yields)
    }

    #[test]
    fn test_maturity_order_and_years() {
        let labels: Vec<_> = Maturity::ALL.iter().map(|m| m.label()).collect();
        assert_eq!(
            labels,
            vec!["1M", "2M", "3M", "6M", "1Y", "2Y", "3Y", "5Y", "7Y", "10Y", "20Y", "30Y"]
        );
        assert_eq!(Maturity::Y10.position(), 9);
        assert_eq!(Maturity::M1.years(), 0.0833);
    }

    #[test]
    fn test_record_rounds_to_two_decimals() {
        let mut yields = [None; Maturity::COUNT];
        yields[0] = Some(2.4049);
        yields[1] = Some(2.405001);
        let r = YieldRecord::new(date("2019-01-02"), yields);
        assert_eq!(r.get(Maturity::M1), Some(2.4));
        assert_eq!(r.get(Maturity::M2), Some(2.41));
        assert_eq!(r.get(Maturity::Y30), None);
    }

    #[test]
    fn test_rounding_halves_to_even() {
        assert_eq!(round_yield(2.125), 2.12);
        assert_eq!(round_yield(0.375), 0.38);
        assert_eq!(round_yield(-0.125), -0.12);
    }

    #[test]
    fn test_inversion() {
        assert!(record("2019-08-27", 2.0, 2.10, 1.95).is_inverted());
        assert!(!record("2019-01-02", 2.0, 1.50, 2.80).is_inverted());
        assert!(!record("2019-01-02", 2.0, 2.00, 2.00).is_inverted());

        let mut missing = record("2019-01-02", 2.0, 3.0, 1.0);
        missing.yields[Maturity::Y10.position()] = None;
        assert!(!missing.is_inverted());
        assert_eq!(missing.spread_2s10s(), None);
    }

    #[test]
    fn test_table_orders_and_dedupes_by_date() {
        let table = YieldTable::from_records(vec![
            record("2019-01-04", 1.0, 1.0, 1.0),
            record("2019-01-02", 2.0, 2.0, 2.0),
            record("2019-01-04", 3.0, 3.0, 3.0),
        ]);
        assert_eq!(table.len(), 2);
        let dates: Vec<_> = table.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![date("2019-01-02"), date("2019-01-04")]);
        assert_eq!(table.get(&date("2019-01-04")).unwrap().get(Maturity::M1), Some(3.0));
    }

    #[test]
    fn test_since_and_max_yield() {
        let table: YieldTable = vec![
            record("2015-05-29", 7.5, 1.0, 1.0),
            record("2015-06-01", 2.0, 2.5, 2.2),
            record("2015-06-02", 2.0, 2.1, 3.4),
        ]
        .into_iter()
        .collect();

        let recent = table.since(date("2015-06-01"));
        assert_eq!(recent.len(), 2);
        assert_eq!(recent.first_date(), Some(date("2015-06-01")));
        assert_eq!(recent.max_yield(), Some(3.4));
        assert_eq!(table.max_yield(), Some(7.5));
        assert_eq!(recent.inverted_days(), 1);
        assert_eq!(YieldTable::new().max_yield(), None);
    }
}
