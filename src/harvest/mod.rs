// src/harvest/mod.rs

use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::config::HarvestConfig;
use crate::extract::{extract_page, ExtractError, FieldNames};
use crate::fetch::{FetchError, PageSource};
use crate::table::{YieldRecord, YieldTable};

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("page {index} is unusable: {source}")]
    Fatal {
        index: u64,
        #[source]
        source: PageError,
    },
}

/// A page failure that must abort the harvest rather than end it.
#[derive(Error, Debug)]
pub enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// What probing one page index produced.
#[derive(Debug)]
pub enum PageOutcome {
    Record(YieldRecord),
    /// Nothing more to read at or past this index.
    EndOfData(String),
    Retryable(FetchError),
    Fatal(PageError),
}

impl PageOutcome {
    pub fn classify(result: Result<String, FetchError>, fields: &FieldNames) -> Self {
        let text = match result {
            Ok(text) => text,
            Err(e) if e.is_retryable() => return PageOutcome::Retryable(e),
            Err(e) if e.is_fatal() => return PageOutcome::Fatal(e.into()),
            Err(e) => return PageOutcome::EndOfData(e.to_string()),
        };
        match extract_page(&text, fields) {
            Ok(record) => PageOutcome::Record(record),
            Err(e) if e.is_fatal() => PageOutcome::Fatal(e.into()),
            Err(e) => PageOutcome::EndOfData(e.to_string()),
        }
    }
}

/// Why a harvest stopped short of fatal failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    RangeExhausted,
    EndOfData { index: u64, reason: String },
    RetriesExhausted { index: u64, reason: String },
}

#[derive(Debug)]
pub struct HarvestReport {
    pub table: YieldTable,
    /// Last index that produced a record.
    pub last_index: Option<u64>,
    pub stop: StopReason,
}

/// Walks page indices in order, one request at a time.
pub struct Harvester<S> {
    source: S,
    fields: FieldNames,
    max_retries: u32,
    retry_backoff: Duration,
}

impl<S: PageSource> Harvester<S> {
    pub fn new(source: S, fields: FieldNames, config: &HarvestConfig) -> Self {
        Self {
            source,
            fields,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch and classify a single index, without retries.
    pub async fn probe(&self, index: u64) -> PageOutcome {
        PageOutcome::classify(self.source.fetch_page(index).await, &self.fields)
    }

    /// Probe with bounded exponential backoff on transient errors.
    async fn probe_with_retry(&self, index: u64) -> PageOutcome {
        let mut attempts = 0;
        loop {
            match self.probe(index).await {
                PageOutcome::Retryable(e) if attempts < self.max_retries => {
                    attempts += 1;
                    let delay = self.retry_backoff * 2u32.saturating_pow(attempts - 1);
                    warn!(index, attempt = attempts, delay_ms = delay.as_millis() as u64, error = %e, "Retrying");
                    sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }

    /// Collect every trading day from `start_index` through `end_index`,
    /// stopping at the first page that has no record.
    pub async fn harvest(&self, start_index: u64, end_index: u64) -> Result<YieldTable, HarvestError> {
        Ok(self.harvest_report(start_index, end_index).await?.table)
    }

    #[instrument(level = "info", skip(self))]
    pub async fn harvest_report(
        &self,
        start_index: u64,
        end_index: u64,
    ) -> Result<HarvestReport, HarvestError> {
        let mut records = Vec::new();
        let mut last_index = None;
        let mut stop = StopReason::RangeExhausted;

        for index in start_index..=end_index {
            match self.probe_with_retry(index).await {
                PageOutcome::Record(record) => {
                    debug!(index, date = %record.date, "harvested");
                    records.push(record);
                    last_index = Some(index);
                }
                PageOutcome::EndOfData(reason) => {
                    info!(index, %reason, "end of available data");
                    stop = StopReason::EndOfData { index, reason };
                    break;
                }
                PageOutcome::Retryable(e) => {
                    error!(index, error = %e, "Exhausted retries; keeping pages gathered so far");
                    stop = StopReason::RetriesExhausted {
                        index,
                        reason: e.to_string(),
                    };
                    break;
                }
                PageOutcome::Fatal(source) => {
                    error!(index, error = %source, "aborting harvest");
                    return Err(HarvestError::Fatal { index, source });
                }
            }
        }

        let table = YieldTable::from_records(records);
        info!(
            records = table.len(),
            first = ?table.first_date(),
            last = ?table.last_date(),
            "harvest finished"
        );
        Ok(HarvestReport {
            table,
            last_index,
            stop,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::extract::tests::entry_xml;
    use crate::fetch::TreasuryClient;
    use crate::table::Maturity;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub(crate) enum Page {
        Ok(String),
        Transient,
        Missing,
    }

    /// Scripted pages; each index serves its queue front to back and repeats the last entry.
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        pages: Mutex<HashMap<u64, Vec<Page>>>,
        pub(crate) calls: Mutex<Vec<u64>>,
    }

    impl ScriptedSource {
        pub(crate) fn with(mut self, index: u64, pages: Vec<Page>) -> Self {
            self.pages.get_mut().unwrap().insert(index, pages);
            self
        }

        pub(crate) fn day(self, index: u64, date: &str) -> Self {
            self.with(index, vec![Page::Ok(entry_xml(date, &[]))])
        }

        fn next(&self, index: u64) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push(index);
            let mut pages = self.pages.lock().unwrap();
            let queue = match pages.get_mut(&index) {
                Some(q) if !q.is_empty() => q,
                _ => return Err(FetchError::NotFound { index, status: 404 }),
            };
            let page = if queue.len() > 1 { queue.remove(0) } else { clone_page(&queue[0]) };
            match page {
                Page::Ok(text) => Ok(text),
                Page::Transient => Err(FetchError::Transient {
                    index,
                    message: "connection reset".into(),
                }),
                Page::Missing => Err(FetchError::NotFound { index, status: 404 }),
            }
        }
    }

    fn clone_page(page: &Page) -> Page {
        match page {
            Page::Ok(t) => Page::Ok(t.clone()),
            Page::Transient => Page::Transient,
            Page::Missing => Page::Missing,
        }
    }

    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, index: u64) -> Result<String, FetchError> {
            self.next(index)
        }
    }

    fn harvester(source: ScriptedSource) -> Harvester<ScriptedSource> {
        let config = HarvestConfig {
            max_retries: 2,
            retry_backoff_ms: 0,
            ..HarvestConfig::default()
        };
        Harvester::new(source, FieldNames::default(), &config)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_stops_at_transport_failure() {
        let source = ScriptedSource::default()
            .day(1, "2019-01-02")
            .day(2, "2019-01-03")
            .day(3, "2019-01-04")
            .day(4, "2019-01-07")
            .with(5, vec![Page::Transient])
            .day(6, "2019-01-09");
        let h = harvester(source);

        let report = h.harvest_report(1, 10).await.unwrap();
        assert_eq!(report.table.len(), 4);
        assert_eq!(report.last_index, Some(4));
        assert!(matches!(report.stop, StopReason::RetriesExhausted { index: 5, .. }));
        let dates: Vec<_> = report.table.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![
                date("2019-01-02"),
                date("2019-01-03"),
                date("2019-01-04"),
                date("2019-01-07")
            ]
        );
        // one try plus two retries at index 5, nothing past it
        let calls = h.source().calls.lock().unwrap().clone();
        assert_eq!(calls, vec![1, 2, 3, 4, 5, 5, 5]);
    }

    #[tokio::test]
    async fn test_retry_then_continue() {
        let source = ScriptedSource::default()
            .day(1, "2019-01-02")
            .with(
                2,
                vec![Page::Transient, Page::Ok(entry_xml("2019-01-03", &[]))],
            )
            .day(3, "2019-01-04");
        let report = harvester(source).harvest_report(1, 3).await.unwrap();
        assert_eq!(report.table.len(), 3);
        assert_eq!(report.stop, StopReason::RangeExhausted);
    }

    #[tokio::test]
    async fn test_missing_page_is_end_of_data() {
        let source = ScriptedSource::default()
            .day(7, "2019-01-02")
            .with(8, vec![Page::Missing])
            .day(9, "2019-01-04");
        let h = harvester(source);
        let report = h.harvest_report(7, 100).await.unwrap();
        assert_eq!(report.table.len(), 1);
        assert!(matches!(report.stop, StopReason::EndOfData { index: 8, .. }));
        assert_eq!(*h.source().calls.lock().unwrap(), vec![7, 8]);
    }

    #[tokio::test]
    async fn test_range_bound_is_inclusive() {
        let source = ScriptedSource::default()
            .day(1, "2019-01-02")
            .day(2, "2019-01-03")
            .day(3, "2019-01-04");
        let table = harvester(source).harvest(1, 2).await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.last_date(), Some(date("2019-01-03")));
    }

    #[tokio::test]
    async fn test_output_sorted_regardless_of_fetch_order() {
        let source = ScriptedSource::default()
            .day(1, "2019-01-04")
            .day(2, "2019-01-02")
            .day(3, "2019-01-03");
        let table = harvester(source).harvest(1, 3).await.unwrap();
        let dates: Vec<_> = table.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![date("2019-01-02"), date("2019-01-03"), date("2019-01-04")]
        );
    }

    #[tokio::test]
    async fn test_non_numeric_yield_aborts() {
        let bad = entry_xml(
            "2019-01-03",
            &[("BC_2YEAR", Some("<d:BC_2YEAR>n/a</d:BC_2YEAR>"))],
        );
        let source = ScriptedSource::default()
            .day(1, "2019-01-02")
            .with(2, vec![Page::Ok(bad)]);
        let err = harvester(source).harvest(1, 5).await.unwrap_err();
        match err {
            HarvestError::Fatal { index, source } => {
                assert_eq!(index, 2);
                assert!(matches!(
                    source,
                    PageError::Extract(ExtractError::Coercion { maturity: Maturity::Y2, .. })
                ));
            }
        }
    }

    #[tokio::test]
    async fn test_unparseable_url_aborts() {
        let config = SourceConfig {
            url_template: "htp//x({index})".into(),
            ..SourceConfig::default()
        };
        let client = TreasuryClient::new(&config).unwrap();
        let h = Harvester::new(client, FieldNames::default(), &HarvestConfig::default());

        assert!(matches!(h.probe(3).await, PageOutcome::Fatal(PageError::Fetch(FetchError::Url(_)))));
        let err = h.harvest(3, 10).await.unwrap_err();
        assert!(matches!(err, HarvestError::Fatal { index: 3, .. }), "{err}");
    }

    #[tokio::test]
    async fn test_start_past_end_probes_nothing() {
        let h = harvester(ScriptedSource::default().day(1, "2019-01-02"));
        let report = h.harvest_report(5, 4).await.unwrap();
        assert!(report.table.is_empty());
        assert!(h.source().calls.lock().unwrap().is_empty());
    }
}
