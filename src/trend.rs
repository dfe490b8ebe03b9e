//! Historical trend queries.
//!
//! Readings are archived per station and day. [`TrendService`] answers the
//! 24-hour trend, same-window-last-year trend, day search and historical
//! window queries on top of any [`TimeSeriesStore`]; [`CsvStore`] is the
//! file-backed store.

use async_trait::async_trait;
use chrono::{Days, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::TrendError;

/// km/h → m/s.
pub const WIND_KMH_TO_MS: f64 = 0.277778;

/// Converted wind speeds above this (m/s) are sensor glitches and read as 0.
pub const WIND_CEILING_MS: f64 = 45.0;

pub fn kmh_to_ms(kmh: f64) -> f64 {
    kmh * WIND_KMH_TO_MS
}

fn capped_wind(kmh: f64) -> f64 {
    let ms = kmh_to_ms(kmh);
    if ms > WIND_CEILING_MS { 0.0 } else { ms }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// One archived observation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WxRow {
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub outdoor_humidity: Option<f64>,
    #[serde(default)]
    pub barometer: Option<f64>,
    #[serde(default)]
    pub rain_rate: Option<f64>,
    #[serde(default)]
    pub daily_rainfall: Option<f64>,
    #[serde(default)]
    pub average_windspeed: Option<f64>,
    #[serde(default)]
    pub gust_windspeed: Option<f64>,
    #[serde(default)]
    pub wind_direction: Option<f64>,
    #[serde(default)]
    pub max_gust_current_day: Option<f64>,
    #[serde(default)]
    pub max_average_windspeed_day: Option<f64>,
    #[serde(default, rename = "max_rain_rate_curent_day")]
    pub max_rain_rate_current_day: Option<f64>,
}

impl WxRow {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// Metric selectable in a trend query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendType {
    Temperature,
    Humidity,
    Barometer,
    Rain,
    DailyRainfall,
    CurrentWind,
    GustWind,
}

impl TrendType {
    /// Archive column backing this metric.
    pub fn column(&self) -> &'static str {
        match self {
            TrendType::Temperature => "temperature",
            TrendType::Humidity => "outdoor_humidity",
            TrendType::Barometer => "barometer",
            TrendType::Rain => "rain_rate",
            TrendType::DailyRainfall => "daily_rainfall",
            TrendType::CurrentWind => "average_windspeed",
            TrendType::GustWind => "gust_windspeed",
        }
    }

    pub fn is_wind(&self) -> bool {
        matches!(self, TrendType::CurrentWind | TrendType::GustWind)
    }

    /// Value of this metric in `row`, wind converted to m/s.
    pub fn value(&self, row: &WxRow) -> Option<f64> {
        let raw = match self {
            TrendType::Temperature => row.temperature,
            TrendType::Humidity => row.outdoor_humidity,
            TrendType::Barometer => row.barometer,
            TrendType::Rain => row.rain_rate,
            TrendType::DailyRainfall => row.daily_rainfall,
            TrendType::CurrentWind => row.average_windspeed,
            TrendType::GustWind => row.gust_windspeed,
        };
        if self.is_wind() {
            raw.map(kmh_to_ms)
        } else {
            raw
        }
    }
}

impl FromStr for TrendType {
    type Err = TrendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(TrendType::Temperature),
            "humidity" => Ok(TrendType::Humidity),
            "barometer" => Ok(TrendType::Barometer),
            "rain" => Ok(TrendType::Rain),
            "daily_rainfall" => Ok(TrendType::DailyRainfall),
            "currwind" => Ok(TrendType::CurrentWind),
            "gustwind" => Ok(TrendType::GustWind),
            other => Err(TrendError::UnknownType(other.to_string())),
        }
    }
}

#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Rows with `start <= timestamp <= end`, ordered by timestamp.
    async fn rows_between(
        &self,
        station: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<WxRow>, TrendError>;

    /// All rows recorded on `date`, ordered by timestamp.
    async fn rows_on(&self, station: &str, date: NaiveDate) -> Result<Vec<WxRow>, TrendError>;
}

/// Archive laid out as `<root>/station=<name>/date=YYYY-MM-DD.csv`.
#[derive(Debug, Clone)]
pub struct CsvStore {
    root: PathBuf,
}

impl CsvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn day_path(&self, station: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join(format!("station={station}"))
            .join(format!("date={}.csv", date.format("%Y-%m-%d")))
    }

    /// Reads every day file from `first` to `last` on the blocking pool.
    async fn read_days(
        &self,
        station: &str,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<WxRow>, TrendError> {
        let paths: Vec<PathBuf> = first
            .iter_days()
            .take_while(|day| *day <= last)
            .map(|day| self.day_path(station, day))
            .collect();
        tokio::task::spawn_blocking(move || read_files(&paths)).await?
    }
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<WxRow>, TrendError> {
    let mut rows = Vec::new();
    for path in paths {
        if !path.exists() {
            continue;
        }
        let day = read_rows(path)?;
        debug!(path = %path.display(), rows = day.len(), "Loaded history file");
        rows.extend(day);
    }
    rows.sort_by_key(WxRow::timestamp);
    Ok(rows)
}

fn read_rows(path: &Path) -> Result<Vec<WxRow>, TrendError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

#[async_trait]
impl TimeSeriesStore for CsvStore {
    async fn rows_between(
        &self,
        station: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<WxRow>, TrendError> {
        let mut rows = self.read_days(station, start.date(), end.date()).await?;
        rows.retain(|r| (start..=end).contains(&r.timestamp()));
        Ok(rows)
    }

    async fn rows_on(&self, station: &str, date: NaiveDate) -> Result<Vec<WxRow>, TrendError> {
        self.read_days(station, date, date).await
    }
}

/// One point of a trend series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub timestamp: String,
    pub value: Option<f64>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendData {
    pub station: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Vec<TrendPoint>,
}

/// Rows of one day plus daily extremes, wind in m/s, one decimal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub station: String,
    pub data: Vec<WxRow>,
    pub max_gust: String,
    pub daily_rainfall: String,
    pub max_average_windspeed: String,
    pub max_rain_rate: String,
}

/// Which windows a historical query covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct HistoryFilter {
    #[serde(default, rename = "last24hours")]
    pub last_24_hours: bool,
    #[serde(default, rename = "last30days")]
    pub last_30_days: bool,
    #[serde(default, rename = "last365days")]
    pub last_365_days: bool,
}

impl HistoryFilter {
    pub fn is_empty(&self) -> bool {
        !(self.last_24_hours || self.last_30_days || self.last_365_days)
    }
}

/// A raw archived row with metrics rounded and wind in m/s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub timestamp: String,
    pub temperature: Option<f64>,
    pub outdoor_humidity: Option<f64>,
    pub barometer: Option<f64>,
    pub rain_rate: Option<f64>,
    pub daily_rainfall: Option<f64>,
    pub average_windspeed: Option<f64>,
    pub gust_windspeed: Option<f64>,
    pub wind_direction: Option<f64>,
}

impl From<&WxRow> for HistoryRow {
    fn from(row: &WxRow) -> Self {
        Self {
            timestamp: row.timestamp().format("%Y-%m-%d %H:%M:%S").to_string(),
            temperature: row.temperature.map(round1),
            outdoor_humidity: row.outdoor_humidity.map(round1),
            barometer: row.barometer.map(round1),
            rain_rate: row.rain_rate.map(round1),
            daily_rainfall: row.daily_rainfall.map(round1),
            average_windspeed: row.average_windspeed.map(|v| round1(capped_wind(v))),
            gust_windspeed: row.gust_windspeed.map(|v| round1(capped_wind(v))),
            wind_direction: row.wind_direction,
        }
    }
}

/// One day of a long window: means for the slow metrics, maxima for rain
/// and gusts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub day: NaiveDate,
    pub temperature: Option<f64>,
    pub outdoor_humidity: Option<f64>,
    pub barometer: Option<f64>,
    pub daily_rainfall: Option<f64>,
    pub average_windspeed: Option<f64>,
    pub gust_windspeed: Option<f64>,
}

impl DailyRow {
    fn from_rows(day: NaiveDate, rows: &[WxRow]) -> Self {
        Self {
            day,
            temperature: mean_of(rows, |r| r.temperature).map(round1),
            outdoor_humidity: mean_of(rows, |r| r.outdoor_humidity).map(round1),
            barometer: mean_of(rows, |r| r.barometer).map(round1),
            daily_rainfall: max_of(rows, |r| r.daily_rainfall).map(round1),
            average_windspeed: mean_of(rows, |r| r.average_windspeed)
                .map(|v| round1(capped_wind(v))),
            gust_windspeed: max_of(rows, |r| r.gust_windspeed).map(|v| round1(capped_wind(v))),
        }
    }
}

/// Extremes over one window, one decimal. `maxDailyRainfall` is the sum of
/// each touched day's final daily total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    pub max_gust: String,
    pub max_average_windspeed: String,
    pub max_rain_rate: String,
    pub max_daily_rainfall: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoricalWindows {
    #[serde(rename = "last24hours", skip_serializing_if = "Option::is_none")]
    pub last_24_hours: Option<Vec<HistoryRow>>,
    #[serde(rename = "last24hoursSummary", skip_serializing_if = "Option::is_none")]
    pub last_24_hours_summary: Option<WindowSummary>,
    #[serde(rename = "last30days", skip_serializing_if = "Option::is_none")]
    pub last_30_days: Option<Vec<DailyRow>>,
    #[serde(rename = "last30daysSummary", skip_serializing_if = "Option::is_none")]
    pub last_30_days_summary: Option<WindowSummary>,
    #[serde(rename = "last365days", skip_serializing_if = "Option::is_none")]
    pub last_365_days: Option<Vec<DailyRow>>,
    #[serde(rename = "last365daysSummary", skip_serializing_if = "Option::is_none")]
    pub last_365_days_summary: Option<WindowSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalData {
    pub station: String,
    pub data: HistoricalWindows,
}

pub struct TrendService<S> {
    store: S,
    stations: BTreeSet<String>,
}

impl<S: TimeSeriesStore> TrendService<S> {
    pub fn new(store: S, stations: impl IntoIterator<Item = String>) -> Self {
        Self {
            store,
            stations: stations.into_iter().collect(),
        }
    }

    /// The last 24 hours of one metric.
    pub async fn trend_24h(
        &self,
        station: &str,
        kind: &str,
        now: NaiveDateTime,
    ) -> Result<TrendData, TrendError> {
        self.trend_window(station, kind, now - TimeDelta::hours(24), now)
            .await
    }

    /// The same 24-hour window, one year earlier.
    pub async fn trend_24h_last_year(
        &self,
        station: &str,
        kind: &str,
        now: NaiveDateTime,
    ) -> Result<TrendData, TrendError> {
        let end = now.checked_sub_months(Months::new(12)).unwrap_or(now);
        self.trend_window(station, kind, end - TimeDelta::hours(24), end)
            .await
    }

    pub async fn search_by_date(
        &self,
        station: &str,
        date: NaiveDate,
    ) -> Result<DaySummary, TrendError> {
        self.check_station(station)?;
        let rows = self.store.rows_on(station, date).await?;

        let max_gust = max_of(&rows, |r| r.max_gust_current_day).map(kmh_to_ms);
        let daily_rainfall = max_of(&rows, |r| r.daily_rainfall);
        let max_average_windspeed = max_of(&rows, |r| r.max_average_windspeed_day).map(kmh_to_ms);
        let max_rain_rate = max_of(&rows, |r| r.max_rain_rate_current_day);

        let data = rows
            .into_iter()
            .map(|mut row| {
                row.max_gust_current_day = row.max_gust_current_day.map(kmh_to_ms);
                row.max_average_windspeed_day = row.max_average_windspeed_day.map(kmh_to_ms);
                row
            })
            .collect();

        Ok(DaySummary {
            station: station.to_string(),
            data,
            max_gust: one_decimal(max_gust),
            daily_rainfall: one_decimal(daily_rainfall),
            max_average_windspeed: one_decimal(max_average_windspeed),
            max_rain_rate: one_decimal(max_rain_rate),
        })
    }

    /// Raw rows for the last 24 hours and per-day aggregates for the last
    /// 30 and 365 days, each with a window summary. At least one window
    /// must be requested.
    pub async fn historical(
        &self,
        station: &str,
        filter: HistoryFilter,
        now: NaiveDateTime,
    ) -> Result<HistoricalData, TrendError> {
        self.check_station(station)?;
        if filter.is_empty() {
            return Err(TrendError::NoFilter);
        }

        let mut data = HistoricalWindows::default();
        if filter.last_24_hours {
            let (rows, summary) = self.window(station, now - TimeDelta::hours(24), now).await?;
            data.last_24_hours = Some(rows.iter().map(HistoryRow::from).collect());
            data.last_24_hours_summary = Some(summary);
        }
        if filter.last_30_days {
            let start = now.checked_sub_days(Days::new(30)).unwrap_or(now);
            let (rows, summary) = self.window(station, start, now).await?;
            data.last_30_days = Some(daily_rows(&rows));
            data.last_30_days_summary = Some(summary);
        }
        if filter.last_365_days {
            let start = now.checked_sub_months(Months::new(12)).unwrap_or(now);
            let (rows, summary) = self.window(station, start, now).await?;
            data.last_365_days = Some(daily_rows(&rows));
            data.last_365_days_summary = Some(summary);
        }

        Ok(HistoricalData {
            station: station.to_string(),
            data,
        })
    }

    /// Rows in `[start, end]` and their summary. Rainfall totals count
    /// whole calendar days, so the first day is read from midnight.
    async fn window(
        &self,
        station: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<(Vec<WxRow>, WindowSummary), TrendError> {
        let day_start = start.date().and_time(NaiveTime::MIN);
        let day_end = end.date().and_hms_opt(23, 59, 59).unwrap_or(end);
        let mut rows = self.store.rows_between(station, day_start, day_end).await?;
        let rainfall = rainfall_total(&rows);
        rows.retain(|r| (start..=end).contains(&r.timestamp()));

        let summary = WindowSummary {
            max_gust: one_decimal(max_of(&rows, |r| r.gust_windspeed).map(kmh_to_ms)),
            max_average_windspeed: one_decimal(
                max_of(&rows, |r| r.average_windspeed).map(kmh_to_ms),
            ),
            max_rain_rate: one_decimal(max_of(&rows, |r| r.rain_rate)),
            max_daily_rainfall: one_decimal(Some(rainfall)),
        };
        Ok((rows, summary))
    }

    async fn trend_window(
        &self,
        station: &str,
        kind: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TrendData, TrendError> {
        self.check_station(station)?;
        let trend: TrendType = kind.parse()?;
        let rows = self.store.rows_between(station, start, end).await?;

        let data = rows
            .iter()
            .map(|row| TrendPoint {
                timestamp: row.timestamp().format("%Y-%m-%d %H:%M:%S").to_string(),
                value: trend.value(row),
                date: row.date,
            })
            .collect();

        Ok(TrendData {
            station: station.to_string(),
            kind: kind.to_string(),
            data,
        })
    }

    fn check_station(&self, station: &str) -> Result<(), TrendError> {
        if self.stations.contains(station) {
            Ok(())
        } else {
            Err(TrendError::UnknownStation(station.to_string()))
        }
    }
}

fn max_of<F>(rows: &[WxRow], field: F) -> Option<f64>
where
    F: Fn(&WxRow) -> Option<f64>,
{
    rows.iter().filter_map(field).reduce(f64::max)
}

fn mean_of<F>(rows: &[WxRow], field: F) -> Option<f64>
where
    F: Fn(&WxRow) -> Option<f64>,
{
    let values: Vec<f64> = rows.iter().filter_map(field).collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn by_day(rows: &[WxRow]) -> BTreeMap<NaiveDate, Vec<WxRow>> {
    let mut days: BTreeMap<NaiveDate, Vec<WxRow>> = BTreeMap::new();
    for row in rows {
        days.entry(row.date).or_default().push(row.clone());
    }
    days
}

fn daily_rows(rows: &[WxRow]) -> Vec<DailyRow> {
    by_day(rows)
        .iter()
        .map(|(day, rows)| DailyRow::from_rows(*day, rows))
        .collect()
}

/// Sum over days of each day's highest running rainfall total.
fn rainfall_total(rows: &[WxRow]) -> f64 {
    by_day(rows)
        .values()
        .filter_map(|rows| max_of(rows, |r| r.daily_rainfall))
        .sum()
}

fn one_decimal(value: Option<f64>) -> String {
    format!("{:.1}", value.unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, time: &str, temperature: f64, gust_kmh: f64) -> WxRow {
        WxRow {
            date: date.parse().unwrap(),
            time: time.parse().unwrap(),
            temperature: Some(temperature),
            outdoor_humidity: None,
            barometer: None,
            rain_rate: None,
            daily_rainfall: Some(1.24),
            average_windspeed: None,
            gust_windspeed: Some(gust_kmh),
            wind_direction: None,
            max_gust_current_day: Some(gust_kmh),
            max_average_windspeed_day: None,
            max_rain_rate_current_day: None,
        }
    }

    struct MemoryStore(Vec<WxRow>);

    #[async_trait]
    impl TimeSeriesStore for MemoryStore {
        async fn rows_between(
            &self,
            _station: &str,
            start: NaiveDateTime,
            end: NaiveDateTime,
        ) -> Result<Vec<WxRow>, TrendError> {
            Ok(self
                .0
                .iter()
                .filter(|r| (start..=end).contains(&r.timestamp()))
                .cloned()
                .collect())
        }

        async fn rows_on(&self, _station: &str, date: NaiveDate) -> Result<Vec<WxRow>, TrendError> {
            Ok(self.0.iter().filter(|r| r.date == date).cloned().collect())
        }
    }

    fn service(rows: Vec<WxRow>) -> TrendService<MemoryStore> {
        TrendService::new(MemoryStore(rows), vec!["Skodje".to_string()])
    }

    fn now() -> NaiveDateTime {
        "2024-06-10T12:00:00".parse().unwrap()
    }

    #[test]
    fn test_trend_type_columns() {
        assert_eq!("humidity".parse::<TrendType>().unwrap().column(), "outdoor_humidity");
        assert_eq!("rain".parse::<TrendType>().unwrap().column(), "rain_rate");
        assert_eq!("currwind".parse::<TrendType>().unwrap().column(), "average_windspeed");
        assert!(matches!(
            "snowfall".parse::<TrendType>(),
            Err(TrendError::UnknownType(_))
        ));
    }

    #[tokio::test]
    async fn test_trend_24h_window() {
        let svc = service(vec![
            row("2024-06-09", "11:00:00", 1.0, 10.0),
            row("2024-06-09", "13:00:00", 2.0, 10.0),
            row("2024-06-10", "11:30:00", 3.0, 10.0),
        ]);
        let trend = svc.trend_24h("Skodje", "temperature", now()).await.unwrap();
        let values: Vec<_> = trend.data.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![Some(2.0), Some(3.0)]);
        assert_eq!(trend.data[0].timestamp, "2024-06-09 13:00:00");
    }

    #[tokio::test]
    async fn test_wind_trend_is_converted() {
        let svc = service(vec![row("2024-06-10", "10:00:00", 1.0, 36.0)]);
        let trend = svc.trend_24h("Skodje", "gustwind", now()).await.unwrap();
        let value = trend.data[0].value.unwrap();
        assert!((value - 36.0 * WIND_KMH_TO_MS).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_last_year_window() {
        let svc = service(vec![
            row("2023-06-10", "10:00:00", 7.0, 0.0),
            row("2024-06-10", "10:00:00", 9.0, 0.0),
        ]);
        let trend = svc
            .trend_24h_last_year("Skodje", "temperature", now())
            .await
            .unwrap();
        assert_eq!(trend.data.len(), 1);
        assert_eq!(trend.data[0].value, Some(7.0));
    }

    #[tokio::test]
    async fn test_unknown_station_and_type() {
        let svc = service(Vec::new());
        let err = svc.trend_24h("Atlantis", "temperature", now()).await.unwrap_err();
        assert!(matches!(err, TrendError::UnknownStation(_)));
        assert!(err.is_client_error());

        let err = svc.trend_24h("Skodje", "snowfall", now()).await.unwrap_err();
        assert!(matches!(err, TrendError::UnknownType(_)));
    }

    #[tokio::test]
    async fn test_search_by_date_summary() {
        let svc = service(vec![
            row("2024-06-10", "10:00:00", 1.0, 36.0),
            row("2024-06-10", "23:00:00", 2.0, 72.0),
        ]);
        let day = svc
            .search_by_date("Skodje", "2024-06-10".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(day.data.len(), 2);
        assert_eq!(day.max_gust, "20.0");
        assert_eq!(day.daily_rainfall, "1.2");
        assert_eq!(day.max_average_windspeed, "0.0");
    }

    #[tokio::test]
    async fn test_search_by_date_empty_day() {
        let svc = service(Vec::new());
        let day = svc
            .search_by_date("Skodje", "2024-06-10".parse().unwrap())
            .await
            .unwrap();
        assert!(day.data.is_empty());
        assert_eq!(day.max_gust, "0.0");
    }

    #[tokio::test]
    async fn test_search_by_date_reports_max_rain_rate() {
        let mut first = row("2024-06-10", "10:00:00", 1.0, 0.0);
        first.max_rain_rate_current_day = Some(0.8);
        let mut second = row("2024-06-10", "11:00:00", 1.0, 0.0);
        second.max_rain_rate_current_day = Some(2.3);
        let svc = service(vec![first, second]);

        let day = svc
            .search_by_date("Skodje", "2024-06-10".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(day.max_rain_rate, "2.3");
    }

    #[tokio::test]
    async fn test_historical_requires_a_window() {
        let svc = service(Vec::new());
        let err = svc
            .historical("Skodje", HistoryFilter::default(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, TrendError::NoFilter));
        assert!(err.is_client_error());

        let err = svc
            .historical(
                "Atlantis",
                HistoryFilter {
                    last_24_hours: true,
                    ..Default::default()
                },
                now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrendError::UnknownStation(_)));
    }

    #[tokio::test]
    async fn test_historical_last_24_hours() {
        let mut early = row("2024-06-09", "08:00:00", 1.0, 0.0);
        early.daily_rainfall = Some(3.0);
        let mut evening = row("2024-06-09", "18:00:00", 2.04, 36.0);
        evening.daily_rainfall = Some(4.0);
        evening.rain_rate = Some(1.5);
        evening.average_windspeed = Some(18.0);
        let mut morning = row("2024-06-10", "09:00:00", 3.0, 180.0);
        morning.daily_rainfall = Some(0.5);
        morning.rain_rate = Some(0.2);
        let svc = service(vec![early, evening, morning]);

        let filter = HistoryFilter {
            last_24_hours: true,
            ..Default::default()
        };
        let result = svc.historical("Skodje", filter, now()).await.unwrap();

        let rows = result.data.last_24_hours.as_ref().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, "2024-06-09 18:00:00");
        assert_eq!(rows[0].temperature, Some(2.0));
        assert_eq!(rows[0].gust_windspeed, Some(10.0));
        assert_eq!(rows[1].gust_windspeed, Some(0.0));

        let summary = result.data.last_24_hours_summary.as_ref().unwrap();
        assert_eq!(summary.max_gust, "50.0");
        assert_eq!(summary.max_average_windspeed, "5.0");
        assert_eq!(summary.max_rain_rate, "1.5");
        assert_eq!(summary.max_daily_rainfall, "4.5");

        let encoded = serde_json::to_value(&result).unwrap();
        assert!(encoded["data"].get("last24hoursSummary").is_some());
        assert!(encoded["data"].get("last30days").is_none());
    }

    #[tokio::test]
    async fn test_historical_last_30_days_aggregates_per_day() {
        let svc = service(vec![
            row("2024-05-01", "10:00:00", 20.0, 10.0),
            row("2024-06-01", "10:00:00", 10.0, 36.0),
            row("2024-06-01", "14:00:00", 13.0, 72.0),
            row("2024-06-05", "12:00:00", 4.0, 18.0),
        ]);
        let filter = HistoryFilter {
            last_30_days: true,
            ..Default::default()
        };
        let result = svc.historical("Skodje", filter, now()).await.unwrap();

        let days = result.data.last_30_days.as_ref().unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].day, "2024-06-01".parse::<NaiveDate>().unwrap());
        assert_eq!(days[0].temperature, Some(11.5));
        assert_eq!(days[0].gust_windspeed, Some(20.0));
        assert_eq!(days[1].temperature, Some(4.0));

        let summary = result.data.last_30_days_summary.as_ref().unwrap();
        assert_eq!(summary.max_gust, "20.0");
        assert_eq!(summary.max_daily_rainfall, "2.5");
        assert!(result.data.last_24_hours.is_none());
    }

    #[test]
    fn test_filter_wire_names() {
        let filter: HistoryFilter =
            serde_json::from_str(r#"{"last24hours":true,"last365days":true}"#).unwrap();
        assert!(filter.last_24_hours && filter.last_365_days && !filter.last_30_days);
        assert!(serde_json::from_str::<HistoryFilter>("{}").unwrap().is_empty());
    }
}
