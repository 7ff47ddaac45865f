use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

use crate::store::Document;

/// Only tours rated at least this well enter the difficulty report.
pub const STATS_MIN_AVERAGE: f64 = 4.5;

pub const TOP_CHEAP_LIMIT: &str = "5";
pub const TOP_CHEAP_SORT: &str = "-ratingsAverage,price";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    pub difficulty: String,
    pub num_tours: u64,
    pub num_ratings: u64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthPlan {
    pub month: u32,
    pub num_tour_starts: u64,
    pub tours: Vec<String>,
}

#[derive(Default)]
struct Totals {
    tours: u64,
    ratings: u64,
    rating_sum: f64,
    price_sum: f64,
    min_price: Option<f64>,
    max_price: Option<f64>,
}

fn number(document: &Document, field: &str) -> Option<f64> {
    document.get(field).and_then(Value::as_f64)
}

/// Groups tours by difficulty, cheapest average price first.
pub fn tour_stats(tours: &[Document]) -> Vec<DifficultyStats> {
    let mut groups: BTreeMap<String, Totals> = BTreeMap::new();
    for tour in tours {
        let difficulty = tour
            .get("difficulty")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let totals = groups.entry(difficulty).or_default();
        let price = number(tour, "price").unwrap_or(0.0);
        totals.tours += 1;
        totals.ratings += tour.get("ratingsQuantity").and_then(Value::as_u64).unwrap_or(0);
        totals.rating_sum += number(tour, "ratingsAverage").unwrap_or(0.0);
        totals.price_sum += price;
        totals.min_price = Some(totals.min_price.map_or(price, |m| m.min(price)));
        totals.max_price = Some(totals.max_price.map_or(price, |m| m.max(price)));
    }

    let mut stats: Vec<DifficultyStats> = groups
        .into_iter()
        .map(|(difficulty, t)| {
            let n = t.tours as f64;
            DifficultyStats {
                difficulty,
                num_tours: t.tours,
                num_ratings: t.ratings,
                avg_rating: t.rating_sum / n,
                avg_price: t.price_sum / n,
                min_price: t.min_price.unwrap_or_default(),
                max_price: t.max_price.unwrap_or_default(),
            }
        })
        .collect();
    stats.sort_by(|a, b| a.avg_price.total_cmp(&b.avg_price));
    stats
}

fn start_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}

/// Tour starts per month of `year`, quietest month first.
pub fn monthly_plan(tours: &[Document], year: i32) -> Vec<MonthPlan> {
    let mut months: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for tour in tours {
        let name = tour.get("name").and_then(Value::as_str).unwrap_or_default();
        let Some(Value::Array(starts)) = tour.get("startDates") else {
            continue;
        };
        for date in starts.iter().filter_map(start_date) {
            if date.year() == year {
                months.entry(date.month()).or_default().push(name.to_string());
            }
        }
    }

    let mut plan: Vec<MonthPlan> = months
        .into_iter()
        .map(|(month, tours)| MonthPlan {
            month,
            num_tour_starts: tours.len() as u64,
            tours,
        })
        .collect();
    // stable: months with equal counts stay in calendar order
    plan.sort_by_key(|p| p.num_tour_starts);
    plan
}
