//! Read-only reporting queries over the star schema.
//!
//! [`Reports`] wraps a store handle and serves the aggregates the dashboard
//! renders. Every query first checks the build-status marker and refuses to
//! answer unless the latest rebuild succeeded.

use duckdb::Row;
use snafu::prelude::*;
use std::path::Path;
use tracing::debug;

use crate::error::{
    IncompleteBuildSnafu, MissingColumnSnafu, NoBuildSnafu, QueryError, QueryStoreSnafu, SqlSnafu,
};
use crate::store::{BuildStatus, Warehouse};

const FACT_TABLE: &str = "fact_listing";
const LOCATION_TABLE: &str = "dim_location";

/// Headline numbers over all listings.
#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub total_listings: u64,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeighbourhoodPrice {
    pub neighbourhood: String,
    pub listings: u64,
    pub avg_price: Option<f64>,
}

/// Listings bucketed by coordinates rounded to three decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct Hotspot {
    pub lat_bucket: Option<f64>,
    pub lon_bucket: Option<f64>,
    pub listings: u64,
    pub avg_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomTypePrice {
    pub room_type: Option<String>,
    pub listings: u64,
    pub avg_price: Option<f64>,
}

/// One equal-width price bucket. The last bucket includes its upper bound.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Query interface over a built warehouse.
#[derive(Debug)]
pub struct Reports {
    store: Warehouse,
}

impl Reports {
    /// Open the store file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueryError> {
        let store = Warehouse::open_read_only(path).context(QueryStoreSnafu)?;
        Self::new(store)
    }

    /// Serve queries from an already open store.
    pub fn new(store: Warehouse) -> Result<Self, QueryError> {
        ensure_built(&store)?;
        Ok(Self { store })
    }

    pub fn store(&self) -> &Warehouse {
        &self.store
    }

    pub fn overview(&self) -> Result<Overview, QueryError> {
        self.prepare(&[(FACT_TABLE, "price")])?;
        self.store
            .connection()
            .query_row(
                "SELECT count(*), avg(price), min(price), max(price) FROM fact_listing",
                [],
                |row| {
                    Ok(Overview {
                        total_listings: count(row, 0)?,
                        avg_price: row.get(1)?,
                        min_price: row.get(2)?,
                        max_price: row.get(3)?,
                    })
                },
            )
            .context(SqlSnafu)
    }

    /// Neighbourhoods by average price, highest first. Listings without a
    /// usable name (missing or `none`) are left out.
    pub fn top_neighbourhoods(&self, limit: usize) -> Result<Vec<NeighbourhoodPrice>, QueryError> {
        self.prepare(&[
            (FACT_TABLE, "price"),
            (FACT_TABLE, "location_id"),
            (LOCATION_TABLE, "neighbourhood"),
        ])?;
        let sql = format!(
            "SELECT d.neighbourhood, count(*) AS listings, avg(f.price) AS avg_price
             FROM fact_listing AS f
             JOIN dim_location AS d ON f.location_id = d.location_id
             WHERE d.neighbourhood IS NOT NULL AND d.neighbourhood <> 'none'
             GROUP BY d.neighbourhood
             ORDER BY avg_price DESC NULLS LAST, d.neighbourhood
             LIMIT {limit}"
        );
        self.collect(&sql, |row| {
            Ok(NeighbourhoodPrice {
                neighbourhood: row.get(0)?,
                listings: count(row, 1)?,
                avg_price: row.get(2)?,
            })
        })
    }

    /// Coordinate buckets by average price, highest first.
    pub fn price_hotspots(&self, limit: usize) -> Result<Vec<Hotspot>, QueryError> {
        self.prepare(&[
            (FACT_TABLE, "price"),
            (FACT_TABLE, "latitude"),
            (FACT_TABLE, "longitude"),
        ])?;
        let sql = format!(
            "SELECT round(latitude, 3) AS lat_bucket,
                    round(longitude, 3) AS lon_bucket,
                    count(*) AS listings,
                    avg(price) AS avg_price
             FROM fact_listing
             GROUP BY lat_bucket, lon_bucket
             ORDER BY avg_price DESC NULLS LAST, lat_bucket, lon_bucket
             LIMIT {limit}"
        );
        self.collect(&sql, |row| {
            Ok(Hotspot {
                lat_bucket: row.get(0)?,
                lon_bucket: row.get(1)?,
                listings: count(row, 2)?,
                avg_price: row.get(3)?,
            })
        })
    }

    /// Average price per room type, highest first.
    pub fn room_types(&self) -> Result<Vec<RoomTypePrice>, QueryError> {
        self.prepare(&[(FACT_TABLE, "price"), (FACT_TABLE, "room_type")])?;
        self.collect(
            "SELECT room_type, count(*) AS listings, avg(price) AS avg_price
             FROM fact_listing
             GROUP BY room_type
             ORDER BY avg_price DESC NULLS LAST, room_type",
            |row| {
                Ok(RoomTypePrice {
                    room_type: row.get(0)?,
                    listings: count(row, 1)?,
                    avg_price: row.get(2)?,
                })
            },
        )
    }

    /// Distribution of non-null prices over `bins` equal-width buckets.
    ///
    /// Empty buckets are included. When every price is the same there is
    /// a single bucket.
    pub fn price_histogram(&self, bins: usize) -> Result<Vec<HistogramBin>, QueryError> {
        self.prepare(&[(FACT_TABLE, "price")])?;

        let (min, max, total): (Option<f64>, Option<f64>, i64) = self
            .store
            .connection()
            .query_row(
                "SELECT min(price), max(price), count(price) FROM fact_listing",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .context(SqlSnafu)?;
        let (Some(min), Some(max)) = (min, max) else {
            return Ok(Vec::new());
        };
        if bins == 0 {
            return Ok(Vec::new());
        }
        if max <= min {
            return Ok(vec![HistogramBin {
                lower: min,
                upper: max,
                count: total.max(0) as u64,
            }]);
        }

        let width = (max - min) / bins as f64;
        let last = bins - 1;
        let sql = format!(
            "SELECT least(CAST(floor((price - ({min})) / ({width})) AS BIGINT), {last}) AS bucket,
                    count(*)
             FROM fact_listing
             WHERE price IS NOT NULL
             GROUP BY bucket"
        );
        let filled: Vec<(i64, u64)> =
            self.collect(&sql, |row| Ok((row.get::<_, i64>(0)?, count(row, 1)?)))?;

        let mut histogram: Vec<HistogramBin> = (0..bins)
            .map(|i| HistogramBin {
                lower: min + width * i as f64,
                upper: if i == last {
                    max
                } else {
                    min + width * (i + 1) as f64
                },
                count: 0,
            })
            .collect();
        for (bucket, n) in filled {
            let index = (bucket.max(0) as usize).min(last);
            histogram[index].count += n;
        }
        Ok(histogram)
    }

    /// Check the build marker and that every `(table, column)` exists.
    fn prepare(&self, columns: &[(&str, &str)]) -> Result<(), QueryError> {
        ensure_built(&self.store)?;
        for (table, column) in columns {
            let present = self
                .store
                .table_columns(table)
                .context(QueryStoreSnafu)?;
            ensure!(
                present.iter().any(|c| c == column),
                MissingColumnSnafu {
                    table: *table,
                    column: *column
                }
            );
        }
        Ok(())
    }

    fn collect<T, F>(&self, sql: &str, map: F) -> Result<Vec<T>, QueryError>
    where
        F: FnMut(&Row<'_>) -> duckdb::Result<T>,
    {
        debug!("Running report query:\n{}", sql);
        let mut stmt = self.store.connection().prepare(sql).context(SqlSnafu)?;
        let rows = stmt
            .query_map([], map)
            .context(SqlSnafu)?
            .collect::<Result<Vec<_>, _>>()
            .context(SqlSnafu)?;
        Ok(rows)
    }
}

fn ensure_built(store: &Warehouse) -> Result<(), QueryError> {
    let record = store
        .latest_build()
        .context(QueryStoreSnafu)?
        .context(NoBuildSnafu)?;
    ensure!(
        record.status == BuildStatus::Succeeded,
        IncompleteBuildSnafu {
            run_id: record.run_id,
            status: record.status.to_string()
        }
    );
    Ok(())
}

fn count(row: &Row<'_>, index: usize) -> duckdb::Result<u64> {
    row.get::<_, i64>(index).map(|n| n.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built_store(fact: &str) -> Warehouse {
        let store = Warehouse::in_memory().unwrap();
        store.begin_build("run-1").unwrap();
        store
            .connection()
            .execute_batch(&format!(
                "CREATE TABLE dim_location AS
                 SELECT * FROM (VALUES (1, 'downtown'), (2, 'none'), (3, NULL))
                     AS t(location_id, neighbourhood);
                 CREATE TABLE fact_listing AS {fact};"
            ))
            .unwrap();
        store.finish_build("run-1").unwrap();
        store
    }

    fn listings() -> Warehouse {
        built_store(
            "SELECT id, price::DOUBLE AS price, room_type,
                    latitude::DOUBLE AS latitude, longitude::DOUBLE AS longitude, location_id
             FROM (VALUES
                 (1, 100.0, 'Private room', 40.0001, -73.0, 1),
                 (2, 200.0, 'Private room', 40.0002, -73.0, 1),
                 (3, 50.0, 'Shared room', 41.0, -74.0, 3),
                 (4, NULL, 'Entire home', 42.0, -75.0, 2)
             ) AS t(id, price, room_type, latitude, longitude, location_id)",
        )
    }

    #[test]
    fn test_overview() {
        let reports = Reports::new(listings()).unwrap();
        let overview = reports.overview().unwrap();
        assert_eq!(overview.total_listings, 4);
        assert_eq!(overview.min_price, Some(50.0));
        assert_eq!(overview.max_price, Some(200.0));
        let avg = overview.avg_price.unwrap();
        assert!((avg - 350.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_neighbourhoods_skips_unnamed() {
        let reports = Reports::new(listings()).unwrap();
        let top = reports.top_neighbourhoods(20).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].neighbourhood, "downtown");
        assert_eq!(top[0].listings, 2);
        assert_eq!(top[0].avg_price, Some(150.0));
    }

    #[test]
    fn test_hotspots_round_coordinates() {
        let reports = Reports::new(listings()).unwrap();
        let hotspots = reports.price_hotspots(25).unwrap();
        assert_eq!(hotspots[0].lat_bucket, Some(40.0));
        assert_eq!(hotspots[0].listings, 2);
        assert_eq!(hotspots[0].avg_price, Some(150.0));
        assert_eq!(reports.price_hotspots(1).unwrap().len(), 1);
    }

    #[test]
    fn test_room_types_ordered_by_price() {
        let reports = Reports::new(listings()).unwrap();
        let rooms = reports.room_types().unwrap();
        let names: Vec<_> = rooms.iter().map(|r| r.room_type.as_deref()).collect();
        assert_eq!(
            names,
            vec![Some("Private room"), Some("Shared room"), Some("Entire home")]
        );
        assert_eq!(rooms.iter().map(|r| r.listings).sum::<u64>(), 4);
    }

    #[test]
    fn test_price_histogram() {
        let reports = Reports::new(listings()).unwrap();
        let bins = reports.price_histogram(3).unwrap();
        assert_eq!(bins.len(), 3);
        assert_eq!(bins[0].lower, 50.0);
        assert_eq!(bins[2].upper, 200.0);
        // 50 | 100 | 200: the maximum lands in the last bucket
        assert_eq!(
            bins.iter().map(|b| b.count).collect::<Vec<_>>(),
            vec![1, 1, 1]
        );
        assert!(reports.price_histogram(0).unwrap().is_empty());
    }

    #[test]
    fn test_histogram_single_value() {
        let store = built_store("SELECT 10.0::DOUBLE AS price UNION ALL SELECT 10.0::DOUBLE");
        let bins = Reports::new(store).unwrap().price_histogram(5).unwrap();
        assert_eq!(
            bins,
            vec![HistogramBin {
                lower: 10.0,
                upper: 10.0,
                count: 2
            }]
        );
    }

    #[test]
    fn test_missing_price_column() {
        let store = built_store("SELECT 1 AS id, 'Private room' AS room_type");
        let reports = Reports::new(store).unwrap();
        let err = reports.room_types().unwrap_err();
        assert!(matches!(
            err,
            QueryError::MissingColumn { ref column, .. } if column == "price"
        ));
        assert!(matches!(
            reports.overview().unwrap_err(),
            QueryError::MissingColumn { .. }
        ));
    }

    #[test]
    fn test_refuses_without_build() {
        let store = Warehouse::in_memory().unwrap();
        assert!(matches!(
            Reports::new(store).unwrap_err(),
            QueryError::NoBuild
        ));
    }

    #[test]
    fn test_refuses_failed_build() {
        let store = listings();
        store.begin_build("run-2").unwrap();
        store
            .fail_build("run-2", "transform", Some("fact_listing"), "boom")
            .unwrap();
        let err = Reports::new(store).unwrap_err();
        assert!(matches!(
            err,
            QueryError::IncompleteBuild { ref status, .. } if status == "failed"
        ));
    }
}
