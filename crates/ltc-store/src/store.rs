use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use ltc_core::{
    AttributeValue, BranchSet, CollapseOutcome, CollapsedZone, ForkBreakdown, RateMatrix,
    WireBranchSet, Zone,
};

use crate::error::{Result, StoreError};
use crate::schema;

/// One persisted collapse run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub id: Uuid,
    pub created_at: String,
    pub bin_width: f64,
    pub zone_count: usize,
    pub labels: Vec<String>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // --- Save ---

    /// Persist a collapse outcome, fork breakdowns included, as a new run.
    pub fn save_run(&self, outcome: &CollapseOutcome, bin_width: f64) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO runs (id, bin_width, labels) VALUES (?1, ?2, ?3)",
            params![
                run_id.to_string(),
                bin_width,
                serde_json::to_string(&outcome.labels)?
            ],
        )?;

        for (position, collapsed) in outcome.zones.iter().enumerate() {
            let weights = outcome.weights.get(position).map(Vec::as_slice).unwrap_or(&[]);
            self.save_zone_on(&tx, run_id, position, collapsed, weights)?;
            if let Some(breakdown) = outcome.breakdown(&collapsed.zone.id) {
                self.save_breakdown_on(&tx, run_id, &collapsed.zone.id, breakdown)?;
            }
        }

        for (position, branch_set) in outcome.remaining.iter().enumerate() {
            tx.execute(
                "INSERT INTO remaining_branch_sets (run_id, position, branch_set) VALUES (?1, ?2, ?3)",
                params![
                    run_id.to_string(),
                    position as i64,
                    serde_json::to_string(&WireBranchSet::from(branch_set))?
                ],
            )?;
        }

        tx.commit()?;
        tracing::info!(
            run = %run_id,
            zones = outcome.zones.len(),
            remaining = outcome.remaining.len(),
            "saved collapse run"
        );
        Ok(run_id)
    }

    fn save_zone_on(
        &self,
        conn: &Connection,
        run_id: Uuid,
        position: usize,
        collapsed: &CollapsedZone,
        weights: &[f64],
    ) -> Result<()> {
        let zone = &collapsed.zone;
        conn.execute(
            "INSERT INTO zones (run_id, zone_id, position, mmin, mmax, a, b, stdb, stdmmax, attributes, mag_bin, occur_rates, weights)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                run_id.to_string(),
                zone.id,
                position as i64,
                zone.mmin,
                zone.mmax,
                zone.a,
                zone.b,
                zone.stdb,
                zone.stdmmax,
                serde_json::to_string(&zone.attributes)?,
                collapsed.mag_bin,
                serde_json::to_string(&collapsed.occur_rates)?,
                serde_json::to_string(weights)?,
            ],
        )?;
        Ok(())
    }

    fn save_breakdown_on(
        &self,
        conn: &Connection,
        run_id: Uuid,
        zone_id: &str,
        breakdown: &ForkBreakdown,
    ) -> Result<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO forks (run_id, zone_id, fork_idx, label, weight, first_mag, rates)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        let forks = breakdown
            .rates
            .columns()
            .iter()
            .zip(&breakdown.weights)
            .zip(&breakdown.labels);
        for (fork_idx, ((rates, weight), label)) in forks.enumerate() {
            stmt.execute(params![
                run_id.to_string(),
                zone_id,
                fork_idx as i64,
                label,
                weight,
                breakdown.first_mag,
                serde_json::to_string(rates)?,
            ])?;
        }
        Ok(())
    }

    // --- Runs ---

    /// All runs, newest first.
    pub fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.created_at, r.bin_width, r.labels,
                    (SELECT COUNT(*) FROM zones z WHERE z.run_id = r.id)
             FROM runs r ORDER BY r.created_at DESC, r.rowid DESC",
        )?;

        let rows: Vec<(String, String, f64, String, i64)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(id, created_at, bin_width, labels, zone_count)| {
                Ok(RunSummary {
                    id: parse_uuid(&id)?,
                    created_at,
                    bin_width,
                    zone_count: zone_count as usize,
                    labels: serde_json::from_str(&labels)?,
                })
            })
            .collect()
    }

    pub fn latest_run(&self) -> Result<Option<RunSummary>> {
        Ok(self.list_runs()?.into_iter().next())
    }

    pub fn get_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.list_runs()?.into_iter().find(|run| run.id == run_id))
    }

    // --- Load ---

    /// Collapsed zones of a run, in their original order.
    pub fn load_zones(&self, run_id: Uuid) -> Result<Vec<CollapsedZone>> {
        let mut stmt = self.conn.prepare(
            "SELECT zone_id, mmin, mmax, a, b, stdb, stdmmax, attributes, mag_bin, occur_rates
             FROM zones WHERE run_id = ?1 ORDER BY position",
        )?;

        let rows = stmt
            .query_map([run_id.to_string()], |row| {
                let zone = Zone {
                    id: row.get(0)?,
                    mmin: row.get(1)?,
                    mmax: row.get(2)?,
                    a: row.get(3)?,
                    b: row.get(4)?,
                    stdb: row.get(5)?,
                    stdmmax: row.get(6)?,
                    attributes: BTreeMap::new(),
                };
                let attributes: String = row.get(7)?;
                let mag_bin: f64 = row.get(8)?;
                let occur_rates: String = row.get(9)?;
                Ok((zone, attributes, mag_bin, occur_rates))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut zone, attributes, mag_bin, occur_rates)| {
                zone.attributes =
                    serde_json::from_str::<BTreeMap<String, AttributeValue>>(&attributes)?;
                Ok(CollapsedZone {
                    zone,
                    occur_rates: serde_json::from_str(&occur_rates)?,
                    mag_bin,
                })
            })
            .collect()
    }

    /// Fork breakdown of one zone, `None` when the run has no such zone.
    pub fn load_breakdown(&self, run_id: Uuid, zone_id: &str) -> Result<Option<ForkBreakdown>> {
        let bin_width: Option<f64> = self
            .conn
            .query_row(
                "SELECT bin_width FROM runs WHERE id = ?1",
                [run_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(bin_width) = bin_width else {
            return Err(StoreError::InvalidData(format!("run not found: {run_id}")));
        };

        let mut stmt = self.conn.prepare(
            "SELECT label, weight, first_mag, rates FROM forks
             WHERE run_id = ?1 AND zone_id = ?2 ORDER BY fork_idx",
        )?;
        let rows: Vec<(String, f64, f64, String)> = stmt
            .query_map(params![run_id.to_string(), zone_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<std::result::Result<_, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }

        let first_mag = rows[0].2;
        let mut labels = Vec::with_capacity(rows.len());
        let mut weights = Vec::with_capacity(rows.len());
        let mut columns = Vec::with_capacity(rows.len());
        for (label, weight, _, rates) in rows {
            labels.push(label);
            weights.push(weight);
            columns.push(serde_json::from_str::<Vec<f64>>(&rates)?);
        }

        Ok(Some(ForkBreakdown {
            first_mag,
            bin_width,
            rates: RateMatrix::from_columns(columns),
            weights,
            labels,
        }))
    }

    /// Non-collapsible branch sets of a run, in tree order.
    pub fn load_remaining(&self, run_id: Uuid) -> Result<Vec<BranchSet>> {
        let mut stmt = self.conn.prepare(
            "SELECT branch_set FROM remaining_branch_sets WHERE run_id = ?1 ORDER BY position",
        )?;
        let rows: Vec<String> = stmt
            .query_map([run_id.to_string()], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        rows.iter()
            .map(|json| {
                let wire: WireBranchSet = serde_json::from_str(json)?;
                Ok(BranchSet::try_from(wire)?)
            })
            .collect()
    }

    /// Rebuild the outcome of a run. Breakdowns stay in the store; use
    /// [`Store::load_breakdown`] for them.
    pub fn load_outcome(&self, run_id: Uuid) -> Result<CollapseOutcome> {
        let run = self
            .get_run(run_id)?
            .ok_or_else(|| StoreError::InvalidData(format!("run not found: {run_id}")))?;
        let zones = self.load_zones(run_id)?;

        let mut stmt = self
            .conn
            .prepare("SELECT weights FROM zones WHERE run_id = ?1 ORDER BY position")?;
        let rows: Vec<String> = stmt
            .query_map([run_id.to_string()], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        let weights = rows
            .iter()
            .map(|json| serde_json::from_str::<Vec<f64>>(json))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(CollapseOutcome::from_parts(
            zones,
            self.load_remaining(run_id)?,
            weights,
            run.labels,
        ))
    }
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("invalid UUID '{s}': {e}")))
}
