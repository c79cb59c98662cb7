//! Repositories over the canonical tables.
//!
//! Row mapping only. List reads fall back to an empty list when storage
//! stays unavailable; writes and single lookups surface the failure.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::database::Database;
use crate::error::Result;

const VEHICLE_COLUMNS: &str =
    "Id, Plate, Model, ModelYear, OriginRegionId, CurrentRegionId, Odometer, CreatedAt";

const MAINTENANCE_COLUMNS: &str =
    "Id, VehicleId, Kind, Description, CostCents, Odometer, PerformedOn";

/// A stored vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vehicle {
    pub id: i64,
    pub plate: String,
    pub model: String,
    pub model_year: Option<i32>,
    pub origin_region_id: i64,
    pub current_region_id: i64,
    pub odometer: i64,
    pub created_at: String,
}

impl Vehicle {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            plate: row.get(1)?,
            model: row.get(2)?,
            model_year: row.get(3)?,
            origin_region_id: row.get(4)?,
            current_region_id: row.get(5)?,
            odometer: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// A vehicle to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVehicle {
    pub plate: String,
    pub model: String,
    pub model_year: Option<i32>,
    pub origin_region_id: i64,
    pub current_region_id: i64,
    pub odometer: i64,
}

impl NewVehicle {
    /// A vehicle with unknown regions and a zero odometer.
    pub fn new(plate: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            plate: plate.into(),
            model: model.into(),
            model_year: None,
            origin_region_id: 1,
            current_region_id: 1,
            odometer: 0,
        }
    }

    pub fn with_model_year(mut self, year: i32) -> Self {
        self.model_year = Some(year);
        self
    }

    pub fn with_regions(mut self, origin: i64, current: i64) -> Self {
        self.origin_region_id = origin;
        self.current_region_id = current;
        self
    }

    pub fn with_odometer(mut self, odometer: i64) -> Self {
        self.odometer = odometer;
        self
    }
}

/// A maintenance log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Maintenance {
    pub id: i64,
    pub vehicle_id: i64,
    pub kind: String,
    pub description: String,
    pub cost_cents: i64,
    pub odometer: Option<i64>,
    pub performed_on: String,
}

impl Maintenance {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            vehicle_id: row.get(1)?,
            kind: row.get(2)?,
            description: row.get(3)?,
            cost_cents: row.get(4)?,
            odometer: row.get(5)?,
            performed_on: row.get(6)?,
        })
    }
}

/// A maintenance entry to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMaintenance {
    pub vehicle_id: i64,
    pub kind: String,
    pub description: String,
    pub cost_cents: i64,
    pub odometer: Option<i64>,
    pub performed_on: String,
}

/// A region reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Region {
    pub id: i64,
    pub code: String,
    pub name: String,
}

/// Vehicle rows.
#[derive(Debug, Clone)]
pub struct VehicleRepository {
    db: Database,
}

impl VehicleRepository {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    /// Insert a vehicle, returning its id.
    pub async fn insert(&self, vehicle: &NewVehicle) -> Result<i64> {
        self.db
            .with_storage("vehicle.insert", |conn| {
                conn.execute(
                    "INSERT INTO Vehicle (Plate, Model, ModelYear, OriginRegionId, CurrentRegionId, Odometer)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        vehicle.plate,
                        vehicle.model,
                        vehicle.model_year,
                        vehicle.origin_region_id,
                        vehicle.current_region_id,
                        vehicle.odometer,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    pub async fn find_by_plate(&self, plate: &str) -> Result<Option<Vehicle>> {
        let sql = format!("SELECT {} FROM Vehicle WHERE Plate = ?1", VEHICLE_COLUMNS);
        self.db
            .with_storage("vehicle.find_by_plate", |conn| {
                conn.query_row(&sql, [plate], Vehicle::from_row).optional()
            })
            .await
    }

    /// Every vehicle, by plate. Empty when storage stays unavailable.
    pub async fn list(&self) -> Result<Vec<Vehicle>> {
        let sql = format!("SELECT {} FROM Vehicle ORDER BY Plate", VEHICLE_COLUMNS);
        self.db
            .with_storage_or("vehicle.list", Vec::new(), |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], Vehicle::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.db
            .with_storage("vehicle.count", |conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM Vehicle", [], |row| row.get(0))?;
                Ok(n.max(0) as usize)
            })
            .await
    }
}

/// Maintenance log rows.
#[derive(Debug, Clone)]
pub struct MaintenanceRepository {
    db: Database,
}

impl MaintenanceRepository {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    /// Record an entry, returning its id.
    pub async fn record(&self, entry: &NewMaintenance) -> Result<i64> {
        self.db
            .with_storage("maintenance.record", |conn| {
                conn.execute(
                    "INSERT INTO Maintenance (VehicleId, Kind, Description, CostCents, Odometer, PerformedOn)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        entry.vehicle_id,
                        entry.kind,
                        entry.description,
                        entry.cost_cents,
                        entry.odometer,
                        entry.performed_on,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    /// Entries for a vehicle, oldest first.
    pub async fn for_vehicle(&self, vehicle_id: i64) -> Result<Vec<Maintenance>> {
        let sql = format!(
            "SELECT {} FROM Maintenance WHERE VehicleId = ?1 ORDER BY PerformedOn, Id",
            MAINTENANCE_COLUMNS
        );
        self.db
            .with_storage_or("maintenance.for_vehicle", Vec::new(), |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([vehicle_id], Maintenance::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }
}

/// Region reference rows.
#[derive(Debug, Clone)]
pub struct RegionRepository {
    db: Database,
}

impl RegionRepository {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    pub async fn list(&self) -> Result<Vec<Region>> {
        self.db
            .with_storage_or("region.list", Vec::new(), |conn| {
                let mut stmt = conn.prepare("SELECT Id, Code, Name FROM Region ORDER BY Id")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(Region {
                            id: row.get(0)?,
                            code: row.get(1)?,
                            name: row.get(2)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Surrogate id of a region code.
    pub async fn id_for_code(&self, code: &str) -> Result<Option<i64>> {
        self.db
            .with_storage("region.id_for_code", |conn| {
                conn.query_row("SELECT Id FROM Region WHERE Code = ?1", [code], |row| row.get(0))
                    .optional()
            })
            .await
    }
}
