//! Component registry.
//!
//! Every service is listed here with the function that constructs it.
//! Components not overridden get their default constructor.

use std::sync::Arc;

use crate::database::Database;
use crate::lookup::{PlacardService, StubPlacardLookup};
use crate::repository::{MaintenanceRepository, RegionRepository, VehicleRepository};

/// Constructor for a component.
pub type Constructor<T> = Box<dyn Fn(&Database) -> T + Send + Sync>;

/// The application's services.
#[derive(Debug, Clone)]
pub struct Services {
    pub database: Database,
    pub vehicles: VehicleRepository,
    pub maintenance: MaintenanceRepository,
    pub regions: RegionRepository,
    pub placards: PlacardService,
}

/// Builds [`Services`] from constructor functions.
pub struct ServicesBuilder {
    database: Database,
    vehicles: Constructor<VehicleRepository>,
    maintenance: Constructor<MaintenanceRepository>,
    regions: Constructor<RegionRepository>,
    placards: Constructor<PlacardService>,
}

impl ServicesBuilder {
    /// A builder with every default constructor.
    pub fn new(database: Database) -> Self {
        Self {
            database,
            vehicles: Box::new(VehicleRepository::new),
            maintenance: Box::new(MaintenanceRepository::new),
            regions: Box::new(RegionRepository::new),
            placards: Box::new(default_placards),
        }
    }

    pub fn vehicles(
        mut self,
        ctor: impl Fn(&Database) -> VehicleRepository + Send + Sync + 'static,
    ) -> Self {
        self.vehicles = Box::new(ctor);
        self
    }

    pub fn maintenance(
        mut self,
        ctor: impl Fn(&Database) -> MaintenanceRepository + Send + Sync + 'static,
    ) -> Self {
        self.maintenance = Box::new(ctor);
        self
    }

    pub fn regions(
        mut self,
        ctor: impl Fn(&Database) -> RegionRepository + Send + Sync + 'static,
    ) -> Self {
        self.regions = Box::new(ctor);
        self
    }

    pub fn placards(
        mut self,
        ctor: impl Fn(&Database) -> PlacardService + Send + Sync + 'static,
    ) -> Self {
        self.placards = Box::new(ctor);
        self
    }

    /// Construct every component.
    pub fn build(self) -> Services {
        let db = &self.database;
        Services {
            vehicles: (self.vehicles)(db),
            maintenance: (self.maintenance)(db),
            regions: (self.regions)(db),
            placards: (self.placards)(db),
            database: self.database.clone(),
        }
    }
}

/// Placard lookups against the demo registry.
fn default_placards(db: &Database) -> PlacardService {
    PlacardService::new(Arc::new(StubPlacardLookup::sample()), db.executor().clone())
}
