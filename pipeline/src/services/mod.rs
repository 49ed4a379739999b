//! Pipeline services over the weather and climate schema

pub mod aggregate;
pub mod baseline;
pub mod ingest;
pub mod observations;
pub mod phenology;
pub mod stations;

pub use aggregate::ZoneAggregationService;
pub use baseline::BaselineService;
pub use ingest::IngestionService;
pub use observations::ObservationStore;
pub use phenology::PhenologyService;
pub use stations::StationService;
