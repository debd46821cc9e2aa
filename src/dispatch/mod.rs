/// Per-village battery state simulator.
pub mod battery;
pub mod kpi;
pub mod orchestrator;
/// Cross-village surplus pooling.
pub mod pool;
pub mod types;

pub use battery::{BatterySimulator, EmptySeriesPolicy};
pub use kpi::VillageSummary;
pub use orchestrator::{MultiVillageOrchestrator, PoolOrder, RunOutput};
pub use pool::{EnergyPoolCoordinator, PoolStep};
pub use types::{BatteryConfig, BatteryState, DispatchRecord, ForecastPoint, VillageId};
