mod ids;
mod project;
pub mod result;

pub use ids::{ForecastId, PortfolioId, ProjectId};
pub use project::{
    Actual, AccuracyStats, ExecutionMode, Forecast, ForecastType, Portfolio, PortfolioProject,
    PortfolioStatus, Project, ProjectStatus, RiskLevel, SimulationRun, compute_accuracy,
    find_dependency_cycle,
};
pub use result::{Histogram, HistogramBin, Percentiles, SimulationResult};
