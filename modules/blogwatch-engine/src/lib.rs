pub mod enrichment;
pub mod orchestrator;

pub use enrichment::{EnrichOutcome, EnrichmentPipeline};
pub use orchestrator::{Orchestrator, TickSummary};
