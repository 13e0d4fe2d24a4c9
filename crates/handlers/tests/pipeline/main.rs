/// End-to-end tests for the onboarding pipeline: ingestion, queue intake,
/// catalog and job stages, and tag-compliance reporting.

mod helpers;
mod intake;
mod reporting;
mod scenario;
mod stages;
