use serde::{Deserialize, Serialize};

mod consolidate_interview;
pub use consolidate_interview::{ConsolidateInterviewJob, process_consolidate_interview};

mod pattern_scan;
pub use pattern_scan::{PatternScanJob, process_pattern_scan};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerJob {
  Consolidate(ConsolidateInterviewJob),
  PatternScan(PatternScanJob),
}
