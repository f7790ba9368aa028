// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod artifact_name;
mod id;
mod segment_name;

pub use artifact_name::{ArtifactName, ArtifactNameError};
pub use id::{ArtifactId, AttemptId, Id};
pub use segment_name::{SegmentName, SegmentNameError};
