pub mod metadata;
pub mod segment;
pub mod visit;

pub use metadata::{MetadataCapture, WebsiteMetadataRecord};
pub use segment::TimeSegment;
pub use visit::{PageKey, VisitRecord};
