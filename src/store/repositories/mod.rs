mod metadata;
mod segments;
mod visits;

pub use metadata::MetadataStore;
pub use segments::SegmentStore;
pub use visits::VisitStore;
