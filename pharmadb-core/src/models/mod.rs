//! Domain models shared by the store and its callers

pub mod measurement;
pub mod pagination;
pub mod sender;
pub mod status;
pub mod validation;

pub use measurement::StandardRange;
pub use pagination::{OrderBy, Paginated, Pagination, SortOrder};
pub use sender::SenderType;
pub use status::{ExperimentResult, ExperimentStatus};
pub use validation::ValidationError;
