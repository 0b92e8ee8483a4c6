pub mod availability;
pub mod slots;
pub mod store;

pub use availability::AvailabilityResolver;
pub use slots::SlotGenerator;
pub use store::{InMemoryScheduleRepository, ScheduleRepository};
