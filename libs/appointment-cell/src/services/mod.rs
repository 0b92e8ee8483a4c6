pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod locks;
pub mod store;

pub use booking::BookingCoordinator;
pub use conflict::{ConflictDetector, DaySnapshot};
pub use lifecycle::{AppointmentLifecycle, LifecycleCommand};
pub use locks::SlotLocks;
pub use store::{
    AppointmentRepository, InMemoryAppointmentRepository, InMemoryServiceRepository,
    ServiceRepository,
};
