pub mod booking;
pub mod conflict;
pub mod repository;

pub use booking::AppointmentService;
pub use conflict::SchedulingValidator;
pub use repository::{AppointmentRepository, SupabaseAppointmentRepository};
