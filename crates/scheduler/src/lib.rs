pub mod refill_sweep;
pub mod reminders;

pub use refill_sweep::RefillSweepService;
pub use reminders::{due_slots, MedicationReminderService, Reminder};
