pub mod appointment;
pub mod session;

pub use appointment::{clinic_now, clinic_offset, Appointment, CLINIC_TIMEZONE};
pub use session::{
    BookingState, ConversationMessage, ConversationSession, PatientDetails, Role, SessionStatus,
};
