//! ABOUTME: SMS adapter implementations
//! ABOUTME: Twilio for production, log and memory senders otherwise

pub mod log;
pub mod memory;
pub mod twilio;

pub use log::LogSender;
pub use memory::MemorySender;
pub use twilio::TwilioSender;
