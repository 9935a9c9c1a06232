mod fanout;
mod participant;

pub use participant::{Participant, ParticipantState};
