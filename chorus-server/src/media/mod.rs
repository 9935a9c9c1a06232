mod session;

pub use session::{supports_opus, MediaEvent, MediaSession};
