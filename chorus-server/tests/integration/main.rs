
mod room_tests;
mod signaling_tests;
