pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

pub const BASE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Capacity of the outbound capture queue between the device callback and the send task.
pub const OUTBOUND_CAPACITY: usize = 64;
