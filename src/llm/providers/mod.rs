pub mod gemini;
pub mod proxy;
