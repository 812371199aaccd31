// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod controller;
pub mod corpus;
pub mod history;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod supply;
