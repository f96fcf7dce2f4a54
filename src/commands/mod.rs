// Packaging
pub mod build;

// Azure
pub mod deploy;

// Pipeline helpers
pub mod variables;
