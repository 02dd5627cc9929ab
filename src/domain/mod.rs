pub mod access;
pub mod feedback;
pub mod lifecycle;
pub mod models;
pub mod validation;
