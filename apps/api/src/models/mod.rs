pub mod application;
pub mod company;
pub mod feedback;
pub mod resume;
pub mod user;
