pub mod connectivity;
pub mod health;
pub mod progress;
