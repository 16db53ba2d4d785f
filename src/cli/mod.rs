pub mod maintenance;
pub mod prices;
pub mod setup;
pub mod ui;
